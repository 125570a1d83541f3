use async_trait::async_trait;
use time::OffsetDateTime;

use crate::error::HistoryError;
use crate::record::{HistoryEvent, RunOutcome, RunRecord, SignalRecord};

/// Durable storage for workflow runs.
///
/// A `HistoryStore` keeps, per run, the run record, the event history and the
/// signal log. The engine writes every command outcome here before the
/// workflow observes it, so a run can be rebuilt after a crash by replaying
/// its history in sequence order.
///
/// ## Open-run exclusivity
///
/// `create_run` must reject a new run while the same workflow id has a run
/// that has not closed (`WorkflowAlreadyOpen`). Closed runs do not block a
/// new start.
///
/// ## Append-only history
///
/// `append_event` rejects a sequence number that is already recorded
/// (`SequenceConflict`), and both `append_event` and `append_signal` reject
/// writes to a closed run (`RunClosed`).
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static`; the engine shares one
/// store across every run task.
#[async_trait]
pub trait HistoryStore: Send + Sync + 'static {
    // ── Runs ─────────────────────────────────────────────────────────────────

    /// Persist a new run in `RUNNING` status.
    async fn create_run(&self, run: RunRecord) -> Result<(), HistoryError>;

    /// Read a run by run id.
    async fn get_run(&self, run_id: &str) -> Result<RunRecord, HistoryError>;

    /// Read the most recently created run for a workflow id.
    ///
    /// Returns `Err(HistoryError::WorkflowNotFound)` if none exists.
    async fn latest_run(&self, workflow_id: &str) -> Result<RunRecord, HistoryError>;

    /// All runs that have not closed, oldest first.
    async fn list_open_runs(&self) -> Result<Vec<RunRecord>, HistoryError>;

    /// Close a run with its terminal outcome.
    ///
    /// Returns `Err(HistoryError::RunClosed)` if the run is already closed.
    async fn close_run(&self, run_id: &str, outcome: RunOutcome) -> Result<(), HistoryError>;

    // ── History ──────────────────────────────────────────────────────────────

    /// Append one event to a run's history.
    async fn append_event(&self, run_id: &str, event: HistoryEvent) -> Result<(), HistoryError>;

    /// Load a run's history ordered by sequence number.
    async fn load_events(&self, run_id: &str) -> Result<Vec<HistoryEvent>, HistoryError>;

    // ── Signals ──────────────────────────────────────────────────────────────

    /// Persist a signal for a run and assign its arrival id.
    async fn append_signal(
        &self,
        run_id: &str,
        name: &str,
        payload: serde_json::Value,
        received_at: OffsetDateTime,
    ) -> Result<SignalRecord, HistoryError>;

    /// Load a run's signal log in arrival order.
    async fn load_signals(&self, run_id: &str) -> Result<Vec<SignalRecord>, HistoryError>;
}

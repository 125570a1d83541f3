/// All errors that can be returned by a HistoryStore implementation.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// No run with the given run id.
    #[error("run not found: {run_id}")]
    RunNotFound { run_id: String },

    /// No run was ever recorded for the workflow id.
    #[error("no run recorded for workflow {workflow_id}")]
    WorkflowNotFound { workflow_id: String },

    /// A run with this run id already exists.
    #[error("run already exists: {run_id}")]
    RunAlreadyExists { run_id: String },

    /// The workflow id already has a run that has not closed.
    #[error("workflow {workflow_id} already has an open run {run_id}")]
    WorkflowAlreadyOpen { workflow_id: String, run_id: String },

    /// An event with this sequence number is already part of the history.
    #[error("history conflict on run {run_id}: sequence {seq} already recorded")]
    SequenceConflict { run_id: String, seq: u64 },

    /// The run is closed; its history and signal log are frozen.
    #[error("run is closed: {run_id}")]
    RunClosed { run_id: String },

    /// A backend-specific error (connection, serialization, etc.).
    #[error("history backend error: {0}")]
    Backend(String),
}

//! Conformance test suite for `HistoryStore` implementations.
//!
//! Any backend can run this suite to check the behavior the engine relies on:
//!
//! - **Runs**: creation, open-run exclusivity per workflow id, latest-run lookup, closing
//! - **Events**: ordered history, sequence conflicts, frozen history after close
//! - **Signals**: arrival-ordered ids, per-run isolation, frozen log after close
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty store for each test:
//!
//! ```ignore
//! use dict_history::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn postgres_history_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         create_test_postgres_history().await
//!     }).await;
//!     assert!(report.is_clean(), "{report}");
//! }
//! ```

/// Run each named check against `$factory` and collect the outcomes under
/// `$area`. The check's function name doubles as its label.
macro_rules! checks {
    ($area:literal, $factory:expr => $($check:ident),+ $(,)?) => {
        vec![$(super::Check::new($area, stringify!($check), $check($factory).await)),+]
    };
}

mod events;
mod runs;
mod signals;

use std::fmt;
use std::future::Future;

use time::macros::datetime;
use time::OffsetDateTime;

use crate::record::{RunOutcome, RunRecord, RunStatus};
use crate::HistoryStore;

/// One check against one fresh store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub area: &'static str,
    pub name: &'static str,
    pub failure: Option<String>,
}

impl Check {
    fn new(area: &'static str, name: &'static str, outcome: Result<(), String>) -> Self {
        Self {
            area,
            name,
            failure: outcome.err(),
        }
    }

    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConformanceReport {
    pub checks: Vec<Check>,
}

impl ConformanceReport {
    pub fn total(&self) -> usize {
        self.checks.len()
    }

    pub fn failures(&self) -> impl Iterator<Item = &Check> {
        self.checks.iter().filter(|c| !c.passed())
    }

    /// True when every check passed.
    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failed = self.failures().count();
        write!(f, "history store: {failed} of {} checks failed", self.total())?;
        for check in self.failures() {
            let why = check.failure.as_deref().unwrap_or_default();
            write!(f, "\n  {}::{} {why}", check.area, check.name)?;
        }
        Ok(())
    }
}

/// Run every check against stores built by `factory`, one store per check.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: HistoryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut checks = runs::run_run_tests(&factory).await;
    checks.extend(events::run_event_tests(&factory).await);
    checks.extend(signals::run_signal_tests(&factory).await);
    ConformanceReport { checks }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

const T0: OffsetDateTime = datetime!(2025-01-01 00:00:00 UTC);

fn make_run(run_id: &str, workflow_id: &str) -> RunRecord {
    RunRecord {
        run_id: run_id.to_string(),
        workflow_id: workflow_id.to_string(),
        workflow_type: "ConformanceWorkflow".to_string(),
        input: serde_json::json!({"test": true}),
        status: RunStatus::Running,
        started_at: T0,
        closed_at: None,
        execution_timeout_ms: None,
        execution_deadline: None,
        result: None,
        error: None,
        continued_from: None,
        parent_run_id: None,
    }
}

fn completed() -> RunOutcome {
    RunOutcome {
        status: RunStatus::Completed,
        result: Some(serde_json::json!({"status": "COMPLETED"})),
        error: None,
        closed_at: T0 + time::Duration::minutes(1),
    }
}

fn check(condition: bool, msg: impl Into<String>) -> Result<(), String> {
    if condition {
        Ok(())
    } else {
        Err(msg.into())
    }
}

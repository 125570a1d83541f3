use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Lifecycle status of a single workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    ContinuedAsNew,
    TimedOut,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Completed => "COMPLETED",
            RunStatus::Failed => "FAILED",
            RunStatus::ContinuedAsNew => "CONTINUED_AS_NEW",
            RunStatus::TimedOut => "TIMED_OUT",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One run of a workflow.
///
/// A workflow id can have many runs over time (continue-as-new, or a fresh
/// start after the previous run closed), but at most one open run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub workflow_id: String,
    pub workflow_type: String,
    pub input: serde_json::Value,
    pub status: RunStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub closed_at: Option<OffsetDateTime>,
    /// Execution timeout in milliseconds; carried over on continue-as-new.
    pub execution_timeout_ms: Option<u64>,
    /// Absolute deadline derived from `started_at + execution_timeout_ms`.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub execution_deadline: Option<OffsetDateTime>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    /// Run id this run was continued from.
    pub continued_from: Option<String>,
    /// Run id of the parent when started as a child workflow.
    pub parent_run_id: Option<String>,
}

impl RunRecord {
    pub fn is_open(&self) -> bool {
        !self.status.is_terminal()
    }
}

/// Terminal outcome written when a run closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub closed_at: OffsetDateTime,
}

/// A signal as persisted in a run's signal log.
///
/// `signal_id` is assigned by the store and increases with arrival order
/// across the whole store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub signal_id: u64,
    pub name: String,
    pub payload: serde_json::Value,
    #[serde(with = "time::serde::rfc3339")]
    pub received_at: OffsetDateTime,
}

/// Which branch a selector resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "branch", rename_all = "snake_case")]
pub enum SelectChoice {
    Signal { channel: String, signal_id: u64 },
    Timer { timer_seq: u64 },
}

/// A recorded command outcome. Every variant carries the command sequence
/// number it answers; replay matches commands to events by that number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryEvent {
    ClockRead {
        seq: u64,
        #[serde(with = "time::serde::rfc3339")]
        at: OffsetDateTime,
    },
    ActivityCompleted {
        seq: u64,
        activity: String,
        attempts: u32,
        output: serde_json::Value,
    },
    ActivityFailed {
        seq: u64,
        activity: String,
        attempts: u32,
        /// Serialized activity error, decoded by the engine on replay.
        error: serde_json::Value,
    },
    TimerStarted {
        seq: u64,
        #[serde(with = "time::serde::rfc3339")]
        fire_at: OffsetDateTime,
    },
    TimerFired {
        seq: u64,
        timer_seq: u64,
    },
    SelectResolved {
        seq: u64,
        choice: SelectChoice,
    },
    ChildCompleted {
        seq: u64,
        workflow_id: String,
        output: serde_json::Value,
    },
    ChildFailed {
        seq: u64,
        workflow_id: String,
        error: String,
    },
}

impl HistoryEvent {
    pub fn seq(&self) -> u64 {
        match self {
            HistoryEvent::ClockRead { seq, .. }
            | HistoryEvent::ActivityCompleted { seq, .. }
            | HistoryEvent::ActivityFailed { seq, .. }
            | HistoryEvent::TimerStarted { seq, .. }
            | HistoryEvent::TimerFired { seq, .. }
            | HistoryEvent::SelectResolved { seq, .. }
            | HistoryEvent::ChildCompleted { seq, .. }
            | HistoryEvent::ChildFailed { seq, .. } => *seq,
        }
    }

    /// Short name used in non-determinism diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            HistoryEvent::ClockRead { .. } => "clock_read",
            HistoryEvent::ActivityCompleted { .. } => "activity_completed",
            HistoryEvent::ActivityFailed { .. } => "activity_failed",
            HistoryEvent::TimerStarted { .. } => "timer_started",
            HistoryEvent::TimerFired { .. } => "timer_fired",
            HistoryEvent::SelectResolved { .. } => "select_resolved",
            HistoryEvent::ChildCompleted { .. } => "child_completed",
            HistoryEvent::ChildFailed { .. } => "child_failed",
        }
    }
}

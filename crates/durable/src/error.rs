use std::fmt;

use serde::{Deserialize, Serialize};

use dict_history::HistoryError;

/// Business reasons an activity refuses work without being retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    InvalidTransition,
    AlreadyExists,
    NotFound,
    Conflict,
    Duplicate,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Validation => "validation",
            FailureKind::InvalidTransition => "invalid transition",
            FailureKind::AlreadyExists => "already exists",
            FailureKind::NotFound => "not found",
            FailureKind::Conflict => "conflict",
            FailureKind::Duplicate => "duplicate",
        };
        f.write_str(s)
    }
}

/// Error returned by an activity attempt or by the retry dispatcher.
///
/// Serializable so a terminal failure can be recorded in history and handed
/// back unchanged on replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivityError {
    /// Infrastructure failure; the dispatcher retries per policy.
    #[error("{message}")]
    Retryable { message: String },

    /// Business rule violation; returned to the workflow immediately.
    #[error("{kind}: {message}")]
    NonRetryable { kind: FailureKind, message: String },

    /// A single attempt exceeded its start-to-close timeout.
    #[error("attempt timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The activity stopped heartbeating.
    #[error("no heartbeat within {timeout_ms}ms")]
    HeartbeatTimeout { timeout_ms: u64 },

    /// Attempts or the schedule-to-close budget ran out.
    #[error("activity {activity} gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        activity: String,
        attempts: u32,
        last: Box<ActivityError>,
    },

    #[error("activity {activity} is not registered")]
    NotRegistered { activity: String },

    #[error("activity payload codec error: {message}")]
    Codec { message: String },
}

impl ActivityError {
    pub fn retryable(message: impl Into<String>) -> Self {
        ActivityError::Retryable {
            message: message.into(),
        }
    }

    pub fn non_retryable(kind: FailureKind, message: impl Into<String>) -> Self {
        ActivityError::NonRetryable {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::non_retryable(FailureKind::Validation, message)
    }

    /// Whether the dispatcher should schedule another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ActivityError::Retryable { .. }
                | ActivityError::Timeout { .. }
                | ActivityError::HeartbeatTimeout { .. }
        )
    }

    /// The business failure kind, if this is a non-retryable rejection.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            ActivityError::NonRetryable { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Errors surfaced by the engine and by workflow code.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum WorkflowError {
    /// Malformed or inconsistent workflow input.
    #[error("invalid workflow input: {0}")]
    Validation(String),

    /// An activity failed terminally.
    #[error("activity {activity} failed: {error}")]
    Activity {
        activity: String,
        error: ActivityError,
    },

    #[error("child workflow {workflow_id} failed: {message}")]
    Child {
        workflow_id: String,
        message: String,
    },

    #[error("workflow {workflow_id} is already running")]
    AlreadyStarted { workflow_id: String },

    #[error("workflow {workflow_id} not found")]
    NotFound { workflow_id: String },

    #[error("workflow type {0} is not registered")]
    UnknownWorkflowType(String),

    /// History does not match the command issued by workflow code.
    #[error("non-deterministic replay at sequence {seq}: workflow issued {expected}, history has {recorded}")]
    NonDeterminism {
        seq: u64,
        expected: String,
        recorded: String,
    },

    /// The execution-timeout safety net fired.
    #[error("workflow execution timed out")]
    ExecutionTimedOut,

    /// Not a failure: the run asks to be restarted with fresh history.
    #[error("workflow continued as new")]
    ContinueAsNew { input: serde_json::Value },

    #[error("history error: {0}")]
    History(String),

    #[error("payload codec error: {0}")]
    Codec(String),

    #[error("workflow engine is shut down")]
    Shutdown,

    /// A run that closed as failed, read back from history.
    #[error("{0}")]
    Failed(String),
}

impl WorkflowError {
    /// The underlying activity error, if an activity failed terminally.
    pub fn activity_error(&self) -> Option<&ActivityError> {
        match self {
            WorkflowError::Activity { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn is_activity_failure(&self) -> bool {
        self.activity_error().is_some()
    }

    /// True when an activity rejected the call as an invalid status
    /// transition, which workflows treat as already satisfied.
    pub fn is_invalid_transition(&self) -> bool {
        self.activity_error()
            .and_then(ActivityError::failure_kind)
            .is_some_and(|kind| kind == FailureKind::InvalidTransition)
    }
}

impl From<HistoryError> for WorkflowError {
    fn from(err: HistoryError) -> Self {
        WorkflowError::History(err.to_string())
    }
}

impl From<serde_json::Error> for WorkflowError {
    fn from(err: serde_json::Error) -> Self {
        WorkflowError::Codec(err.to_string())
    }
}

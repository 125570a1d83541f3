//! Durable execution for DICT workflows.
//!
//! Workflows are deterministic async functions that reach the world only
//! through a [`WorkflowContext`]: activities dispatched with retries,
//! persisted timers, a signal selector, child workflows and
//! continue-as-new. Every outcome is appended to a `dict-history` store, and
//! [`Engine::recover`] rebuilds open runs by replaying that history.

mod activity;
mod clock;
mod context;
mod engine;
mod error;
mod mailbox;
mod retry;
mod selector;
mod workflow;

pub use activity::{Activity, ActivityContext, ActivityRegistry};
pub use clock::Clock;
pub use context::{Timer, WorkflowContext};
pub use engine::{Engine, EngineBuilder, WorkflowHandle, DEFAULT_MAX_CONCURRENT_ACTIVITIES};
pub use error::{ActivityError, FailureKind, WorkflowError};
pub use retry::{ActivityCatalog, ActivityOptions, ActivityProfile, RetryPolicy};
pub use selector::{Selected, Selector, Signal};
pub use workflow::{Workflow, WorkflowOptions, WorkflowRegistry};

pub use dict_history::{HistoryStore, MemoryHistoryStore, RunRecord, RunStatus};

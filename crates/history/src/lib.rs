//! Durable history for DICT workflow runs.
//!
//! A run is persisted as a [`RunRecord`], an append-only log of
//! [`HistoryEvent`]s keyed by command sequence number, and a log of
//! [`SignalRecord`]s ordered by arrival. The engine in `dict-durable`
//! replays a run from these three pieces after a restart.

pub mod conformance;
mod error;
mod memory;
mod record;
mod traits;

pub use error::HistoryError;
pub use memory::MemoryHistoryStore;
pub use record::{HistoryEvent, RunOutcome, RunRecord, RunStatus, SelectChoice, SignalRecord};
pub use traits::HistoryStore;

//! PIX DICT business workflows on the `dict-durable` engine.
//!
//! Four long-lived processes (claims, infraction investigations, entry
//! deletion with a grace period, and VSYNC reconciliation with its daily
//! scheduler), the activities they drive, and the worker that hosts them.

pub mod activities;
pub mod claim;
pub mod client;
pub mod collaborators;
pub mod config;
pub mod deletion;
pub mod ids;
pub mod infraction;
pub mod observability;
mod steps;
pub mod vsync;
pub mod worker;

pub use claim::{CancelClaim, ClaimInput, ClaimOutcome, ClaimResult, ClaimWorkflow, ConfirmClaim};
pub use client::DictClient;
pub use collaborators::{Collaborators, MemoryCollaborators};
pub use config::{ConfigError, SchedulerConfig, WorkerConfig};
pub use deletion::{
    CancelDeletion, DeletionOutcome, EntryDeletionInput, EntryDeletionResult, EntryDeletionWorkflow,
};
pub use infraction::{
    EvidenceAdded, InfractionInput, InfractionResult, InfractionWorkflow, InvestigationComplete,
};
pub use observability::{init_logging, LogFormat};
pub use vsync::{VSyncInput, VSyncResult, VSyncSchedulerInput, VSyncSchedulerWorkflow, VSyncWorkflow};
pub use worker::{Worker, WorkerBuilder, WorkerError};

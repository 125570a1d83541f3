//! DICT domain model: claims, infractions, directory entries and
//! reconciliation reports, plus the ports workflow activities call.

#[macro_use]
mod macros;

pub mod claim;
pub mod entry;
pub mod error;
pub mod infraction;
pub mod ispb;
pub mod memory;
pub mod ports;
pub mod sync;

pub use claim::{Claim, ClaimAccount, ClaimStatus, ClaimType, NewClaim};
pub use entry::{Account, DeletionReason, Entry, EntryStatus, Owner, ReviewFlag};
pub use error::DomainError;
pub use infraction::{Infraction, InfractionStatus, InfractionType, InvestigationDecision, NewInfraction};
pub use ispb::Ispb;
pub use ports::{
    ClaimRepository, EntryFilter, EntryRepository, EventMap, EventPublisher, InfractionRepository,
    RegistryClient, SyncReportRepository,
};
pub use sync::{
    Discrepancy, DiscrepancyKind, FetchRequest, RemoteEntry, RemotePage, SyncCounts, SyncReport,
    SyncStatus, SyncType,
};

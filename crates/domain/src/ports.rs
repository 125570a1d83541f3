//! Collaborators the workflow activities depend on.
//!
//! Workflows never call these directly. Activities wrap each call so that
//! retries, timeouts and replay apply uniformly.

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::claim::Claim;
use crate::entry::{DeletionReason, Entry};
use crate::error::DomainError;
use crate::infraction::Infraction;
use crate::ispb::Ispb;
use crate::sync::{FetchRequest, RemotePage, SyncReport};

/// A published event body: a flat JSON object carrying an `event_type`.
pub type EventMap = serde_json::Map<String, serde_json::Value>;

/// Persistence for claims.
///
/// `update` is version-checked: the caller passes the entity as read, and
/// the store rejects it with [`DomainError::ConcurrentModification`] if
/// someone else wrote in between. Every successful write bumps `version`.
#[async_trait]
pub trait ClaimRepository: Send + Sync {
    /// Fails with `AlreadyExists` on a known claim id, or with `Conflict`
    /// when another active claim holds the same key.
    async fn insert(&self, claim: Claim) -> Result<Claim, DomainError>;
    async fn get(&self, claim_id: &str) -> Result<Option<Claim>, DomainError>;
    async fn update(&self, claim: Claim) -> Result<Claim, DomainError>;
    async fn active_for_key(&self, key: &str) -> Result<Option<Claim>, DomainError>;
}

/// Which entries `EntryRepository::list` returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryFilter {
    pub participant_ispb: Option<Ispb>,
    /// Only entries updated at or after this instant.
    pub updated_since: Option<OffsetDateTime>,
    pub include_deleted: bool,
}

impl EntryFilter {
    pub fn matches(&self, entry: &Entry) -> bool {
        if !self.include_deleted && entry.is_deleted() {
            return false;
        }
        if let Some(ispb) = &self.participant_ispb {
            if &entry.participant_ispb != ispb {
                return false;
            }
        }
        match self.updated_since {
            Some(since) => entry.updated_at >= since,
            None => true,
        }
    }
}

#[async_trait]
pub trait EntryRepository: Send + Sync {
    /// Fails with `AlreadyExists` when the id or the key is taken.
    async fn insert(&self, entry: Entry) -> Result<Entry, DomainError>;
    async fn get(&self, entry_id: &str) -> Result<Option<Entry>, DomainError>;
    async fn get_by_key(&self, key: &str) -> Result<Option<Entry>, DomainError>;
    async fn update(&self, entry: Entry) -> Result<Entry, DomainError>;
    /// Matching entries ordered by key.
    async fn list(&self, filter: &EntryFilter) -> Result<Vec<Entry>, DomainError>;
}

#[async_trait]
pub trait InfractionRepository: Send + Sync {
    async fn insert(&self, infraction: Infraction) -> Result<Infraction, DomainError>;
    async fn get(&self, infraction_id: &str) -> Result<Option<Infraction>, DomainError>;
    async fn update(&self, infraction: Infraction) -> Result<Infraction, DomainError>;
}

/// Append-only audit log of reconciliation runs.
#[async_trait]
pub trait SyncReportRepository: Send + Sync {
    /// Store a report and return its id. A second report for the same
    /// `sync_id` is not stored; the first one's id is returned.
    async fn insert(&self, report: SyncReport) -> Result<String, DomainError>;
    async fn get(&self, report_id: &str) -> Result<Option<SyncReport>, DomainError>;
    async fn find_by_sync_id(&self, sync_id: &str) -> Result<Option<SyncReport>, DomainError>;
    /// Most recent first.
    async fn list(&self, limit: usize) -> Result<Vec<SyncReport>, DomainError>;
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &EventMap, partition_key: &str) -> Result<(), DomainError>;
}

/// Client for the central registry (Bacen DICT).
#[async_trait]
pub trait RegistryClient: Send + Sync {
    async fn fetch_entries(&self, request: &FetchRequest) -> Result<RemotePage, DomainError>;
    async fn notify_claim_donor(&self, claim: &Claim) -> Result<(), DomainError>;
    async fn notify_reported_participant(&self, infraction: &Infraction) -> Result<(), DomainError>;
    /// Report a decided or escalated infraction.
    async fn report_infraction(&self, infraction: &Infraction) -> Result<(), DomainError>;
    async fn report_entry_deletion(
        &self,
        entry: &Entry,
        reason: DeletionReason,
    ) -> Result<(), DomainError>;
}

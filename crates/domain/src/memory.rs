//! In-process collaborators for tests and local runs.
//!
//! Each one carries a [`Faults`] table so tests can make individual
//! operations fail, either a fixed number of times or permanently.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::claim::Claim;
use crate::entry::{DeletionReason, Entry};
use crate::error::DomainError;
use crate::infraction::Infraction;
use crate::ports::{
    ClaimRepository, EntryFilter, EntryRepository, EventMap, EventPublisher, InfractionRepository,
    RegistryClient, SyncReportRepository,
};
use crate::sync::{FetchRequest, RemoteEntry, RemotePage, SyncReport, SyncType};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Failure injection ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum FaultPlan {
    Times(u32),
    Always,
}

#[derive(Debug, Default)]
struct FaultState {
    plans: HashMap<String, FaultPlan>,
    calls: HashMap<String, u64>,
}

/// Per-operation failure plan and call counter.
#[derive(Debug, Default)]
pub struct Faults {
    state: Mutex<FaultState>,
}

impl Faults {
    /// Make the next `times` calls to `op` fail with `Unavailable`.
    pub fn fail_times(&self, op: &str, times: u32) {
        lock(&self.state)
            .plans
            .insert(op.to_string(), FaultPlan::Times(times));
    }

    /// Make every call to `op` fail with `Unavailable`.
    pub fn fail_always(&self, op: &str) {
        lock(&self.state)
            .plans
            .insert(op.to_string(), FaultPlan::Always);
    }

    pub fn clear(&self, op: &str) {
        lock(&self.state).plans.remove(op);
    }

    /// How many times `op` was attempted, failures included.
    pub fn calls(&self, op: &str) -> u64 {
        lock(&self.state).calls.get(op).copied().unwrap_or(0)
    }

    fn check(&self, op: &str) -> Result<(), DomainError> {
        let mut state = lock(&self.state);
        *state.calls.entry(op.to_string()).or_insert(0) += 1;
        let fail = match state.plans.get_mut(op) {
            Some(FaultPlan::Always) => true,
            Some(FaultPlan::Times(0)) | None => false,
            Some(FaultPlan::Times(n)) => {
                *n -= 1;
                true
            }
        };
        if fail {
            Err(DomainError::Unavailable(format!("injected failure in {op}")))
        } else {
            Ok(())
        }
    }
}

fn check_version(
    entity: &'static str,
    id: &str,
    stored: u64,
    given: u64,
) -> Result<(), DomainError> {
    if stored != given {
        return Err(DomainError::ConcurrentModification {
            entity,
            id: id.to_string(),
            expected_version: given,
        });
    }
    Ok(())
}

// ── Claims ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryClaimRepository {
    claims: Mutex<HashMap<String, Claim>>,
    faults: Faults,
}

impl MemoryClaimRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn faults(&self) -> &Faults {
        &self.faults
    }
}

#[async_trait]
impl ClaimRepository for MemoryClaimRepository {
    async fn insert(&self, mut claim: Claim) -> Result<Claim, DomainError> {
        self.faults.check("insert")?;
        let mut claims = lock(&self.claims);
        if claims.contains_key(&claim.claim_id) {
            return Err(DomainError::AlreadyExists {
                entity: "claim",
                id: claim.claim_id,
            });
        }
        if let Some(active) = claims
            .values()
            .find(|c| c.key == claim.key && c.is_active())
        {
            return Err(DomainError::Conflict(format!(
                "key {} already has active claim {}",
                claim.key, active.claim_id
            )));
        }
        claim.version = 1;
        claims.insert(claim.claim_id.clone(), claim.clone());
        Ok(claim)
    }

    async fn get(&self, claim_id: &str) -> Result<Option<Claim>, DomainError> {
        self.faults.check("get")?;
        Ok(lock(&self.claims).get(claim_id).cloned())
    }

    async fn update(&self, mut claim: Claim) -> Result<Claim, DomainError> {
        self.faults.check("update")?;
        let mut claims = lock(&self.claims);
        let stored = claims
            .get(&claim.claim_id)
            .ok_or_else(|| DomainError::NotFound {
                entity: "claim",
                id: claim.claim_id.clone(),
            })?;
        check_version("claim", &claim.claim_id, stored.version, claim.version)?;
        claim.version += 1;
        claims.insert(claim.claim_id.clone(), claim.clone());
        Ok(claim)
    }

    async fn active_for_key(&self, key: &str) -> Result<Option<Claim>, DomainError> {
        self.faults.check("active_for_key")?;
        Ok(lock(&self.claims)
            .values()
            .find(|c| c.key == key && c.is_active())
            .cloned())
    }
}

// ── Entries ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryEntryRepository {
    entries: Mutex<HashMap<String, Entry>>,
    faults: Faults,
}

impl MemoryEntryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn faults(&self) -> &Faults {
        &self.faults
    }
}

#[async_trait]
impl EntryRepository for MemoryEntryRepository {
    async fn insert(&self, mut entry: Entry) -> Result<Entry, DomainError> {
        self.faults.check("insert")?;
        let mut entries = lock(&self.entries);
        if entries.contains_key(&entry.entry_id) {
            return Err(DomainError::AlreadyExists {
                entity: "entry",
                id: entry.entry_id,
            });
        }
        if entries
            .values()
            .any(|e| e.key == entry.key && !e.is_deleted())
        {
            return Err(DomainError::AlreadyExists {
                entity: "entry",
                id: entry.key,
            });
        }
        entry.version = 1;
        entries.insert(entry.entry_id.clone(), entry.clone());
        Ok(entry)
    }

    async fn get(&self, entry_id: &str) -> Result<Option<Entry>, DomainError> {
        self.faults.check("get")?;
        Ok(lock(&self.entries).get(entry_id).cloned())
    }

    async fn get_by_key(&self, key: &str) -> Result<Option<Entry>, DomainError> {
        self.faults.check("get_by_key")?;
        Ok(lock(&self.entries)
            .values()
            .find(|e| e.key == key && !e.is_deleted())
            .cloned())
    }

    async fn update(&self, mut entry: Entry) -> Result<Entry, DomainError> {
        self.faults.check("update")?;
        let mut entries = lock(&self.entries);
        let stored = entries
            .get(&entry.entry_id)
            .ok_or_else(|| DomainError::NotFound {
                entity: "entry",
                id: entry.entry_id.clone(),
            })?;
        check_version("entry", &entry.entry_id, stored.version, entry.version)?;
        entry.version += 1;
        entries.insert(entry.entry_id.clone(), entry.clone());
        Ok(entry)
    }

    async fn list(&self, filter: &EntryFilter) -> Result<Vec<Entry>, DomainError> {
        self.faults.check("list")?;
        let mut matched: Vec<Entry> = lock(&self.entries)
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.key.cmp(&b.key).then_with(|| a.entry_id.cmp(&b.entry_id)));
        Ok(matched)
    }
}

// ── Infractions ──────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryInfractionRepository {
    infractions: Mutex<HashMap<String, Infraction>>,
    faults: Faults,
}

impl MemoryInfractionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn faults(&self) -> &Faults {
        &self.faults
    }
}

#[async_trait]
impl InfractionRepository for MemoryInfractionRepository {
    async fn insert(&self, mut infraction: Infraction) -> Result<Infraction, DomainError> {
        self.faults.check("insert")?;
        let mut infractions = lock(&self.infractions);
        if infractions.contains_key(&infraction.infraction_id) {
            return Err(DomainError::AlreadyExists {
                entity: "infraction",
                id: infraction.infraction_id,
            });
        }
        infraction.version = 1;
        infractions.insert(infraction.infraction_id.clone(), infraction.clone());
        Ok(infraction)
    }

    async fn get(&self, infraction_id: &str) -> Result<Option<Infraction>, DomainError> {
        self.faults.check("get")?;
        Ok(lock(&self.infractions).get(infraction_id).cloned())
    }

    async fn update(&self, mut infraction: Infraction) -> Result<Infraction, DomainError> {
        self.faults.check("update")?;
        let mut infractions = lock(&self.infractions);
        let stored = infractions
            .get(&infraction.infraction_id)
            .ok_or_else(|| DomainError::NotFound {
                entity: "infraction",
                id: infraction.infraction_id.clone(),
            })?;
        check_version(
            "infraction",
            &infraction.infraction_id,
            stored.version,
            infraction.version,
        )?;
        infraction.version += 1;
        infractions.insert(infraction.infraction_id.clone(), infraction.clone());
        Ok(infraction)
    }
}

// ── Sync reports ─────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemorySyncReportRepository {
    reports: Mutex<Vec<SyncReport>>,
    faults: Faults,
}

impl MemorySyncReportRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn faults(&self) -> &Faults {
        &self.faults
    }
}

#[async_trait]
impl SyncReportRepository for MemorySyncReportRepository {
    async fn insert(&self, report: SyncReport) -> Result<String, DomainError> {
        self.faults.check("insert")?;
        let mut reports = lock(&self.reports);
        if let Some(existing) = reports.iter().find(|r| r.sync_id == report.sync_id) {
            return Ok(existing.report_id.clone());
        }
        let id = report.report_id.clone();
        reports.push(report);
        Ok(id)
    }

    async fn get(&self, report_id: &str) -> Result<Option<SyncReport>, DomainError> {
        self.faults.check("get")?;
        Ok(lock(&self.reports)
            .iter()
            .find(|r| r.report_id == report_id)
            .cloned())
    }

    async fn find_by_sync_id(&self, sync_id: &str) -> Result<Option<SyncReport>, DomainError> {
        self.faults.check("find_by_sync_id")?;
        Ok(lock(&self.reports)
            .iter()
            .find(|r| r.sync_id == sync_id)
            .cloned())
    }

    async fn list(&self, limit: usize) -> Result<Vec<SyncReport>, DomainError> {
        self.faults.check("list")?;
        Ok(lock(&self.reports).iter().rev().take(limit).cloned().collect())
    }
}

// ── Events ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct PublishedEvent {
    pub partition_key: String,
    pub event: EventMap,
}

impl PublishedEvent {
    pub fn event_type(&self) -> Option<&str> {
        self.event.get("event_type").and_then(|v| v.as_str())
    }
}

/// Publisher that keeps every event it was handed.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<PublishedEvent>>,
    faults: Faults,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn faults(&self) -> &Faults {
        &self.faults
    }

    pub fn events(&self) -> Vec<PublishedEvent> {
        lock(&self.events).clone()
    }

    pub fn of_type(&self, event_type: &str) -> Vec<PublishedEvent> {
        lock(&self.events)
            .iter()
            .filter(|e| e.event_type() == Some(event_type))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: &EventMap, partition_key: &str) -> Result<(), DomainError> {
        self.faults.check("publish")?;
        lock(&self.events).push(PublishedEvent {
            partition_key: partition_key.to_string(),
            event: event.clone(),
        });
        Ok(())
    }
}

// ── Registry ─────────────────────────────────────────────────────────────────

/// A message the registry client delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    ClaimDonor { claim_id: String },
    ReportedParticipant { infraction_id: String },
    InfractionReport { infraction_id: String, status: String },
    EntryDeletion { entry_id: String, reason: DeletionReason },
}

/// Registry double holding a key-ordered set of remote entries.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    entries: Mutex<BTreeMap<String, RemoteEntry>>,
    notifications: Mutex<Vec<Notification>>,
    faults: Faults,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn faults(&self) -> &Faults {
        &self.faults
    }

    pub fn put_entry(&self, entry: RemoteEntry) {
        lock(&self.entries).insert(entry.key.clone(), entry);
    }

    pub fn remove_entry(&self, key: &str) -> Option<RemoteEntry> {
        lock(&self.entries).remove(key)
    }

    pub fn notifications(&self) -> Vec<Notification> {
        lock(&self.notifications).clone()
    }

    fn notify(&self, op: &str, notification: Notification) -> Result<(), DomainError> {
        self.faults.check(op)?;
        lock(&self.notifications).push(notification);
        Ok(())
    }
}

#[async_trait]
impl RegistryClient for MemoryRegistry {
    async fn fetch_entries(&self, request: &FetchRequest) -> Result<RemotePage, DomainError> {
        self.faults.check("fetch_entries")?;
        let offset = match request.page_token.as_deref().filter(|t| !t.is_empty()) {
            Some(token) => token.parse::<usize>().map_err(|_| {
                DomainError::Validation(format!("malformed page token {token:?}"))
            })?,
            None => 0,
        };
        let since = match request.sync_type {
            SyncType::Incremental => request.since,
            SyncType::Full => None,
        };
        let entries = lock(&self.entries);
        let matching: Vec<&RemoteEntry> = entries
            .values()
            .filter(|e| {
                request
                    .participant_ispb
                    .as_ref()
                    .map_or(true, |ispb| &e.participant_ispb == ispb)
            })
            .filter(|e| since.map_or(true, |since| e.updated_at >= since))
            .collect();
        let page_size = request.page_size.max(1) as usize;
        let page: Vec<RemoteEntry> = matching
            .iter()
            .skip(offset)
            .take(page_size)
            .map(|e| (*e).clone())
            .collect();
        let consumed = offset + page.len();
        let next_page_token = (consumed < matching.len()).then(|| consumed.to_string());
        Ok(RemotePage {
            entries: page,
            next_page_token,
        })
    }

    async fn notify_claim_donor(&self, claim: &Claim) -> Result<(), DomainError> {
        self.notify(
            "notify_claim_donor",
            Notification::ClaimDonor {
                claim_id: claim.claim_id.clone(),
            },
        )
    }

    async fn notify_reported_participant(&self, infraction: &Infraction) -> Result<(), DomainError> {
        self.notify(
            "notify_reported_participant",
            Notification::ReportedParticipant {
                infraction_id: infraction.infraction_id.clone(),
            },
        )
    }

    async fn report_infraction(&self, infraction: &Infraction) -> Result<(), DomainError> {
        self.notify(
            "report_infraction",
            Notification::InfractionReport {
                infraction_id: infraction.infraction_id.clone(),
                status: infraction.status.to_string(),
            },
        )
    }

    async fn report_entry_deletion(
        &self,
        entry: &Entry,
        reason: DeletionReason,
    ) -> Result<(), DomainError> {
        self.notify(
            "report_entry_deletion",
            Notification::EntryDeletion {
                entry_id: entry.entry_id.clone(),
                reason,
            },
        )
    }
}

use std::sync::Arc;

use dict_domain::memory::{
    MemoryClaimRepository, MemoryEntryRepository, MemoryInfractionRepository, MemoryRegistry,
    MemorySyncReportRepository, RecordingPublisher,
};
use dict_domain::{
    ClaimRepository, EntryRepository, EventPublisher, InfractionRepository, RegistryClient,
    SyncReportRepository,
};

/// External systems the activities call.
#[derive(Clone)]
pub struct Collaborators {
    pub claims: Arc<dyn ClaimRepository>,
    pub entries: Arc<dyn EntryRepository>,
    pub infractions: Arc<dyn InfractionRepository>,
    pub reports: Arc<dyn SyncReportRepository>,
    pub publisher: Arc<dyn EventPublisher>,
    pub registry: Arc<dyn RegistryClient>,
}

/// In-memory collaborators, keeping typed handles for inspection and
/// failure injection.
#[derive(Clone, Default)]
pub struct MemoryCollaborators {
    pub claims: Arc<MemoryClaimRepository>,
    pub entries: Arc<MemoryEntryRepository>,
    pub infractions: Arc<MemoryInfractionRepository>,
    pub reports: Arc<MemorySyncReportRepository>,
    pub publisher: Arc<RecordingPublisher>,
    pub registry: Arc<MemoryRegistry>,
}

impl MemoryCollaborators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            claims: self.claims.clone(),
            entries: self.entries.clone(),
            infractions: self.infractions.clone(),
            reports: self.reports.clone(),
            publisher: self.publisher.clone(),
            registry: self.registry.clone(),
        }
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use dict_domain::{
    EntryFilter, EntryRepository, FetchRequest, Ispb, RegistryClient, RemoteEntry, RemotePage,
    SyncCounts, SyncReport, SyncReportRepository, SyncStatus, SyncType,
};
use dict_durable::{Activity, ActivityContext, ActivityError};

use super::domain_failure;
use crate::vsync::reconcile::{self, Comparison};

/// Fetch one page of registry entries.
pub struct FetchRemoteEntriesActivity {
    registry: Arc<dyn RegistryClient>,
}

impl FetchRemoteEntriesActivity {
    pub fn new(registry: Arc<dyn RegistryClient>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Activity for FetchRemoteEntriesActivity {
    const NAME: &'static str = "FetchRemoteEntriesActivity";
    type Input = FetchRequest;
    type Output = RemotePage;

    async fn execute(&self, ctx: &ActivityContext, request: FetchRequest) -> Result<RemotePage, ActivityError> {
        let page = self
            .registry
            .fetch_entries(&request)
            .await
            .map_err(domain_failure)?;
        ctx.heartbeat();
        tracing::debug!(
            entries = page.entries.len(),
            more = page.next_token().is_some(),
            "fetched registry page"
        );
        Ok(page)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompareInput {
    pub remote: Vec<RemoteEntry>,
    pub participant_ispb: Option<Ispb>,
    /// Lower bound on `updated_at` for the absent-from-registry pass.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub since: Option<OffsetDateTime>,
}

/// Diff a registry snapshot against the live local entries.
pub struct CompareEntriesActivity {
    entries: Arc<dyn EntryRepository>,
}

impl CompareEntriesActivity {
    pub fn new(entries: Arc<dyn EntryRepository>) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl Activity for CompareEntriesActivity {
    const NAME: &'static str = "CompareEntriesActivity";
    type Input = CompareInput;
    type Output = Comparison;

    async fn execute(&self, _ctx: &ActivityContext, input: CompareInput) -> Result<Comparison, ActivityError> {
        let filter = EntryFilter {
            participant_ispb: input.participant_ispb.clone(),
            updated_since: None,
            include_deleted: false,
        };
        let local = self.entries.list(&filter).await.map_err(domain_failure)?;
        let comparison = reconcile::compare(&input.remote, &local, input.since);
        tracing::info!(
            remote = input.remote.len(),
            local = local.len(),
            discrepancies = comparison.discrepancies.len(),
            "compared registry snapshot"
        );
        Ok(comparison)
    }
}

/// A report ready to persist, minus its identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReportDraft {
    pub sync_id: String,
    pub sync_type: SyncType,
    pub participant_ispb: Option<Ispb>,
    pub counts: SyncCounts,
    pub status: SyncStatus,
    pub duration_ms: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub sync_timestamp: OffsetDateTime,
    pub error_message: Option<String>,
}

/// Append the audit report. Returns the stored report id, which is the
/// first one written for this sync id.
pub struct PersistSyncReportActivity {
    reports: Arc<dyn SyncReportRepository>,
}

impl PersistSyncReportActivity {
    pub fn new(reports: Arc<dyn SyncReportRepository>) -> Self {
        Self { reports }
    }
}

#[async_trait]
impl Activity for PersistSyncReportActivity {
    const NAME: &'static str = "PersistSyncReportActivity";
    type Input = SyncReportDraft;
    type Output = String;

    async fn execute(&self, _ctx: &ActivityContext, draft: SyncReportDraft) -> Result<String, ActivityError> {
        let report = SyncReport {
            report_id: Uuid::new_v4().to_string(),
            sync_id: draft.sync_id,
            sync_type: draft.sync_type,
            participant_ispb: draft.participant_ispb,
            counts: draft.counts,
            status: draft.status,
            duration_ms: draft.duration_ms,
            sync_timestamp: draft.sync_timestamp,
            error_message: draft.error_message,
        };
        self.reports.insert(report).await.map_err(domain_failure)
    }
}

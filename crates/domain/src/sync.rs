use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::entry::{Account, Entry, EntryStatus, Owner};
use crate::ispb::Ispb;

/// Registry page size requested by reconciliation.
pub const REMOTE_PAGE_SIZE: u32 = 1000;

wire_enum! {
    pub enum SyncType {
        Full => "FULL",
        Incremental => "INCREMENTAL",
    }
}

wire_enum! {
    pub enum SyncStatus {
        Completed => "COMPLETED",
        Partial => "PARTIAL",
        Failed => "FAILED",
    }
}

wire_enum! {
    pub enum DiscrepancyKind {
        /// Present in the registry, absent locally.
        MissingLocal => "MISSING_LOCAL",
        /// Present in both, with differing data.
        OutdatedLocal => "OUTDATED_LOCAL",
        /// Present locally, absent from the registry.
        MissingBacen => "MISSING_BACEN",
    }
}

/// An entry as the authoritative registry reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub key: String,
    pub key_type: String,
    pub participant_ispb: Ispb,
    pub account: Account,
    pub owner: Owner,
    pub status: EntryStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl RemoteEntry {
    /// Names of the registry-owned fields that differ from `local`.
    pub fn differing_fields(&self, local: &Entry) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.account.branch != local.account.branch {
            fields.push("account_branch");
        }
        if self.account.number != local.account.number {
            fields.push("account_number");
        }
        if self.owner.name != local.owner.name {
            fields.push("owner_name");
        }
        if self.owner.tax_id != local.owner.tax_id {
            fields.push("owner_tax_id");
        }
        if self.status != local.status {
            fields.push("status");
        }
        fields
    }
}

/// One difference between the registry and the local store, with the
/// data needed to repair it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub kind: DiscrepancyKind,
    pub key: String,
    pub entry_id: Option<String>,
    pub remote: Option<RemoteEntry>,
    #[serde(default)]
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub participant_ispb: Option<Ispb>,
    pub sync_type: SyncType,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub since: Option<OffsetDateTime>,
    pub page_token: Option<String>,
    pub page_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RemotePage {
    pub entries: Vec<RemoteEntry>,
    /// Empty or absent on the last page.
    #[serde(default)]
    pub next_page_token: Option<String>,
}

impl RemotePage {
    pub fn next_token(&self) -> Option<&str> {
        self.next_page_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// Counters shared by the reconciliation result and its audit report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SyncCounts {
    pub entries_fetched: u64,
    pub entries_compared: u64,
    pub created: u64,
    pub updated: u64,
    /// Reconciliation never deletes; kept for report compatibility.
    pub deleted: u64,
    pub flagged_for_review: u64,
    pub discrepancies: u64,
    pub missing_local: u64,
    pub outdated_local: u64,
    pub missing_bacen: u64,
    pub repair_failures: u64,
}

impl SyncCounts {
    pub fn record_discrepancy(&mut self, kind: DiscrepancyKind) {
        self.discrepancies += 1;
        match kind {
            DiscrepancyKind::MissingLocal => self.missing_local += 1,
            DiscrepancyKind::OutdatedLocal => self.outdated_local += 1,
            DiscrepancyKind::MissingBacen => self.missing_bacen += 1,
        }
    }
}

/// Append-only audit record of one reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub report_id: String,
    pub sync_id: String,
    pub sync_type: SyncType,
    pub participant_ispb: Option<Ispb>,
    #[serde(flatten)]
    pub counts: SyncCounts,
    pub status: SyncStatus,
    pub duration_ms: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub sync_timestamp: OffsetDateTime,
    pub error_message: Option<String>,
}

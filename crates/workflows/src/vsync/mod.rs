//! VSYNC: reconcile the local key directory with the central registry,
//! plus the daily scheduler that drives it.

pub mod reconcile;
mod scheduler;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use dict_domain::sync::REMOTE_PAGE_SIZE;
use dict_domain::{
    Discrepancy, DiscrepancyKind, FetchRequest, Ispb, RemoteEntry, SyncCounts, SyncStatus, SyncType,
};
use dict_durable::{ActivityProfile, Workflow, WorkflowContext, WorkflowError};

use crate::activities::{
    CompareEntriesActivity, CompareInput, CreateEntryActivity, FetchRemoteEntriesActivity,
    FlagEntryForReviewActivity, FlagEntryInput, PersistSyncReportActivity, SyncReportDraft,
    UpdateEntryActivity, UpdateEntryInput,
};
use crate::steps::{invalid_input, publish};

pub use reconcile::Comparison;
pub use scheduler::{VSyncSchedulerInput, VSyncSchedulerWorkflow, SCHEDULER_INTERVAL};

pub const VSYNC_EXECUTION_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);

pub const MISSING_BACEN_REVIEW_REASON: &str = "MISSING_BACEN: entry absent from registry snapshot";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VSyncInput {
    /// Empty or absent means every participant.
    #[serde(default)]
    pub participant_ispb: Option<String>,
    pub sync_type: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_sync_date: Option<OffsetDateTime>,
}

/// Validated VSYNC parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlan {
    pub participant_ispb: Option<Ispb>,
    pub sync_type: SyncType,
    pub since: Option<OffsetDateTime>,
}

impl VSyncInput {
    pub fn validate(&self) -> Result<SyncPlan, WorkflowError> {
        let sync_type = SyncType::parse(&self.sync_type).map_err(invalid_input)?;
        let participant_ispb = match self.participant_ispb.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(Ispb::parse(raw).map_err(invalid_input)?),
            _ => None,
        };
        let since = match sync_type {
            SyncType::Full => None,
            SyncType::Incremental => Some(
                self.last_sync_date
                    .ok_or_else(|| invalid_input("INCREMENTAL sync requires last_sync_date"))?,
            ),
        };
        Ok(SyncPlan {
            participant_ispb,
            sync_type,
            since,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VSyncResult {
    #[serde(flatten)]
    pub counts: SyncCounts,
    pub status: SyncStatus,
    pub duration_ms: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub sync_timestamp: OffsetDateTime,
    #[serde(default)]
    pub report_id: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

pub struct VSyncWorkflow;

impl VSyncWorkflow {
    async fn fetch_all(ctx: &WorkflowContext, plan: &SyncPlan) -> Result<Vec<RemoteEntry>, WorkflowError> {
        let mut entries = Vec::new();
        let mut page_token = None;
        loop {
            let request = FetchRequest {
                participant_ispb: plan.participant_ispb.clone(),
                sync_type: plan.sync_type,
                since: plan.since,
                page_token: page_token.take(),
                page_size: REMOTE_PAGE_SIZE,
            };
            let page = ctx
                .execute_activity::<FetchRemoteEntriesActivity>(&request, ActivityProfile::ExternalApi)
                .await?;
            page_token = page.next_token().map(str::to_string);
            entries.extend(page.entries);
            if page_token.is_none() {
                return Ok(entries);
            }
        }
    }

    /// Apply one repair. Returns whether it succeeded.
    async fn repair(
        ctx: &WorkflowContext,
        discrepancy: &Discrepancy,
        counts: &mut SyncCounts,
    ) -> Result<bool, WorkflowError> {
        let profile = ActivityProfile::Database;
        match (discrepancy.kind, &discrepancy.entry_id, &discrepancy.remote) {
            (DiscrepancyKind::MissingLocal, _, Some(remote)) => {
                let created = ctx
                    .execute_non_critical::<CreateEntryActivity>(remote, profile)
                    .await?;
                if created.is_some() {
                    counts.created += 1;
                }
                Ok(created.is_some())
            }
            (DiscrepancyKind::OutdatedLocal, Some(entry_id), Some(remote)) => {
                let input = UpdateEntryInput {
                    entry_id: entry_id.clone(),
                    remote: remote.clone(),
                };
                let updated = ctx
                    .execute_non_critical::<UpdateEntryActivity>(&input, profile)
                    .await?;
                if updated.is_some() {
                    counts.updated += 1;
                }
                Ok(updated.is_some())
            }
            (DiscrepancyKind::MissingBacen, Some(entry_id), _) => {
                let input = FlagEntryInput {
                    entry_id: entry_id.clone(),
                    reason: MISSING_BACEN_REVIEW_REASON.to_string(),
                };
                let flagged = ctx
                    .execute_non_critical::<FlagEntryForReviewActivity>(&input, profile)
                    .await?;
                if flagged == Some(true) {
                    counts.flagged_for_review += 1;
                }
                Ok(flagged.is_some())
            }
            _ => {
                tracing::warn!(key = %discrepancy.key, kind = %discrepancy.kind, "discrepancy lacks repair data");
                Ok(false)
            }
        }
    }

    async fn duration_since(ctx: &WorkflowContext, started: OffsetDateTime) -> Result<u64, WorkflowError> {
        let elapsed = ctx.now().await? - started;
        Ok(u64::try_from(elapsed.whole_milliseconds()).unwrap_or(0))
    }

    /// Persist a FAILED report, best effort, and hand back the error.
    async fn fail(
        ctx: &WorkflowContext,
        plan: &SyncPlan,
        started: OffsetDateTime,
        counts: SyncCounts,
        err: WorkflowError,
    ) -> Result<VSyncResult, WorkflowError> {
        tracing::error!(error = %err, "vsync failed");
        let draft = SyncReportDraft {
            sync_id: ctx.run_id().to_string(),
            sync_type: plan.sync_type,
            participant_ispb: plan.participant_ispb.clone(),
            counts,
            status: SyncStatus::Failed,
            duration_ms: Self::duration_since(ctx, started).await?,
            sync_timestamp: started,
            error_message: Some(err.to_string()),
        };
        ctx.execute_non_critical::<PersistSyncReportActivity>(&draft, ActivityProfile::Database)
            .await?;
        Err(err)
    }
}

#[async_trait]
impl Workflow for VSyncWorkflow {
    const NAME: &'static str = "VSyncWorkflow";
    type Input = VSyncInput;
    type Output = VSyncResult;

    async fn run(&self, ctx: WorkflowContext, input: VSyncInput) -> Result<VSyncResult, WorkflowError> {
        let plan = input.validate()?;
        let started = ctx.now().await?;
        tracing::info!(
            sync_type = %plan.sync_type,
            participant = ?plan.participant_ispb,
            "vsync started"
        );
        let mut counts = SyncCounts::default();

        let remote = match Self::fetch_all(&ctx, &plan).await {
            Ok(remote) => remote,
            Err(err) if err.is_activity_failure() => {
                return Self::fail(&ctx, &plan, started, counts, err).await
            }
            Err(err) => return Err(err),
        };
        counts.entries_fetched = remote.len() as u64;

        let compare = CompareInput {
            remote,
            participant_ispb: plan.participant_ispb.clone(),
            since: plan.since,
        };
        let comparison = match ctx
            .execute_activity::<CompareEntriesActivity>(&compare, ActivityProfile::Database)
            .await
        {
            Ok(comparison) => comparison,
            Err(err) if err.is_activity_failure() => {
                return Self::fail(&ctx, &plan, started, counts, err).await
            }
            Err(err) => return Err(err),
        };
        counts.entries_compared = comparison.compared;
        if comparison.awaiting_review > 0 {
            tracing::info!(count = comparison.awaiting_review, "entries still awaiting manual review");
        }

        for discrepancy in &comparison.discrepancies {
            counts.record_discrepancy(discrepancy.kind);
            if !Self::repair(&ctx, discrepancy, &mut counts).await? {
                counts.repair_failures += 1;
            }
        }

        let (status, error_message) = if counts.repair_failures > 0 {
            (
                SyncStatus::Partial,
                Some(format!(
                    "{} out of {} fixes failed",
                    counts.repair_failures, counts.discrepancies
                )),
            )
        } else {
            (SyncStatus::Completed, None)
        };

        let duration_ms = Self::duration_since(&ctx, started).await?;
        let draft = SyncReportDraft {
            sync_id: ctx.run_id().to_string(),
            sync_type: plan.sync_type,
            participant_ispb: plan.participant_ispb.clone(),
            counts,
            status,
            duration_ms,
            sync_timestamp: started,
            error_message: error_message.clone(),
        };
        let report_id = ctx
            .execute_non_critical::<PersistSyncReportActivity>(&draft, ActivityProfile::Database)
            .await?;

        let result = VSyncResult {
            counts,
            status,
            duration_ms,
            sync_timestamp: started,
            report_id,
            error_message,
        };
        let partition_key = plan
            .participant_ispb
            .as_ref()
            .map_or("all", Ispb::as_str)
            .to_string();
        publish(&ctx, "vsync_completed", &partition_key, &result).await?;
        tracing::info!(
            status = %result.status,
            discrepancies = counts.discrepancies,
            repair_failures = counts.repair_failures,
            "vsync finished"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn incremental_needs_a_since_date() {
        let input = VSyncInput {
            participant_ispb: None,
            sync_type: "INCREMENTAL".into(),
            last_sync_date: None,
        };
        assert!(matches!(input.validate(), Err(WorkflowError::Validation(_))));

        let input = VSyncInput {
            last_sync_date: Some(datetime!(2025-03-01 00:00 UTC)),
            ..input
        };
        assert_eq!(input.validate().unwrap().since, Some(datetime!(2025-03-01 00:00 UTC)));
    }

    #[test]
    fn full_sync_ignores_since_and_blank_ispb() {
        let plan = VSyncInput {
            participant_ispb: Some("".into()),
            sync_type: "full".into(),
            last_sync_date: Some(datetime!(2025-03-01 00:00 UTC)),
        }
        .validate()
        .unwrap();
        assert_eq!(plan.sync_type, SyncType::Full);
        assert_eq!(plan.since, None);
        assert_eq!(plan.participant_ispb, None);
    }

    #[test]
    fn rejects_bad_ispb_and_type() {
        let input = VSyncInput {
            participant_ispb: Some("12ab".into()),
            sync_type: "FULL".into(),
            last_sync_date: None,
        };
        assert!(input.validate().is_err());
        let input = VSyncInput {
            participant_ispb: None,
            sync_type: "DAILY".into(),
            last_sync_date: None,
        };
        assert!(input.validate().is_err());
    }
}

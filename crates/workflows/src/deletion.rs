//! Entry deletion with a 30-day grace period during which the owner can
//! change their mind.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use dict_domain::DeletionReason;
use dict_durable::{ActivityProfile, Selected, Workflow, WorkflowContext, WorkflowError};

use crate::activities::{
    AuthoritySubject, DeactivateEntryActivity, DeactivateEntryInput, EntryRef, GetEntryActivity,
    NotifyAuthorityActivity, ReactivateEntryActivity, SoftDeleteEntryActivity,
};
use crate::steps::{invalid_input, publish, satisfied};

pub const CANCEL_DELETION_SIGNAL: &str = "cancel_deletion";

pub const DELETION_GRACE_PERIOD: Duration = Duration::from_secs(30 * 24 * 60 * 60);
pub const DELETION_EXECUTION_TIMEOUT: Duration = Duration::from_secs(31 * 24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryDeletionInput {
    pub entry_id: String,
    pub deletion_reason: String,
    #[serde(default)]
    pub requested_by: String,
}

impl EntryDeletionInput {
    pub fn validate(&self) -> Result<(String, DeletionReason), WorkflowError> {
        let entry_id = self.entry_id.trim();
        if entry_id.is_empty() {
            return Err(invalid_input("entry_id is required"));
        }
        let reason = DeletionReason::parse(&self.deletion_reason).map_err(invalid_input)?;
        Ok((entry_id.to_string(), reason))
    }
}

/// Payload of the `cancel_deletion` signal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CancelDeletion {
    pub reason: String,
    pub cancelled_by: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeletionOutcome {
    Deleted,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryDeletionResult {
    pub entry_id: String,
    pub status: DeletionOutcome,
    pub deletion_reason: DeletionReason,
    #[serde(with = "time::serde::rfc3339")]
    pub deactivated_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub deleted_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub cancelled_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub cancelled_by: Option<String>,
    pub bacen_notified: bool,
    pub message: String,
    #[serde(default)]
    pub error_reason: Option<String>,
}

pub struct EntryDeletionWorkflow;

#[async_trait]
impl Workflow for EntryDeletionWorkflow {
    const NAME: &'static str = "EntryDeletionWorkflow";
    type Input = EntryDeletionInput;
    type Output = EntryDeletionResult;

    async fn run(
        &self,
        ctx: WorkflowContext,
        input: EntryDeletionInput,
    ) -> Result<EntryDeletionResult, WorkflowError> {
        let (entry_id, reason) = input.validate()?;
        if !ctx.is_replaying() {
            tracing::info!(%entry_id, %reason, requested_by = %input.requested_by, "entry deletion started");
        }

        let deactivated = satisfied(
            "deactivate",
            ctx.execute_activity::<DeactivateEntryActivity>(
                &DeactivateEntryInput {
                    entry_id: entry_id.clone(),
                    reason,
                },
                ActivityProfile::Database,
            )
            .await,
        )?;
        let deactivated_at = match deactivated.and_then(|e| e.deactivated_at) {
            Some(at) => at,
            None => ctx.now().await?,
        };
        let entry_ref = EntryRef {
            entry_id: entry_id.clone(),
        };

        let grace = ctx.new_timer(DELETION_GRACE_PERIOD).await?;
        let selected = ctx
            .selector()
            .on_signal(CANCEL_DELETION_SIGNAL)
            .on_timer(grace)
            .select()
            .await?;

        if let Selected::Signal(signal) = selected {
            let cancel: CancelDeletion = signal.decode_or_default();
            satisfied(
                "reactivate",
                ctx.execute_activity::<ReactivateEntryActivity>(&entry_ref, ActivityProfile::Database)
                    .await,
            )?;
            tracing::info!(%entry_id, cancelled_by = %cancel.cancelled_by, "entry deletion cancelled");
            return Ok(EntryDeletionResult {
                entry_id,
                status: DeletionOutcome::Cancelled,
                deletion_reason: reason,
                deactivated_at,
                deleted_at: None,
                cancelled_at: Some(ctx.now().await?),
                cancelled_by: Some(cancel.cancelled_by.clone()),
                bacen_notified: false,
                message: format!(
                    "Deletion cancelled by {}: {}",
                    cancel.cancelled_by, cancel.reason
                ),
                error_reason: None,
            });
        }

        let deleted = satisfied(
            "soft_delete",
            ctx.execute_activity::<SoftDeleteEntryActivity>(&entry_ref, ActivityProfile::Database)
                .await,
        )?;
        let Some(entry) = deleted else {
            // Someone moved the entry out of INACTIVE during the grace period.
            let entry = ctx
                .execute_activity::<GetEntryActivity>(&entry_ref, ActivityProfile::Database)
                .await?;
            tracing::warn!(%entry_id, status = %entry.status, "entry no longer inactive; deletion skipped");
            return Ok(EntryDeletionResult {
                entry_id,
                status: DeletionOutcome::Cancelled,
                deletion_reason: reason,
                deactivated_at,
                deleted_at: None,
                cancelled_at: Some(ctx.now().await?),
                cancelled_by: None,
                bacen_notified: false,
                message: format!(
                    "Deletion skipped - entry is {} at the end of the waiting period",
                    entry.status
                ),
                error_reason: None,
            });
        };
        let deleted_at = match entry.deleted_at {
            Some(at) => at,
            None => ctx.now().await?,
        };

        let notified = ctx
            .execute_activity::<NotifyAuthorityActivity>(
                &AuthoritySubject::EntryDeletion {
                    entry_id: entry_id.clone(),
                    reason,
                },
                ActivityProfile::ExternalApi,
            )
            .await;
        let (bacen_notified, message, error_reason) = match notified {
            Ok(()) => (
                true,
                "Entry deleted successfully after 30-day waiting period and Bacen notified",
                None,
            ),
            Err(err) if err.is_activity_failure() => {
                tracing::warn!(%entry_id, error = %err, "bacen deletion notice failed");
                let detail = err.activity_error().map(ToString::to_string).unwrap_or_default();
                (
                    false,
                    "Entry deleted but Bacen notification pending - will retry",
                    Some(format!("Bacen notification failed: {detail}")),
                )
            }
            Err(err) => return Err(err),
        };

        let result = EntryDeletionResult {
            entry_id: entry_id.clone(),
            status: DeletionOutcome::Deleted,
            deletion_reason: reason,
            deactivated_at,
            deleted_at: Some(deleted_at),
            cancelled_at: None,
            cancelled_by: None,
            bacen_notified,
            message: message.to_string(),
            error_reason,
        };
        publish(&ctx, "entry_deletion_completed", &entry_id, &result).await?;
        tracing::info!(%entry_id, bacen_notified, "entry deleted");
        Ok(result)
    }
}

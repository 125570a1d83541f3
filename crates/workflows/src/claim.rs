//! Portability and ownership claims: a 30-day negotiation with the donor.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use dict_domain::claim::CLAIM_EXPIRY;
use dict_domain::{ClaimAccount, ClaimStatus, ClaimType, Ispb, NewClaim};
use dict_durable::{
    ActivityError, ActivityProfile, FailureKind, Selected, Workflow, WorkflowContext, WorkflowError,
};

use crate::activities::{
    AwaitClaimResolutionActivity, CancelClaimActivity, CancelClaimInput, ClaimRef,
    CompleteClaimActivity, CreateClaimActivity, ExpireClaimActivity, GetClaimActivity,
    NotifyClaimDonorActivity,
};
use crate::steps::{invalid_input, publish, satisfied};

pub const CONFIRM_SIGNAL: &str = "confirm";
pub const CANCEL_SIGNAL: &str = "cancel";

/// Safety net over the 30-day expiry.
pub const CLAIM_EXECUTION_TIMEOUT: Duration = Duration::from_secs(31 * 24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimInput {
    pub claim_id: String,
    #[serde(default)]
    pub entry_id: Option<String>,
    pub claim_type: String,
    pub key: String,
    pub key_type: String,
    pub donor_ispb: String,
    pub claimer_ispb: String,
    #[serde(default)]
    pub claimer_account: ClaimAccount,
}

impl ClaimInput {
    pub fn validate(&self) -> Result<NewClaim, WorkflowError> {
        let new = NewClaim {
            claim_id: self.claim_id.trim().to_string(),
            entry_id: self.entry_id.clone().filter(|id| !id.trim().is_empty()),
            claim_type: ClaimType::parse(&self.claim_type).map_err(invalid_input)?,
            key: self.key.trim().to_string(),
            key_type: self.key_type.clone(),
            donor_ispb: Ispb::parse(&self.donor_ispb).map_err(invalid_input)?,
            claimer_ispb: Ispb::parse(&self.claimer_ispb).map_err(invalid_input)?,
            claimer_account: self.claimer_account.clone(),
        };
        new.validate().map_err(invalid_input)?;
        Ok(new)
    }
}

/// Payload of the `confirm` signal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmClaim {
    pub confirmed_by: Option<String>,
}

/// Payload of the `cancel` signal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CancelClaim {
    pub reason: String,
    pub cancelled_by: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimOutcome {
    Completed,
    Cancelled,
    Expired,
    /// Another claim on the key was already active.
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimResult {
    pub claim_id: String,
    pub status: ClaimOutcome,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub cancelled_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expired_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub cancelled_by: Option<String>,
    pub message: String,
}

impl ClaimOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            ClaimOutcome::Completed => "COMPLETED",
            ClaimOutcome::Cancelled => "CANCELLED",
            ClaimOutcome::Expired => "EXPIRED",
            ClaimOutcome::Rejected => "REJECTED",
        }
    }

    /// The outcome a closed claim ended in; `None` while it is still open.
    pub fn from_status(status: ClaimStatus) -> Option<Self> {
        match status {
            ClaimStatus::Completed => Some(ClaimOutcome::Completed),
            ClaimStatus::Cancelled => Some(ClaimOutcome::Cancelled),
            ClaimStatus::Expired => Some(ClaimOutcome::Expired),
            ClaimStatus::Open | ClaimStatus::WaitingResolution | ClaimStatus::Confirmed => None,
        }
    }
}

impl ClaimResult {
    fn new(claim_id: &str, status: ClaimOutcome, message: String) -> Self {
        Self {
            claim_id: claim_id.to_string(),
            status,
            completed_at: None,
            cancelled_at: None,
            expired_at: None,
            reason: None,
            cancelled_by: None,
            message,
        }
    }
}

pub struct ClaimWorkflow;

impl ClaimWorkflow {
    /// Report the stored claim when its terminal transition was refused
    /// because another actor had already moved it on.
    async fn settled_elsewhere(
        ctx: &WorkflowContext,
        claim_ref: &ClaimRef,
        attempted: ClaimOutcome,
    ) -> Result<ClaimResult, WorkflowError> {
        let claim = ctx
            .execute_activity::<GetClaimActivity>(claim_ref, ActivityProfile::Database)
            .await?;
        let status = ClaimOutcome::from_status(claim.status).unwrap_or(attempted);
        tracing::warn!(
            claim_id = %claim.claim_id,
            stored = %claim.status,
            attempted = ?attempted,
            "claim already settled elsewhere"
        );
        let mut result = ClaimResult::new(
            &claim.claim_id,
            status,
            format!(
                "Claim already {} - {} not applied",
                claim.status,
                attempted.as_str()
            ),
        );
        result.completed_at = claim.completed_at;
        result.cancelled_at = claim.cancelled_at;
        result.expired_at = claim.expired_at;
        result.reason = claim.cancellation_reason;
        result.cancelled_by = claim.cancelled_by;
        Ok(result)
    }
}

#[async_trait]
impl Workflow for ClaimWorkflow {
    const NAME: &'static str = "ClaimWorkflow";
    type Input = ClaimInput;
    type Output = ClaimResult;

    async fn run(&self, ctx: WorkflowContext, input: ClaimInput) -> Result<ClaimResult, WorkflowError> {
        let new = input.validate()?;
        let claim_id = new.claim_id.clone();
        if !ctx.is_replaying() {
            tracing::info!(%claim_id, claim_type = %new.claim_type, key = %new.key, "claim workflow started");
        }

        if let Err(err) = ctx
            .execute_activity::<CreateClaimActivity>(&new, ActivityProfile::Database)
            .await
        {
            let conflict = err
                .activity_error()
                .and_then(ActivityError::failure_kind)
                .is_some_and(|kind| kind == FailureKind::Conflict);
            if !conflict {
                return Err(err);
            }
            tracing::info!(%claim_id, error = %err, "claim rejected");
            let detail = err.activity_error().map(ToString::to_string).unwrap_or_default();
            return Ok(ClaimResult::new(
                &claim_id,
                ClaimOutcome::Rejected,
                format!("Claim rejected - {detail}"),
            ));
        }

        let claim_ref = ClaimRef {
            claim_id: claim_id.clone(),
        };
        ctx.execute_non_critical::<NotifyClaimDonorActivity>(&claim_ref, ActivityProfile::ExternalApi)
            .await?;
        satisfied(
            "await_resolution",
            ctx.execute_activity::<AwaitClaimResolutionActivity>(&claim_ref, ActivityProfile::Database)
                .await,
        )?;

        let expiry = ctx.new_timer(CLAIM_EXPIRY).await?;
        let selected = ctx
            .selector()
            .on_signal(CONFIRM_SIGNAL)
            .on_signal(CANCEL_SIGNAL)
            .on_timer(expiry)
            .select()
            .await?;

        let result = match selected {
            Selected::Signal(signal) if signal.name == CONFIRM_SIGNAL => {
                let confirm: ConfirmClaim = signal.decode_or_default();
                tracing::info!(%claim_id, confirmed_by = ?confirm.confirmed_by, "donor confirmed claim");
                let completed = satisfied(
                    "complete",
                    ctx.execute_activity::<CompleteClaimActivity>(&claim_ref, ActivityProfile::Database)
                        .await,
                )?;
                match completed {
                    Some(claim) => {
                        let mut result = ClaimResult::new(
                            &claim_id,
                            ClaimOutcome::Completed,
                            "Claim completed successfully - donor confirmed".to_string(),
                        );
                        result.completed_at = match claim.completed_at {
                            Some(at) => Some(at),
                            None => Some(ctx.now().await?),
                        };
                        result
                    }
                    None => Self::settled_elsewhere(&ctx, &claim_ref, ClaimOutcome::Completed).await?,
                }
            }
            Selected::Signal(signal) => {
                let cancel: CancelClaim = signal.decode_or_default();
                let actor = if cancel.cancelled_by.trim().is_empty() {
                    "unknown".to_string()
                } else {
                    cancel.cancelled_by
                };
                tracing::info!(%claim_id, cancelled_by = %actor, reason = %cancel.reason, "claim cancelled");
                let cancelled = satisfied(
                    "cancel",
                    ctx.execute_activity::<CancelClaimActivity>(
                        &CancelClaimInput {
                            claim_id: claim_id.clone(),
                            reason: cancel.reason.clone(),
                            cancelled_by: actor.clone(),
                        },
                        ActivityProfile::Database,
                    )
                    .await,
                )?;
                match cancelled {
                    Some(claim) => {
                        let mut result = ClaimResult::new(
                            &claim_id,
                            ClaimOutcome::Cancelled,
                            format!("Claim cancelled by {actor}"),
                        );
                        result.cancelled_at = match claim.cancelled_at {
                            Some(at) => Some(at),
                            None => Some(ctx.now().await?),
                        };
                        result.reason = Some(cancel.reason);
                        result.cancelled_by = Some(actor);
                        result
                    }
                    None => Self::settled_elsewhere(&ctx, &claim_ref, ClaimOutcome::Cancelled).await?,
                }
            }
            Selected::Timer(_) => {
                tracing::info!(%claim_id, "claim expired without confirmation");
                let expired = satisfied(
                    "expire",
                    ctx.execute_activity::<ExpireClaimActivity>(&claim_ref, ActivityProfile::Database)
                        .await,
                )?;
                match expired {
                    Some(claim) => {
                        let mut result = ClaimResult::new(
                            &claim_id,
                            ClaimOutcome::Expired,
                            "Claim expired after 30 days without confirmation".to_string(),
                        );
                        result.expired_at = match claim.expired_at {
                            Some(at) => Some(at),
                            None => Some(ctx.now().await?),
                        };
                        result
                    }
                    None => Self::settled_elsewhere(&ctx, &claim_ref, ClaimOutcome::Expired).await?,
                }
            }
        };

        publish(&ctx, "claim_workflow_completed", &claim_id, &result).await?;
        tracing::info!(%claim_id, status = ?result.status, "claim workflow finished");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> ClaimInput {
        ClaimInput {
            claim_id: "C1".into(),
            entry_id: None,
            claim_type: "portability".into(),
            key: "+5511999990000".into(),
            key_type: "PHONE".into(),
            donor_ispb: "11111111".into(),
            claimer_ispb: "22222222".into(),
            claimer_account: ClaimAccount::default(),
        }
    }

    #[test]
    fn validates_into_domain_claim() {
        let new = input().validate().unwrap();
        assert_eq!(new.claim_type, ClaimType::Portability);
        assert_eq!(new.donor_ispb.as_str(), "11111111");
    }

    #[test]
    fn rejects_bad_input() {
        let mut same = input();
        same.claimer_ispb = "11111111".into();
        assert!(matches!(same.validate(), Err(WorkflowError::Validation(_))));

        let mut bad_type = input();
        bad_type.claim_type = "TRANSFER".into();
        assert!(bad_type.validate().is_err());

        let mut short = input();
        short.donor_ispb = "123".into();
        assert!(short.validate().is_err());
    }

    #[test]
    fn closed_claims_map_to_outcomes() {
        assert_eq!(ClaimOutcome::from_status(ClaimStatus::Cancelled), Some(ClaimOutcome::Cancelled));
        assert_eq!(ClaimOutcome::from_status(ClaimStatus::Completed), Some(ClaimOutcome::Completed));
        assert_eq!(ClaimOutcome::from_status(ClaimStatus::Confirmed), None);
        assert_eq!(ClaimOutcome::Expired.as_str(), "EXPIRED");
    }

    #[test]
    fn signal_payloads_tolerate_missing_fields() {
        let cancel: CancelClaim = serde_json::from_value(serde_json::json!({"reason": "fraud"})).unwrap();
        assert_eq!(cancel.cancelled_by, "");
        let confirm: ConfirmClaim = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(confirm.confirmed_by, None);
    }
}

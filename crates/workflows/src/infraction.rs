//! Infraction investigations: evidence collection, an analyst decision or
//! automatic escalation to the central bank after seven days.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use dict_domain::{InfractionStatus, InfractionType, InvestigationDecision, Ispb, NewInfraction};
use dict_durable::{ActivityProfile, Selected, Workflow, WorkflowContext, WorkflowError};

use crate::activities::{
    AddEvidenceActivity, AddEvidenceInput, AuthoritySubject, CreateInfractionActivity,
    DecideInfractionActivity, DecideInfractionInput, GetInfractionActivity, InfractionRef,
    InvestigateInfractionActivity, NotifyAuthorityActivity, NotifyReportedParticipantActivity,
};
use crate::steps::{invalid_input, publish, satisfied};

pub const EVIDENCE_ADDED_SIGNAL: &str = "evidence_added";
pub const INVESTIGATION_COMPLETE_SIGNAL: &str = "investigation_complete";

/// Time an analyst has before the case is escalated automatically.
pub const INVESTIGATION_PERIOD: Duration = Duration::from_secs(7 * 24 * 60 * 60);
pub const INFRACTION_EXECUTION_TIMEOUT: Duration = Duration::from_secs(30 * 24 * 60 * 60);

pub const AUTO_ESCALATION_NOTE: &str = "Auto-escalated after 7 days without decision";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfractionInput {
    pub infraction_id: String,
    pub key: String,
    pub infraction_type: String,
    pub description: String,
    pub reporter_ispb: String,
    #[serde(default)]
    pub reported_ispb: Option<String>,
    #[serde(default)]
    pub evidence_urls: Vec<String>,
    #[serde(default)]
    pub entry_id: Option<String>,
    #[serde(default)]
    pub claim_id: Option<String>,
}

impl InfractionInput {
    pub fn validate(&self) -> Result<NewInfraction, WorkflowError> {
        if self.reporter_ispb.trim().is_empty() {
            return Err(invalid_input("reporter_ispb is required"));
        }
        let reported_ispb = match self.reported_ispb.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(Ispb::parse(raw).map_err(invalid_input)?),
            _ => None,
        };
        let new = NewInfraction {
            infraction_id: self.infraction_id.trim().to_string(),
            key: self.key.trim().to_string(),
            infraction_type: InfractionType::parse(&self.infraction_type).map_err(invalid_input)?,
            description: self.description.clone(),
            reporter_ispb: Ispb::parse(&self.reporter_ispb).map_err(invalid_input)?,
            reported_ispb,
            evidence_urls: self.evidence_urls.clone(),
            entry_id: self.entry_id.clone(),
            claim_id: self.claim_id.clone(),
        };
        new.validate().map_err(invalid_input)?;
        Ok(new)
    }
}

/// Payload of the `evidence_added` signal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidenceAdded {
    pub evidence_url: String,
    pub uploaded_by: Option<String>,
    pub description: Option<String>,
}

/// Payload of the `investigation_complete` signal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvestigationComplete {
    pub decision: String,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfractionResult {
    pub infraction_id: String,
    pub status: InfractionStatus,
    pub decision: InvestigationDecision,
    pub resolution_notes: Option<String>,
    pub escalated_to_bacen: bool,
    pub auto_escalated: bool,
    pub evidence_urls: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub completed_at: OffsetDateTime,
    pub message: String,
}

struct Verdict {
    decision: InvestigationDecision,
    notes: String,
    automatic: bool,
}

pub struct InfractionWorkflow;

impl InfractionWorkflow {
    /// The case was closed by someone else before the verdict could be
    /// applied. Report what is stored and leave the authority alone.
    async fn closed_elsewhere(
        ctx: &WorkflowContext,
        infraction_ref: &InfractionRef,
        verdict: Verdict,
        evidence: Vec<String>,
    ) -> Result<InfractionResult, WorkflowError> {
        let stored = ctx
            .execute_activity::<GetInfractionActivity>(infraction_ref, ActivityProfile::Database)
            .await?;
        tracing::warn!(
            infraction_id = %stored.infraction_id,
            stored = %stored.status,
            decision = %verdict.decision,
            "infraction already closed; decision not applied"
        );
        Ok(InfractionResult {
            infraction_id: stored.infraction_id,
            status: stored.status,
            decision: verdict.decision,
            resolution_notes: stored.resolution_notes,
            escalated_to_bacen: stored.status == InfractionStatus::EscalatedToBacen,
            auto_escalated: verdict.automatic,
            evidence_urls: evidence,
            completed_at: ctx.now().await?,
            message: format!(
                "Infraction already {} - {} decision not applied",
                stored.status, verdict.decision
            ),
        })
    }

    /// Collect evidence until a valid decision arrives or the deadline
    /// passes.
    async fn investigate(
        ctx: &WorkflowContext,
        infraction_id: &str,
        evidence: &mut Vec<String>,
    ) -> Result<Verdict, WorkflowError> {
        let deadline = ctx.new_timer(INVESTIGATION_PERIOD).await?;
        loop {
            let selected = ctx
                .selector()
                .on_signal(EVIDENCE_ADDED_SIGNAL)
                .on_signal(INVESTIGATION_COMPLETE_SIGNAL)
                .on_timer(deadline)
                .select()
                .await?;

            match selected {
                Selected::Signal(signal) if signal.name == EVIDENCE_ADDED_SIGNAL => {
                    let added: EvidenceAdded = signal.decode_or_default();
                    let url = added.evidence_url.trim().to_string();
                    if url.is_empty() || evidence.contains(&url) {
                        tracing::debug!(infraction_id, %url, "evidence ignored");
                        continue;
                    }
                    let input = AddEvidenceInput {
                        infraction_id: infraction_id.to_string(),
                        evidence_url: url.clone(),
                    };
                    if ctx
                        .execute_non_critical::<AddEvidenceActivity>(&input, ActivityProfile::Database)
                        .await?
                        .is_some()
                    {
                        tracing::info!(infraction_id, %url, uploaded_by = ?added.uploaded_by, "evidence added");
                        evidence.push(url);
                    }
                }
                Selected::Signal(signal) => {
                    let complete: InvestigationComplete = signal.decode_or_default();
                    let decision = match InvestigationDecision::parse(&complete.decision) {
                        Ok(decision) => decision,
                        Err(e) => {
                            tracing::warn!(infraction_id, error = %e, "unknown investigation decision ignored");
                            continue;
                        }
                    };
                    if decision.requires_notes() && complete.notes.trim().is_empty() {
                        tracing::warn!(infraction_id, %decision, "decision without notes ignored");
                        continue;
                    }
                    return Ok(Verdict {
                        decision,
                        notes: complete.notes,
                        automatic: false,
                    });
                }
                Selected::Timer(_) => {
                    tracing::info!(infraction_id, "investigation deadline reached; escalating");
                    return Ok(Verdict {
                        decision: InvestigationDecision::Escalate,
                        notes: AUTO_ESCALATION_NOTE.to_string(),
                        automatic: true,
                    });
                }
            }
        }
    }
}

#[async_trait]
impl Workflow for InfractionWorkflow {
    const NAME: &'static str = "InfractionWorkflow";
    type Input = InfractionInput;
    type Output = InfractionResult;

    async fn run(&self, ctx: WorkflowContext, input: InfractionInput) -> Result<InfractionResult, WorkflowError> {
        let new = input.validate()?;
        let infraction_id = new.infraction_id.clone();
        // Resumed runs log from recovery instead.
        if !ctx.is_replaying() {
            tracing::info!(%infraction_id, infraction_type = %new.infraction_type, "infraction workflow started");
        }

        let infraction = ctx
            .execute_activity::<CreateInfractionActivity>(&new, ActivityProfile::Database)
            .await?;
        let mut evidence = infraction.evidence_urls.clone();

        let infraction_ref = InfractionRef {
            infraction_id: infraction_id.clone(),
        };
        if infraction.reported_ispb.is_some() {
            ctx.execute_non_critical::<NotifyReportedParticipantActivity>(
                &infraction_ref,
                ActivityProfile::ExternalApi,
            )
            .await?;
        }
        satisfied(
            "investigate",
            ctx.execute_activity::<InvestigateInfractionActivity>(&infraction_ref, ActivityProfile::Database)
                .await,
        )?;

        let verdict = Self::investigate(&ctx, &infraction_id, &mut evidence).await?;

        let decided = satisfied(
            "decide",
            ctx.execute_activity::<DecideInfractionActivity>(
                &DecideInfractionInput {
                    infraction_id: infraction_id.clone(),
                    decision: verdict.decision,
                    notes: verdict.notes.clone(),
                },
                ActivityProfile::Database,
            )
            .await,
        )?;
        if decided.is_none() {
            return Self::closed_elsewhere(&ctx, &infraction_ref, verdict, evidence).await;
        }

        let authority = AuthoritySubject::Infraction {
            infraction_id: infraction_id.clone(),
        };
        let message = match verdict.decision {
            InvestigationDecision::Resolve => {
                ctx.execute_non_critical::<NotifyAuthorityActivity>(&authority, ActivityProfile::ExternalApi)
                    .await?;
                "Infraction resolved successfully"
            }
            InvestigationDecision::Dismiss => "Infraction dismissed - unfounded or invalid",
            InvestigationDecision::Escalate => {
                ctx.execute_activity::<NotifyAuthorityActivity>(&authority, ActivityProfile::ExternalApi)
                    .await?;
                "Infraction escalated to Bacen for further action"
            }
        };

        let result = InfractionResult {
            infraction_id: infraction_id.clone(),
            status: verdict.decision.target_status(),
            decision: verdict.decision,
            resolution_notes: Some(verdict.notes).filter(|n| !n.trim().is_empty()),
            escalated_to_bacen: verdict.decision == InvestigationDecision::Escalate,
            auto_escalated: verdict.automatic,
            evidence_urls: evidence,
            completed_at: ctx.now().await?,
            message: message.to_string(),
        };

        publish(&ctx, "infraction_workflow_completed", &infraction_id, &result).await?;
        tracing::info!(%infraction_id, status = %result.status, "infraction workflow finished");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> InfractionInput {
        InfractionInput {
            infraction_id: "I1".into(),
            key: "user@example.com".into(),
            infraction_type: "FRAUD".into(),
            description: "suspicious transfers".into(),
            reporter_ispb: "11111111".into(),
            reported_ispb: Some("22222222".into()),
            evidence_urls: vec![],
            entry_id: None,
            claim_id: None,
        }
    }

    #[test]
    fn blank_reported_participant_is_absent() {
        let mut raw = input();
        raw.reported_ispb = Some("  ".into());
        assert_eq!(raw.validate().unwrap().reported_ispb, None);
    }

    #[test]
    fn rejects_self_report_and_unknown_type() {
        let mut raw = input();
        raw.reported_ispb = Some("11111111".into());
        assert!(matches!(raw.validate(), Err(WorkflowError::Validation(_))));

        let mut raw = input();
        raw.infraction_type = "SPAM".into();
        assert!(raw.validate().is_err());

        let mut raw = input();
        raw.description = " ".into();
        assert!(raw.validate().is_err());
    }
}

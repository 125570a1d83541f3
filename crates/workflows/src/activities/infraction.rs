use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use dict_domain::{
    DomainError, Infraction, InfractionRepository, InfractionStatus, InvestigationDecision,
    NewInfraction, RegistryClient,
};
use dict_durable::{Activity, ActivityContext, ActivityError, FailureKind};

use super::{domain_failure, not_found};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfractionRef {
    pub infraction_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddEvidenceInput {
    pub infraction_id: String,
    pub evidence_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecideInfractionInput {
    pub infraction_id: String,
    pub decision: InvestigationDecision,
    pub notes: String,
}

pub(super) async fn load(
    infractions: &dyn InfractionRepository,
    infraction_id: &str,
) -> Result<Infraction, ActivityError> {
    infractions
        .get(infraction_id)
        .await
        .map_err(domain_failure)?
        .ok_or_else(|| not_found("infraction", infraction_id))
}

async fn transition(
    infractions: &dyn InfractionRepository,
    infraction_id: &str,
    target: InfractionStatus,
    apply: impl FnOnce(&mut Infraction) -> Result<(), DomainError> + Send,
) -> Result<Infraction, ActivityError> {
    let mut infraction = load(infractions, infraction_id).await?;
    if infraction.status == target {
        return Ok(infraction);
    }
    apply(&mut infraction).map_err(domain_failure)?;
    let infraction = infractions.update(infraction).await.map_err(domain_failure)?;
    tracing::info!(infraction_id, status = %infraction.status, "infraction status updated");
    Ok(infraction)
}

pub struct GetInfractionActivity {
    infractions: Arc<dyn InfractionRepository>,
}

impl GetInfractionActivity {
    pub fn new(infractions: Arc<dyn InfractionRepository>) -> Self {
        Self { infractions }
    }
}

#[async_trait]
impl Activity for GetInfractionActivity {
    const NAME: &'static str = "GetInfractionActivity";
    type Input = InfractionRef;
    type Output = Infraction;

    async fn execute(&self, _ctx: &ActivityContext, input: InfractionRef) -> Result<Infraction, ActivityError> {
        load(self.infractions.as_ref(), &input.infraction_id).await
    }
}

/// Open an infraction record with its initial evidence.
pub struct CreateInfractionActivity {
    infractions: Arc<dyn InfractionRepository>,
}

impl CreateInfractionActivity {
    pub fn new(infractions: Arc<dyn InfractionRepository>) -> Self {
        Self { infractions }
    }

    fn existing_or_duplicate(
        existing: Infraction,
        new: &NewInfraction,
    ) -> Result<Infraction, ActivityError> {
        if existing.matches(new) {
            Ok(existing)
        } else {
            Err(ActivityError::non_retryable(
                FailureKind::Duplicate,
                format!(
                    "infraction {} already exists with different data",
                    new.infraction_id
                ),
            ))
        }
    }
}

#[async_trait]
impl Activity for CreateInfractionActivity {
    const NAME: &'static str = "CreateInfractionActivity";
    type Input = NewInfraction;
    type Output = Infraction;

    async fn execute(
        &self,
        ctx: &ActivityContext,
        input: NewInfraction,
    ) -> Result<Infraction, ActivityError> {
        let found = self
            .infractions
            .get(&input.infraction_id)
            .await
            .map_err(domain_failure)?;
        if let Some(existing) = found {
            return Self::existing_or_duplicate(existing, &input);
        }
        let infraction = Infraction::open(input.clone(), ctx.now()).map_err(domain_failure)?;
        match self.infractions.insert(infraction).await {
            Ok(infraction) => Ok(infraction),
            Err(DomainError::AlreadyExists { .. }) => {
                let existing = load(self.infractions.as_ref(), &input.infraction_id).await?;
                Self::existing_or_duplicate(existing, &input)
            }
            Err(e) => Err(domain_failure(e)),
        }
    }
}

pub struct NotifyReportedParticipantActivity {
    infractions: Arc<dyn InfractionRepository>,
    registry: Arc<dyn RegistryClient>,
}

impl NotifyReportedParticipantActivity {
    pub fn new(
        infractions: Arc<dyn InfractionRepository>,
        registry: Arc<dyn RegistryClient>,
    ) -> Self {
        Self {
            infractions,
            registry,
        }
    }
}

#[async_trait]
impl Activity for NotifyReportedParticipantActivity {
    const NAME: &'static str = "NotifyReportedParticipantActivity";
    type Input = InfractionRef;
    type Output = ();

    async fn execute(&self, _ctx: &ActivityContext, input: InfractionRef) -> Result<(), ActivityError> {
        let infraction = load(self.infractions.as_ref(), &input.infraction_id).await?;
        self.registry
            .notify_reported_participant(&infraction)
            .await
            .map_err(domain_failure)
    }
}

pub struct InvestigateInfractionActivity {
    infractions: Arc<dyn InfractionRepository>,
}

impl InvestigateInfractionActivity {
    pub fn new(infractions: Arc<dyn InfractionRepository>) -> Self {
        Self { infractions }
    }
}

#[async_trait]
impl Activity for InvestigateInfractionActivity {
    const NAME: &'static str = "InvestigateInfractionActivity";
    type Input = InfractionRef;
    type Output = Infraction;

    async fn execute(
        &self,
        ctx: &ActivityContext,
        input: InfractionRef,
    ) -> Result<Infraction, ActivityError> {
        let now = ctx.now();
        transition(
            self.infractions.as_ref(),
            &input.infraction_id,
            InfractionStatus::UnderInvestigation,
            |infraction| infraction.investigate(now),
        )
        .await
    }
}

/// Append one evidence URL. Returns whether the set grew.
pub struct AddEvidenceActivity {
    infractions: Arc<dyn InfractionRepository>,
}

impl AddEvidenceActivity {
    pub fn new(infractions: Arc<dyn InfractionRepository>) -> Self {
        Self { infractions }
    }
}

#[async_trait]
impl Activity for AddEvidenceActivity {
    const NAME: &'static str = "AddEvidenceActivity";
    type Input = AddEvidenceInput;
    type Output = bool;

    async fn execute(&self, ctx: &ActivityContext, input: AddEvidenceInput) -> Result<bool, ActivityError> {
        let mut infraction = load(self.infractions.as_ref(), &input.infraction_id).await?;
        let added = infraction
            .add_evidence(&input.evidence_url, ctx.now())
            .map_err(domain_failure)?;
        if added {
            self.infractions
                .update(infraction)
                .await
                .map_err(domain_failure)?;
        }
        Ok(added)
    }
}

/// Apply an investigation decision.
pub struct DecideInfractionActivity {
    infractions: Arc<dyn InfractionRepository>,
}

impl DecideInfractionActivity {
    pub fn new(infractions: Arc<dyn InfractionRepository>) -> Self {
        Self { infractions }
    }
}

#[async_trait]
impl Activity for DecideInfractionActivity {
    const NAME: &'static str = "DecideInfractionActivity";
    type Input = DecideInfractionInput;
    type Output = Infraction;

    async fn execute(
        &self,
        ctx: &ActivityContext,
        input: DecideInfractionInput,
    ) -> Result<Infraction, ActivityError> {
        let now = ctx.now();
        let DecideInfractionInput {
            infraction_id,
            decision,
            notes,
        } = input;
        transition(
            self.infractions.as_ref(),
            &infraction_id,
            decision.target_status(),
            move |infraction| infraction.decide(decision, &notes, now),
        )
        .await
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use dict_domain::{Claim, ClaimRepository, ClaimStatus, DomainError, NewClaim, RegistryClient};
use dict_durable::{Activity, ActivityContext, ActivityError, FailureKind};

use super::{domain_failure, not_found};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRef {
    pub claim_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelClaimInput {
    pub claim_id: String,
    pub reason: String,
    pub cancelled_by: String,
}

async fn load(claims: &dyn ClaimRepository, claim_id: &str) -> Result<Claim, ActivityError> {
    claims
        .get(claim_id)
        .await
        .map_err(domain_failure)?
        .ok_or_else(|| not_found("claim", claim_id))
}

/// Move a claim to `target` unless it is already there.
async fn transition(
    claims: &dyn ClaimRepository,
    claim_id: &str,
    target: ClaimStatus,
    apply: impl FnOnce(&mut Claim) -> Result<(), DomainError> + Send,
) -> Result<Claim, ActivityError> {
    let mut claim = load(claims, claim_id).await?;
    if claim.status == target {
        return Ok(claim);
    }
    apply(&mut claim).map_err(domain_failure)?;
    let claim = claims.update(claim).await.map_err(domain_failure)?;
    tracing::info!(claim_id, status = %claim.status, "claim status updated");
    Ok(claim)
}

fn existing_or_duplicate(existing: Claim, new: &NewClaim) -> Result<Claim, ActivityError> {
    if existing.matches(new) {
        Ok(existing)
    } else {
        Err(ActivityError::non_retryable(
            FailureKind::Duplicate,
            format!("claim {} already exists with different data", new.claim_id),
        ))
    }
}

// ── Create ───────────────────────────────────────────────────────────────────

/// Persist a new claim. A repeated call with the same data returns the
/// stored claim; a second active claim on the key is a `Conflict`.
pub struct CreateClaimActivity {
    claims: Arc<dyn ClaimRepository>,
}

impl CreateClaimActivity {
    pub fn new(claims: Arc<dyn ClaimRepository>) -> Self {
        Self { claims }
    }
}

#[async_trait]
impl Activity for CreateClaimActivity {
    const NAME: &'static str = "CreateClaimActivity";
    type Input = NewClaim;
    type Output = Claim;

    async fn execute(&self, ctx: &ActivityContext, input: NewClaim) -> Result<Claim, ActivityError> {
        if let Some(existing) = self.claims.get(&input.claim_id).await.map_err(domain_failure)? {
            return existing_or_duplicate(existing, &input);
        }
        let claim = Claim::open(input.clone(), ctx.now()).map_err(domain_failure)?;
        match self.claims.insert(claim).await {
            Ok(claim) => Ok(claim),
            Err(DomainError::AlreadyExists { .. }) => {
                let existing = load(self.claims.as_ref(), &input.claim_id).await?;
                existing_or_duplicate(existing, &input)
            }
            Err(e) => Err(domain_failure(e)),
        }
    }
}

// ── Read ─────────────────────────────────────────────────────────────────────

/// The stored claim, as whoever touched it last left it.
pub struct GetClaimActivity {
    claims: Arc<dyn ClaimRepository>,
}

impl GetClaimActivity {
    pub fn new(claims: Arc<dyn ClaimRepository>) -> Self {
        Self { claims }
    }
}

#[async_trait]
impl Activity for GetClaimActivity {
    const NAME: &'static str = "GetClaimActivity";
    type Input = ClaimRef;
    type Output = Claim;

    async fn execute(&self, _ctx: &ActivityContext, input: ClaimRef) -> Result<Claim, ActivityError> {
        load(self.claims.as_ref(), &input.claim_id).await
    }
}

// ── Notify ───────────────────────────────────────────────────────────────────

pub struct NotifyClaimDonorActivity {
    claims: Arc<dyn ClaimRepository>,
    registry: Arc<dyn RegistryClient>,
}

impl NotifyClaimDonorActivity {
    pub fn new(claims: Arc<dyn ClaimRepository>, registry: Arc<dyn RegistryClient>) -> Self {
        Self { claims, registry }
    }
}

#[async_trait]
impl Activity for NotifyClaimDonorActivity {
    const NAME: &'static str = "NotifyClaimDonorActivity";
    type Input = ClaimRef;
    type Output = ();

    async fn execute(&self, _ctx: &ActivityContext, input: ClaimRef) -> Result<(), ActivityError> {
        let claim = load(self.claims.as_ref(), &input.claim_id).await?;
        self.registry
            .notify_claim_donor(&claim)
            .await
            .map_err(domain_failure)
    }
}

// ── Status changes ───────────────────────────────────────────────────────────

pub struct AwaitClaimResolutionActivity {
    claims: Arc<dyn ClaimRepository>,
}

impl AwaitClaimResolutionActivity {
    pub fn new(claims: Arc<dyn ClaimRepository>) -> Self {
        Self { claims }
    }
}

#[async_trait]
impl Activity for AwaitClaimResolutionActivity {
    const NAME: &'static str = "AwaitClaimResolutionActivity";
    type Input = ClaimRef;
    type Output = Claim;

    async fn execute(&self, ctx: &ActivityContext, input: ClaimRef) -> Result<Claim, ActivityError> {
        let now = ctx.now();
        transition(
            self.claims.as_ref(),
            &input.claim_id,
            ClaimStatus::WaitingResolution,
            |claim| claim.await_resolution(now),
        )
        .await
    }
}

/// Confirm (if still waiting) and complete a claim in one write.
pub struct CompleteClaimActivity {
    claims: Arc<dyn ClaimRepository>,
}

impl CompleteClaimActivity {
    pub fn new(claims: Arc<dyn ClaimRepository>) -> Self {
        Self { claims }
    }
}

#[async_trait]
impl Activity for CompleteClaimActivity {
    const NAME: &'static str = "CompleteClaimActivity";
    type Input = ClaimRef;
    type Output = Claim;

    async fn execute(&self, ctx: &ActivityContext, input: ClaimRef) -> Result<Claim, ActivityError> {
        let now = ctx.now();
        transition(
            self.claims.as_ref(),
            &input.claim_id,
            ClaimStatus::Completed,
            |claim| {
                if claim.status == ClaimStatus::WaitingResolution {
                    claim.confirm(now)?;
                }
                claim.complete(now)
            },
        )
        .await
    }
}

pub struct CancelClaimActivity {
    claims: Arc<dyn ClaimRepository>,
}

impl CancelClaimActivity {
    pub fn new(claims: Arc<dyn ClaimRepository>) -> Self {
        Self { claims }
    }
}

#[async_trait]
impl Activity for CancelClaimActivity {
    const NAME: &'static str = "CancelClaimActivity";
    type Input = CancelClaimInput;
    type Output = Claim;

    async fn execute(
        &self,
        ctx: &ActivityContext,
        input: CancelClaimInput,
    ) -> Result<Claim, ActivityError> {
        let now = ctx.now();
        let CancelClaimInput {
            claim_id,
            reason,
            cancelled_by,
        } = input;
        transition(
            self.claims.as_ref(),
            &claim_id,
            ClaimStatus::Cancelled,
            move |claim| claim.cancel(reason, cancelled_by, now),
        )
        .await
    }
}

pub struct ExpireClaimActivity {
    claims: Arc<dyn ClaimRepository>,
}

impl ExpireClaimActivity {
    pub fn new(claims: Arc<dyn ClaimRepository>) -> Self {
        Self { claims }
    }
}

#[async_trait]
impl Activity for ExpireClaimActivity {
    const NAME: &'static str = "ExpireClaimActivity";
    type Input = ClaimRef;
    type Output = Claim;

    async fn execute(&self, ctx: &ActivityContext, input: ClaimRef) -> Result<Claim, ActivityError> {
        let now = ctx.now();
        transition(
            self.claims.as_ref(),
            &input.claim_id,
            ClaimStatus::Expired,
            |claim| claim.expire(now),
        )
        .await
    }
}

//! Activities: the only code that touches repositories, the registry and
//! the event bus.
//!
//! Every mutating activity is idempotent. Creates accept an existing record
//! with matching data, and status changes succeed when the entity is
//! already in the target status. Anything else the domain rejects comes
//! back as a non-retryable failure.

mod authority;
mod claim;
mod entry;
mod events;
mod infraction;
mod vsync;

use dict_domain::DomainError;
use dict_durable::{ActivityError, EngineBuilder, FailureKind};

use crate::collaborators::Collaborators;

pub use authority::{AuthoritySubject, NotifyAuthorityActivity};
pub use claim::{
    AwaitClaimResolutionActivity, CancelClaimActivity, CancelClaimInput, ClaimRef,
    CompleteClaimActivity, CreateClaimActivity, ExpireClaimActivity, GetClaimActivity,
    NotifyClaimDonorActivity,
};
pub use entry::{
    CreateEntryActivity, DeactivateEntryActivity, DeactivateEntryInput, EntryRef,
    FlagEntryForReviewActivity, FlagEntryInput, GetEntryActivity, ReactivateEntryActivity,
    SoftDeleteEntryActivity, UpdateEntryActivity, UpdateEntryInput,
};
pub use events::{PublishEvent, PublishEventActivity};
pub use infraction::{
    AddEvidenceActivity, AddEvidenceInput, CreateInfractionActivity, DecideInfractionActivity,
    DecideInfractionInput, GetInfractionActivity, InfractionRef, InvestigateInfractionActivity,
    NotifyReportedParticipantActivity,
};
pub use vsync::{
    CompareEntriesActivity, CompareInput, FetchRemoteEntriesActivity, PersistSyncReportActivity,
    SyncReportDraft,
};

/// Classify a domain failure for the retry dispatcher.
pub(crate) fn domain_failure(err: DomainError) -> ActivityError {
    let kind = match &err {
        DomainError::Unavailable(_) | DomainError::ConcurrentModification { .. } => {
            return ActivityError::retryable(err.to_string());
        }
        DomainError::Validation(_) => FailureKind::Validation,
        DomainError::InvalidTransition { .. } => FailureKind::InvalidTransition,
        DomainError::AlreadyExists { .. } => FailureKind::AlreadyExists,
        DomainError::NotFound { .. } => FailureKind::NotFound,
        DomainError::Conflict(_) => FailureKind::Conflict,
    };
    ActivityError::non_retryable(kind, err.to_string())
}

pub(crate) fn not_found(entity: &'static str, id: &str) -> ActivityError {
    domain_failure(DomainError::NotFound {
        entity,
        id: id.to_string(),
    })
}

/// Register every activity against `collaborators`.
pub(crate) fn register(builder: EngineBuilder, c: &Collaborators) -> EngineBuilder {
    builder
        .register_activity(CreateClaimActivity::new(c.claims.clone()))
        .register_activity(GetClaimActivity::new(c.claims.clone()))
        .register_activity(NotifyClaimDonorActivity::new(c.claims.clone(), c.registry.clone()))
        .register_activity(AwaitClaimResolutionActivity::new(c.claims.clone()))
        .register_activity(CompleteClaimActivity::new(c.claims.clone()))
        .register_activity(CancelClaimActivity::new(c.claims.clone()))
        .register_activity(ExpireClaimActivity::new(c.claims.clone()))
        .register_activity(CreateInfractionActivity::new(c.infractions.clone()))
        .register_activity(GetInfractionActivity::new(c.infractions.clone()))
        .register_activity(NotifyReportedParticipantActivity::new(
            c.infractions.clone(),
            c.registry.clone(),
        ))
        .register_activity(InvestigateInfractionActivity::new(c.infractions.clone()))
        .register_activity(AddEvidenceActivity::new(c.infractions.clone()))
        .register_activity(DecideInfractionActivity::new(c.infractions.clone()))
        .register_activity(GetEntryActivity::new(c.entries.clone()))
        .register_activity(DeactivateEntryActivity::new(c.entries.clone()))
        .register_activity(ReactivateEntryActivity::new(c.entries.clone()))
        .register_activity(SoftDeleteEntryActivity::new(c.entries.clone()))
        .register_activity(CreateEntryActivity::new(c.entries.clone()))
        .register_activity(UpdateEntryActivity::new(c.entries.clone()))
        .register_activity(FlagEntryForReviewActivity::new(c.entries.clone()))
        .register_activity(FetchRemoteEntriesActivity::new(c.registry.clone()))
        .register_activity(CompareEntriesActivity::new(c.entries.clone()))
        .register_activity(PersistSyncReportActivity::new(c.reports.clone()))
        .register_activity(NotifyAuthorityActivity::new(
            c.infractions.clone(),
            c.entries.clone(),
            c.registry.clone(),
        ))
        .register_activity(PublishEventActivity::new(c.publisher.clone()))
}

/// Errors raised by domain rules and by collaborator implementations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Input violates a field-level rule.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The entity's status does not allow the requested transition.
    #[error("invalid transition for {entity} {id}: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        id: String,
        from: String,
        to: String,
    },

    #[error("{entity} already exists: {id}")]
    AlreadyExists { entity: &'static str, id: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A business rule conflict, e.g. a second active claim on a key.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Optimistic concurrency check failed; the caller should re-read and retry.
    #[error("concurrent modification of {entity} {id}: expected version {expected_version}")]
    ConcurrentModification {
        entity: &'static str,
        id: String,
        expected_version: u64,
    },

    /// The collaborator is temporarily unreachable.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl DomainError {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DomainError::Unavailable(_) | DomainError::ConcurrentModification { .. }
        )
    }
}

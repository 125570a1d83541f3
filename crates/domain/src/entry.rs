use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::DomainError;
use crate::ispb::Ispb;
use crate::sync::RemoteEntry;

wire_enum! {
    pub enum EntryStatus {
        Active => "ACTIVE",
        Inactive => "INACTIVE",
        Blocked => "BLOCKED",
        PortabilityPending => "PORTABILITY_PENDING",
        OwnershipChangePending => "OWNERSHIP_CHANGE_PENDING",
    }
}

wire_enum! {
    pub enum DeletionReason {
        UserRequest => "USER_REQUEST",
        Compliance => "COMPLIANCE",
        Fraud => "FRAUD",
        Duplicate => "DUPLICATE",
        AdminAction => "ADMIN_ACTION",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Account {
    pub branch: String,
    pub number: String,
    pub account_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Owner {
    pub owner_type: String,
    pub name: String,
    pub tax_id: String,
}

/// Marks an entry that reconciliation could not repair automatically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewFlag {
    pub reason: String,
    #[serde(with = "time::serde::rfc3339")]
    pub flagged_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub entry_id: String,
    pub key: String,
    pub key_type: String,
    pub participant_ispb: Ispb,
    pub account: Account,
    pub owner: Owner,
    pub status: EntryStatus,
    pub deactivation_reason: Option<String>,
    pub review: Option<ReviewFlag>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub deactivated_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub deleted_at: Option<OffsetDateTime>,
    pub version: u64,
}

impl Entry {
    /// Build a local entry mirroring a registry record.
    pub fn from_remote(entry_id: String, remote: &RemoteEntry, now: OffsetDateTime) -> Entry {
        Entry {
            entry_id,
            key: remote.key.clone(),
            key_type: remote.key_type.clone(),
            participant_ispb: remote.participant_ispb.clone(),
            account: remote.account.clone(),
            owner: remote.owner.clone(),
            status: remote.status,
            deactivation_reason: None,
            review: None,
            created_at: now,
            updated_at: now,
            deactivated_at: None,
            deleted_at: None,
            version: 0,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Overwrite the fields the registry is authoritative for.
    pub fn apply_remote(&mut self, remote: &RemoteEntry, now: OffsetDateTime) {
        self.account = remote.account.clone();
        self.owner = remote.owner.clone();
        self.status = remote.status;
        self.updated_at = now;
    }

    fn invalid(&self, to: &str) -> DomainError {
        let from = if self.is_deleted() {
            "DELETED".to_string()
        } else {
            self.status.to_string()
        };
        DomainError::InvalidTransition {
            entity: "entry",
            id: self.entry_id.clone(),
            from,
            to: to.to_string(),
        }
    }

    /// Start the deletion grace period.
    pub fn deactivate(&mut self, reason: &str, now: OffsetDateTime) -> Result<(), DomainError> {
        if self.is_deleted() || matches!(self.status, EntryStatus::Inactive | EntryStatus::Blocked) {
            return Err(self.invalid("INACTIVE"));
        }
        self.status = EntryStatus::Inactive;
        self.deactivation_reason = Some(reason.to_string());
        self.deactivated_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Undo a deactivation inside the grace period.
    pub fn activate(&mut self, now: OffsetDateTime) -> Result<(), DomainError> {
        if self.is_deleted() || self.status != EntryStatus::Inactive {
            return Err(self.invalid("ACTIVE"));
        }
        self.status = EntryStatus::Active;
        self.deactivation_reason = None;
        self.deactivated_at = None;
        self.updated_at = now;
        Ok(())
    }

    pub fn soft_delete(&mut self, now: OffsetDateTime) -> Result<(), DomainError> {
        if self.is_deleted() || self.status != EntryStatus::Inactive {
            return Err(self.invalid("DELETED"));
        }
        self.deleted_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Flag for manual review. Returns `false` if a flag was already set.
    pub fn flag_for_review(&mut self, reason: &str, now: OffsetDateTime) -> bool {
        if self.review.is_some() {
            return false;
        }
        self.review = Some(ReviewFlag {
            reason: reason.to_string(),
            flagged_at: now,
        });
        self.updated_at = now;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const T0: OffsetDateTime = datetime!(2025-05-10 08:00 UTC);

    fn entry() -> Entry {
        Entry {
            entry_id: "ENT-1".to_string(),
            key: "12345678901".to_string(),
            key_type: "CPF".to_string(),
            participant_ispb: Ispb::parse("60746948").unwrap(),
            account: Account {
                branch: "0001".to_string(),
                number: "998877".to_string(),
                account_type: "CACC".to_string(),
            },
            owner: Owner {
                owner_type: "NATURAL_PERSON".to_string(),
                name: "Maria Souza".to_string(),
                tax_id: "12345678901".to_string(),
            },
            status: EntryStatus::Active,
            deactivation_reason: None,
            review: None,
            created_at: T0,
            updated_at: T0,
            deactivated_at: None,
            deleted_at: None,
            version: 0,
        }
    }

    #[test]
    fn deactivate_then_reactivate() {
        let mut e = entry();
        e.deactivate("USER_REQUEST", T0).unwrap();
        assert_eq!(e.status, EntryStatus::Inactive);
        assert!(e.deactivate("USER_REQUEST", T0).is_err());
        e.activate(T0).unwrap();
        assert_eq!(e.status, EntryStatus::Active);
        assert_eq!(e.deactivation_reason, None);
    }

    #[test]
    fn soft_delete_requires_inactive() {
        let mut e = entry();
        assert!(matches!(
            e.soft_delete(T0),
            Err(DomainError::InvalidTransition { .. })
        ));
        e.deactivate("FRAUD", T0).unwrap();
        e.soft_delete(T0).unwrap();
        assert!(e.is_deleted());
        let err = e.activate(T0).unwrap_err();
        assert!(err.to_string().contains("DELETED -> ACTIVE"));
    }

    #[test]
    fn blocked_entry_cannot_be_deactivated() {
        let mut e = entry();
        e.status = EntryStatus::Blocked;
        assert!(e.deactivate("ADMIN_ACTION", T0).is_err());
    }

    #[test]
    fn flag_once() {
        let mut e = entry();
        assert!(e.flag_for_review("missing in registry", T0));
        assert!(!e.flag_for_review("missing in registry", T0));
    }
}

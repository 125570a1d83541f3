use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::DomainError;
use crate::ispb::Ispb;

/// Window the donor has to respond before the claimer may escalate.
pub const COMPLETION_PERIOD: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Lifetime of a claim without confirmation.
pub const CLAIM_EXPIRY: Duration = Duration::from_secs(30 * 24 * 60 * 60);

wire_enum! {
    pub enum ClaimType {
        Portability => "PORTABILITY",
        Ownership => "OWNERSHIP",
    }
}

wire_enum! {
    pub enum ClaimStatus {
        Open => "OPEN",
        WaitingResolution => "WAITING_RESOLUTION",
        Confirmed => "CONFIRMED",
        Cancelled => "CANCELLED",
        Completed => "COMPLETED",
        Expired => "EXPIRED",
    }
}

impl ClaimStatus {
    pub fn allowed_next(self) -> &'static [ClaimStatus] {
        use ClaimStatus::*;
        match self {
            Open => &[WaitingResolution, Cancelled],
            WaitingResolution => &[Confirmed, Cancelled, Expired],
            Confirmed => &[Completed, Cancelled],
            Cancelled | Completed | Expired => &[],
        }
    }

    pub fn can_transition_to(self, next: ClaimStatus) -> bool {
        self.allowed_next().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_next().is_empty()
    }

    /// Active claims block a second claim on the same key.
    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ClaimAccount {
    pub branch: String,
    pub number: String,
    pub account_type: String,
}

/// The data a claim is opened with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewClaim {
    pub claim_id: String,
    #[serde(default)]
    pub entry_id: Option<String>,
    pub claim_type: ClaimType,
    pub key: String,
    pub key_type: String,
    pub donor_ispb: Ispb,
    pub claimer_ispb: Ispb,
    pub claimer_account: ClaimAccount,
}

impl NewClaim {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.claim_id.trim().is_empty() {
            return Err(DomainError::Validation("claim_id is required".to_string()));
        }
        if self.key.trim().is_empty() {
            return Err(DomainError::Validation("key is required".to_string()));
        }
        if self.donor_ispb == self.claimer_ispb {
            return Err(DomainError::Validation(format!(
                "donor and claimer must differ (both {})",
                self.donor_ispb
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub claim_id: String,
    pub entry_id: Option<String>,
    pub claim_type: ClaimType,
    pub status: ClaimStatus,
    pub key: String,
    pub key_type: String,
    pub donor_ispb: Ispb,
    pub claimer_ispb: Ispb,
    pub claimer_account: ClaimAccount,
    #[serde(with = "time::serde::rfc3339")]
    pub completion_period_end: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub claim_expiry_date: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub confirmed_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub cancelled_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expired_at: Option<OffsetDateTime>,
    pub cancellation_reason: Option<String>,
    pub cancelled_by: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub version: u64,
}

impl Claim {
    pub fn open(new: NewClaim, now: OffsetDateTime) -> Result<Claim, DomainError> {
        new.validate()?;
        Ok(Claim {
            claim_id: new.claim_id,
            entry_id: new.entry_id,
            claim_type: new.claim_type,
            status: ClaimStatus::Open,
            key: new.key,
            key_type: new.key_type,
            donor_ispb: new.donor_ispb,
            claimer_ispb: new.claimer_ispb,
            claimer_account: new.claimer_account,
            completion_period_end: now + COMPLETION_PERIOD,
            claim_expiry_date: now + CLAIM_EXPIRY,
            confirmed_at: None,
            completed_at: None,
            cancelled_at: None,
            expired_at: None,
            cancellation_reason: None,
            cancelled_by: None,
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }

    /// Whether `new` describes this claim, so a repeated create is a no-op.
    pub fn matches(&self, new: &NewClaim) -> bool {
        self.claim_id == new.claim_id
            && self.claim_type == new.claim_type
            && self.key == new.key
            && self.donor_ispb == new.donor_ispb
            && self.claimer_ispb == new.claimer_ispb
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    fn transition(&mut self, next: ClaimStatus, now: OffsetDateTime) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                entity: "claim",
                id: self.claim_id.clone(),
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    pub fn await_resolution(&mut self, now: OffsetDateTime) -> Result<(), DomainError> {
        self.transition(ClaimStatus::WaitingResolution, now)
    }

    pub fn confirm(&mut self, now: OffsetDateTime) -> Result<(), DomainError> {
        self.transition(ClaimStatus::Confirmed, now)?;
        self.confirmed_at = Some(now);
        Ok(())
    }

    pub fn complete(&mut self, now: OffsetDateTime) -> Result<(), DomainError> {
        self.transition(ClaimStatus::Completed, now)?;
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn cancel(
        &mut self,
        reason: impl Into<String>,
        cancelled_by: impl Into<String>,
        now: OffsetDateTime,
    ) -> Result<(), DomainError> {
        self.transition(ClaimStatus::Cancelled, now)?;
        self.cancelled_at = Some(now);
        self.cancellation_reason = Some(reason.into());
        self.cancelled_by = Some(cancelled_by.into());
        Ok(())
    }

    pub fn expire(&mut self, now: OffsetDateTime) -> Result<(), DomainError> {
        self.transition(ClaimStatus::Expired, now)?;
        self.expired_at = Some(now);
        Ok(())
    }
}

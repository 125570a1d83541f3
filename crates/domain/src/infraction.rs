use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::DomainError;
use crate::ispb::Ispb;

wire_enum! {
    pub enum InfractionType {
        Fraud => "FRAUD",
        AccountClosed => "ACCOUNT_CLOSED",
        IncorrectData => "INCORRECT_DATA",
        UnauthorizedUse => "UNAUTHORIZED_USE",
        DuplicateKey => "DUPLICATE_KEY",
        Other => "OTHER",
    }
}

wire_enum! {
    pub enum InfractionStatus {
        Open => "OPEN",
        UnderInvestigation => "UNDER_INVESTIGATION",
        Resolved => "RESOLVED",
        Dismissed => "DISMISSED",
        EscalatedToBacen => "ESCALATED_TO_BACEN",
    }
}

impl InfractionStatus {
    pub fn allowed_next(self) -> &'static [InfractionStatus] {
        use InfractionStatus::*;
        match self {
            Open => &[UnderInvestigation, Resolved, Dismissed, EscalatedToBacen],
            UnderInvestigation => &[Resolved, Dismissed, EscalatedToBacen],
            EscalatedToBacen => &[Resolved, Dismissed],
            Resolved | Dismissed => &[],
        }
    }

    pub fn can_transition_to(self, next: InfractionStatus) -> bool {
        self.allowed_next().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_next().is_empty()
    }
}

wire_enum! {
    /// Outcome chosen by an analyst, or synthesized on timeout.
    pub enum InvestigationDecision {
        Resolve => "RESOLVE",
        Dismiss => "DISMISS",
        Escalate => "ESCALATE",
    }
}

impl InvestigationDecision {
    pub fn target_status(self) -> InfractionStatus {
        match self {
            InvestigationDecision::Resolve => InfractionStatus::Resolved,
            InvestigationDecision::Dismiss => InfractionStatus::Dismissed,
            InvestigationDecision::Escalate => InfractionStatus::EscalatedToBacen,
        }
    }

    /// RESOLVE and DISMISS close the case and must be justified.
    pub fn requires_notes(self) -> bool {
        !matches!(self, InvestigationDecision::Escalate)
    }
}

/// The data an infraction report is opened with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInfraction {
    pub infraction_id: String,
    pub key: String,
    pub infraction_type: InfractionType,
    pub description: String,
    pub reporter_ispb: Ispb,
    #[serde(default)]
    pub reported_ispb: Option<Ispb>,
    #[serde(default)]
    pub evidence_urls: Vec<String>,
    #[serde(default)]
    pub entry_id: Option<String>,
    #[serde(default)]
    pub claim_id: Option<String>,
}

impl NewInfraction {
    pub fn validate(&self) -> Result<(), DomainError> {
        for (field, value) in [
            ("infraction_id", &self.infraction_id),
            ("key", &self.key),
            ("description", &self.description),
        ] {
            if value.trim().is_empty() {
                return Err(DomainError::Validation(format!("{field} is required")));
            }
        }
        if self.reported_ispb.as_ref() == Some(&self.reporter_ispb) {
            return Err(DomainError::Validation(format!(
                "reporter and reported participant must differ (both {})",
                self.reporter_ispb
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Infraction {
    pub infraction_id: String,
    pub key: String,
    pub infraction_type: InfractionType,
    pub status: InfractionStatus,
    pub description: String,
    pub reporter_ispb: Ispb,
    pub reported_ispb: Option<Ispb>,
    pub evidence_urls: Vec<String>,
    pub resolution_notes: Option<String>,
    pub entry_id: Option<String>,
    pub claim_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub reported_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub investigated_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub resolved_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub escalated_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub version: u64,
}

impl Infraction {
    /// Open a report. Blank and repeated initial evidence URLs are dropped.
    pub fn open(new: NewInfraction, now: OffsetDateTime) -> Result<Infraction, DomainError> {
        new.validate()?;
        let mut infraction = Infraction {
            infraction_id: new.infraction_id,
            key: new.key,
            infraction_type: new.infraction_type,
            status: InfractionStatus::Open,
            description: new.description,
            reporter_ispb: new.reporter_ispb,
            reported_ispb: new.reported_ispb,
            evidence_urls: Vec::new(),
            resolution_notes: None,
            entry_id: new.entry_id,
            claim_id: new.claim_id,
            reported_at: now,
            investigated_at: None,
            resolved_at: None,
            escalated_at: None,
            updated_at: now,
            version: 0,
        };
        for url in &new.evidence_urls {
            if !url.trim().is_empty() {
                infraction.add_evidence(url, now)?;
            }
        }
        Ok(infraction)
    }

    pub fn matches(&self, new: &NewInfraction) -> bool {
        self.infraction_id == new.infraction_id
            && self.key == new.key
            && self.infraction_type == new.infraction_type
            && self.reporter_ispb == new.reporter_ispb
    }

    /// Append an evidence URL. Returns `false` when the URL is already
    /// present, leaving the set unchanged.
    pub fn add_evidence(&mut self, url: &str, now: OffsetDateTime) -> Result<bool, DomainError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(DomainError::Validation("evidence URL cannot be empty".to_string()));
        }
        if self.evidence_urls.iter().any(|existing| existing == url) {
            return Ok(false);
        }
        self.evidence_urls.push(url.to_string());
        self.updated_at = now;
        Ok(true)
    }

    fn transition(&mut self, next: InfractionStatus, now: OffsetDateTime) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                entity: "infraction",
                id: self.infraction_id.clone(),
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    pub fn investigate(&mut self, now: OffsetDateTime) -> Result<(), DomainError> {
        self.transition(InfractionStatus::UnderInvestigation, now)?;
        self.investigated_at = Some(now);
        Ok(())
    }

    /// Apply a decision. RESOLVE and DISMISS require non-empty notes.
    pub fn decide(
        &mut self,
        decision: InvestigationDecision,
        notes: &str,
        now: OffsetDateTime,
    ) -> Result<(), DomainError> {
        if decision.requires_notes() && notes.trim().is_empty() {
            return Err(DomainError::Validation(format!(
                "{decision} requires resolution notes"
            )));
        }
        self.transition(decision.target_status(), now)?;
        if !notes.trim().is_empty() {
            self.resolution_notes = Some(notes.to_string());
        }
        match decision {
            InvestigationDecision::Escalate => self.escalated_at = Some(now),
            _ => self.resolved_at = Some(now),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const T0: OffsetDateTime = datetime!(2025-04-01 10:00 UTC);

    fn report() -> NewInfraction {
        NewInfraction {
            infraction_id: "INF-7".to_string(),
            key: "fraud@example.com".to_string(),
            infraction_type: InfractionType::Fraud,
            description: "key used in a phishing scheme".to_string(),
            reporter_ispb: Ispb::parse("60746948").unwrap(),
            reported_ispb: Some(Ispb::parse("00360305").unwrap()),
            evidence_urls: vec![
                "https://evidence/a".to_string(),
                " ".to_string(),
                "https://evidence/a".to_string(),
            ],
            entry_id: None,
            claim_id: None,
        }
    }

    #[test]
    fn open_dedupes_initial_evidence() {
        let infraction = Infraction::open(report(), T0).unwrap();
        assert_eq!(infraction.status, InfractionStatus::Open);
        assert_eq!(infraction.evidence_urls, vec!["https://evidence/a".to_string()]);
    }

    #[test]
    fn reporter_must_differ_from_reported() {
        let mut new = report();
        new.reported_ispb = Some(new.reporter_ispb.clone());
        assert!(matches!(
            Infraction::open(new, T0),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn add_evidence_is_a_set() {
        let mut infraction = Infraction::open(report(), T0).unwrap();
        assert!(infraction.add_evidence("https://evidence/b", T0).unwrap());
        assert!(!infraction.add_evidence("https://evidence/b", T0).unwrap());
        assert!(infraction.add_evidence("", T0).is_err());
        assert_eq!(infraction.evidence_urls.len(), 2);
    }

    #[test]
    fn resolve_requires_notes() {
        let mut infraction = Infraction::open(report(), T0).unwrap();
        infraction.investigate(T0).unwrap();
        let err = infraction
            .decide(InvestigationDecision::Resolve, "  ", T0)
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(infraction.status, InfractionStatus::UnderInvestigation);

        infraction
            .decide(InvestigationDecision::Resolve, "owner confirmed", T0)
            .unwrap();
        assert_eq!(infraction.status, InfractionStatus::Resolved);
        assert_eq!(infraction.resolved_at, Some(T0));
    }

    #[test]
    fn escalated_can_still_be_closed() {
        let mut infraction = Infraction::open(report(), T0).unwrap();
        infraction.investigate(T0).unwrap();
        infraction
            .decide(InvestigationDecision::Escalate, "", T0)
            .unwrap();
        assert_eq!(infraction.escalated_at, Some(T0));
        assert!(infraction
            .decide(InvestigationDecision::Escalate, "again", T0)
            .is_err());
        infraction
            .decide(InvestigationDecision::Dismiss, "bacen closed it", T0)
            .unwrap();
        assert!(infraction.status.is_terminal());
    }
}

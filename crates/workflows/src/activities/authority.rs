use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use dict_domain::{DeletionReason, EntryRepository, InfractionRepository, RegistryClient};
use dict_durable::{Activity, ActivityContext, ActivityError};

use super::domain_failure;

/// What is being reported to the central bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "subject", rename_all = "snake_case")]
pub enum AuthoritySubject {
    Infraction { infraction_id: String },
    EntryDeletion { entry_id: String, reason: DeletionReason },
}

/// Send the current state of an infraction or a deleted entry to the
/// central bank's bridge.
pub struct NotifyAuthorityActivity {
    infractions: Arc<dyn InfractionRepository>,
    entries: Arc<dyn EntryRepository>,
    registry: Arc<dyn RegistryClient>,
}

impl NotifyAuthorityActivity {
    pub fn new(
        infractions: Arc<dyn InfractionRepository>,
        entries: Arc<dyn EntryRepository>,
        registry: Arc<dyn RegistryClient>,
    ) -> Self {
        Self {
            infractions,
            entries,
            registry,
        }
    }
}

#[async_trait]
impl Activity for NotifyAuthorityActivity {
    const NAME: &'static str = "NotifyAuthorityActivity";
    type Input = AuthoritySubject;
    type Output = ();

    async fn execute(&self, _ctx: &ActivityContext, subject: AuthoritySubject) -> Result<(), ActivityError> {
        match subject {
            AuthoritySubject::Infraction { infraction_id } => {
                let infraction = super::infraction::load(self.infractions.as_ref(), &infraction_id).await?;
                self.registry
                    .report_infraction(&infraction)
                    .await
                    .map_err(domain_failure)?;
                tracing::info!(%infraction_id, status = %infraction.status, "infraction reported to bacen");
            }
            AuthoritySubject::EntryDeletion { entry_id, reason } => {
                let entry = super::entry::load(self.entries.as_ref(), &entry_id).await?;
                self.registry
                    .report_entry_deletion(&entry, reason)
                    .await
                    .map_err(domain_failure)?;
                tracing::info!(%entry_id, %reason, "entry deletion reported to bacen");
            }
        }
        Ok(())
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use dict_domain::{DeletionReason, DomainError, Entry, EntryRepository, EntryStatus, RemoteEntry};
use dict_durable::{Activity, ActivityContext, ActivityError};

use super::{domain_failure, not_found};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRef {
    pub entry_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeactivateEntryInput {
    pub entry_id: String,
    pub reason: DeletionReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateEntryInput {
    pub entry_id: String,
    pub remote: RemoteEntry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagEntryInput {
    pub entry_id: String,
    pub reason: String,
}

pub(super) async fn load(entries: &dyn EntryRepository, entry_id: &str) -> Result<Entry, ActivityError> {
    entries
        .get(entry_id)
        .await
        .map_err(domain_failure)?
        .ok_or_else(|| not_found("entry", entry_id))
}

async fn mutate(
    entries: &dyn EntryRepository,
    entry_id: &str,
    done: impl FnOnce(&Entry) -> bool + Send,
    apply: impl FnOnce(&mut Entry) -> Result<(), DomainError> + Send,
) -> Result<Entry, ActivityError> {
    let mut entry = load(entries, entry_id).await?;
    if done(&entry) {
        return Ok(entry);
    }
    apply(&mut entry).map_err(domain_failure)?;
    entries.update(entry).await.map_err(domain_failure)
}

pub struct GetEntryActivity {
    entries: Arc<dyn EntryRepository>,
}

impl GetEntryActivity {
    pub fn new(entries: Arc<dyn EntryRepository>) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl Activity for GetEntryActivity {
    const NAME: &'static str = "GetEntryActivity";
    type Input = EntryRef;
    type Output = Entry;

    async fn execute(&self, _ctx: &ActivityContext, input: EntryRef) -> Result<Entry, ActivityError> {
        load(self.entries.as_ref(), &input.entry_id).await
    }
}

// ── Deletion lifecycle ───────────────────────────────────────────────────────

pub struct DeactivateEntryActivity {
    entries: Arc<dyn EntryRepository>,
}

impl DeactivateEntryActivity {
    pub fn new(entries: Arc<dyn EntryRepository>) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl Activity for DeactivateEntryActivity {
    const NAME: &'static str = "DeactivateEntryActivity";
    type Input = DeactivateEntryInput;
    type Output = Entry;

    async fn execute(
        &self,
        ctx: &ActivityContext,
        input: DeactivateEntryInput,
    ) -> Result<Entry, ActivityError> {
        let now = ctx.now();
        let reason = input.reason;
        mutate(
            self.entries.as_ref(),
            &input.entry_id,
            |e| !e.is_deleted() && e.status == EntryStatus::Inactive,
            move |e| e.deactivate(reason.as_str(), now),
        )
        .await
    }
}

pub struct ReactivateEntryActivity {
    entries: Arc<dyn EntryRepository>,
}

impl ReactivateEntryActivity {
    pub fn new(entries: Arc<dyn EntryRepository>) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl Activity for ReactivateEntryActivity {
    const NAME: &'static str = "ReactivateEntryActivity";
    type Input = EntryRef;
    type Output = Entry;

    async fn execute(&self, ctx: &ActivityContext, input: EntryRef) -> Result<Entry, ActivityError> {
        let now = ctx.now();
        mutate(
            self.entries.as_ref(),
            &input.entry_id,
            |e| !e.is_deleted() && e.status == EntryStatus::Active,
            |e| e.activate(now),
        )
        .await
    }
}

pub struct SoftDeleteEntryActivity {
    entries: Arc<dyn EntryRepository>,
}

impl SoftDeleteEntryActivity {
    pub fn new(entries: Arc<dyn EntryRepository>) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl Activity for SoftDeleteEntryActivity {
    const NAME: &'static str = "SoftDeleteEntryActivity";
    type Input = EntryRef;
    type Output = Entry;

    async fn execute(&self, ctx: &ActivityContext, input: EntryRef) -> Result<Entry, ActivityError> {
        let now = ctx.now();
        mutate(
            self.entries.as_ref(),
            &input.entry_id,
            Entry::is_deleted,
            |e| e.soft_delete(now),
        )
        .await
    }
}

// ── Reconciliation repairs ───────────────────────────────────────────────────

/// Create a local entry for a registry record, keyed by the PIX key.
pub struct CreateEntryActivity {
    entries: Arc<dyn EntryRepository>,
}

impl CreateEntryActivity {
    pub fn new(entries: Arc<dyn EntryRepository>) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl Activity for CreateEntryActivity {
    const NAME: &'static str = "CreateEntryActivity";
    type Input = RemoteEntry;
    type Output = Entry;

    async fn execute(&self, ctx: &ActivityContext, remote: RemoteEntry) -> Result<Entry, ActivityError> {
        if let Some(existing) = self
            .entries
            .get_by_key(&remote.key)
            .await
            .map_err(domain_failure)?
        {
            return Ok(existing);
        }
        let entry = Entry::from_remote(Uuid::new_v4().to_string(), &remote, ctx.now());
        match self.entries.insert(entry).await {
            Ok(entry) => Ok(entry),
            Err(DomainError::AlreadyExists { .. }) => self
                .entries
                .get_by_key(&remote.key)
                .await
                .map_err(domain_failure)?
                .ok_or_else(|| ActivityError::retryable(format!("entry for key {} vanished", remote.key))),
            Err(e) => Err(domain_failure(e)),
        }
    }
}

/// Overwrite a local entry with the registry's data.
pub struct UpdateEntryActivity {
    entries: Arc<dyn EntryRepository>,
}

impl UpdateEntryActivity {
    pub fn new(entries: Arc<dyn EntryRepository>) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl Activity for UpdateEntryActivity {
    const NAME: &'static str = "UpdateEntryActivity";
    type Input = UpdateEntryInput;
    type Output = Entry;

    async fn execute(&self, ctx: &ActivityContext, input: UpdateEntryInput) -> Result<Entry, ActivityError> {
        let now = ctx.now();
        let remote = input.remote;
        mutate(
            self.entries.as_ref(),
            &input.entry_id,
            |e| remote.differing_fields(e).is_empty(),
            |e| {
                e.apply_remote(&remote, now);
                Ok(())
            },
        )
        .await
    }
}

/// Mark an entry for manual review. Returns whether a new flag was set.
pub struct FlagEntryForReviewActivity {
    entries: Arc<dyn EntryRepository>,
}

impl FlagEntryForReviewActivity {
    pub fn new(entries: Arc<dyn EntryRepository>) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl Activity for FlagEntryForReviewActivity {
    const NAME: &'static str = "FlagEntryForReviewActivity";
    type Input = FlagEntryInput;
    type Output = bool;

    async fn execute(&self, ctx: &ActivityContext, input: FlagEntryInput) -> Result<bool, ActivityError> {
        let mut entry = load(self.entries.as_ref(), &input.entry_id).await?;
        if !entry.flag_for_review(&input.reason, ctx.now()) {
            return Ok(false);
        }
        self.entries.update(entry).await.map_err(domain_failure)?;
        Ok(true)
    }
}

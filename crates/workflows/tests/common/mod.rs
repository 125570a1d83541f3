//! Shared scaffolding: a worker over in-memory collaborators with its clock
//! pinned to a Monday morning.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use time::macros::datetime;
use time::OffsetDateTime;

use dict_domain::{Account, Entry, EntryRepository, EntryStatus, Ispb, Owner, RemoteEntry};
use dict_durable::{Clock, MemoryHistoryStore};
use dict_workflows::observability::init_test_logging;
use dict_workflows::{DictClient, MemoryCollaborators, Worker, WorkerConfig};

pub const START: OffsetDateTime = datetime!(2025-03-03 09:00 UTC);
pub const DAY: Duration = Duration::from_secs(24 * 60 * 60);

pub const OUR_ISPB: &str = "12345678";
pub const OTHER_ISPB: &str = "87654321";

pub struct Harness {
    pub mem: MemoryCollaborators,
    pub store: Arc<MemoryHistoryStore>,
    pub clock: Clock,
    pub worker: Worker,
    pub client: DictClient,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(WorkerConfig::default())
    }

    pub fn with_config(config: WorkerConfig) -> Self {
        init_test_logging();
        let clock = Clock::starting_at(START);
        Self::assemble(
            config,
            Arc::new(MemoryHistoryStore::new()),
            MemoryCollaborators::new(),
            clock,
        )
    }

    /// A second worker over the same history, collaborators and clock, as
    /// after a process restart.
    pub fn restart(&self) -> Self {
        self.worker.shutdown();
        Self::assemble(
            self.worker.config().clone(),
            Arc::clone(&self.store),
            self.mem.clone(),
            self.clock.clone(),
        )
    }

    fn assemble(
        config: WorkerConfig,
        store: Arc<MemoryHistoryStore>,
        mem: MemoryCollaborators,
        clock: Clock,
    ) -> Self {
        let worker = Worker::builder(config, store.clone(), mem.collaborators())
            .clock(clock.clone())
            .build()
            .expect("valid worker config");
        let client = worker.client();
        Self {
            mem,
            store,
            clock,
            worker,
            client,
        }
    }

    pub fn elapsed_since_start(&self, at: OffsetDateTime) -> Duration {
        Duration::try_from(at - START).expect("timestamp after start")
    }

    pub async fn seed_entry(&self, entry: Entry) -> Entry {
        self.mem.entries.insert(entry).await.expect("seed entry")
    }

    pub async fn entry(&self, entry_id: &str) -> Entry {
        self.mem
            .entries
            .get(entry_id)
            .await
            .expect("entry lookup")
            .expect("entry exists")
    }
}

pub fn remote_entry(key: &str, account_number: &str) -> RemoteEntry {
    RemoteEntry {
        key: key.to_string(),
        key_type: "EMAIL".to_string(),
        participant_ispb: Ispb::parse(OUR_ISPB).unwrap(),
        account: Account {
            branch: "0001".to_string(),
            number: account_number.to_string(),
            account_type: "CACC".to_string(),
        },
        owner: Owner {
            owner_type: "NATURAL_PERSON".to_string(),
            name: "Maria Souza".to_string(),
            tax_id: "12345678901".to_string(),
        },
        status: EntryStatus::Active,
        created_at: START,
        updated_at: START,
    }
}

pub fn local_entry(entry_id: &str, key: &str, account_number: &str) -> Entry {
    Entry::from_remote(entry_id.to_string(), &remote_entry(key, account_number), START)
}

/// Let spawned runs make progress without moving time forward much.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

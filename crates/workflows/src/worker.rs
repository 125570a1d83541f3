//! Worker assembly: one engine with every DICT workflow and activity.

use std::sync::Arc;

use dict_durable::{ActivityCatalog, Clock, Engine, HistoryStore, WorkflowError};

use crate::activities;
use crate::claim::ClaimWorkflow;
use crate::client::DictClient;
use crate::collaborators::Collaborators;
use crate::config::{ConfigError, WorkerConfig};
use crate::deletion::EntryDeletionWorkflow;
use crate::infraction::InfractionWorkflow;
use crate::vsync::{VSyncSchedulerInput, VSyncSchedulerWorkflow, VSyncWorkflow};

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

pub struct WorkerBuilder {
    config: WorkerConfig,
    store: Arc<dyn HistoryStore>,
    collaborators: Collaborators,
    clock: Option<Clock>,
    catalog: Option<ActivityCatalog>,
}

impl WorkerBuilder {
    /// Override the wall clock; tests pin it to a fixed instant.
    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn catalog(mut self, catalog: ActivityCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn build(self) -> Result<Worker, WorkerError> {
        self.config.validate()?;
        let mut builder = Engine::builder(self.store)
            .max_concurrent_activities(self.config.max_concurrent_activities)
            .register_workflow(ClaimWorkflow)
            .register_workflow(InfractionWorkflow)
            .register_workflow(EntryDeletionWorkflow)
            .register_workflow(VSyncWorkflow)
            .register_workflow(VSyncSchedulerWorkflow);
        if let Some(clock) = self.clock {
            builder = builder.clock(clock);
        }
        if let Some(catalog) = self.catalog {
            builder = builder.catalog(catalog);
        }
        let engine = activities::register(builder, &self.collaborators).build();
        Ok(Worker {
            config: self.config,
            engine,
        })
    }
}

/// A running DICT worker.
pub struct Worker {
    config: WorkerConfig,
    engine: Engine,
}

impl Worker {
    pub fn builder(
        config: WorkerConfig,
        store: Arc<dyn HistoryStore>,
        collaborators: Collaborators,
    ) -> WorkerBuilder {
        WorkerBuilder {
            config,
            store,
            collaborators,
            clock: None,
            catalog: None,
        }
    }

    /// Resume open runs and, when enabled, make sure the scheduler runs.
    ///
    /// Returns the number of runs resumed from history.
    #[tracing::instrument(skip_all, fields(task_queue = %self.config.task_queue))]
    pub async fn start(&self) -> Result<usize, WorkerError> {
        let resumed = self.engine.recover().await?;
        tracing::info!(resumed, "worker started");

        if self.config.scheduler.enabled {
            let input = VSyncSchedulerInput {
                participant_ispb: self
                    .config
                    .scheduler
                    .participant()?
                    .map(|ispb| ispb.as_str().to_string()),
            };
            match self.client().start_scheduler(&input).await {
                Ok(_) => tracing::info!("vsync scheduler started"),
                Err(WorkflowError::AlreadyStarted { .. }) => {
                    tracing::info!("vsync scheduler already running")
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(resumed)
    }

    pub fn client(&self) -> DictClient {
        DictClient::new(self.engine.clone())
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Stop driving runs. They stay open in the history store.
    pub fn shutdown(&self) {
        tracing::info!(task_queue = %self.config.task_queue, "worker shutting down");
        self.engine.shutdown();
    }
}

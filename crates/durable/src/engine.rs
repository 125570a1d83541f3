//! The engine: starts runs, routes signals, drives runs to completion, and
//! resumes open runs from history after a restart.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::Instrument;
use uuid::Uuid;

use dict_history::{HistoryError, HistoryStore, RunOutcome, RunRecord, RunStatus};

use crate::activity::{Activity, ActivityRegistry, Dispatcher};
use crate::clock::Clock;
use crate::context::{RunCore, WorkflowContext};
use crate::error::WorkflowError;
use crate::mailbox::Mailbox;
use crate::retry::ActivityCatalog;
use crate::workflow::{ErasedWorkflow, Workflow, WorkflowOptions, WorkflowRegistry};

/// Default worker-wide cap on concurrently executing activity attempts.
pub const DEFAULT_MAX_CONCURRENT_ACTIVITIES: usize = 200;

/// State shared by the engine handle and every run it drives.
pub(crate) struct EngineShared {
    pub(crate) store: Arc<dyn HistoryStore>,
    pub(crate) clock: Clock,
    pub(crate) catalog: ActivityCatalog,
    pub(crate) dispatcher: Dispatcher,
    workflows: WorkflowRegistry,
    live: Mutex<HashMap<String, LiveRun>>,
}

/// An in-process run, indexed by workflow id.
struct LiveRun {
    run_id: String,
    mailbox: Arc<Mailbox>,
    state: watch::Receiver<RunState>,
    abort: AbortHandle,
}

#[derive(Debug, Clone)]
enum RunState {
    Running,
    Closed {
        status: RunStatus,
        outcome: Result<serde_json::Value, WorkflowError>,
    },
}

/// Builder for [`Engine`].
pub struct EngineBuilder {
    store: Arc<dyn HistoryStore>,
    clock: Clock,
    catalog: ActivityCatalog,
    max_concurrent_activities: usize,
    workflows: WorkflowRegistry,
    activities: ActivityRegistry,
}

impl EngineBuilder {
    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn catalog(mut self, catalog: ActivityCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn max_concurrent_activities(mut self, max: usize) -> Self {
        self.max_concurrent_activities = max;
        self
    }

    pub fn register_workflow<W: Workflow>(mut self, workflow: W) -> Self {
        self.workflows.register(workflow);
        self
    }

    pub fn register_activity<A: Activity>(mut self, activity: A) -> Self {
        self.activities.register(activity);
        self
    }

    pub fn build(self) -> Engine {
        let dispatcher = Dispatcher::new(
            self.activities,
            self.max_concurrent_activities,
            self.clock.clone(),
        );
        Engine {
            shared: Arc::new(EngineShared {
                store: self.store,
                clock: self.clock,
                catalog: self.catalog,
                dispatcher,
                workflows: self.workflows,
                live: Mutex::new(HashMap::new()),
            }),
        }
    }
}

/// Handle to the durable execution engine. Cheap to clone.
#[derive(Clone)]
pub struct Engine {
    shared: Arc<EngineShared>,
}

impl Engine {
    pub fn builder(store: Arc<dyn HistoryStore>) -> EngineBuilder {
        EngineBuilder {
            store,
            clock: Clock::system(),
            catalog: ActivityCatalog::default(),
            max_concurrent_activities: DEFAULT_MAX_CONCURRENT_ACTIVITIES,
            workflows: WorkflowRegistry::new(),
            activities: ActivityRegistry::new(),
        }
    }

    pub fn clock(&self) -> &Clock {
        &self.shared.clock
    }

    pub fn store(&self) -> &Arc<dyn HistoryStore> {
        &self.shared.store
    }

    /// Start a new run of `W` under `workflow_id`.
    ///
    /// Fails with [`WorkflowError::AlreadyStarted`] while another run with the
    /// same workflow id is open.
    pub async fn start<W: Workflow>(
        &self,
        workflow_id: &str,
        input: &W::Input,
        options: WorkflowOptions,
    ) -> Result<WorkflowHandle<W::Output>, WorkflowError> {
        let input = serde_json::to_value(input)?;
        let run_id = self
            .shared
            .start_run(W::NAME, workflow_id, input, options, None, None)
            .await?;
        Ok(WorkflowHandle {
            engine: self.clone(),
            workflow_id: workflow_id.to_string(),
            run_id,
            _output: PhantomData,
        })
    }

    /// Deliver a signal to the open run of `workflow_id`.
    ///
    /// The signal is persisted before delivery. Returns `Ok(false)` when the
    /// latest run has already closed; the signal is then dropped.
    #[tracing::instrument(skip_all, fields(workflow_id = %workflow_id, signal = %name))]
    pub async fn signal<P: Serialize>(
        &self,
        workflow_id: &str,
        name: &str,
        payload: &P,
    ) -> Result<bool, WorkflowError> {
        let payload = serde_json::to_value(payload)?;
        let run = self.shared.store.latest_run(workflow_id).await.map_err(|e| lookup_error(workflow_id, e))?;
        if !run.is_open() {
            tracing::info!(status = %run.status, "signal to closed run ignored");
            return Ok(false);
        }

        let received_at = self.shared.clock.now();
        let record = match self
            .shared
            .store
            .append_signal(&run.run_id, name, payload, received_at)
            .await
        {
            Ok(record) => record,
            Err(HistoryError::RunClosed { .. }) => {
                tracing::info!("run closed before signal was persisted; ignored");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(mailbox) = self.shared.mailbox_for(workflow_id, &run.run_id) {
            mailbox.deliver(record);
        }
        Ok(true)
    }

    /// Wait for `workflow_id` to finish and decode its result.
    ///
    /// Follows continue-as-new chains to the run that finally completes.
    pub async fn result<O: DeserializeOwned>(&self, workflow_id: &str) -> Result<O, WorkflowError> {
        let value = self.shared.await_result(workflow_id).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Latest run record for `workflow_id`.
    pub async fn describe(&self, workflow_id: &str) -> Result<RunRecord, WorkflowError> {
        self.shared
            .store
            .latest_run(workflow_id)
            .await
            .map_err(|e| lookup_error(workflow_id, e))
    }

    /// Resume every open run recorded in the history store that this engine
    /// is not already driving. Returns the number of runs resumed.
    pub async fn recover(&self) -> Result<usize, WorkflowError> {
        let open = self.shared.store.list_open_runs().await?;
        let mut resumed = 0;
        for run in open {
            if self.shared.is_live(&run.workflow_id, &run.run_id) {
                continue;
            }
            let history = self.shared.store.load_events(&run.run_id).await?;
            let signals = self.shared.store.load_signals(&run.run_id).await?;
            tracing::info!(
                workflow_id = %run.workflow_id,
                run_id = %run.run_id,
                events = history.len(),
                signals = signals.len(),
                "resuming run from history"
            );
            self.shared.launch(run, history, signals).await?;
            resumed += 1;
        }
        Ok(resumed)
    }

    /// Stop driving every run in this process. Runs stay open in the history
    /// store and can be resumed with [`Engine::recover`].
    pub fn shutdown(&self) {
        if let Ok(mut live) = self.shared.live.lock() {
            for (_, run) in live.drain() {
                run.abort.abort();
            }
        }
    }
}

impl EngineShared {
    fn live(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, LiveRun>>, WorkflowError> {
        self.live
            .lock()
            .map_err(|_| WorkflowError::History("live run table lock poisoned".to_string()))
    }

    fn is_live(&self, workflow_id: &str, run_id: &str) -> bool {
        self.live()
            .map(|live| live.get(workflow_id).is_some_and(|r| r.run_id == run_id))
            .unwrap_or(false)
    }

    fn mailbox_for(&self, workflow_id: &str, run_id: &str) -> Option<Arc<Mailbox>> {
        let live = self.live().ok()?;
        live.get(workflow_id)
            .filter(|r| r.run_id == run_id)
            .map(|r| Arc::clone(&r.mailbox))
    }

    async fn start_run(
        self: &Arc<Self>,
        workflow_type: &str,
        workflow_id: &str,
        input: serde_json::Value,
        options: WorkflowOptions,
        continued_from: Option<String>,
        parent_run_id: Option<String>,
    ) -> Result<String, WorkflowError> {
        // Reject unknown types before anything is persisted.
        self.workflows.get(workflow_type)?;

        let started_at = self.clock.now();
        let run = RunRecord {
            run_id: Uuid::new_v4().to_string(),
            workflow_id: workflow_id.to_string(),
            workflow_type: workflow_type.to_string(),
            input,
            status: RunStatus::Running,
            started_at,
            closed_at: None,
            execution_timeout_ms: options.execution_timeout.map(|t| t.as_millis() as u64),
            execution_deadline: options.execution_timeout.map(|t| started_at + t),
            result: None,
            error: None,
            continued_from,
            parent_run_id,
        };
        self.store.create_run(run.clone()).await.map_err(|e| match e {
            HistoryError::WorkflowAlreadyOpen { workflow_id, .. } => {
                WorkflowError::AlreadyStarted { workflow_id }
            }
            other => other.into(),
        })?;
        tracing::info!(
            workflow_type,
            workflow_id,
            run_id = %run.run_id,
            "workflow run started"
        );
        let run_id = run.run_id.clone();
        self.launch(run, Vec::new(), Vec::new()).await?;
        Ok(run_id)
    }

    /// Spawn `run` and then re-read its signal log.
    ///
    /// `signal` only hands a persisted signal to runs already in the live
    /// table, so anything appended between the caller's snapshot (or
    /// `create_run`) and registration is delivered here. The mailbox drops
    /// ids it already holds.
    async fn launch(
        self: &Arc<Self>,
        run: RunRecord,
        history: Vec<dict_history::HistoryEvent>,
        signals: Vec<dict_history::SignalRecord>,
    ) -> Result<(), WorkflowError> {
        let run_id = run.run_id.clone();
        let mailbox = Arc::clone(self).spawn_run(run, history, signals)?;
        let mut caught_up = 0;
        for signal in self.store.load_signals(&run_id).await? {
            if mailbox.deliver(signal) {
                caught_up += 1;
            }
        }
        if caught_up > 0 {
            tracing::debug!(%run_id, caught_up, "delivered signals persisted during registration");
        }
        Ok(())
    }

    fn spawn_run(
        self: Arc<Self>,
        run: RunRecord,
        history: Vec<dict_history::HistoryEvent>,
        signals: Vec<dict_history::SignalRecord>,
    ) -> Result<Arc<Mailbox>, WorkflowError> {
        let workflow = self.workflows.get(&run.workflow_type)?;
        let mailbox = Arc::new(Mailbox::new(signals));
        let ctx = WorkflowContext::new(RunCore::new(
            run.workflow_id.clone(),
            run.run_id.clone(),
            run.workflow_type.clone(),
            Arc::clone(&self),
            Arc::clone(&mailbox),
            history,
        ));
        let (state_tx, state_rx) = watch::channel(RunState::Running);

        let span = tracing::info_span!(
            "workflow",
            workflow_type = %run.workflow_type,
            workflow_id = %run.workflow_id,
            run_id = %run.run_id,
        );
        let workflow_id = run.workflow_id.clone();
        let run_id = run.run_id.clone();

        // Hold the table lock across spawn so the task cannot close and
        // continue-as-new before this run is registered.
        let mut live = self.live()?;
        let shared = Arc::clone(&self);
        let task = tokio::spawn(
            async move { shared.drive(workflow, ctx, run, state_tx).await }.instrument(span),
        );
        live.insert(
            workflow_id,
            LiveRun {
                run_id,
                mailbox: Arc::clone(&mailbox),
                state: state_rx,
                abort: task.abort_handle(),
            },
        );
        Ok(mailbox)
    }

    async fn drive(
        self: Arc<Self>,
        workflow: Arc<dyn ErasedWorkflow>,
        ctx: WorkflowContext,
        run: RunRecord,
        state: watch::Sender<RunState>,
    ) {
        let execution = workflow.run(ctx, run.input.clone());
        let outcome = match run.execution_deadline {
            Some(deadline) => {
                match tokio::time::timeout(self.clock.until(deadline), execution).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(WorkflowError::ExecutionTimedOut),
                }
            }
            None => execution.await,
        };

        let closed_at = self.clock.now();
        let (status, record) = match &outcome {
            Ok(value) => (
                RunStatus::Completed,
                RunOutcome {
                    status: RunStatus::Completed,
                    result: Some(value.clone()),
                    error: None,
                    closed_at,
                },
            ),
            Err(err) => {
                let status = match err {
                    WorkflowError::ContinueAsNew { .. } => RunStatus::ContinuedAsNew,
                    WorkflowError::ExecutionTimedOut => RunStatus::TimedOut,
                    _ => RunStatus::Failed,
                };
                (
                    status,
                    RunOutcome {
                        status,
                        result: None,
                        error: Some(err.to_string()),
                        closed_at,
                    },
                )
            }
        };

        if let Err(e) = self.store.close_run(&run.run_id, record).await {
            tracing::error!(error = %e, "failed to close run in history");
        }
        match &outcome {
            Ok(_) => tracing::info!("workflow run completed"),
            Err(WorkflowError::ContinueAsNew { .. }) => tracing::info!("workflow run continued as new"),
            Err(err) => tracing::warn!(status = %status, error = %err, "workflow run closed without result"),
        }

        if let Err(WorkflowError::ContinueAsNew { input }) = &outcome {
            let options = WorkflowOptions {
                execution_timeout: run.execution_timeout_ms.map(Duration::from_millis),
            };
            if let Err(e) = self
                .start_run(
                    &run.workflow_type,
                    &run.workflow_id,
                    input.clone(),
                    options,
                    Some(run.run_id.clone()),
                    run.parent_run_id.clone(),
                )
                .await
            {
                tracing::error!(error = %e, "failed to continue workflow as new");
            }
        }

        state.send_replace(RunState::Closed { status, outcome });
    }

    /// Wait for the run of `workflow_id` to close and return its outcome,
    /// following continue-as-new to the successor run.
    async fn await_result(&self, workflow_id: &str) -> Result<serde_json::Value, WorkflowError> {
        loop {
            let live_state = {
                let live = self.live()?;
                live.get(workflow_id)
                    .map(|r| (r.run_id.clone(), r.state.clone()))
            };

            let Some((run_id, mut rx)) = live_state else {
                return self.stored_result(workflow_id).await;
            };
            let (status, outcome) = loop {
                let current = rx.borrow_and_update().clone();
                if let RunState::Closed { status, outcome } = current {
                    break (status, outcome);
                }
                if rx.changed().await.is_err() {
                    // The driving task was aborted by shutdown.
                    return Err(WorkflowError::Shutdown);
                }
            };

            if status != RunStatus::ContinuedAsNew {
                return outcome;
            }
            // The successor is registered before the old run reports closed.
            if self.is_live(workflow_id, &run_id) {
                return Err(WorkflowError::History(format!(
                    "run {run_id} continued as new but no successor was started"
                )));
            }
        }
    }

    /// Outcome of a closed run that this engine is not driving.
    async fn stored_result(&self, workflow_id: &str) -> Result<serde_json::Value, WorkflowError> {
        let run = self
            .store
            .latest_run(workflow_id)
            .await
            .map_err(|e| lookup_error(workflow_id, e))?;
        match run.status {
            RunStatus::Completed => Ok(run.result.unwrap_or_default()),
            RunStatus::TimedOut => Err(WorkflowError::ExecutionTimedOut),
            RunStatus::Failed | RunStatus::ContinuedAsNew => {
                Err(WorkflowError::Failed(run.error.unwrap_or_default()))
            }
            // Open, but driven elsewhere or not yet recovered.
            RunStatus::Running => Err(WorkflowError::NotFound {
                workflow_id: workflow_id.to_string(),
            }),
        }
    }

    /// Start (or re-attach to) a child run and wait for its outcome.
    pub(crate) async fn run_child(
        self: &Arc<Self>,
        workflow_type: &str,
        workflow_id: &str,
        input: serde_json::Value,
        options: WorkflowOptions,
        parent_run_id: &str,
    ) -> Result<serde_json::Value, WorkflowError> {
        let existing = match self.store.latest_run(workflow_id).await {
            Ok(run) => Some(run),
            Err(HistoryError::WorkflowNotFound { .. }) => None,
            Err(e) => return Err(e.into()),
        };
        let attach = existing
            .as_ref()
            .is_some_and(|run| run.parent_run_id.as_deref() == Some(parent_run_id));

        if !attach {
            self.start_run(
                workflow_type,
                workflow_id,
                input,
                options,
                None,
                Some(parent_run_id.to_string()),
            )
            .await?;
        } else if let Some(run) = existing.filter(|r| r.is_open()) {
            if !self.is_live(&run.workflow_id, &run.run_id) {
                let history = self.store.load_events(&run.run_id).await?;
                let signals = self.store.load_signals(&run.run_id).await?;
                self.launch(run, history, signals).await?;
            }
        }
        self.await_result(workflow_id).await
    }
}

fn lookup_error(workflow_id: &str, err: HistoryError) -> WorkflowError {
    match err {
        HistoryError::WorkflowNotFound { .. } => WorkflowError::NotFound {
            workflow_id: workflow_id.to_string(),
        },
        other => other.into(),
    }
}

/// Typed handle to a started workflow run.
pub struct WorkflowHandle<O> {
    engine: Engine,
    workflow_id: String,
    run_id: String,
    _output: PhantomData<fn() -> O>,
}

impl<O: DeserializeOwned> WorkflowHandle<O> {
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    /// Run id of the first run; later runs follow via continue-as-new.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub async fn signal<P: Serialize>(&self, name: &str, payload: &P) -> Result<bool, WorkflowError> {
        self.engine.signal(&self.workflow_id, name, payload).await
    }

    pub async fn result(&self) -> Result<O, WorkflowError> {
        self.engine.result(&self.workflow_id).await
    }
}

impl<O> Clone for WorkflowHandle<O> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            workflow_id: self.workflow_id.clone(),
            run_id: self.run_id.clone(),
            _output: PhantomData,
        }
    }
}

//! The workflow-side API.
//!
//! Every call that observes the outside world is a command with a sequence
//! number. Live, the outcome is appended to history before it is returned.
//! On replay the recorded outcome for that sequence number is returned
//! instead, and a mismatch between command and record fails the run.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;

use dict_history::{HistoryEvent, SelectChoice};

use crate::activity::{Activity, ActivityScope};
use crate::engine::EngineShared;
use crate::error::{ActivityError, WorkflowError};
use crate::mailbox::Mailbox;
use crate::retry::ActivityProfile;
use crate::selector::{Selector, Signal};
use crate::workflow::{Workflow, WorkflowOptions};

/// Handle given to workflow code for one run.
#[derive(Clone)]
pub struct WorkflowContext {
    inner: Arc<RunCore>,
}

pub(crate) struct RunCore {
    pub(crate) workflow_id: String,
    pub(crate) run_id: String,
    pub(crate) workflow_type: String,
    pub(crate) engine: Arc<EngineShared>,
    pub(crate) mailbox: Arc<Mailbox>,
    replay: Mutex<ReplayState>,
}

struct ReplayState {
    next_seq: u64,
    recorded: BTreeMap<u64, HistoryEvent>,
}

/// A durable timer created by [`WorkflowContext::new_timer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    pub(crate) seq: u64,
    pub(crate) fire_at: OffsetDateTime,
}

impl Timer {
    pub fn fire_at(&self) -> OffsetDateTime {
        self.fire_at
    }
}

impl RunCore {
    pub(crate) fn new(
        workflow_id: String,
        run_id: String,
        workflow_type: String,
        engine: Arc<EngineShared>,
        mailbox: Arc<Mailbox>,
        history: Vec<HistoryEvent>,
    ) -> Self {
        let recorded = history.into_iter().map(|e| (e.seq(), e)).collect();
        Self {
            workflow_id,
            run_id,
            workflow_type,
            engine,
            mailbox,
            replay: Mutex::new(ReplayState {
                next_seq: 0,
                recorded,
            }),
        }
    }
}

impl WorkflowContext {
    pub(crate) fn new(core: RunCore) -> Self {
        Self {
            inner: Arc::new(core),
        }
    }

    pub fn workflow_id(&self) -> &str {
        &self.inner.workflow_id
    }

    pub fn run_id(&self) -> &str {
        &self.inner.run_id
    }

    pub fn workflow_type(&self) -> &str {
        &self.inner.workflow_type
    }

    /// True while recorded history is still being replayed.
    pub fn is_replaying(&self) -> bool {
        self.inner
            .replay
            .lock()
            .map(|state| !state.recorded.is_empty())
            .unwrap_or(false)
    }

    // ── Command plumbing ─────────────────────────────────────────────────────

    /// Claim the next sequence number and the event recorded for it, if any.
    fn next_command(&self) -> Result<(u64, Option<HistoryEvent>), WorkflowError> {
        let mut state = self
            .inner
            .replay
            .lock()
            .map_err(|_| WorkflowError::History("replay state lock poisoned".to_string()))?;
        let seq = state.next_seq;
        state.next_seq += 1;
        let recorded = state.recorded.remove(&seq);
        Ok((seq, recorded))
    }

    async fn record(&self, event: HistoryEvent) -> Result<(), WorkflowError> {
        self.inner
            .engine
            .store
            .append_event(&self.inner.run_id, event)
            .await?;
        Ok(())
    }

    pub(crate) fn mismatch(seq: u64, expected: impl Into<String>, recorded: &HistoryEvent) -> WorkflowError {
        WorkflowError::NonDeterminism {
            seq,
            expected: expected.into(),
            recorded: recorded.kind().to_string(),
        }
    }

    // ── Clock ────────────────────────────────────────────────────────────────

    /// Current wall-clock time, recorded so replay sees the same value.
    pub async fn now(&self) -> Result<OffsetDateTime, WorkflowError> {
        match self.next_command()? {
            (_, Some(HistoryEvent::ClockRead { at, .. })) => Ok(at),
            (seq, Some(other)) => Err(Self::mismatch(seq, "clock_read", &other)),
            (seq, None) => {
                let at = self.inner.engine.clock.now();
                self.record(HistoryEvent::ClockRead { seq, at }).await?;
                Ok(at)
            }
        }
    }

    // ── Activities ───────────────────────────────────────────────────────────

    /// Run an activity under the named profile's timeouts and retry policy.
    ///
    /// A terminal activity failure comes back as [`WorkflowError::Activity`].
    pub async fn execute_activity<A: Activity>(
        &self,
        input: &A::Input,
        profile: ActivityProfile,
    ) -> Result<A::Output, WorkflowError> {
        let (seq, recorded) = self.next_command()?;
        match recorded {
            Some(HistoryEvent::ActivityCompleted {
                activity, output, ..
            }) if activity == A::NAME => Ok(serde_json::from_value(output)?),
            Some(HistoryEvent::ActivityFailed {
                activity, error, ..
            }) if activity == A::NAME => {
                let error: ActivityError = serde_json::from_value(error)?;
                Err(WorkflowError::Activity {
                    activity: A::NAME.to_string(),
                    error,
                })
            }
            Some(other) => Err(Self::mismatch(seq, format!("activity {}", A::NAME), &other)),
            None => self.dispatch_activity::<A>(seq, input, profile).await,
        }
    }

    async fn dispatch_activity<A: Activity>(
        &self,
        seq: u64,
        input: &A::Input,
        profile: ActivityProfile,
    ) -> Result<A::Output, WorkflowError> {
        let engine = &self.inner.engine;
        let input = serde_json::to_value(input)?;
        let scope = ActivityScope {
            workflow_id: self.inner.workflow_id.clone(),
            run_id: self.inner.run_id.clone(),
        };
        let dispatched = engine
            .dispatcher
            .dispatch(A::NAME, input, engine.catalog.options(profile), &scope)
            .await;

        match dispatched.result {
            Ok(output) => {
                self.record(HistoryEvent::ActivityCompleted {
                    seq,
                    activity: A::NAME.to_string(),
                    attempts: dispatched.attempts,
                    output: output.clone(),
                })
                .await?;
                Ok(serde_json::from_value(output)?)
            }
            Err(error) => {
                self.record(HistoryEvent::ActivityFailed {
                    seq,
                    activity: A::NAME.to_string(),
                    attempts: dispatched.attempts,
                    error: serde_json::to_value(&error)?,
                })
                .await?;
                Err(WorkflowError::Activity {
                    activity: A::NAME.to_string(),
                    error,
                })
            }
        }
    }

    /// Run an activity whose failure must not stop the workflow.
    ///
    /// A terminal activity failure is logged and yields `Ok(None)`; engine
    /// errors (history, non-determinism) still propagate.
    pub async fn execute_non_critical<A: Activity>(
        &self,
        input: &A::Input,
        profile: ActivityProfile,
    ) -> Result<Option<A::Output>, WorkflowError> {
        match self.execute_activity::<A>(input, profile).await {
            Ok(output) => Ok(Some(output)),
            Err(err) if err.is_activity_failure() => {
                tracing::warn!(
                    workflow_id = %self.inner.workflow_id,
                    activity = A::NAME,
                    error = %err,
                    "non-critical activity failed; continuing"
                );
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    // ── Timers ───────────────────────────────────────────────────────────────

    /// Create a durable timer firing `duration` from now.
    pub async fn new_timer(&self, duration: Duration) -> Result<Timer, WorkflowError> {
        match self.next_command()? {
            (seq, Some(HistoryEvent::TimerStarted { fire_at, .. })) => Ok(Timer { seq, fire_at }),
            (seq, Some(other)) => Err(Self::mismatch(seq, "timer_started", &other)),
            (seq, None) => {
                let fire_at = self.inner.engine.clock.now() + duration;
                self.record(HistoryEvent::TimerStarted { seq, fire_at }).await?;
                Ok(Timer { seq, fire_at })
            }
        }
    }

    /// Block until `timer` fires.
    pub async fn wait_timer(&self, timer: Timer) -> Result<(), WorkflowError> {
        match self.next_command()? {
            (_, Some(HistoryEvent::TimerFired { timer_seq, .. })) if timer_seq == timer.seq => Ok(()),
            (seq, Some(other)) => Err(Self::mismatch(seq, "timer_fired", &other)),
            (seq, None) => {
                self.inner.engine.clock.sleep_until(timer.fire_at).await;
                self.record(HistoryEvent::TimerFired {
                    seq,
                    timer_seq: timer.seq,
                })
                .await
            }
        }
    }

    pub async fn sleep(&self, duration: Duration) -> Result<(), WorkflowError> {
        let timer = self.new_timer(duration).await?;
        self.wait_timer(timer).await
    }

    // ── Signals ──────────────────────────────────────────────────────────────

    /// Start building a race between signal channels and timers.
    pub fn selector(&self) -> Selector<'_> {
        Selector::new(self)
    }

    /// Block until a signal arrives on `channel`.
    pub async fn receive(&self, channel: &str) -> Result<Signal, WorkflowError> {
        match self.selector().on_signal(channel).select().await? {
            crate::selector::Selected::Signal(signal) => Ok(signal),
            crate::selector::Selected::Timer(_) => Err(WorkflowError::History(
                "selector without timers resolved a timer".to_string(),
            )),
        }
    }

    pub(crate) fn claim_select(&self) -> Result<(u64, Option<HistoryEvent>), WorkflowError> {
        self.next_command()
    }

    pub(crate) async fn record_select(
        &self,
        seq: u64,
        choice: SelectChoice,
    ) -> Result<(), WorkflowError> {
        self.record(HistoryEvent::SelectResolved { seq, choice }).await
    }

    pub(crate) fn core(&self) -> &RunCore {
        &self.inner
    }

    // ── Child workflows and continue-as-new ──────────────────────────────────

    /// Run a child workflow to completion.
    ///
    /// A child already started by this run before a restart is awaited
    /// rather than started again.
    pub async fn execute_child<W: Workflow>(
        &self,
        workflow_id: &str,
        input: &W::Input,
        options: WorkflowOptions,
    ) -> Result<W::Output, WorkflowError> {
        let (seq, recorded) = self.next_command()?;
        match recorded {
            Some(HistoryEvent::ChildCompleted {
                workflow_id: child, output, ..
            }) if child == workflow_id => return Ok(serde_json::from_value(output)?),
            Some(HistoryEvent::ChildFailed {
                workflow_id: child, error, ..
            }) if child == workflow_id => {
                return Err(WorkflowError::Child {
                    workflow_id: child,
                    message: error,
                })
            }
            Some(other) => {
                return Err(Self::mismatch(seq, format!("child {workflow_id}"), &other))
            }
            None => {}
        }

        let engine = &self.inner.engine;
        let input = serde_json::to_value(input)?;
        let outcome = engine
            .run_child(W::NAME, workflow_id, input, options, &self.inner.run_id)
            .await;
        match outcome {
            Ok(output) => {
                self.record(HistoryEvent::ChildCompleted {
                    seq,
                    workflow_id: workflow_id.to_string(),
                    output: output.clone(),
                })
                .await?;
                Ok(serde_json::from_value(output)?)
            }
            Err(WorkflowError::Shutdown) => Err(WorkflowError::Shutdown),
            Err(err) => {
                let message = err.to_string();
                self.record(HistoryEvent::ChildFailed {
                    seq,
                    workflow_id: workflow_id.to_string(),
                    error: message.clone(),
                })
                .await?;
                Err(WorkflowError::Child {
                    workflow_id: workflow_id.to_string(),
                    message,
                })
            }
        }
    }

    /// Build the error that closes this run and restarts the workflow with
    /// `input` and an empty history. Return it from `run`.
    pub fn continue_as_new<I: Serialize>(&self, input: &I) -> WorkflowError {
        match serde_json::to_value(input) {
            Ok(input) => WorkflowError::ContinueAsNew { input },
            Err(e) => WorkflowError::Codec(e.to_string()),
        }
    }
}

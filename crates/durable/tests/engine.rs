//! Engine behavior exercised through small purpose-built workflows.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::macros::datetime;
use time::OffsetDateTime;

use dict_history::{HistoryError, HistoryEvent, RunOutcome, RunRecord, SelectChoice, SignalRecord};

use dict_durable::{
    Activity, ActivityCatalog, ActivityContext, ActivityError, ActivityOptions, ActivityProfile,
    Clock, Engine, FailureKind, HistoryStore, MemoryHistoryStore, RetryPolicy, RunStatus,
    Selected, Workflow, WorkflowContext, WorkflowError, WorkflowOptions,
};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

// ── Activities ───────────────────────────────────────────────────────────────

/// Counts calls; fails with `failures_before_success` retryable errors first.
#[derive(Clone, Default)]
struct Record {
    calls: Arc<AtomicU32>,
    failures_before_success: u32,
}

#[async_trait]
impl Activity for Record {
    const NAME: &'static str = "RecordActivity";
    type Input = String;
    type Output = String;

    async fn execute(&self, _ctx: &ActivityContext, input: String) -> Result<String, ActivityError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures_before_success {
            return Err(ActivityError::retryable(format!("transient failure {call}")));
        }
        Ok(format!("recorded:{input}"))
    }
}

#[derive(Clone, Default)]
struct Reject {
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl Activity for Reject {
    const NAME: &'static str = "RejectActivity";
    type Input = ();
    type Output = ();

    async fn execute(&self, _ctx: &ActivityContext, _input: ()) -> Result<(), ActivityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ActivityError::non_retryable(
            FailureKind::InvalidTransition,
            "already terminal",
        ))
    }
}

/// Heartbeats once, then stalls past the heartbeat timeout.
#[derive(Clone, Default)]
struct Stall {
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl Activity for Stall {
    const NAME: &'static str = "StallActivity";
    type Input = ();
    type Output = ();

    async fn execute(&self, ctx: &ActivityContext, _input: ()) -> Result<(), ActivityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ctx.heartbeat();
        tokio::time::sleep(Duration::from_secs(8)).await;
        Ok(())
    }
}

// ── Workflows ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Approval {
    Approved { by: String, at_day: i64 },
    TimedOut,
}

/// Records the request, then waits up to 5 days for an `approve` signal.
struct ApprovalWorkflow;

#[async_trait]
impl Workflow for ApprovalWorkflow {
    const NAME: &'static str = "ApprovalWorkflow";
    type Input = String;
    type Output = Approval;

    async fn run(&self, ctx: WorkflowContext, input: String) -> Result<Approval, WorkflowError> {
        let started = ctx.now().await?;
        ctx.execute_activity::<Record>(&input, ActivityProfile::Database)
            .await?;
        let deadline = ctx.new_timer(5 * DAY).await?;
        match ctx
            .selector()
            .on_signal("approve")
            .on_timer(deadline)
            .select()
            .await?
        {
            Selected::Signal(signal) => {
                let by: String = signal.decode()?;
                Ok(Approval::Approved {
                    by,
                    at_day: (signal.received_at - started).whole_days(),
                })
            }
            Selected::Timer(_) => Ok(Approval::TimedOut),
        }
    }
}

struct RetryWorkflow;

#[async_trait]
impl Workflow for RetryWorkflow {
    const NAME: &'static str = "RetryWorkflow";
    type Input = ();
    type Output = String;

    async fn run(&self, ctx: WorkflowContext, _input: ()) -> Result<String, WorkflowError> {
        ctx.execute_activity::<Record>(&"x".to_string(), ActivityProfile::Messaging)
            .await
    }
}

struct RejectWorkflow;

#[async_trait]
impl Workflow for RejectWorkflow {
    const NAME: &'static str = "RejectWorkflow";
    type Input = ();
    type Output = bool;

    async fn run(&self, ctx: WorkflowContext, _input: ()) -> Result<bool, WorkflowError> {
        match ctx.execute_activity::<Reject>(&(), ActivityProfile::Database).await {
            Ok(()) => Ok(false),
            Err(err) if err.is_invalid_transition() => Ok(true),
            Err(err) => Err(err),
        }
    }
}

struct StallWorkflow;

#[async_trait]
impl Workflow for StallWorkflow {
    const NAME: &'static str = "StallWorkflow";
    type Input = ();
    type Output = ();

    async fn run(&self, ctx: WorkflowContext, _input: ()) -> Result<(), WorkflowError> {
        ctx.execute_activity::<Stall>(&(), ActivityProfile::LongRunning)
            .await
    }
}

/// Sleeps a day per iteration and continues as new until `remaining` is 0.
struct CountdownWorkflow;

#[async_trait]
impl Workflow for CountdownWorkflow {
    const NAME: &'static str = "CountdownWorkflow";
    type Input = u32;
    type Output = String;

    async fn run(&self, ctx: WorkflowContext, remaining: u32) -> Result<String, WorkflowError> {
        if remaining == 0 {
            return Ok(format!("done in run {}", ctx.run_id()));
        }
        ctx.sleep(DAY).await?;
        Err(ctx.continue_as_new(&(remaining - 1)))
    }
}

/// Runs an `ApprovalWorkflow` child and reports its outcome.
struct ParentWorkflow;

#[async_trait]
impl Workflow for ParentWorkflow {
    const NAME: &'static str = "ParentWorkflow";
    type Input = ();
    type Output = Approval;

    async fn run(&self, ctx: WorkflowContext, _input: ()) -> Result<Approval, WorkflowError> {
        ctx.execute_child::<ApprovalWorkflow>(
            "approval-child",
            &"from-parent".to_string(),
            WorkflowOptions::default(),
        )
        .await
    }
}

struct Forever;

#[async_trait]
impl Workflow for Forever {
    const NAME: &'static str = "ForeverWorkflow";
    type Input = ();
    type Output = ();

    async fn run(&self, ctx: WorkflowContext, _input: ()) -> Result<(), WorkflowError> {
        ctx.receive("never").await?;
        Ok(())
    }
}

/// Races `approve` against a one-day timer, then stays open until `finish`
/// so the recorded choice can be replayed.
struct TieWorkflow;

#[async_trait]
impl Workflow for TieWorkflow {
    const NAME: &'static str = "TieWorkflow";
    type Input = ();
    type Output = String;

    async fn run(&self, ctx: WorkflowContext, _input: ()) -> Result<String, WorkflowError> {
        let timer = ctx.new_timer(DAY).await?;
        let branch = match ctx.selector().on_signal("approve").on_timer(timer).select().await? {
            Selected::Signal(signal) => signal.name,
            Selected::Timer(_) => "timer".to_string(),
        };
        ctx.receive("finish").await?;
        Ok(branch)
    }
}

/// Notes `is_replaying` before and after its one activity, then waits for
/// `go`.
#[derive(Clone, Default)]
struct ReplayAware {
    flags: Arc<std::sync::Mutex<Vec<bool>>>,
}

impl ReplayAware {
    fn note(&self, ctx: &WorkflowContext) {
        if let Ok(mut flags) = self.flags.lock() {
            flags.push(ctx.is_replaying());
        }
    }

    fn take(&self) -> Vec<bool> {
        self.flags.lock().map(|mut f| std::mem::take(&mut *f)).unwrap_or_default()
    }
}

#[async_trait]
impl Workflow for ReplayAware {
    const NAME: &'static str = "ReplayAware";
    type Input = ();
    type Output = ();

    async fn run(&self, ctx: WorkflowContext, _input: ()) -> Result<(), WorkflowError> {
        self.note(&ctx);
        ctx.execute_activity::<Record>(&"once".to_string(), ActivityProfile::Database)
            .await?;
        self.note(&ctx);
        ctx.receive("go").await?;
        Ok(())
    }
}

// ── Store with a racing signal ───────────────────────────────────────────────

#[derive(Clone, Copy)]
enum Moment {
    /// Right after `create_run` returns.
    AfterCreate,
    /// Right after the first signal log read for the run.
    AfterSnapshot,
}

/// Memory store that once appends an `approve` signal from "erin" at a
/// moment when the engine has the run in history but not yet in its live
/// table, as a concurrent `signal` call would.
struct RacingSignal {
    inner: Arc<MemoryHistoryStore>,
    moment: Moment,
    at: OffsetDateTime,
    fired: AtomicBool,
}

impl RacingSignal {
    fn new(inner: Arc<MemoryHistoryStore>, moment: Moment, at: OffsetDateTime) -> Self {
        Self {
            inner,
            moment,
            at,
            fired: AtomicBool::new(false),
        }
    }

    async fn fire_once(&self, run_id: &str) -> Result<(), HistoryError> {
        if !self.fired.swap(true, Ordering::SeqCst) {
            self.inner
                .append_signal(run_id, "approve", serde_json::json!("erin"), self.at)
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for RacingSignal {
    async fn create_run(&self, run: RunRecord) -> Result<(), HistoryError> {
        let run_id = run.run_id.clone();
        self.inner.create_run(run).await?;
        if let Moment::AfterCreate = self.moment {
            self.fire_once(&run_id).await?;
        }
        Ok(())
    }

    async fn get_run(&self, run_id: &str) -> Result<RunRecord, HistoryError> {
        self.inner.get_run(run_id).await
    }

    async fn latest_run(&self, workflow_id: &str) -> Result<RunRecord, HistoryError> {
        self.inner.latest_run(workflow_id).await
    }

    async fn list_open_runs(&self) -> Result<Vec<RunRecord>, HistoryError> {
        self.inner.list_open_runs().await
    }

    async fn close_run(&self, run_id: &str, outcome: RunOutcome) -> Result<(), HistoryError> {
        self.inner.close_run(run_id, outcome).await
    }

    async fn append_event(&self, run_id: &str, event: HistoryEvent) -> Result<(), HistoryError> {
        self.inner.append_event(run_id, event).await
    }

    async fn load_events(&self, run_id: &str) -> Result<Vec<HistoryEvent>, HistoryError> {
        self.inner.load_events(run_id).await
    }

    async fn append_signal(
        &self,
        run_id: &str,
        name: &str,
        payload: serde_json::Value,
        received_at: OffsetDateTime,
    ) -> Result<SignalRecord, HistoryError> {
        self.inner.append_signal(run_id, name, payload, received_at).await
    }

    async fn load_signals(&self, run_id: &str) -> Result<Vec<SignalRecord>, HistoryError> {
        let snapshot = self.inner.load_signals(run_id).await?;
        if let Moment::AfterSnapshot = self.moment {
            self.fire_once(run_id).await?;
        }
        Ok(snapshot)
    }
}

// ── Harness ──────────────────────────────────────────────────────────────────

struct Harness {
    store: Arc<MemoryHistoryStore>,
    /// Shared by every engine so a restarted worker keeps the same time line.
    clock: Clock,
    record: Record,
    reject: Reject,
    stall: Stall,
    replay_aware: ReplayAware,
}

impl Harness {
    fn new() -> Self {
        Self {
            store: Arc::new(MemoryHistoryStore::new()),
            clock: Clock::starting_at(datetime!(2025-06-02 09:00 UTC)),
            record: Record::default(),
            reject: Reject::default(),
            stall: Stall::default(),
            replay_aware: ReplayAware::default(),
        }
    }

    fn engine(&self) -> Engine {
        self.engine_over(self.store.clone())
    }

    fn engine_over(&self, store: Arc<dyn HistoryStore>) -> Engine {
        Engine::builder(store)
            .clock(self.clock.clone())
            .register_activity(self.record.clone())
            .register_activity(self.reject.clone())
            .register_activity(self.stall.clone())
            .register_workflow(ApprovalWorkflow)
            .register_workflow(RetryWorkflow)
            .register_workflow(RejectWorkflow)
            .register_workflow(StallWorkflow)
            .register_workflow(CountdownWorkflow)
            .register_workflow(ParentWorkflow)
            .register_workflow(Forever)
            .register_workflow(TieWorkflow)
            .register_workflow(self.replay_aware.clone())
            .build()
    }

    fn calls(&self) -> u32 {
        self.record.calls.load(Ordering::SeqCst)
    }
}

// ── Selector ─────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn signal_before_deadline_wins() {
    let harness = Harness::new();
    let engine = harness.engine();
    let handle = engine
        .start::<ApprovalWorkflow>("approval-1", &"req".to_string(), WorkflowOptions::default())
        .await
        .unwrap();

    tokio::time::sleep(2 * DAY).await;
    assert!(handle.signal("approve", &"alice").await.unwrap());

    assert_eq!(
        handle.result().await.unwrap(),
        Approval::Approved {
            by: "alice".into(),
            at_day: 2
        }
    );
    assert_eq!(harness.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn deadline_fires_without_signal() {
    let harness = Harness::new();
    let engine = harness.engine();
    let handle = engine
        .start::<ApprovalWorkflow>("approval-2", &"req".to_string(), WorkflowOptions::default())
        .await
        .unwrap();

    assert_eq!(handle.result().await.unwrap(), Approval::TimedOut);
    let run = engine.describe("approval-2").await.unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!((run.closed_at.unwrap() - run.started_at).whole_days(), 5);
}

#[tokio::test(start_paused = true)]
async fn signal_after_close_is_ignored() {
    let harness = Harness::new();
    let engine = harness.engine();
    let handle = engine
        .start::<ApprovalWorkflow>("approval-3", &"req".to_string(), WorkflowOptions::default())
        .await
        .unwrap();
    assert_eq!(handle.result().await.unwrap(), Approval::TimedOut);

    assert!(!engine.signal("approval-3", "approve", &"late").await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn signal_arriving_as_timer_fires_wins_and_replays() {
    let harness = Harness::new();
    let first = harness.engine();
    let handle = first
        .start::<TieWorkflow>("tie", &(), WorkflowOptions::default())
        .await
        .unwrap();
    tokio::time::sleep(DAY / 2).await;
    first.shutdown();

    let fire_at = harness
        .store
        .load_events(handle.run_id())
        .await
        .unwrap()
        .into_iter()
        .find_map(|e| match e {
            HistoryEvent::TimerStarted { fire_at, .. } => Some(fire_at),
            _ => None,
        })
        .unwrap();
    tokio::time::advance(harness.clock.until(fire_at)).await;
    assert_eq!(harness.clock.now(), fire_at);

    // Signal and timer are both ready at the same instant when the run resumes.
    let second = harness.engine();
    assert!(second.signal("tie", "approve", &"frank").await.unwrap());
    let signals = harness.store.load_signals(handle.run_id()).await.unwrap();
    assert_eq!(signals[0].received_at, fire_at);
    second.recover().await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let chosen = |events: Vec<HistoryEvent>| {
        events.into_iter().find_map(|e| match e {
            HistoryEvent::SelectResolved { choice, .. } => Some(choice),
            _ => None,
        })
    };
    let recorded = chosen(harness.store.load_events(handle.run_id()).await.unwrap());
    assert!(matches!(recorded, Some(SelectChoice::Signal { ref channel, .. }) if channel == "approve"));
    second.shutdown();

    let third = harness.engine();
    assert_eq!(third.recover().await.unwrap(), 1);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(third.signal("tie", "finish", &()).await.unwrap());

    let branch: String = third.result("tie").await.unwrap();
    assert_eq!(branch, "approve");
    let events = harness.store.load_events(handle.run_id()).await.unwrap();
    let selects = events
        .iter()
        .filter(|e| matches!(e, HistoryEvent::SelectResolved { .. }))
        .count();
    assert_eq!(selects, 2, "one race for approve, one receive for finish");
    assert_eq!(chosen(events), recorded);
}

#[tokio::test(start_paused = true)]
async fn signal_persisted_before_run_registers_is_delivered() {
    let harness = Harness::new();
    let store = RacingSignal::new(harness.store.clone(), Moment::AfterCreate, harness.clock.now());
    let engine = harness.engine_over(Arc::new(store));
    let handle = engine
        .start::<ApprovalWorkflow>("approval-race", &"req".to_string(), WorkflowOptions::default())
        .await
        .unwrap();

    assert_eq!(
        handle.result().await.unwrap(),
        Approval::Approved {
            by: "erin".into(),
            at_day: 0
        }
    );
}

#[tokio::test(start_paused = true)]
async fn signal_persisted_during_recovery_is_delivered() {
    let harness = Harness::new();
    let first = harness.engine();
    first
        .start::<ApprovalWorkflow>("approval-rr", &"req".to_string(), WorkflowOptions::default())
        .await
        .unwrap();
    tokio::time::sleep(DAY).await;
    first.shutdown();

    let store = RacingSignal::new(harness.store.clone(), Moment::AfterSnapshot, harness.clock.now());
    let second = harness.engine_over(Arc::new(store));
    assert_eq!(second.recover().await.unwrap(), 1);

    let outcome: Approval = second.result("approval-rr").await.unwrap();
    assert_eq!(
        outcome,
        Approval::Approved {
            by: "erin".into(),
            at_day: 1
        }
    );
}

#[tokio::test(start_paused = true)]
async fn duplicate_start_is_rejected_while_open() {
    let harness = Harness::new();
    let engine = harness.engine();
    engine
        .start::<ApprovalWorkflow>("approval-4", &"a".to_string(), WorkflowOptions::default())
        .await
        .unwrap();
    let second = engine
        .start::<ApprovalWorkflow>("approval-4", &"b".to_string(), WorkflowOptions::default())
        .await;
    assert!(matches!(second, Err(WorkflowError::AlreadyStarted { .. })));
}

#[tokio::test]
async fn signal_to_unknown_workflow_is_not_found() {
    let harness = Harness::new();
    let engine = harness.engine();
    let err = engine.signal("nobody", "approve", &"x").await.unwrap_err();
    assert!(matches!(err, WorkflowError::NotFound { .. }));
}

// ── Activities and retries ───────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried() {
    let mut harness = Harness::new();
    harness.record.failures_before_success = 3;
    let engine = harness.engine();
    let handle = engine
        .start::<RetryWorkflow>("retry-1", &(), WorkflowOptions::default())
        .await
        .unwrap();

    assert_eq!(handle.result().await.unwrap(), "recorded:x");
    assert_eq!(harness.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_fail_the_call() {
    let mut harness = Harness::new();
    harness.record.failures_before_success = u32::MAX;
    let engine = harness.engine();
    let handle = engine
        .start::<RetryWorkflow>("retry-2", &(), WorkflowOptions::default())
        .await
        .unwrap();

    let err = handle.result().await.unwrap_err();
    match err.activity_error() {
        Some(ActivityError::RetriesExhausted { attempts, .. }) => assert_eq!(*attempts, 7),
        other => panic!("expected exhausted retries, got {other:?}"),
    }
    // Messaging profile: 7 attempts.
    assert_eq!(harness.calls(), 7);
}

#[tokio::test(start_paused = true)]
async fn business_rejection_is_not_retried() {
    let harness = Harness::new();
    let engine = harness.engine();
    let handle = engine
        .start::<RejectWorkflow>("reject-1", &(), WorkflowOptions::default())
        .await
        .unwrap();

    assert!(handle.result().await.unwrap());
    assert_eq!(harness.reject.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn silent_heartbeat_times_out_the_attempt() {
    let harness = Harness::new();
    let options = ActivityOptions {
        start_to_close: Duration::from_secs(60),
        schedule_to_close: None,
        heartbeat_timeout: Some(Duration::from_secs(2)),
        retry: RetryPolicy {
            initial_interval: Duration::from_secs(1),
            backoff_coefficient: 2.0,
            maximum_interval: Duration::from_secs(10),
            maximum_attempts: 2,
        },
    };
    let engine = Engine::builder(harness.store.clone())
        .catalog(ActivityCatalog::default().with(ActivityProfile::LongRunning, options))
        .register_activity(harness.stall.clone())
        .register_workflow(StallWorkflow)
        .build();
    let handle = engine
        .start::<StallWorkflow>("stall-1", &(), WorkflowOptions::default())
        .await
        .unwrap();

    let err = handle.result().await.unwrap_err();
    match err.activity_error() {
        Some(ActivityError::RetriesExhausted { last, .. }) => {
            assert!(matches!(**last, ActivityError::HeartbeatTimeout { .. }))
        }
        other => panic!("expected heartbeat exhaustion, got {other:?}"),
    }
    assert_eq!(harness.stall.calls.load(Ordering::SeqCst), 2);
}

// ── Replay ───────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn recovery_replays_without_repeating_activities() {
    let harness = Harness::new();
    let first = harness.engine();
    first
        .start::<ApprovalWorkflow>("approval-r", &"req".to_string(), WorkflowOptions::default())
        .await
        .unwrap();
    tokio::time::sleep(DAY).await;
    assert_eq!(harness.calls(), 1);

    // Crash: the run stays open in the store.
    first.shutdown();
    tokio::time::sleep(DAY).await;

    let second = harness.engine();
    assert_eq!(second.recover().await.unwrap(), 1);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(second.signal("approval-r", "approve", &"bob").await.unwrap());

    let outcome: Approval = second.result("approval-r").await.unwrap();
    assert!(matches!(outcome, Approval::Approved { ref by, .. } if by == "bob"));
    assert_eq!(harness.calls(), 1, "recorded activity must not run again");
}

#[tokio::test(start_paused = true)]
async fn replay_is_reported_until_history_runs_out() {
    let harness = Harness::new();
    let first = harness.engine();
    first
        .start::<ReplayAware>("replay-aware", &(), WorkflowOptions::default())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(harness.replay_aware.take(), vec![false, false]);
    first.shutdown();

    let second = harness.engine();
    assert_eq!(second.recover().await.unwrap(), 1);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(harness.replay_aware.take(), vec![true, false]);

    assert!(second.signal("replay-aware", "go", &()).await.unwrap());
    second.result::<()>("replay-aware").await.unwrap();
    assert_eq!(harness.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn recovered_timer_keeps_original_deadline() {
    let harness = Harness::new();
    let first = harness.engine();
    first
        .start::<ApprovalWorkflow>("approval-t", &"req".to_string(), WorkflowOptions::default())
        .await
        .unwrap();
    tokio::time::sleep(DAY).await;
    first.shutdown();

    let second = harness.engine();
    second.recover().await.unwrap();
    let outcome: Approval = second.result("approval-t").await.unwrap();
    assert_eq!(outcome, Approval::TimedOut);

    let run = second.describe("approval-t").await.unwrap();
    let timer_fire = harness
        .store
        .load_events(&run.run_id)
        .await
        .unwrap()
        .into_iter()
        .find_map(|e| match e {
            dict_history::HistoryEvent::TimerStarted { fire_at, .. } => Some(fire_at),
            _ => None,
        })
        .unwrap();
    assert_eq!((timer_fire - run.started_at).whole_days(), 5);
}

#[tokio::test(start_paused = true)]
async fn signal_sent_while_down_is_seen_after_recovery() {
    let harness = Harness::new();
    let first = harness.engine();
    first
        .start::<ApprovalWorkflow>("approval-s", &"req".to_string(), WorkflowOptions::default())
        .await
        .unwrap();
    tokio::time::sleep(DAY).await;
    first.shutdown();

    // Persisted even though no engine is driving the run.
    let second = harness.engine();
    assert!(second.signal("approval-s", "approve", &"carol").await.unwrap());
    second.recover().await.unwrap();

    let outcome: Approval = second.result("approval-s").await.unwrap();
    assert!(matches!(outcome, Approval::Approved { ref by, at_day: 1 } if by == "carol"));
}

// ── Continue-as-new, children, timeouts ──────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn continue_as_new_chains_runs() {
    let harness = Harness::new();
    let engine = harness.engine();
    let handle = engine
        .start::<CountdownWorkflow>("countdown", &3, WorkflowOptions::default())
        .await
        .unwrap();

    let message = handle.result().await.unwrap();
    let last = engine.describe("countdown").await.unwrap();
    assert_eq!(message, format!("done in run {}", last.run_id));
    assert_ne!(last.run_id, handle.run_id());
    assert!(last.continued_from.is_some());
    assert!(harness.store.load_events(&last.run_id).await.unwrap().is_empty());

    let first = harness.store.get_run(handle.run_id()).await.unwrap();
    assert_eq!(first.status, RunStatus::ContinuedAsNew);
}

#[tokio::test(start_paused = true)]
async fn child_workflow_result_reaches_parent() {
    let harness = Harness::new();
    let engine = harness.engine();
    let handle = engine
        .start::<ParentWorkflow>("parent", &(), WorkflowOptions::default())
        .await
        .unwrap();

    tokio::time::sleep(DAY).await;
    assert!(engine.signal("approval-child", "approve", &"dave").await.unwrap());

    let outcome = handle.result().await.unwrap();
    assert!(matches!(outcome, Approval::Approved { ref by, at_day: 1 } if by == "dave"));
    let child = engine.describe("approval-child").await.unwrap();
    let parent = engine.describe("parent").await.unwrap();
    assert_eq!(child.parent_run_id, Some(parent.run_id));
}

#[tokio::test(start_paused = true)]
async fn execution_timeout_closes_the_run() {
    let harness = Harness::new();
    let engine = harness.engine();
    let handle = engine
        .start::<Forever>(
            "forever",
            &(),
            WorkflowOptions::with_execution_timeout(Duration::from_secs(3600)),
        )
        .await
        .unwrap();

    let err = handle.result().await.unwrap_err();
    assert!(matches!(err, WorkflowError::ExecutionTimedOut));
    let run = engine.describe("forever").await.unwrap();
    assert_eq!(run.status, RunStatus::TimedOut);
}

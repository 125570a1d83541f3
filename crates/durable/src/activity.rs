//! Activities and the retry-governed dispatcher.
//!
//! An activity is the only place side effects happen. The dispatcher runs
//! attempts under the per-attempt timeout, the heartbeat watchdog and the
//! worker-wide concurrency cap, and retries infrastructure failures with
//! exponential backoff.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::{watch, Semaphore};
use tokio::time::Instant;
use tracing::Instrument;

use crate::clock::Clock;
use crate::error::ActivityError;
use crate::retry::ActivityOptions;

/// A typed, idempotent unit of side-effecting work.
#[async_trait]
pub trait Activity: Send + Sync + 'static {
    /// Registered name; also recorded in history.
    const NAME: &'static str;

    type Input: Serialize + DeserializeOwned + Send + Sync + 'static;
    type Output: Serialize + DeserializeOwned + Send + 'static;

    async fn execute(
        &self,
        ctx: &ActivityContext,
        input: Self::Input,
    ) -> Result<Self::Output, ActivityError>;
}

/// Per-attempt information handed to an activity.
#[derive(Debug, Clone)]
pub struct ActivityContext {
    pub activity: &'static str,
    pub workflow_id: String,
    pub run_id: String,
    /// 1-based attempt number.
    pub attempt: u32,
    clock: Clock,
    heartbeat: Arc<watch::Sender<Instant>>,
}

impl ActivityContext {
    /// Wall-clock time for timestamps written by the activity.
    pub fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }

    /// Report liveness. Once an activity has heartbeated it must keep doing
    /// so within its profile's heartbeat timeout.
    pub fn heartbeat(&self) {
        self.heartbeat.send_replace(Instant::now());
    }
}

/// Identifies the run an activity call belongs to.
#[derive(Debug, Clone)]
pub(crate) struct ActivityScope {
    pub workflow_id: String,
    pub run_id: String,
}

// ── Type erasure ─────────────────────────────────────────────────────────────

#[async_trait]
trait ErasedActivity: Send + Sync {
    async fn call(
        &self,
        ctx: &ActivityContext,
        input: serde_json::Value,
    ) -> Result<serde_json::Value, ActivityError>;
}

struct Typed<A>(A);

#[async_trait]
impl<A: Activity> ErasedActivity for Typed<A> {
    async fn call(
        &self,
        ctx: &ActivityContext,
        input: serde_json::Value,
    ) -> Result<serde_json::Value, ActivityError> {
        let input: A::Input = serde_json::from_value(input).map_err(|e| ActivityError::Codec {
            message: e.to_string(),
        })?;
        let output = self.0.execute(ctx, input).await?;
        serde_json::to_value(output).map_err(|e| ActivityError::Codec {
            message: e.to_string(),
        })
    }
}

// ── Registry and dispatcher ──────────────────────────────────────────────────

/// Activities known to a worker, keyed by name.
#[derive(Default)]
pub struct ActivityRegistry {
    activities: HashMap<&'static str, Arc<dyn ErasedActivity>>,
}

impl ActivityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an activity, replacing any previous one with the same name.
    pub fn register<A: Activity>(&mut self, activity: A) {
        self.activities.insert(A::NAME, Arc::new(Typed(activity)));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.activities.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }
}

impl std::fmt::Debug for ActivityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.activities.keys().collect();
        names.sort();
        f.debug_struct("ActivityRegistry")
            .field("activities", &names)
            .finish()
    }
}

/// Runs activity attempts with retries under a shared concurrency cap.
pub(crate) struct Dispatcher {
    registry: ActivityRegistry,
    permits: Arc<Semaphore>,
    clock: Clock,
}

/// Outcome of one dispatched call: the result plus attempts made.
pub(crate) struct Dispatched {
    pub result: Result<serde_json::Value, ActivityError>,
    pub attempts: u32,
}

impl Dispatcher {
    pub(crate) fn new(registry: ActivityRegistry, max_concurrent: usize, clock: Clock) -> Self {
        Self {
            registry,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            clock,
        }
    }

    pub(crate) async fn dispatch(
        &self,
        name: &'static str,
        input: serde_json::Value,
        options: &ActivityOptions,
        scope: &ActivityScope,
    ) -> Dispatched {
        let Some(activity) = self.registry.activities.get(name).cloned() else {
            return Dispatched {
                result: Err(ActivityError::NotRegistered {
                    activity: name.to_string(),
                }),
                attempts: 0,
            };
        };

        let scheduled = Instant::now();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let attempt_timeout = match options.schedule_to_close {
                Some(total) => options
                    .start_to_close
                    .min(total.saturating_sub(scheduled.elapsed())),
                None => options.start_to_close,
            };
            let span = tracing::info_span!("activity", activity = name, attempt);
            let result = self
                .run_attempt(&activity, name, input.clone(), attempt_timeout, options, scope, attempt)
                .instrument(span)
                .await;

            let err = match result {
                Ok(output) => {
                    return Dispatched {
                        result: Ok(output),
                        attempts: attempt,
                    }
                }
                Err(err) if !err.is_retryable() => {
                    return Dispatched {
                        result: Err(err),
                        attempts: attempt,
                    }
                }
                Err(err) => err,
            };

            let delay = options.retry.backoff_for(attempt);
            let budget_left = options
                .schedule_to_close
                .map(|total| total.saturating_sub(scheduled.elapsed()));
            let out_of_budget = budget_left.is_some_and(|left| left <= delay);
            if !options.retry.allows_another(attempt) || out_of_budget {
                tracing::warn!(activity = name, attempts = attempt, error = %err, "activity retries exhausted");
                return Dispatched {
                    result: Err(ActivityError::RetriesExhausted {
                        activity: name.to_string(),
                        attempts: attempt,
                        last: Box::new(err),
                    }),
                    attempts: attempt,
                };
            }

            tracing::warn!(
                activity = name,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "activity attempt failed; retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_attempt(
        &self,
        activity: &Arc<dyn ErasedActivity>,
        name: &'static str,
        input: serde_json::Value,
        attempt_timeout: Duration,
        options: &ActivityOptions,
        scope: &ActivityScope,
        attempt: u32,
    ) -> Result<serde_json::Value, ActivityError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ActivityError::retryable("activity worker is closed"))?;

        let (beat_tx, beat_rx) = watch::channel(Instant::now());
        let ctx = ActivityContext {
            activity: name,
            workflow_id: scope.workflow_id.clone(),
            run_id: scope.run_id.clone(),
            attempt,
            clock: self.clock.clone(),
            heartbeat: Arc::new(beat_tx),
        };

        let run = tokio::time::timeout(attempt_timeout, activity.call(&ctx, input));
        let watchdog = heartbeat_watchdog(beat_rx, options.heartbeat_timeout);
        tokio::select! {
            outcome = run => match outcome {
                Ok(result) => result,
                Err(_) => Err(ActivityError::Timeout {
                    timeout_ms: attempt_timeout.as_millis() as u64,
                }),
            },
            err = watchdog => Err(err),
        }
    }
}

/// Resolves once a heartbeating activity goes quiet for `timeout`.
///
/// Activities that never heartbeat are bounded by start-to-close only.
async fn heartbeat_watchdog(
    mut beats: watch::Receiver<Instant>,
    timeout: Option<Duration>,
) -> ActivityError {
    let Some(timeout) = timeout else {
        return std::future::pending().await;
    };
    if beats.changed().await.is_err() {
        return std::future::pending().await;
    }
    loop {
        let last = *beats.borrow_and_update();
        tokio::select! {
            changed = beats.changed() => {
                if changed.is_err() {
                    return std::future::pending().await;
                }
            }
            _ = tokio::time::sleep_until(last + timeout) => {
                return ActivityError::HeartbeatTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                };
            }
        }
    }
}

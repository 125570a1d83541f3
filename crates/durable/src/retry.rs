//! Activity retry policies and the per-class option catalog.
//!
//! Workflows never hand-tune timeouts. Each activity call names an
//! [`ActivityProfile`], and the engine's [`ActivityCatalog`] resolves it to
//! concrete [`ActivityOptions`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exponential backoff schedule for one activity call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub backoff_coefficient: f64,
    pub maximum_interval: Duration,
    /// Total attempts including the first; `0` means unlimited.
    pub maximum_attempts: u32,
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let scaled = self.initial_interval.as_secs_f64() * self.backoff_coefficient.powi(exponent);
        let capped = scaled.min(self.maximum_interval.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.maximum_interval)
    }

    /// Whether another attempt is allowed after `attempts` have run.
    pub fn allows_another(&self, attempts: u32) -> bool {
        self.maximum_attempts == 0 || attempts < self.maximum_attempts
    }
}

/// Timeouts and retry policy applied to one activity call.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityOptions {
    /// Upper bound for a single attempt.
    pub start_to_close: Duration,
    /// Upper bound for all attempts and backoff together.
    pub schedule_to_close: Option<Duration>,
    /// Maximum gap between heartbeats once the activity has heartbeated.
    pub heartbeat_timeout: Option<Duration>,
    pub retry: RetryPolicy,
}

/// Operation classes with their own timeout and retry profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityProfile {
    Database,
    ExternalApi,
    Messaging,
    Validation,
    LongRunning,
}

impl ActivityProfile {
    pub const ALL: [ActivityProfile; 5] = [
        ActivityProfile::Database,
        ActivityProfile::ExternalApi,
        ActivityProfile::Messaging,
        ActivityProfile::Validation,
        ActivityProfile::LongRunning,
    ];

    /// Built-in options for this class.
    pub fn default_options(self) -> ActivityOptions {
        match self {
            ActivityProfile::Database => ActivityOptions {
                start_to_close: Duration::from_secs(10),
                schedule_to_close: None,
                heartbeat_timeout: Some(Duration::from_secs(5)),
                retry: RetryPolicy {
                    initial_interval: Duration::from_secs(1),
                    backoff_coefficient: 2.0,
                    maximum_interval: Duration::from_secs(30),
                    maximum_attempts: 5,
                },
            },
            ActivityProfile::ExternalApi => ActivityOptions {
                start_to_close: Duration::from_secs(30),
                schedule_to_close: Some(Duration::from_secs(2 * 60)),
                heartbeat_timeout: Some(Duration::from_secs(10)),
                retry: RetryPolicy {
                    initial_interval: Duration::from_secs(2),
                    backoff_coefficient: 2.0,
                    maximum_interval: Duration::from_secs(60),
                    maximum_attempts: 10,
                },
            },
            ActivityProfile::Messaging => ActivityOptions {
                start_to_close: Duration::from_secs(15),
                schedule_to_close: None,
                heartbeat_timeout: Some(Duration::from_secs(5)),
                retry: RetryPolicy {
                    initial_interval: Duration::from_millis(500),
                    backoff_coefficient: 2.0,
                    maximum_interval: Duration::from_secs(20),
                    maximum_attempts: 7,
                },
            },
            ActivityProfile::Validation => ActivityOptions {
                start_to_close: Duration::from_secs(5),
                schedule_to_close: None,
                heartbeat_timeout: None,
                retry: RetryPolicy {
                    initial_interval: Duration::from_secs(1),
                    backoff_coefficient: 1.5,
                    maximum_interval: Duration::from_secs(10),
                    maximum_attempts: 3,
                },
            },
            ActivityProfile::LongRunning => ActivityOptions {
                start_to_close: Duration::from_secs(5 * 60),
                schedule_to_close: Some(Duration::from_secs(10 * 60)),
                heartbeat_timeout: Some(Duration::from_secs(30)),
                retry: RetryPolicy {
                    initial_interval: Duration::from_secs(5),
                    backoff_coefficient: 2.0,
                    maximum_interval: Duration::from_secs(2 * 60),
                    maximum_attempts: 15,
                },
            },
        }
    }
}

/// Options per activity profile, owned by the engine.
#[derive(Debug, Clone)]
pub struct ActivityCatalog {
    database: ActivityOptions,
    external_api: ActivityOptions,
    messaging: ActivityOptions,
    validation: ActivityOptions,
    long_running: ActivityOptions,
}

impl Default for ActivityCatalog {
    fn default() -> Self {
        Self {
            database: ActivityProfile::Database.default_options(),
            external_api: ActivityProfile::ExternalApi.default_options(),
            messaging: ActivityProfile::Messaging.default_options(),
            validation: ActivityProfile::Validation.default_options(),
            long_running: ActivityProfile::LongRunning.default_options(),
        }
    }
}

impl ActivityCatalog {
    pub fn options(&self, profile: ActivityProfile) -> &ActivityOptions {
        match profile {
            ActivityProfile::Database => &self.database,
            ActivityProfile::ExternalApi => &self.external_api,
            ActivityProfile::Messaging => &self.messaging,
            ActivityProfile::Validation => &self.validation,
            ActivityProfile::LongRunning => &self.long_running,
        }
    }

    /// Replace the options for one profile.
    pub fn with(mut self, profile: ActivityProfile, options: ActivityOptions) -> Self {
        let slot = match profile {
            ActivityProfile::Database => &mut self.database,
            ActivityProfile::ExternalApi => &mut self.external_api,
            ActivityProfile::Messaging => &mut self.messaging,
            ActivityProfile::Validation => &mut self.validation,
            ActivityProfile::LongRunning => &mut self.long_running,
        };
        *slot = options;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_matches_profile_table() {
        let catalog = ActivityCatalog::default();

        let db = catalog.options(ActivityProfile::Database);
        assert_eq!(db.start_to_close, Duration::from_secs(10));
        assert_eq!(db.heartbeat_timeout, Some(Duration::from_secs(5)));
        assert_eq!(db.retry.maximum_attempts, 5);

        let api = catalog.options(ActivityProfile::ExternalApi);
        assert_eq!(api.start_to_close, Duration::from_secs(30));
        assert_eq!(api.schedule_to_close, Some(Duration::from_secs(120)));
        assert_eq!(api.retry.maximum_interval, Duration::from_secs(60));
        assert_eq!(api.retry.maximum_attempts, 10);

        let msg = catalog.options(ActivityProfile::Messaging);
        assert_eq!(msg.retry.initial_interval, Duration::from_millis(500));
        assert_eq!(msg.retry.maximum_attempts, 7);

        let validation = catalog.options(ActivityProfile::Validation);
        assert_eq!(validation.heartbeat_timeout, None);
        assert_eq!(validation.retry.backoff_coefficient, 1.5);

        let long = catalog.options(ActivityProfile::LongRunning);
        assert_eq!(long.schedule_to_close, Some(Duration::from_secs(600)));
        assert_eq!(long.retry.maximum_attempts, 15);
    }

    #[test]
    fn backoff_grows_then_caps() {
        let policy = ActivityProfile::Database.default_options().retry;
        let delays: Vec<u64> = (1..=7).map(|a| policy.backoff_for(a).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30]);
    }

    #[test]
    fn fractional_coefficient_backoff() {
        let policy = ActivityProfile::Validation.default_options().retry;
        assert_eq!(policy.backoff_for(1), Duration::from_secs(1));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(1500));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(2250));
    }

    #[test]
    fn zero_max_attempts_is_unlimited() {
        let mut policy = ActivityProfile::Database.default_options().retry;
        assert!(policy.allows_another(4));
        assert!(!policy.allows_another(5));
        policy.maximum_attempts = 0;
        assert!(policy.allows_another(1_000));
    }
}

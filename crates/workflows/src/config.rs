//! Worker configuration.
//!
//! Loaded from a TOML file, then overridden from the environment:
//!
//! ```toml
//! task_queue = "dict-task-queue"
//! max_concurrent_activities = 200
//! log_format = "json"
//!
//! [scheduler]
//! enabled = true
//! participant_ispb = "60746948"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use dict_domain::Ispb;
use dict_durable::DEFAULT_MAX_CONCURRENT_ACTIVITIES;

use crate::observability::LogFormat;

pub const DEFAULT_TASK_QUEUE: &str = "dict-task-queue";

pub const ENV_TASK_QUEUE: &str = "DICT_TASK_QUEUE";
pub const ENV_MAX_CONCURRENT_ACTIVITIES: &str = "DICT_MAX_CONCURRENT_ACTIVITIES";
pub const ENV_LOG_FORMAT: &str = "DICT_LOG_FORMAT";
pub const ENV_SCHEDULER_ENABLED: &str = "DICT_VSYNC_SCHEDULER_ENABLED";
pub const ENV_SCHEDULER_ISPB: &str = "DICT_VSYNC_PARTICIPANT_ISPB";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse worker config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {var}: {message}")]
    Env { var: &'static str, message: String },

    #[error("invalid worker config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerConfig {
    /// Logical queue name, carried in logs.
    pub task_queue: String,
    pub max_concurrent_activities: usize,
    pub log_format: LogFormat,
    pub scheduler: SchedulerConfig,
}

/// `[scheduler]` section: the daily VSYNC loop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// Participant to reconcile; all participants when unset.
    pub participant_ispb: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            task_queue: DEFAULT_TASK_QUEUE.to_string(),
            max_concurrent_activities: DEFAULT_MAX_CONCURRENT_ACTIVITIES,
            log_format: LogFormat::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl WorkerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Read `path`, apply environment overrides, and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from variables returned by `lookup`.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(queue) = lookup(ENV_TASK_QUEUE) {
            self.task_queue = queue;
        }
        if let Some(raw) = lookup(ENV_MAX_CONCURRENT_ACTIVITIES) {
            self.max_concurrent_activities =
                raw.trim().parse().map_err(|e| ConfigError::Env {
                    var: ENV_MAX_CONCURRENT_ACTIVITIES,
                    message: format!("{raw:?}: {e}"),
                })?;
        }
        if let Some(raw) = lookup(ENV_LOG_FORMAT) {
            self.log_format = raw.parse().map_err(|message| ConfigError::Env {
                var: ENV_LOG_FORMAT,
                message,
            })?;
        }
        if let Some(raw) = lookup(ENV_SCHEDULER_ENABLED) {
            self.scheduler.enabled = parse_bool(&raw).ok_or_else(|| ConfigError::Env {
                var: ENV_SCHEDULER_ENABLED,
                message: format!("expected true or false, got {raw:?}"),
            })?;
        }
        if let Some(raw) = lookup(ENV_SCHEDULER_ISPB) {
            let raw = raw.trim();
            self.scheduler.participant_ispb = (!raw.is_empty()).then(|| raw.to_string());
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.task_queue.trim().is_empty() {
            return Err(ConfigError::Invalid("task_queue must not be empty".to_string()));
        }
        if self.max_concurrent_activities == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_activities must be at least 1".to_string(),
            ));
        }
        self.scheduler.participant()?;
        Ok(())
    }
}

impl SchedulerConfig {
    pub fn participant(&self) -> Result<Option<Ispb>, ConfigError> {
        self.participant_ispb
            .as_deref()
            .map(Ispb::parse)
            .transpose()
            .map_err(|e| ConfigError::Invalid(format!("scheduler.participant_ispb: {e}")))
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.task_queue, "dict-task-queue");
        assert_eq!(config.max_concurrent_activities, 200);
        assert!(!config.scheduler.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_toml() {
        let config = WorkerConfig::from_toml_str(
            r#"
            task_queue = "dict-prod"
            max_concurrent_activities = 50
            log_format = "json"

            [scheduler]
            enabled = true
            participant_ispb = "60746948"
            "#,
        )
        .unwrap();
        assert_eq!(config.task_queue, "dict-prod");
        assert_eq!(config.max_concurrent_activities, 50);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.scheduler.participant().unwrap().unwrap().as_str(),
            "60746948"
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = WorkerConfig::from_toml_str("queue = \"x\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn env_overrides_file() {
        let mut config = WorkerConfig::from_toml_str("max_concurrent_activities = 10").unwrap();
        config
            .apply_env(env(&[
                (ENV_MAX_CONCURRENT_ACTIVITIES, "32"),
                (ENV_LOG_FORMAT, "json"),
                (ENV_SCHEDULER_ENABLED, "yes"),
                (ENV_SCHEDULER_ISPB, ""),
            ]))
            .unwrap();
        assert_eq!(config.max_concurrent_activities, 32);
        assert_eq!(config.log_format, LogFormat::Json);
        assert!(config.scheduler.enabled);
        assert_eq!(config.scheduler.participant_ispb, None);
    }

    #[test]
    fn bad_env_value_names_the_variable() {
        let mut config = WorkerConfig::default();
        let err = config
            .apply_env(env(&[(ENV_MAX_CONCURRENT_ACTIVITIES, "many")]))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_MAX_CONCURRENT_ACTIVITIES));
    }

    #[test]
    fn validate_rejects_zero_concurrency_and_bad_ispb() {
        let mut config = WorkerConfig {
            max_concurrent_activities: 0,
            ..WorkerConfig::default()
        };
        assert!(config.validate().is_err());
        config.max_concurrent_activities = 1;
        config.scheduler.participant_ispb = Some("1234".to_string());
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}

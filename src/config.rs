use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_RETRY_LIMIT: u32 = 3;
pub const DEFAULT_ALERT_TOPIC: &str = "backup-alerts";
pub const DEFAULT_BACKOFF_UNIT: Duration = Duration::from_secs(1);

/// Static settings for a backup handler. Built once and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub project_id: String,
    pub alert_topic: String,
    /// Retries after the initial attempt.
    pub retry_limit: u32,
    /// Retry `n` waits `backoff_unit * 2^n` between initiation and status check.
    pub backoff_unit: Duration,
}

impl Config {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            alert_topic: DEFAULT_ALERT_TOPIC.to_string(),
            retry_limit: DEFAULT_RETRY_LIMIT,
            backoff_unit: DEFAULT_BACKOFF_UNIT,
        }
    }

    pub fn with_alert_topic(mut self, topic: impl Into<String>) -> Self {
        self.alert_topic = topic.into();
        self
    }

    pub fn with_retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.project_id.trim().is_empty() {
            return Err(ConfigError::EmptyProject);
        }
        if self.alert_topic.trim().is_empty() {
            return Err(ConfigError::EmptyAlertTopic);
        }
        Ok(())
    }
}

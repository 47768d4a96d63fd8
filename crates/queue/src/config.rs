//! Job queue configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// Where jobs are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    /// In-process; jobs are lost on restart.
    #[default]
    Memory,
    /// PostgreSQL table.
    Postgres,
}

/// Job queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default)]
    pub backend: QueueBackend,
    /// Connection string, required for the postgres backend
    #[serde(default)]
    pub database_url: Option<String>,
    /// Table holding the jobs
    #[serde(default = "default_table")]
    pub table: String,
    /// Total attempts per job, the first one included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Multiplier applied per further retry
    #[serde(default = "default_backoff_coefficient")]
    pub backoff_coefficient: u32,
    /// Upper bound on the retry delay in milliseconds
    #[serde(default)]
    pub max_backoff_ms: Option<u64>,
    /// How long an idle worker waits before polling again
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Connection pool size
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_table() -> String {
    "analytics_jobs".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    1000
}

fn default_backoff_coefficient() -> u32 {
    2
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_max_connections() -> u32 {
    10
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::default(),
            database_url: None,
            table: default_table(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            backoff_coefficient: default_backoff_coefficient(),
            max_backoff_ms: None,
            poll_interval_ms: default_poll_interval_ms(),
            max_connections: default_max_connections(),
        }
    }
}

impl QueueConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.backoff_coefficient,
            Duration::from_millis(self.initial_backoff_ms),
            self.max_backoff_ms.map(Duration::from_millis),
            self.max_attempts,
        )
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

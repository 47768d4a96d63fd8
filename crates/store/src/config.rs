//! Event store configuration.

use serde::{Deserialize, Serialize};

/// Where events are persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process; events are lost on restart.
    #[default]
    Memory,
    /// PostgreSQL table.
    Postgres,
}

/// Event store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Connection string, required for the postgres backend
    #[serde(default)]
    pub database_url: Option<String>,
    /// Table holding the events
    #[serde(default = "default_table")]
    pub table: String,
    /// Connection pool size
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_table() -> String {
    "events".to_string()
}

fn default_max_connections() -> u32 {
    10
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            database_url: None,
            table: default_table(),
            max_connections: default_max_connections(),
        }
    }
}

//! Event persistence and report aggregation for the analytics pipeline.
//!
//! The store enforces uniqueness of the event natural key; that constraint is
//! the only concurrency control on writes.

use std::sync::Arc;

use async_trait::async_trait;
use pipeline_core::{Event, EventFilter};
use serde::{Deserialize, Serialize};
use tracing::info;

pub mod aggregate;
pub mod config;
pub mod error;
pub mod health;
pub mod memory;
pub mod postgres;

pub use aggregate::ReportingAggregator;
pub use config::*;
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use postgres::PgStore;

/// A path and the number of matching events recorded on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathCount {
    /// `None` for events recorded without a path.
    pub path: Option<String>,
    pub count: u64,
}

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Inserts one event. Fails with [`StoreError::Duplicate`] when the
    /// natural key already exists.
    async fn insert_event(&self, event: &Event) -> StoreResult<()>;

    /// Number of events matching the filter.
    async fn count(&self, filter: &EventFilter) -> StoreResult<u64>;

    /// Distinct user ids among matching events, `None` included when present.
    async fn distinct_users(&self, filter: &EventFilter) -> StoreResult<Vec<Option<String>>>;

    /// Paths ordered by matching event count descending, ties by path.
    async fn top_paths(&self, filter: &EventFilter, limit: usize) -> StoreResult<Vec<PathCount>>;

    async fn ping(&self) -> StoreResult<()>;

    /// Backend name for logs.
    fn backend(&self) -> &'static str;
}

/// Builds the configured store backend, creating its schema when needed.
pub async fn connect(config: &StoreConfig) -> StoreResult<Arc<dyn EventStore>> {
    let store: Arc<dyn EventStore> = match config.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Postgres => {
            let store = PgStore::connect(config).await?;
            store.init_schema().await?;
            Arc::new(store)
        }
    };

    info!(backend = store.backend(), "Event store ready");
    Ok(store)
}

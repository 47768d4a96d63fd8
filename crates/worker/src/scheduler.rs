//! Starts the worker pool and janitor as background tasks.

use std::sync::Arc;
use std::time::Duration;

use event_store::EventStore;
use job_queue::JobQueue;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::janitor::{Janitor, JanitorConfig};
use crate::pool::{PoolConfig, WorkerPool};
use crate::writer::IdempotentWriter;

/// Worker configuration, read from the `worker` config section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Jobs processed at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_janitor_interval_secs")]
    pub janitor_interval_secs: u64,
    /// Lease after which a running job is handed out again
    #[serde(default = "default_stalled_timeout_secs")]
    pub stalled_timeout_secs: u64,
    #[serde(default = "default_completed_retention_secs")]
    pub completed_retention_secs: u64,
}

fn default_concurrency() -> usize {
    50
}

fn default_janitor_interval_secs() -> u64 {
    30
}

fn default_stalled_timeout_secs() -> u64 {
    300
}

fn default_completed_retention_secs() -> u64 {
    86_400
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            janitor_interval_secs: default_janitor_interval_secs(),
            stalled_timeout_secs: default_stalled_timeout_secs(),
            completed_retention_secs: default_completed_retention_secs(),
        }
    }
}

impl WorkerConfig {
    pub fn janitor_config(&self) -> JanitorConfig {
        JanitorConfig {
            interval: Duration::from_secs(self.janitor_interval_secs.max(1)),
            stalled_timeout: Duration::from_secs(self.stalled_timeout_secs),
            completed_retention: Duration::from_secs(self.completed_retention_secs),
        }
    }
}

/// Background worker scheduler.
pub struct WorkerScheduler {
    config: WorkerConfig,
    poll_interval: Duration,
    queue: Arc<dyn JobQueue>,
    store: Arc<dyn EventStore>,
}

impl WorkerScheduler {
    pub fn new(
        config: WorkerConfig,
        poll_interval: Duration,
        queue: Arc<dyn JobQueue>,
        store: Arc<dyn EventStore>,
    ) -> Self {
        Self {
            config,
            poll_interval,
            queue,
            store,
        }
    }

    /// Starts the pool and the janitor. Both stop when `shutdown` flips to true.
    pub fn start(self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        let pool = WorkerPool::new(
            self.queue.clone(),
            Arc::new(IdempotentWriter::new(self.store)),
            PoolConfig {
                concurrency: self.config.concurrency,
                poll_interval: self.poll_interval,
                ..PoolConfig::default()
            },
        );
        let rx = shutdown.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = pool.run(rx).await {
                error!("Worker pool fatal error: {}", e);
            }
        }));

        let janitor = Janitor::new(self.queue, self.config.janitor_config());
        handles.push(tokio::spawn(async move {
            janitor.run(shutdown).await;
        }));

        info!(
            concurrency = self.config.concurrency,
            "Background workers started"
        );
        handles
    }
}

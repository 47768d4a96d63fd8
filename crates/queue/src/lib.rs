//! Durable job queue with retry and backoff for the analytics pipeline.
//!
//! A job is handed to exactly one claimant per attempt. Failed attempts are
//! rescheduled by the queue itself according to a [`RetryPolicy`]; workers
//! never sleep while holding a job.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

pub mod config;
pub mod error;
pub mod health;
pub mod job;
pub mod memory;
pub mod postgres;
pub mod retry;

pub use config::*;
pub use error::{QueueError, QueueResult};
pub use job::*;
pub use memory::MemoryQueue;
pub use postgres::PgQueue;
pub use retry::{RetryDecision, RetryPolicy};

/// Jobs touched by a stalled-job sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StalledJobs {
    /// Made available again with their consumed attempt still counted.
    pub requeued: u64,
    /// Had no attempts left and were terminally failed.
    pub failed: u64,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Durably stores a job. It stays until claimed and acknowledged.
    async fn enqueue(&self, job: NewJob) -> QueueResult<JobId>;

    /// Claims the next available job whose scheduled time has passed,
    /// incrementing its attempt counter.
    async fn claim(&self, worker_id: &str) -> QueueResult<Option<Job>>;

    /// Marks a claimed job as done. It is never redelivered.
    ///
    /// Only the current claim may report: once a job was reclaimed, reports
    /// for an earlier attempt fail with [`QueueError::JobNotFound`].
    async fn complete(&self, job: &Job) -> QueueResult<()>;

    /// Reports a failed attempt; the queue decides between retry and failure.
    async fn fail(&self, job: &Job, error: &str) -> QueueResult<FailureOutcome>;

    async fn stats(&self) -> QueueResult<QueueStats>;

    /// Terminally failed jobs, most useful for inspection.
    async fn failed_jobs(&self, limit: usize) -> QueueResult<Vec<Job>>;

    /// Returns jobs held longer than `timeout` to the queue.
    async fn reset_stalled(&self, timeout: Duration) -> QueueResult<StalledJobs>;

    /// Deletes completed jobs finished more than `older_than` ago.
    async fn purge_completed(&self, older_than: Duration) -> QueueResult<u64>;

    async fn ping(&self) -> QueueResult<()>;

    /// Backend name for logs.
    fn backend(&self) -> &'static str;
}

/// Builds the configured queue backend, creating its schema when needed.
pub async fn connect(config: &QueueConfig) -> QueueResult<Arc<dyn JobQueue>> {
    let queue: Arc<dyn JobQueue> = match config.backend {
        QueueBackend::Memory => Arc::new(MemoryQueue::new(config.retry_policy())),
        QueueBackend::Postgres => {
            let queue = PgQueue::connect(config).await?;
            queue.init_schema().await?;
            Arc::new(queue)
        }
    };

    info!(
        backend = queue.backend(),
        max_attempts = config.max_attempts,
        initial_backoff_ms = config.initial_backoff_ms,
        "Job queue ready"
    );
    Ok(queue)
}

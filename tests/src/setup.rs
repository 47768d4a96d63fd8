//! Common test setup functions.

use std::sync::Arc;
use std::time::Duration;

use api::{router, AppState, IngestionService};
use axum::Router;
use axum_test::TestServer;
use event_store::{EventStore, MemoryStore, ReportingAggregator};
use job_queue::{JobQueue, MemoryQueue, QueueStats, RetryPolicy};
use telemetry::HealthRegistry;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use worker::{IdempotentWriter, PoolConfig, WorkerError, WorkerPool};

/// Retry policy with short waits so retry paths finish quickly.
pub fn fast_retry_policy() -> RetryPolicy {
    RetryPolicy::new(2, Duration::from_millis(10), Some(Duration::from_millis(50)), 3)
}

/// Test context wiring the real router to in-process backends.
///
/// Ingest, worker and reporting run the same production code paths; only
/// the backends are swapped for memory or mock implementations.
pub struct TestContext {
    pub queue: Arc<dyn JobQueue>,
    pub store: Arc<dyn EventStore>,
    pub health: Arc<HealthRegistry>,
    pub router: Router,
}

impl TestContext {
    /// Memory queue with fast retries and an empty memory store.
    pub fn new() -> Self {
        Self::with_backends(
            Arc::new(MemoryQueue::new(fast_retry_policy())),
            Arc::new(MemoryStore::new()),
        )
    }

    pub fn with_store(store: Arc<dyn EventStore>) -> Self {
        Self::with_backends(Arc::new(MemoryQueue::new(fast_retry_policy())), store)
    }

    pub fn with_backends(queue: Arc<dyn JobQueue>, store: Arc<dyn EventStore>) -> Self {
        let health = Arc::new(HealthRegistry::new());
        health.queue.set_healthy();
        health.store.set_healthy();

        let state = AppState::new(
            IngestionService::new(queue.clone()),
            ReportingAggregator::new(store.clone()),
            health.clone(),
        );

        Self {
            queue,
            store,
            health,
            router: router(state),
        }
    }

    pub fn server(&self) -> TestServer {
        TestServer::new(self.router.clone()).expect("Failed to create test server")
    }

    /// Starts a worker pool writing to the context's store.
    pub fn start_workers(&self, concurrency: usize) -> RunningWorkers {
        let pool = WorkerPool::new(
            self.queue.clone(),
            Arc::new(IdempotentWriter::new(self.store.clone())),
            PoolConfig {
                worker_id: "integration-worker".into(),
                concurrency,
                poll_interval: Duration::from_millis(5),
            },
        );
        let (shutdown, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { pool.run(rx).await });

        RunningWorkers { shutdown, handle }
    }

    /// Waits until `total` jobs reached a terminal state.
    pub async fn wait_until_settled(&self, total: u64) -> QueueStats {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let stats = self.queue.stats().await.expect("Failed to read queue stats");
            if stats.completed + stats.failed >= total {
                return stats;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "queue did not settle: {:?}",
                stats
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle on a pool started by [`TestContext::start_workers`].
pub struct RunningWorkers {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<Result<(), WorkerError>>,
}

impl RunningWorkers {
    /// Signals shutdown and waits for in-flight jobs to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        self.handle
            .await
            .expect("worker pool panicked")
            .expect("worker pool failed");
    }
}

//! Bounded-concurrency worker pool.
//!
//! A slot permit is taken before the queue is polled, so a claimed job always
//! has a slot to run in and in-flight work never exceeds the pool size.

use std::sync::Arc;
use std::time::{Duration, Instant};

use job_queue::{FailureOutcome, Job, JobQueue};
use telemetry::metrics;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

use crate::error::WorkerError;
use crate::writer::{JobProcessor, WriteOutcome};

/// Worker pool settings.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Identifier recorded on claimed jobs
    pub worker_id: String,
    /// Maximum jobs processed at once
    pub concurrency: usize,
    /// Wait between polls of an empty queue
    pub poll_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", uuid::Uuid::new_v4()),
            concurrency: 50,
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Claims jobs and runs them on independent tasks, one slot each.
pub struct WorkerPool {
    queue: Arc<dyn JobQueue>,
    processor: Arc<dyn JobProcessor>,
    config: PoolConfig,
    slots: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        processor: Arc<dyn JobProcessor>,
        config: PoolConfig,
    ) -> Self {
        let concurrency = config.concurrency.max(1);
        Self {
            queue,
            processor,
            slots: Arc::new(Semaphore::new(concurrency)),
            config: PoolConfig {
                concurrency,
                ..config
            },
        }
    }

    pub fn concurrency(&self) -> usize {
        self.config.concurrency
    }

    /// Free slots right now.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Runs until `shutdown` flips to true, then waits for in-flight jobs.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), WorkerError> {
        info!(
            worker_id = %self.config.worker_id,
            concurrency = self.config.concurrency,
            backend = self.queue.backend(),
            "Worker pool starting"
        );

        loop {
            let permit = tokio::select! {
                _ = stopped(&mut shutdown) => break,
                permit = self.slots.clone().acquire_owned() => {
                    permit.map_err(|_| WorkerError::PoolClosed)?
                }
            };

            let job = tokio::select! {
                _ = stopped(&mut shutdown) => break,
                job = self.wait_for_job() => job,
            };

            self.spawn_job(job, permit);
        }

        info!(worker_id = %self.config.worker_id, "Worker pool draining");
        self.drain().await;
        info!(worker_id = %self.config.worker_id, "Worker pool stopped");
        Ok(())
    }

    /// Waits until every slot is free again.
    pub async fn drain(&self) {
        let all = u32::try_from(self.config.concurrency).unwrap_or(u32::MAX);
        if let Ok(permits) = self.slots.acquire_many(all).await {
            drop(permits);
        }
    }

    /// Polls until a job is claimed. Queue errors are logged and retried.
    async fn wait_for_job(&self) -> Job {
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            match self.queue.claim(&self.config.worker_id).await {
                Ok(Some(job)) => return job,
                Ok(None) => {}
                Err(e) => error!(worker_id = %self.config.worker_id, "Failed to claim job: {}", e),
            }
        }
    }

    fn spawn_job(&self, job: Job, permit: OwnedSemaphorePermit) {
        let queue = self.queue.clone();
        let processor = self.processor.clone();

        metrics().jobs_claimed.inc();
        metrics().jobs_in_flight.inc();

        tokio::spawn(async move {
            process_job(queue.as_ref(), processor.as_ref(), job).await;
            metrics().jobs_in_flight.dec();
            drop(permit);
        });
    }
}

/// Runs one attempt and reports its result to the queue.
async fn process_job(queue: &dyn JobQueue, processor: &dyn JobProcessor, job: Job) {
    let start = Instant::now();
    let result = processor.process(&job).await;
    metrics()
        .write_latency_ms
        .observe(start.elapsed().as_millis() as u64);

    match result {
        Ok(outcome) => {
            if outcome == WriteOutcome::Duplicate {
                metrics().jobs_duplicate.inc();
            }
            match queue.complete(&job).await {
                Ok(()) => {
                    metrics().jobs_completed.inc();
                    debug!(job_id = %job.id, attempt = job.attempt, "Job completed");
                }
                // The lease is reclaimed later; the redelivery is absorbed as a duplicate
                Err(e) => error!(job_id = %job.id, "Failed to complete job: {}", e),
            }
        }
        Err(write_error) => match queue.fail(&job, &write_error.to_string()).await {
            Ok(FailureOutcome::Retrying { delay }) => {
                metrics().jobs_retried.inc();
                warn!(
                    job_id = %job.id,
                    attempt = job.attempt,
                    max_attempts = job.max_attempts,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %write_error,
                    "Job attempt failed, retrying"
                );
            }
            Ok(FailureOutcome::Failed) => {
                metrics().jobs_failed.inc();
                error!(
                    job_id = %job.id,
                    attempts = job.attempt,
                    error = %write_error,
                    "Job failed permanently"
                );
            }
            Err(e) => error!(job_id = %job.id, "Failed to report job failure: {}", e),
        },
    }
}

/// Resolves once shutdown is requested or the sender is gone.
pub(crate) async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

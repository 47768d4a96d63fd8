//! Periodic queue housekeeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use job_queue::{JobQueue, QueueError, QueueStats};
use telemetry::metrics;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::pool::stopped;

/// Failed jobs logged per alert.
const FAILED_SAMPLE: usize = 5;

#[derive(Debug, Clone)]
pub struct JanitorConfig {
    pub interval: Duration,
    /// Running jobs older than this are considered abandoned
    pub stalled_timeout: Duration,
    /// Completed jobs are deleted after this long
    pub completed_retention: Duration,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            stalled_timeout: Duration::from_secs(300),
            completed_retention: Duration::from_secs(86_400),
        }
    }
}

/// Result of one janitor pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JanitorReport {
    pub requeued: u64,
    pub stalled_failed: u64,
    pub purged: u64,
    /// Terminal failures since the previous pass
    pub new_failures: u64,
    pub stats: QueueStats,
}

pub struct Janitor {
    queue: Arc<dyn JobQueue>,
    config: JanitorConfig,
    seen_failed: AtomicU64,
}

impl Janitor {
    pub fn new(queue: Arc<dyn JobQueue>, config: JanitorConfig) -> Self {
        Self {
            queue,
            config,
            seen_failed: AtomicU64::new(0),
        }
    }

    /// Runs a pass every interval until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = stopped(&mut shutdown) => break,
                _ = ticker.tick() => {}
            }

            if let Err(e) = self.run_once().await {
                error!("Janitor pass failed: {}", e);
            }
        }
        info!("Janitor stopped");
    }

    pub async fn run_once(&self) -> Result<JanitorReport, QueueError> {
        let stalled = self.queue.reset_stalled(self.config.stalled_timeout).await?;
        if stalled.requeued > 0 || stalled.failed > 0 {
            warn!(
                requeued = stalled.requeued,
                failed = stalled.failed,
                "Reclaimed stalled jobs"
            );
        }
        metrics().jobs_reclaimed.inc_by(stalled.requeued);
        metrics().jobs_failed.inc_by(stalled.failed);

        let purged = self
            .queue
            .purge_completed(self.config.completed_retention)
            .await?;

        let stats = self.queue.stats().await?;
        metrics().queue_available.set(stats.available);
        metrics().queue_failed.set(stats.failed);

        // Purging never touches failed jobs, so the count only grows
        let previous = self.seen_failed.swap(stats.failed, Ordering::Relaxed);
        let new_failures = stats.failed.saturating_sub(previous);
        if new_failures > 0 {
            self.alert_failures(new_failures, stats.failed).await;
        }

        let snapshot = metrics().snapshot();
        info!(
            available = stats.available,
            running = stats.running,
            failed = stats.failed,
            purged,
            jobs_completed = snapshot.jobs_completed,
            jobs_duplicate = snapshot.jobs_duplicate,
            jobs_retried = snapshot.jobs_retried,
            write_latency_mean_ms = snapshot.write_latency_mean_ms,
            "Queue status"
        );

        Ok(JanitorReport {
            requeued: stalled.requeued,
            stalled_failed: stalled.failed,
            purged,
            new_failures,
            stats,
        })
    }

    async fn alert_failures(&self, new_failures: u64, total: u64) {
        error!(new_failures, total, "Jobs failed permanently");

        match self.queue.failed_jobs(FAILED_SAMPLE).await {
            Ok(jobs) => {
                for job in jobs {
                    error!(
                        job_id = %job.id,
                        attempts = job.attempt,
                        last_error = job.last_error.as_deref().unwrap_or(""),
                        "Failed job"
                    );
                }
            }
            Err(e) => error!("Failed to list failed jobs: {}", e),
        }
    }
}

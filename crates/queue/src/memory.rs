//! In-process job queue.
//!
//! Jobs live in a mutex-guarded map and are lost when the process exits. Used
//! for development and tests; scheduling runs on tokio's clock so backoff
//! can be driven with paused time.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{QueueError, QueueResult};
use crate::job::{FailureOutcome, Job, JobId, JobStatus, NewJob, QueueStats};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::{JobQueue, StalledJobs};

#[derive(Debug)]
struct Record {
    job: Job,
    ready_at: Instant,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
    locked_by: Option<String>,
}

#[derive(Debug)]
pub struct MemoryQueue {
    records: Mutex<BTreeMap<JobId, Record>>,
    next_id: AtomicI64,
    policy: RetryPolicy,
}

impl MemoryQueue {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
            policy,
        }
    }

    /// Snapshot of a job, for inspection in tests and tooling.
    pub fn get(&self, id: JobId) -> Option<Job> {
        self.records.lock().get(&id).map(|r| r.job.clone())
    }

    /// Worker currently holding the job, if any.
    pub fn locked_by(&self, id: JobId) -> Option<String> {
        self.records.lock().get(&id).and_then(|r| r.locked_by.clone())
    }
}

impl Record {
    /// Whether `job` is the live claim on this record. Every claim bumps the
    /// attempt, so a reclaimed job no longer matches its earlier holder.
    fn holds_claim(&self, job: &Job) -> bool {
        self.job.status == JobStatus::Running && self.job.attempt == job.attempt
    }
}

/// `since + age <= now`, never true when the sum overflows the clock.
fn elapsed(since: Instant, age: Duration, now: Instant) -> bool {
    since.checked_add(age).is_some_and(|deadline| deadline <= now)
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

/// Wall-clock time `delay` from now, for display on the job record.
fn scheduled_after(delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| Utc::now().checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, new_job: NewJob) -> QueueResult<JobId> {
        let id = JobId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let now = Utc::now();
        let job = Job {
            id,
            job_type: new_job.job_type,
            payload: new_job.payload,
            attempt: 0,
            max_attempts: new_job
                .max_attempts
                .unwrap_or_else(|| self.policy.max_attempts()),
            status: JobStatus::Available,
            created_at: now,
            scheduled_at: now,
            last_error: None,
        };

        self.records.lock().insert(
            id,
            Record {
                job,
                ready_at: Instant::now(),
                started_at: None,
                finished_at: None,
                locked_by: None,
            },
        );
        debug!(job_id = %id, "Job enqueued");
        Ok(id)
    }

    async fn claim(&self, worker_id: &str) -> QueueResult<Option<Job>> {
        let now = Instant::now();
        let mut records = self.records.lock();

        let next = records
            .values_mut()
            .filter(|r| r.job.status == JobStatus::Available && r.ready_at <= now)
            .min_by_key(|r| (r.ready_at, r.job.id));

        Ok(next.map(|record| {
            record.job.status = JobStatus::Running;
            record.job.attempt += 1;
            record.started_at = Some(now);
            record.locked_by = Some(worker_id.to_string());
            record.job.clone()
        }))
    }

    async fn complete(&self, job: &Job) -> QueueResult<()> {
        let mut records = self.records.lock();
        let record = records
            .get_mut(&job.id)
            .filter(|r| r.holds_claim(job))
            .ok_or(QueueError::JobNotFound(job.id))?;

        record.job.status = JobStatus::Completed;
        record.finished_at = Some(Instant::now());
        record.locked_by = None;
        Ok(())
    }

    async fn fail(&self, job: &Job, error: &str) -> QueueResult<FailureOutcome> {
        let now = Instant::now();
        let mut records = self.records.lock();
        let record = records
            .get_mut(&job.id)
            .filter(|r| r.holds_claim(job))
            .ok_or(QueueError::JobNotFound(job.id))?;

        record.job.last_error = Some(error.to_string());
        record.locked_by = None;
        record.started_at = None;

        match self
            .policy
            .decide(record.job.attempt, record.job.max_attempts)
        {
            RetryDecision::Retry(delay) => {
                record.job.status = JobStatus::Available;
                record.job.scheduled_at = scheduled_after(delay);
                record.ready_at = now + delay.min(MAX_DELAY);
                Ok(FailureOutcome::Retrying { delay })
            }
            RetryDecision::GiveUp => {
                record.job.status = JobStatus::Failed;
                record.finished_at = Some(now);
                Ok(FailureOutcome::Failed)
            }
        }
    }

    async fn stats(&self) -> QueueResult<QueueStats> {
        let records = self.records.lock();
        let mut stats = QueueStats::default();
        for record in records.values() {
            match record.job.status {
                JobStatus::Available => stats.available += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }

    async fn failed_jobs(&self, limit: usize) -> QueueResult<Vec<Job>> {
        Ok(self
            .records
            .lock()
            .values()
            .filter(|r| r.job.status == JobStatus::Failed)
            .take(limit)
            .map(|r| r.job.clone())
            .collect())
    }

    async fn reset_stalled(&self, timeout: Duration) -> QueueResult<StalledJobs> {
        let now = Instant::now();
        let mut stalled = StalledJobs::default();

        for record in self.records.lock().values_mut() {
            let expired = record.job.status == JobStatus::Running
                && record.started_at.is_some_and(|t| elapsed(t, timeout, now));
            if !expired {
                continue;
            }

            record.locked_by = None;
            record.started_at = None;
            if record.job.has_attempts_remaining() {
                record.job.status = JobStatus::Available;
                record.job.scheduled_at = Utc::now();
                record.ready_at = now;
                stalled.requeued += 1;
            } else {
                warn!(job_id = %record.job.id, "Stalled job has no attempts left");
                record.job.status = JobStatus::Failed;
                record.job.last_error = Some(STALLED_ERROR.to_string());
                record.finished_at = Some(now);
                stalled.failed += 1;
            }
        }

        Ok(stalled)
    }

    async fn purge_completed(&self, older_than: Duration) -> QueueResult<u64> {
        let now = Instant::now();
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|_, r| {
            !(r.job.status == JobStatus::Completed
                && r.finished_at.is_some_and(|t| elapsed(t, older_than, now)))
        });
        Ok((before - records.len()) as u64)
    }

    async fn ping(&self) -> QueueResult<()> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// Longest delay the tokio clock is asked to schedule.
const MAX_DELAY: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Error recorded on jobs whose lease expired with no attempts left.
pub(crate) const STALLED_ERROR: &str = "lease expired while running";

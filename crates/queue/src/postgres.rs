//! # PgQueue
//!
//! A job queue backed by a PostgreSQL table. Claims use `FOR UPDATE SKIP LOCKED`
//! so concurrent workers never receive the same job; retries are scheduled by
//! moving `scheduled_at` forward.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info};

use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};
use crate::job::{FailureOutcome, Job, JobId, JobStatus, NewJob, QueueStats};
use crate::memory::STALLED_ERROR;
use crate::retry::{RetryDecision, RetryPolicy};
use crate::{JobQueue, StalledJobs};

const JOB_COLUMNS: &str =
    "id, job_type, payload, status, attempt, max_attempts, created_at, scheduled_at, last_error";

/// SQL text for one queue table.
#[derive(Debug)]
struct Statements {
    schema: Vec<String>,
    enqueue: String,
    claim: String,
    complete: String,
    retry: String,
    fail: String,
    stats: String,
    failed_jobs: String,
    fail_stalled: String,
    requeue_stalled: String,
    purge_completed: String,
}

impl Statements {
    fn new(table: &str) -> Self {
        Self {
            schema: vec![
                format!(
                    r#"
CREATE TABLE IF NOT EXISTS {table} (
    id BIGSERIAL PRIMARY KEY,
    job_type TEXT NOT NULL,
    payload JSONB NOT NULL,
    status TEXT NOT NULL DEFAULT 'available',
    attempt INTEGER NOT NULL DEFAULT 0,
    max_attempts INTEGER NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    scheduled_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    started_at TIMESTAMPTZ,
    finished_at TIMESTAMPTZ,
    locked_by TEXT,
    last_error TEXT
)"#
                ),
                format!(
                    "CREATE INDEX IF NOT EXISTS {table}_available_idx ON {table} (scheduled_at) WHERE status = 'available'"
                ),
                format!(
                    "CREATE INDEX IF NOT EXISTS {table}_status_idx ON {table} (status)"
                ),
            ],
            enqueue: format!(
                "INSERT INTO {table} (job_type, payload, max_attempts) VALUES ($1, $2, $3) RETURNING id"
            ),
            claim: format!(
                r#"
WITH next_job AS (
    SELECT id
    FROM {table}
    WHERE status = 'available' AND scheduled_at <= NOW()
    ORDER BY scheduled_at, id
    LIMIT 1
    FOR UPDATE SKIP LOCKED
)
UPDATE {table}
SET
    status = 'running',
    attempt = {table}.attempt + 1,
    started_at = NOW(),
    locked_by = $1
FROM next_job
WHERE {table}.id = next_job.id
RETURNING {returning}"#,
                returning = JOB_COLUMNS
                    .split(", ")
                    .map(|c| format!("{table}.{c}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            complete: format!(
                r#"
UPDATE {table}
SET status = 'completed', finished_at = NOW(), locked_by = NULL
WHERE id = $1 AND status = 'running' AND attempt = $2"#
            ),
            retry: format!(
                r#"
UPDATE {table}
SET
    status = 'available',
    scheduled_at = NOW() + $2::double precision * INTERVAL '1 millisecond',
    last_error = $3,
    started_at = NULL,
    locked_by = NULL
WHERE id = $1 AND status = 'running' AND attempt = $4"#
            ),
            fail: format!(
                r#"
UPDATE {table}
SET status = 'failed', finished_at = NOW(), last_error = $2, locked_by = NULL
WHERE id = $1 AND status = 'running' AND attempt = $3"#
            ),
            stats: format!("SELECT status, COUNT(*) AS count FROM {table} GROUP BY status"),
            failed_jobs: format!(
                "SELECT {JOB_COLUMNS} FROM {table} WHERE status = 'failed' ORDER BY finished_at DESC, id DESC LIMIT $1"
            ),
            fail_stalled: format!(
                r#"
UPDATE {table}
SET status = 'failed', finished_at = NOW(), last_error = $2, started_at = NULL, locked_by = NULL
WHERE status = 'running'
    AND started_at <= NOW() - $1::double precision * INTERVAL '1 millisecond'
    AND attempt >= max_attempts"#
            ),
            requeue_stalled: format!(
                r#"
UPDATE {table}
SET status = 'available', scheduled_at = NOW(), started_at = NULL, locked_by = NULL
WHERE status = 'running'
    AND started_at <= NOW() - $1::double precision * INTERVAL '1 millisecond'
    AND attempt < max_attempts"#
            ),
            purge_completed: format!(
                r#"
DELETE FROM {table}
WHERE status = 'completed'
    AND finished_at <= NOW() - $1::double precision * INTERVAL '1 millisecond'"#
            ),
        }
    }
}

/// A job queue stored in PostgreSQL.
#[derive(Debug, Clone)]
pub struct PgQueue {
    pool: PgPool,
    policy: RetryPolicy,
    statements: std::sync::Arc<Statements>,
}

impl PgQueue {
    /// Connects using `config.database_url`.
    pub async fn connect(config: &QueueConfig) -> QueueResult<Self> {
        let url = config.database_url.as_deref().ok_or_else(|| {
            QueueError::Config("database_url is required for the postgres backend".into())
        })?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await
            .map_err(QueueError::Connection)?;

        Self::from_pool(pool, config)
    }

    /// Builds a queue over an existing pool.
    pub fn from_pool(pool: PgPool, config: &QueueConfig) -> QueueResult<Self> {
        validate_identifier(&config.table)?;
        Ok(Self {
            pool,
            policy: config.retry_policy(),
            statements: std::sync::Arc::new(Statements::new(&config.table)),
        })
    }

    /// Creates the queue table and its indexes if missing.
    pub async fn init_schema(&self) -> QueueResult<()> {
        for statement in &self.statements.schema {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(QueueError::query("CREATE"))?;
        }
        info!("Job queue schema ready");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Table names are interpolated into SQL, so only plain identifiers pass.
fn validate_identifier(name: &str) -> QueueResult<()> {
    let valid = !name.is_empty()
        && name.len() <= 63
        && name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(QueueError::Config(format!("invalid table name: {}", name)))
    }
}

/// Claim generation a report applies to; a reclaimed job has moved past it.
fn attempt(job: &Job) -> i32 {
    i32::try_from(job.attempt).unwrap_or(i32::MAX)
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

fn decode_job(row: &PgRow) -> QueueResult<Job> {
    let decode = |e: sqlx::Error| QueueError::Decode(e.to_string());

    let status: String = row.try_get("status").map_err(decode)?;
    let attempt: i32 = row.try_get("attempt").map_err(decode)?;
    let max_attempts: i32 = row.try_get("max_attempts").map_err(decode)?;

    Ok(Job {
        id: JobId(row.try_get("id").map_err(decode)?),
        job_type: row.try_get("job_type").map_err(decode)?,
        payload: row.try_get::<Value, _>("payload").map_err(decode)?,
        attempt: attempt.max(0) as u32,
        max_attempts: max_attempts.max(0) as u32,
        status: status.parse()?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(decode)?,
        scheduled_at: row
            .try_get::<DateTime<Utc>, _>("scheduled_at")
            .map_err(decode)?,
        last_error: row.try_get("last_error").map_err(decode)?,
    })
}

#[async_trait]
impl JobQueue for PgQueue {
    async fn enqueue(&self, new_job: NewJob) -> QueueResult<JobId> {
        let max_attempts = new_job
            .max_attempts
            .unwrap_or_else(|| self.policy.max_attempts());

        let id: i64 = sqlx::query_scalar(&self.statements.enqueue)
            .bind(&new_job.job_type)
            .bind(&new_job.payload)
            .bind(i32::try_from(max_attempts).unwrap_or(i32::MAX))
            .fetch_one(&self.pool)
            .await
            .map_err(QueueError::query("INSERT"))?;

        debug!(job_id = id, "Job enqueued");
        Ok(JobId(id))
    }

    async fn claim(&self, worker_id: &str) -> QueueResult<Option<Job>> {
        let row = sqlx::query(&self.statements.claim)
            .bind(worker_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(QueueError::query("UPDATE"))?;

        row.as_ref().map(decode_job).transpose()
    }

    async fn complete(&self, job: &Job) -> QueueResult<()> {
        let result = sqlx::query(&self.statements.complete)
            .bind(job.id.0)
            .bind(attempt(job))
            .execute(&self.pool)
            .await
            .map_err(QueueError::query("UPDATE"))?;

        if result.rows_affected() == 0 {
            return Err(QueueError::JobNotFound(job.id));
        }
        Ok(())
    }

    async fn fail(&self, job: &Job, error: &str) -> QueueResult<FailureOutcome> {
        let (outcome, result) = match self.policy.decide(job.attempt, job.max_attempts) {
            RetryDecision::Retry(delay) => {
                let result = sqlx::query(&self.statements.retry)
                    .bind(job.id.0)
                    .bind(millis(delay))
                    .bind(error)
                    .bind(attempt(job))
                    .execute(&self.pool)
                    .await;
                (FailureOutcome::Retrying { delay }, result)
            }
            RetryDecision::GiveUp => {
                let result = sqlx::query(&self.statements.fail)
                    .bind(job.id.0)
                    .bind(error)
                    .bind(attempt(job))
                    .execute(&self.pool)
                    .await;
                (FailureOutcome::Failed, result)
            }
        };

        let result = result.map_err(QueueError::query("UPDATE"))?;
        if result.rows_affected() == 0 {
            return Err(QueueError::JobNotFound(job.id));
        }
        Ok(outcome)
    }

    async fn stats(&self) -> QueueResult<QueueStats> {
        let rows = sqlx::query(&self.statements.stats)
            .fetch_all(&self.pool)
            .await
            .map_err(QueueError::query("SELECT"))?;

        let mut stats = QueueStats::default();
        for row in rows {
            let status: String = row
                .try_get("status")
                .map_err(|e| QueueError::Decode(e.to_string()))?;
            let count: i64 = row
                .try_get("count")
                .map_err(|e| QueueError::Decode(e.to_string()))?;
            let count = count.max(0) as u64;

            match status.parse()? {
                JobStatus::Available => stats.available = count,
                JobStatus::Running => stats.running = count,
                JobStatus::Completed => stats.completed = count,
                JobStatus::Failed => stats.failed = count,
            }
        }
        Ok(stats)
    }

    async fn failed_jobs(&self, limit: usize) -> QueueResult<Vec<Job>> {
        let rows = sqlx::query(&self.statements.failed_jobs)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(QueueError::query("SELECT"))?;

        rows.iter().map(decode_job).collect()
    }

    async fn reset_stalled(&self, timeout: Duration) -> QueueResult<StalledJobs> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(QueueError::query("BEGIN"))?;

        let failed = sqlx::query(&self.statements.fail_stalled)
            .bind(millis(timeout))
            .bind(STALLED_ERROR)
            .execute(&mut *tx)
            .await
            .map_err(QueueError::query("UPDATE"))?
            .rows_affected();

        let requeued = sqlx::query(&self.statements.requeue_stalled)
            .bind(millis(timeout))
            .execute(&mut *tx)
            .await
            .map_err(QueueError::query("UPDATE"))?
            .rows_affected();

        tx.commit().await.map_err(QueueError::query("COMMIT"))?;

        Ok(StalledJobs { requeued, failed })
    }

    async fn purge_completed(&self, older_than: Duration) -> QueueResult<u64> {
        let result = sqlx::query(&self.statements.purge_completed)
            .bind(millis(older_than))
            .execute(&self.pool)
            .await
            .map_err(QueueError::query("DELETE"))?;

        Ok(result.rows_affected())
    }

    async fn ping(&self) -> QueueResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(QueueError::query("SELECT"))?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

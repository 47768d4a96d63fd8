//! PostgreSQL event store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pipeline_core::{Event, EventFilter};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use tracing::info;

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::{EventStore, PathCount};

/// Every aggregate query narrows on the same four parameters.
const FILTER: &str = r#"site_id = $1
    AND event_type = $2
    AND ($3::timestamptz IS NULL OR "timestamp" >= $3)
    AND ($4::timestamptz IS NULL OR "timestamp" < $4)"#;

#[derive(Debug)]
struct Statements {
    schema: Vec<String>,
    natural_key: String,
    insert: String,
    count: String,
    distinct_users: String,
    top_paths: String,
}

impl Statements {
    fn new(table: &str) -> Self {
        let natural_key = format!("{table}_natural_key");
        Self {
            schema: vec![
                // NULLS NOT DISTINCT needs PostgreSQL 15
                format!(
                    r#"
CREATE TABLE IF NOT EXISTS {table} (
    id BIGSERIAL PRIMARY KEY,
    site_id TEXT NOT NULL,
    event_type TEXT NOT NULL,
    "timestamp" TIMESTAMPTZ NOT NULL,
    path TEXT,
    user_id TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CONSTRAINT {natural_key} UNIQUE NULLS NOT DISTINCT (site_id, event_type, "timestamp", path, user_id)
)"#
                ),
                format!(
                    r#"CREATE INDEX IF NOT EXISTS {table}_report_idx ON {table} (site_id, event_type, "timestamp")"#
                ),
            ],
            insert: format!(
                r#"INSERT INTO {table} (site_id, event_type, "timestamp", path, user_id) VALUES ($1, $2, $3, $4, $5)"#
            ),
            count: format!("SELECT COUNT(*) FROM {table} WHERE {FILTER}"),
            distinct_users: format!("SELECT DISTINCT user_id FROM {table} WHERE {FILTER}"),
            top_paths: format!(
                r#"
SELECT path, COUNT(*) AS views
FROM {table}
WHERE {FILTER}
GROUP BY path
ORDER BY views DESC, path ASC NULLS LAST
LIMIT $5"#
            ),
            natural_key,
        }
    }
}

/// Events stored in a PostgreSQL table.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    statements: Arc<Statements>,
}

impl PgStore {
    /// Connects using `config.database_url`.
    pub async fn connect(config: &StoreConfig) -> StoreResult<Self> {
        let url = config.database_url.as_deref().ok_or_else(|| {
            StoreError::Config("database_url is required for the postgres backend".into())
        })?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await
            .map_err(StoreError::Connection)?;

        Self::from_pool(pool, config)
    }

    /// Builds a store over an existing pool.
    pub fn from_pool(pool: PgPool, config: &StoreConfig) -> StoreResult<Self> {
        if !is_identifier(&config.table) {
            return Err(StoreError::Config(format!(
                "invalid table name: {}",
                config.table
            )));
        }
        Ok(Self {
            pool,
            statements: Arc::new(Statements::new(&config.table)),
        })
    }

    /// Creates the events table and its indexes if missing.
    pub async fn init_schema(&self) -> StoreResult<()> {
        for statement in &self.statements.schema {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(StoreError::query("CREATE"))?;
        }
        info!("Event store schema ready");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn is_natural_key_violation(&self, err: &sqlx::Error) -> bool {
        match err {
            sqlx::Error::Database(db_err) => {
                db_err.is_unique_violation()
                    && db_err.constraint() == Some(self.statements.natural_key.as_str())
            }
            _ => false,
        }
    }
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 48
        && name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn window_bounds(filter: &EventFilter) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    match filter.window {
        Some(window) => (Some(window.start), Some(window.end)),
        None => (None, None),
    }
}

#[async_trait]
impl EventStore for PgStore {
    async fn insert_event(&self, event: &Event) -> StoreResult<()> {
        let result = sqlx::query(&self.statements.insert)
            .bind(&event.site_id)
            .bind(&event.event_type)
            .bind(event.timestamp)
            .bind(&event.path)
            .bind(&event.user_id)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if self.is_natural_key_violation(&e) => Err(StoreError::Duplicate),
            Err(e) => Err(StoreError::query("INSERT")(e)),
        }
    }

    async fn count(&self, filter: &EventFilter) -> StoreResult<u64> {
        let (start, end) = window_bounds(filter);
        let count: i64 = sqlx::query_scalar(&self.statements.count)
            .bind(&filter.site_id)
            .bind(&filter.event_type)
            .bind(start)
            .bind(end)
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::query("SELECT"))?;

        Ok(count.max(0) as u64)
    }

    async fn distinct_users(&self, filter: &EventFilter) -> StoreResult<Vec<Option<String>>> {
        let (start, end) = window_bounds(filter);
        sqlx::query_scalar(&self.statements.distinct_users)
            .bind(&filter.site_id)
            .bind(&filter.event_type)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::query("SELECT"))
    }

    async fn top_paths(&self, filter: &EventFilter, limit: usize) -> StoreResult<Vec<PathCount>> {
        let (start, end) = window_bounds(filter);
        let rows = sqlx::query(&self.statements.top_paths)
            .bind(&filter.site_id)
            .bind(&filter.event_type)
            .bind(start)
            .bind(end)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::query("SELECT"))?;

        rows.iter()
            .map(|row| {
                let path: Option<String> = row.try_get("path").map_err(StoreError::query("SELECT"))?;
                let views: i64 = row.try_get("views").map_err(StoreError::query("SELECT"))?;
                Ok(PathCount {
                    path,
                    count: views.max(0) as u64,
                })
            })
            .collect()
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(StoreError::query("SELECT"))?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

//! Tests against a real PostgreSQL.
//!
//! Requires Docker to be running for testcontainers, or
//! `PIPELINE_TEST_DATABASE_URL` pointing at a PostgreSQL 15+ database.
//! Run with `cargo test -p integration-tests --test postgres -- --ignored`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use chrono::{TimeZone, Utc};
use event_store::{EventStore, PgStore, ReportingAggregator, StoreBackend, StoreConfig};
use integration_tests::containers::TestDatabase;
use integration_tests::fixtures::{home_page_view, march_first_traffic};
use integration_tests::setup::TestContext;
use job_queue::{
    FailureOutcome, JobQueue, JobStatus, NewJob, PgQueue, QueueBackend, QueueConfig, QueueError,
};
use pipeline_core::{validate_event, Event, ReportQuery, UNKNOWN_PATH};
use serde_json::json;

async fn queue(db: &TestDatabase, table: &str) -> PgQueue {
    let config = QueueConfig {
        backend: QueueBackend::Postgres,
        table: table.to_string(),
        initial_backoff_ms: 50,
        ..QueueConfig::default()
    };
    let queue = PgQueue::from_pool(db.pool.clone(), &config).expect("Failed to build queue");
    queue.init_schema().await.expect("Failed to create queue schema");
    queue
}

async fn store(db: &TestDatabase, table: &str) -> PgStore {
    let config = StoreConfig {
        backend: StoreBackend::Postgres,
        table: table.to_string(),
        ..StoreConfig::default()
    };
    let store = PgStore::from_pool(db.pool.clone(), &config).expect("Failed to build store");
    store.init_schema().await.expect("Failed to create store schema");
    store
}

fn anonymous_page_view() -> Event {
    Event {
        site_id: "s1".into(),
        event_type: "page_view".into(),
        timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
        path: None,
        user_id: None,
    }
}

/// Concurrent claimants never receive the same job
#[tokio::test]
#[ignore]
async fn test_claims_are_exclusive() {
    let db = TestDatabase::start().await;
    let queue = Arc::new(queue(&db, "jobs_exclusive").await);

    for i in 0..30 {
        queue
            .enqueue(NewJob::new("analytics-event", json!({ "n": i })))
            .await
            .unwrap();
    }

    let mut tasks = Vec::new();
    for w in 0..6 {
        let queue = queue.clone();
        tasks.push(tokio::spawn(async move {
            let worker_id = format!("w{}", w);
            let mut ids = Vec::new();
            while let Some(job) = queue.claim(&worker_id).await.unwrap() {
                assert_eq!(job.attempt, 1);
                ids.push(job.id);
            }
            ids
        }));
    }

    let mut claimed = Vec::new();
    for task in tasks {
        claimed.extend(task.await.unwrap());
    }
    let unique: HashSet<_> = claimed.iter().copied().collect();
    assert_eq!(claimed.len(), 30);
    assert_eq!(unique.len(), 30);

    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.running, 30);
    assert_eq!(stats.available, 0);
}

/// Failed attempts wait out their backoff and stop at the attempt budget
#[tokio::test]
#[ignore]
async fn test_retry_backoff_and_terminal_failure() {
    let db = TestDatabase::start().await;
    let queue = queue(&db, "jobs_retry").await;

    let id = queue
        .enqueue(NewJob::new("analytics-event", json!({})).with_max_attempts(2))
        .await
        .unwrap();

    let job = queue.claim("w1").await.unwrap().unwrap();
    let outcome = queue.fail(&job, "store down").await.unwrap();
    assert_eq!(
        outcome,
        FailureOutcome::Retrying {
            delay: Duration::from_millis(50)
        }
    );

    // Not visible until the backoff elapses
    assert!(queue.claim("w1").await.unwrap().is_none());
    tokio::time::sleep(Duration::from_millis(150)).await;

    let job = queue.claim("w2").await.unwrap().unwrap();
    assert_eq!(job.id, id);
    assert_eq!(job.attempt, 2);
    assert_eq!(job.last_error.as_deref(), Some("store down"));

    assert_eq!(queue.fail(&job, "still down").await.unwrap(), FailureOutcome::Failed);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(queue.claim("w3").await.unwrap().is_none());

    let failed = queue.failed_jobs(5).await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].status, JobStatus::Failed);
    assert_eq!(failed[0].attempt, 2);
    assert_eq!(failed[0].last_error.as_deref(), Some("still down"));
}

/// Abandoned jobs are returned to the queue, or failed when out of attempts
#[tokio::test]
#[ignore]
async fn test_stalled_jobs_are_reclaimed() {
    let db = TestDatabase::start().await;
    let queue = queue(&db, "jobs_stalled").await;

    queue
        .enqueue(NewJob::new("analytics-event", json!({ "n": 1 })))
        .await
        .unwrap();
    queue
        .enqueue(NewJob::new("analytics-event", json!({ "n": 2 })).with_max_attempts(1))
        .await
        .unwrap();
    queue.claim("crashed").await.unwrap().unwrap();
    queue.claim("crashed").await.unwrap().unwrap();

    assert_eq!(queue.reset_stalled(Duration::from_secs(3600)).await.unwrap().requeued, 0);

    let stalled = queue.reset_stalled(Duration::ZERO).await.unwrap();
    assert_eq!(stalled.requeued, 1);
    assert_eq!(stalled.failed, 1);

    let job = queue.claim("w2").await.unwrap().unwrap();
    assert_eq!(job.payload["n"], 1);
    assert_eq!(job.attempt, 2);

    queue.complete(&job).await.unwrap();
    assert_eq!(queue.purge_completed(Duration::ZERO).await.unwrap(), 1);
    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.completed, 0);
    assert_eq!(stats.failed, 1);
}

/// Reports from a reclaimed claim do not affect the current holder
#[tokio::test]
#[ignore]
async fn test_stale_holder_cannot_touch_new_claim() {
    let db = TestDatabase::start().await;
    let queue = queue(&db, "jobs_stale_holder").await;

    let id = queue
        .enqueue(NewJob::new("analytics-event", json!({})))
        .await
        .unwrap();
    let stale = queue.claim("w1").await.unwrap().unwrap();
    assert_eq!(queue.reset_stalled(Duration::ZERO).await.unwrap().requeued, 1);

    let live = queue.claim("w2").await.unwrap().unwrap();
    assert_eq!(live.id, id);
    assert_eq!(live.attempt, 2);

    assert!(matches!(
        queue.fail(&stale, "late failure").await,
        Err(QueueError::JobNotFound(_))
    ));
    assert!(matches!(
        queue.complete(&stale).await,
        Err(QueueError::JobNotFound(_))
    ));

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(queue.claim("w3").await.unwrap().is_none());
    assert_eq!(queue.stats().await.unwrap().running, 1);

    queue.complete(&live).await.unwrap();
    assert_eq!(queue.stats().await.unwrap().completed, 1);
}

/// The natural key treats missing optional fields as equal
#[tokio::test]
#[ignore]
async fn test_duplicate_detection_with_nulls() {
    let db = TestDatabase::start().await;
    let store = store(&db, "events_dupes").await;

    store.insert_event(&anonymous_page_view()).await.unwrap();
    let err = store.insert_event(&anonymous_page_view()).await.unwrap_err();
    assert!(err.is_duplicate(), "expected duplicate, got {}", err);

    let mut other = anonymous_page_view();
    other.user_id = Some("u1".into());
    store.insert_event(&other).await.unwrap();
}

/// Reports from PostgreSQL match the in-memory semantics
#[tokio::test]
#[ignore]
async fn test_report_aggregation() {
    let db = TestDatabase::start().await;
    let store = Arc::new(store(&db, "events_report").await);

    for payload in march_first_traffic() {
        store.insert_event(&validate_event(&payload).unwrap()).await.unwrap();
    }
    let aggregator = ReportingAggregator::new(store).with_top_paths(5);

    let day = ReportQuery::parse(Some("s1"), Some("2024-03-01")).unwrap();
    let report = aggregator.report(&day).await.unwrap();
    assert_eq!(report.total_views, 5);
    assert_eq!(report.unique_users, 2);
    let paths: Vec<_> = report
        .top_paths
        .iter()
        .map(|p| (p.path.as_str(), p.views))
        .collect();
    assert_eq!(paths, vec![("/home", 3), ("/pricing", 1), (UNKNOWN_PATH, 1)]);

    let all_time = ReportQuery::parse(Some("s1"), None).unwrap();
    let report = aggregator.report(&all_time).await.unwrap();
    assert_eq!(report.total_views, 7);
    assert_eq!(report.unique_users, 3);

    let empty = ReportQuery::parse(Some("s1"), Some("2024-03-05")).unwrap();
    let err = aggregator.report(&empty).await.unwrap_err();
    assert_eq!(err.http_status(), 404);
}

/// Full path against PostgreSQL: redelivered events are stored once
#[tokio::test]
#[ignore]
async fn test_end_to_end_idempotency() {
    let db = TestDatabase::start().await;
    let queue = Arc::new(queue(&db, "jobs_e2e").await);
    let store = Arc::new(store(&db, "events_e2e").await);
    let ctx = TestContext::with_backends(queue, store.clone());
    let server = ctx.server();

    for _ in 0..4 {
        server
            .post("/api/ingestion/event")
            .json(&home_page_view())
            .await
            .assert_status(StatusCode::ACCEPTED);
    }

    let workers = ctx.start_workers(4);
    let stats = ctx.wait_until_settled(4).await;
    workers.stop().await;
    assert_eq!(stats.completed, 4);

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM events_e2e")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(rows, 1);
}

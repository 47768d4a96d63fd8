//! End-to-end tests of the ingest, queue, worker, store path.

use std::sync::Arc;

use axum::http::StatusCode;
use event_store::MemoryStore;
use integration_tests::fixtures::{home_page_view, page_view};
use integration_tests::mocks::FlakyStore;
use integration_tests::setup::{fast_retry_policy, TestContext};
use job_queue::{JobQueue, JobStatus, MemoryQueue};
use serde_json::Value;

/// The same event delivered many times is stored exactly once
#[tokio::test]
async fn test_redelivered_event_stored_once() {
    let store = Arc::new(MemoryStore::new());
    let ctx = TestContext::with_store(store.clone());
    let server = ctx.server();

    for _ in 0..5 {
        server
            .post("/api/ingestion/event")
            .json(&home_page_view())
            .await
            .assert_status(StatusCode::ACCEPTED);
    }

    let workers = ctx.start_workers(4);
    let stats = ctx.wait_until_settled(5).await;
    workers.stop().await;

    // Duplicates are acknowledged, not failed
    assert_eq!(stats.completed, 5);
    assert_eq!(stats.failed, 0);
    assert_eq!(store.len(), 1);

    let response = server
        .get("/api/reporting/stats")
        .add_query_param("site_id", "s1")
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["data"]["total_views"], 1);
}

/// Events differing only by user are distinct rows
#[tokio::test]
async fn test_distinct_events_all_stored() {
    let store = Arc::new(MemoryStore::new());
    let ctx = TestContext::with_store(store.clone());
    let server = ctx.server();

    for user in ["u1", "u2", "u3"] {
        server
            .post("/api/ingestion/event")
            .json(&page_view("2024-03-01T10:00:00Z", Some("/home"), Some(user)))
            .await
            .assert_status(StatusCode::ACCEPTED);
    }
    server
        .post("/api/ingestion/event")
        .json(&home_page_view())
        .await
        .assert_status(StatusCode::ACCEPTED);

    let workers = ctx.start_workers(2);
    ctx.wait_until_settled(4).await;
    workers.stop().await;

    assert_eq!(store.len(), 4);
}

/// Transient store failures are retried until the write lands
#[tokio::test]
async fn test_transient_store_failure_recovers() {
    let store = FlakyStore::new(2);
    let ctx = TestContext::with_store(Arc::new(store.clone()));
    let server = ctx.server();

    server
        .post("/api/ingestion/event")
        .json(&home_page_view())
        .await
        .assert_status(StatusCode::ACCEPTED);

    let workers = ctx.start_workers(1);
    let stats = ctx.wait_until_settled(1).await;
    workers.stop().await;

    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 0);
    assert_eq!(store.insert_calls(), 3);
    assert_eq!(store.events().len(), 1);
}

/// A job that never succeeds is failed after its attempt budget
#[tokio::test]
async fn test_persistent_failure_is_bounded() {
    let store = FlakyStore::always_failing();
    let ctx = TestContext::with_store(Arc::new(store.clone()));
    let server = ctx.server();

    server
        .post("/api/ingestion/event")
        .json(&home_page_view())
        .await
        .assert_status(StatusCode::ACCEPTED);

    let workers = ctx.start_workers(2);
    let stats = ctx.wait_until_settled(1).await;

    // Give a misbehaving pool time to retry again
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    workers.stop().await;

    assert_eq!(stats.failed, 1);
    assert_eq!(store.insert_calls(), 3);

    let failed = ctx.queue.failed_jobs(10).await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].status, JobStatus::Failed);
    assert_eq!(failed[0].attempt, 3);
    assert!(failed[0].last_error.as_deref().unwrap_or_default().contains("mock store failure"));
}

/// Many events processed by a small pool all reach the store
#[tokio::test]
async fn test_backlog_drains_through_bounded_pool() {
    let queue = Arc::new(MemoryQueue::new(fast_retry_policy()));
    let store = Arc::new(MemoryStore::new());
    let ctx = TestContext::with_backends(queue.clone(), store.clone());
    let server = ctx.server();

    for minute in 0..40 {
        let ts = format!("2024-03-01T10:{:02}:00Z", minute);
        server
            .post("/api/ingestion/event")
            .json(&page_view(&ts, Some("/home"), None))
            .await
            .assert_status(StatusCode::ACCEPTED);
    }

    let workers = ctx.start_workers(3);
    let stats = ctx.wait_until_settled(40).await;
    workers.stop().await;

    assert_eq!(stats.completed, 40);
    assert_eq!(stats.running, 0);
    assert_eq!(store.len(), 40);
}

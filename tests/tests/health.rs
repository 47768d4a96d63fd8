//! Tests for health check endpoints.

use axum::http::StatusCode;
use integration_tests::setup::TestContext;
use serde_json::Value;

/// Test /api/healthcheck returns the static message
#[tokio::test]
async fn test_healthcheck_message() {
    let ctx = TestContext::new();
    let server = ctx.server();

    let response = server.get("/api/healthcheck").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["message"], "API is running, healthy, and ready!");
}

/// Test /api/health reports every component and the queue gauges
#[tokio::test]
async fn test_health_endpoint_structure() {
    let ctx = TestContext::new();
    let server = ctx.server();

    let response = server.get("/api/health").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");

    let components = body["components"].as_array().expect("components array");
    let names: Vec<&str> = components
        .iter()
        .filter_map(|c| c["name"].as_str())
        .collect();
    assert_eq!(names, vec!["queue", "store"]);

    for field in ["jobs_in_flight", "queue_available", "queue_failed"] {
        assert!(body[field].as_u64().is_some(), "{} should be a number", field);
    }
}

/// An unreachable store degrades health but keeps the service ready
#[tokio::test]
async fn test_store_down_is_degraded() {
    let ctx = TestContext::new();
    ctx.health.store.set_unhealthy("connection refused");
    let server = ctx.server();

    let body: Value = server.get("/api/health").await.json();
    assert_eq!(body["status"], "degraded");

    server.get("/api/health/ready").await.assert_status_ok();
}

/// Readiness follows the queue
#[tokio::test]
async fn test_ready_endpoint() {
    let ctx = TestContext::new();
    let server = ctx.server();

    server.get("/api/health/ready").await.assert_status_ok();

    ctx.health.queue.set_unhealthy("connection refused");
    server
        .get("/api/health/ready")
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);

    ctx.health.queue.set_healthy();
    server.get("/api/health/ready").await.assert_status_ok();
}

/// Liveness does not depend on any backend
#[tokio::test]
async fn test_live_endpoint() {
    let ctx = TestContext::new();
    ctx.health.queue.set_unhealthy("down");
    ctx.health.store.set_unhealthy("down");
    let server = ctx.server();

    server.get("/api/health/live").await.assert_status_ok();
}

/// Routes outside the /api prefix do not exist
#[tokio::test]
async fn test_routes_are_prefixed() {
    let ctx = TestContext::new();
    let server = ctx.server();

    server
        .get("/healthcheck")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

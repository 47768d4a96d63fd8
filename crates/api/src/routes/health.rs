//! Health check endpoints.

use axum::{extract::State, http::StatusCode, Json};
use telemetry::metrics;

use crate::response::{HealthResponse, HealthcheckResponse};
use crate::state::AppState;

/// GET /api/healthcheck - Static liveness payload.
pub async fn healthcheck_handler() -> Json<HealthcheckResponse> {
    Json(HealthcheckResponse {
        message: "API is running, healthy, and ready!".to_string(),
    })
}

/// GET /api/health - Per-component health.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        report: state.health.report(),
        jobs_in_flight: metrics().jobs_in_flight.get(),
        queue_available: metrics().queue_available.get(),
        queue_failed: metrics().queue_failed.get(),
    })
}

/// GET /api/health/ready - Readiness probe (queue reachable).
pub async fn ready_handler(State(state): State<AppState>) -> StatusCode {
    if state.health.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /api/health/live - Liveness probe (service is running).
pub async fn live_handler() -> StatusCode {
    StatusCode::OK
}

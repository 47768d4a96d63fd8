//! Ingestion endpoint handler.

use std::time::Instant;

use axum::{extract::State, http::StatusCode, Json};
use pipeline_core::validate_event;
use telemetry::metrics;
use tracing::{debug, info};

use crate::extractors::JsonPayload;
use crate::response::{ApiError, IngestResponse};
use crate::state::AppState;

/// POST /api/ingestion/event
///
/// Validates the event and enqueues it; the store is written later by the
/// worker. 202 means the queue holds the event.
pub async fn ingest_handler(
    State(state): State<AppState>,
    payload: Result<JsonPayload, ApiError>,
) -> Result<(StatusCode, Json<IngestResponse>), ApiError> {
    let start = Instant::now();
    metrics().events_received.inc();

    let JsonPayload(payload) = payload.inspect_err(|_| metrics().events_rejected.inc())?;

    let event = validate_event(&payload).map_err(|e| {
        metrics().events_rejected.inc();
        debug!(errors = ?e.field_errors(), "Event rejected");
        ApiError::from(e)
    })?;

    let job_id = state.ingestion.accept(&event).await?;

    let latency_ms = start.elapsed().as_millis() as u64;
    metrics().ingest_latency_ms.observe(latency_ms);

    info!(
        job_id = %job_id,
        site_id = %event.site_id,
        event_type = %event.event_type,
        latency_ms = latency_ms,
        "Event accepted"
    );

    Ok((StatusCode::ACCEPTED, Json(IngestResponse::queued())))
}

//! Reporting endpoint handler.

use axum::{extract::State, Json};
use pipeline_core::Report;
use tracing::debug;

use crate::extractors::StatsQuery;
use crate::response::{ApiError, SuccessResponse};
use crate::state::AppState;

/// GET /api/reporting/stats?site_id=..&date=YYYY-MM-DD
pub async fn stats_handler(
    State(state): State<AppState>,
    StatsQuery(query): StatsQuery,
) -> Result<Json<SuccessResponse<Report>>, ApiError> {
    debug!(site_id = %query.site_id, date = %query.date_label(), "Report requested");

    let report = state.reporting.report(&query).await?;
    Ok(Json(SuccessResponse::new(report)))
}

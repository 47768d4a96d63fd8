//! Application state shared across handlers.

use std::sync::Arc;

use event_store::ReportingAggregator;
use telemetry::HealthRegistry;

use crate::ingestion::IngestionService;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub ingestion: IngestionService,
    pub reporting: ReportingAggregator,
    /// Backend health, refreshed by the health monitor
    pub health: Arc<HealthRegistry>,
}

impl AppState {
    pub fn new(
        ingestion: IngestionService,
        reporting: ReportingAggregator,
        health: Arc<HealthRegistry>,
    ) -> Self {
        Self {
            ingestion,
            reporting,
            health,
        }
    }
}

//! Store health checks.

use telemetry::ComponentHealth;
use tracing::{debug, error};

use crate::EventStore;

/// Pings the store and records the result.
pub async fn check_connection(store: &dyn EventStore, health: &ComponentHealth) -> bool {
    match store.ping().await {
        Ok(()) => {
            debug!(backend = store.backend(), "Event store connection healthy");
            health.set_healthy();
            true
        }
        Err(e) => {
            error!(backend = store.backend(), "Event store health check failed: {}", e);
            health.set_unhealthy(e.to_string());
            false
        }
    }
}

//! Queue health checks.

use telemetry::ComponentHealth;
use tracing::{debug, error};

use crate::JobQueue;

/// Pings the queue backend and records the result.
pub async fn check_connection(queue: &dyn JobQueue, health: &ComponentHealth) -> bool {
    match queue.ping().await {
        Ok(()) => {
            debug!(backend = queue.backend(), "Job queue connection healthy");
            health.set_healthy();
            true
        }
        Err(e) => {
            error!(backend = queue.backend(), "Job queue health check failed: {}", e);
            health.set_unhealthy(e.to_string());
            false
        }
    }
}

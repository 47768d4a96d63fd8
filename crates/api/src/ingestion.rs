//! Hands validated events to the job queue.

use std::sync::Arc;

use job_queue::{JobId, JobQueue, NewJob};
use pipeline_core::{Error, Event, Result, EVENT_JOB_TYPE};
use telemetry::metrics;
use tracing::{debug, error};

/// Accept path for events. Never touches the store.
#[derive(Clone)]
pub struct IngestionService {
    queue: Arc<dyn JobQueue>,
}

impl IngestionService {
    pub fn new(queue: Arc<dyn JobQueue>) -> Self {
        Self { queue }
    }

    /// Enqueues one job for the event. Returns once the queue holds it.
    pub async fn accept(&self, event: &Event) -> Result<JobId> {
        let payload = serde_json::to_value(event)?;

        match self.queue.enqueue(NewJob::new(EVENT_JOB_TYPE, payload)).await {
            Ok(id) => {
                metrics().jobs_enqueued.inc();
                debug!(job_id = %id, site_id = %event.site_id, "Event queued");
                Ok(id)
            }
            Err(e) => {
                metrics().enqueue_errors.inc();
                error!(
                    site_id = %event.site_id,
                    event_type = %event.event_type,
                    error = %e,
                    "Failed to enqueue event"
                );
                Err(Error::queue_unavailable("Failed to queue event for processing"))
            }
        }
    }

    pub fn queue(&self) -> &Arc<dyn JobQueue> {
        &self.queue
    }
}

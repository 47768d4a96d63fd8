//! Turns queued event jobs into stored rows.

use std::sync::Arc;

use async_trait::async_trait;
use event_store::{EventStore, StoreError};
use job_queue::Job;
use pipeline_core::{Event, EVENT_JOB_TYPE};
use tracing::{debug, warn};

use crate::error::WriteError;

/// How a successful attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Inserted,
    /// The natural key was already stored by an earlier delivery.
    Duplicate,
}

/// Processes one claimed job.
#[async_trait]
pub trait JobProcessor: Send + Sync {
    async fn process(&self, job: &Job) -> Result<WriteOutcome, WriteError>;
}

/// Inserts one event per job, absorbing natural-key duplicates.
pub struct IdempotentWriter {
    store: Arc<dyn EventStore>,
}

impl IdempotentWriter {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl JobProcessor for IdempotentWriter {
    async fn process(&self, job: &Job) -> Result<WriteOutcome, WriteError> {
        if job.job_type != EVENT_JOB_TYPE {
            return Err(WriteError::UnexpectedJobType(job.job_type.clone()));
        }

        let event: Event = serde_json::from_value(job.payload.clone())?;

        match self.store.insert_event(&event).await {
            Ok(()) => {
                debug!(job_id = %job.id, site_id = %event.site_id, "Event stored");
                Ok(WriteOutcome::Inserted)
            }
            Err(StoreError::Duplicate) => {
                warn!(
                    job_id = %job.id,
                    attempt = job.attempt,
                    site_id = %event.site_id,
                    "Duplicate event skipped"
                );
                Ok(WriteOutcome::Duplicate)
            }
            Err(e) => Err(e.into()),
        }
    }
}

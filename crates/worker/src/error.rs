//! Worker errors.

use event_store::StoreError;
use job_queue::QueueError;
use thiserror::Error;

/// A failed attempt at processing one job. Always retried by the queue while
/// attempts remain.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("unexpected job type: {0}")]
    UnexpectedJobType(String),

    #[error("undecodable event payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("store write failed: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("worker pool closed")]
    PoolClosed,
}

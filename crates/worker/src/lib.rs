//! Job workers for the analytics pipeline.
//!
//! - Pool: bounded-concurrency slots claiming jobs from the queue
//! - Writer: idempotent insert of one event per job
//! - Janitor: stalled-job recovery, completed-job purge, failure alerts

pub mod error;
pub mod janitor;
pub mod pool;
pub mod scheduler;
pub mod writer;

pub use error::{WorkerError, WriteError};
pub use janitor::{Janitor, JanitorConfig, JanitorReport};
pub use pool::{PoolConfig, WorkerPool};
pub use scheduler::*;
pub use writer::{IdempotentWriter, JobProcessor, WriteOutcome};

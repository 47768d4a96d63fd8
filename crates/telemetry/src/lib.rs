//! Telemetry for the analytics pipeline.
//!
//! Metrics live in process memory and are logged periodically by the worker
//! janitor; health is tracked per backend component.

pub mod health;
pub mod metrics;
pub mod tracing_setup;

pub use health::*;
pub use metrics::*;
pub use tracing_setup::*;

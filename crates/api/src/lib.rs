//! HTTP API layer for the analytics pipeline.

pub mod extractors;
pub mod ingestion;
pub mod response;
pub mod routes;
pub mod state;

pub use ingestion::IngestionService;
pub use routes::router;
pub use state::AppState;

//! Store errors.

use thiserror::Error;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// An event with the same natural key is already stored.
    #[error("event already recorded")]
    Duplicate,

    #[error("pool creation failed: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("{command} query failed: {source}")]
    Query {
        command: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("invalid store configuration: {0}")]
    Config(String),
}

impl StoreError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate)
    }

    pub(crate) fn query(command: &'static str) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| Self::Query { command, source }
    }
}

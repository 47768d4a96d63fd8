//! Queue errors.

use thiserror::Error;

use crate::job::JobId;

pub type QueueResult<T> = std::result::Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("pool creation failed: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("{command} query failed: {source}")]
    Query {
        command: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("job {0} not found")]
    JobNotFound(JobId),

    #[error("could not decode job row: {0}")]
    Decode(String),

    #[error("invalid queue configuration: {0}")]
    Config(String),
}

impl QueueError {
    pub(crate) fn query(command: &'static str) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| Self::Query { command, source }
    }
}

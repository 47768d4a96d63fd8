//! Unified error types for the analytics pipeline.
//!
//! Error codes:
//! - VALID_001-003: Validation errors
//! - NOT_FOUND_001: No report data
//! - QUEUE_001: Enqueue failed
//! - STORE_001: Store read failed

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Validation error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorCode {
    /// VALID_001: Body is not valid JSON
    InvalidFormat,
    /// VALID_002: One or more event fields violate their constraints
    InvalidEvent,
    /// VALID_003: Malformed query parameters
    InvalidQuery,
}

impl ValidationErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidFormat => "VALID_001",
            Self::InvalidEvent => "VALID_002",
            Self::InvalidQuery => "VALID_003",
        }
    }

    /// Get the HTTP status code.
    pub fn http_status(&self) -> u16 {
        400
    }
}

/// Not found error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundErrorCode {
    /// NOT_FOUND_001: No events match the report filter
    NoData,
}

impl NotFoundErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoData => "NOT_FOUND_001",
        }
    }

    pub fn http_status(&self) -> u16 {
        404
    }
}

/// Queue error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueErrorCode {
    /// QUEUE_001: Failed to enqueue event
    EnqueueFailed,
}

impl QueueErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            Self::EnqueueFailed => "QUEUE_001",
        }
    }

    pub fn http_status(&self) -> u16 {
        500
    }
}

/// Store error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorCode {
    /// STORE_001: Failed to read from the event store
    QueryFailed,
}

impl StoreErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            Self::QueryFailed => "STORE_001",
        }
    }

    pub fn http_status(&self) -> u16 {
        500
    }
}

/// A single violated field constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Unified error type for the analytics pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// Client input rejected at the boundary. Never retried.
    #[error("[{code}] {message}")]
    Validation {
        code: &'static str,
        message: String,
        errors: Vec<FieldError>,
    },

    /// Well-formed report query with no matching data.
    #[error("[{code}] {message}")]
    NotFound { code: &'static str, message: String },

    /// The event was never durably recorded.
    #[error("[{code}] {message}")]
    QueueUnavailable { code: &'static str, message: String },

    /// Read path against the store failed.
    #[error("[{code}] {message}")]
    Store { code: &'static str, message: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a validation error listing every violated field.
    pub fn validation(
        code: ValidationErrorCode,
        msg: impl Into<String>,
        errors: Vec<FieldError>,
    ) -> Self {
        Self::Validation {
            code: code.code(),
            message: msg.into(),
            errors,
        }
    }

    /// Create a validation error for an unparseable body.
    pub fn invalid_format(msg: impl Into<String>) -> Self {
        Self::validation(ValidationErrorCode::InvalidFormat, msg, Vec::new())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound {
            code: NotFoundErrorCode::NoData.code(),
            message: msg.into(),
        }
    }

    pub fn queue_unavailable(msg: impl Into<String>) -> Self {
        Self::QueueUnavailable {
            code: QueueErrorCode::EnqueueFailed.code(),
            message: msg.into(),
        }
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store {
            code: StoreErrorCode::QueryFailed.code(),
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Get the HTTP status code for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::NotFound { .. } => 404,
            Self::QueueUnavailable { .. } => 500,
            Self::Store { .. } => 500,
            Self::Serialization(_) => 500,
            Self::Internal(_) => 500,
        }
    }

    /// Get the error code if this is a coded error.
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            Self::Validation { code, .. } => Some(code),
            Self::NotFound { code, .. } => Some(code),
            Self::QueueUnavailable { code, .. } => Some(code),
            Self::Store { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Field-level details, empty for non-validation errors.
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            Self::Validation { errors, .. } => errors,
            _ => &[],
        }
    }
}

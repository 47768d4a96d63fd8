//! Standardized API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pipeline_core::{Error, FieldError};
use serde::{Deserialize, Serialize};
use telemetry::HealthReport;
use tracing::error;

/// Accepted ingestion.
#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    pub status: String,
}

impl IngestResponse {
    pub fn queued() -> Self {
        Self {
            status: "queued".to_string(),
        }
    }
}

/// Successful read wrapped as `{"status": "success", "data": ...}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse<T> {
    pub status: String,
    pub data: T,
}

impl<T> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            status: "success".to_string(),
            data,
        }
    }
}

/// Static liveness payload.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthcheckResponse {
    pub message: String,
}

/// Component health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    #[serde(flatten)]
    pub report: HealthReport,
    pub jobs_in_flight: u64,
    pub queue_available: u64,
    pub queue_failed: u64,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            code: code.into(),
            message: message.into(),
            errors: None,
        }
    }

    pub fn with_errors(mut self, errors: Vec<FieldError>) -> Self {
        if !errors.is_empty() {
            self.errors = Some(errors);
        }
        self
    }
}

/// API error type with pipeline error codes.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub response: ErrorResponse,
}

impl ApiError {
    pub fn with_code(status: StatusCode, code: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            status,
            response: ErrorResponse::new(code, msg),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::with_code(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_001", msg)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.response)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status =
            StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        match &err {
            Error::Validation {
                code,
                message,
                errors,
            } => ApiError {
                status,
                response: ErrorResponse::new(*code, message).with_errors(errors.clone()),
            },
            Error::NotFound { code, message }
            | Error::QueueUnavailable { code, message }
            | Error::Store { code, message } => ApiError::with_code(status, *code, message),
            Error::Serialization(_) | Error::Internal(_) => {
                error!(error = %err, "Internal error");
                ApiError::internal("Internal server error")
            }
        }
    }
}

//! Request extractors.
//!
//! Both map their rejections onto coded validation errors so every 400 has
//! the same body shape.

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::request::Parts,
};
use pipeline_core::{Error, ReportQuery, ValidationErrorCode};
use serde::Deserialize;
use serde_json::Value;

use crate::response::ApiError;

/// Request body parsed as JSON, regardless of content type.
#[derive(Debug, Clone)]
pub struct JsonPayload(pub Value);

#[async_trait]
impl<S> FromRequest<S> for JsonPayload
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let body = Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::from(Error::invalid_format(e.body_text())))?;

        let value = serde_json::from_slice(&body)
            .map_err(|e| ApiError::from(Error::invalid_format(format!("Invalid JSON body: {}", e))))?;

        Ok(JsonPayload(value))
    }
}

#[derive(Debug, Deserialize)]
struct StatsParams {
    site_id: Option<String>,
    date: Option<String>,
}

/// Validated `site_id` / `date` query parameters.
#[derive(Debug, Clone)]
pub struct StatsQuery(pub ReportQuery);

#[async_trait]
impl<S> FromRequestParts<S> for StatsQuery
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Query(params) = Query::<StatsParams>::try_from_uri(&parts.uri).map_err(|e| {
            ApiError::from(Error::validation(
                ValidationErrorCode::InvalidQuery,
                format!("Invalid query parameters: {}", e.body_text()),
                Vec::new(),
            ))
        })?;

        ReportQuery::parse(params.site_id.as_deref(), params.date.as_deref())
            .map(StatsQuery)
            .map_err(ApiError::from)
    }
}

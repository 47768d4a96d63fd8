//! Event type definitions and validation for the analytics pipeline.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use validator::{Validate, ValidationErrors};

use crate::error::{Error, FieldError, Result, ValidationErrorCode};

/// Event type counted by reports.
pub const PAGE_VIEW_EVENT: &str = "page_view";

/// Job type tag for queued events.
pub const EVENT_JOB_TYPE: &str = "analytics-event";

/// A single analytics event.
///
/// Never mutated after validation. The natural key is the full field set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Event {
    #[validate(length(max = 255))]
    pub site_id: String,
    #[validate(length(max = 255))]
    pub event_type: String,
    /// UTC, microsecond precision
    pub timestamp: DateTime<Utc>,
    #[validate(length(max = 2048))]
    pub path: Option<String>,
    #[validate(length(max = 255))]
    pub user_id: Option<String>,
}

/// The fields that identify an event for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NaturalKey {
    pub site_id: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub path: Option<String>,
    pub user_id: Option<String>,
}

impl Event {
    /// Returns the deduplication key for this event.
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey {
            site_id: self.site_id.clone(),
            event_type: self.event_type.clone(),
            timestamp: self.timestamp,
            path: self.path.clone(),
            user_id: self.user_id.clone(),
        }
    }

    pub fn is_page_view(&self) -> bool {
        self.event_type == PAGE_VIEW_EVENT
    }
}

/// Validates a raw ingestion payload.
///
/// Either every required field is present and well-typed or the whole payload
/// is rejected with one `FieldError` per violated constraint.
pub fn validate_event(payload: &Value) -> Result<Event> {
    let Some(object) = payload.as_object() else {
        return Err(Error::validation(
            ValidationErrorCode::InvalidEvent,
            "Validation failed",
            vec![FieldError::new("body", "expected a JSON object")],
        ));
    };

    let mut errors = Vec::new();

    let site_id = required_string(object, "site_id", &mut errors);
    let event_type = required_string(object, "event_type", &mut errors);
    let timestamp = required_string(object, "timestamp", &mut errors).and_then(|raw| {
        parse_timestamp(&raw)
            .map_err(|msg| errors.push(FieldError::new("timestamp", msg)))
            .ok()
    });
    let path = optional_string(object, "path", &mut errors);
    let user_id = optional_string(object, "user_id", &mut errors);

    let event = Event {
        site_id: site_id.unwrap_or_default(),
        event_type: event_type.unwrap_or_default(),
        timestamp: timestamp.unwrap_or_default(),
        path,
        user_id,
    };

    if let Err(length_errors) = event.validate() {
        for field_error in describe_validation_errors(&length_errors) {
            // A type error on the same field already explains the problem
            if !errors.iter().any(|e| e.field == field_error.field) {
                errors.push(field_error);
            }
        }
    }

    if errors.is_empty() {
        Ok(event)
    } else {
        Err(Error::validation(
            ValidationErrorCode::InvalidEvent,
            "Validation failed",
            errors,
        ))
    }
}

/// Parses an RFC 3339 timestamp into a UTC instant.
///
/// Offsets are normalized to UTC and precision truncated to microseconds, the
/// finest resolution the store keeps.
pub fn parse_timestamp(raw: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc).trunc_subsecs(6))
        .map_err(|_| "timestamp must be a valid ISO-8601 datetime".to_string())
}

fn required_string(
    object: &Map<String, Value>,
    field: &str,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match object.get(field) {
        None | Some(Value::Null) => {
            errors.push(FieldError::new(field, format!("{} is required", field)));
            None
        }
        Some(Value::String(s)) if s.is_empty() => {
            errors.push(FieldError::new(field, format!("{} is required", field)));
            None
        }
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            errors.push(FieldError::new(field, format!("{} must be a string", field)));
            None
        }
    }
}

fn optional_string(
    object: &Map<String, Value>,
    field: &str,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match object.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            errors.push(FieldError::new(field, format!("{} must be a string", field)));
            None
        }
    }
}

/// Flattens validator errors into field errors, sorted by field name.
pub fn describe_validation_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut described: Vec<FieldError> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            let field = field.to_string();
            errs.iter().map(move |err| {
                let message = match (&err.message, err.code.as_ref()) {
                    (Some(message), _) => message.to_string(),
                    (None, "length") => match err.params.get("max") {
                        Some(max) => format!("{} must be at most {} characters", field, max),
                        None => format!("{} has an invalid length", field),
                    },
                    (None, code) => format!("{} is invalid ({})", field, code),
                };
                FieldError::new(field.clone(), message)
            })
        })
        .collect();

    described.sort_by(|a, b| a.field.cmp(&b.field));
    described
}

//! Core types, validation, and errors for the analytics pipeline.

pub mod error;
pub mod events;
pub mod limits;
pub mod report;

pub use error::{Error, FieldError, Result, ValidationErrorCode};
pub use events::*;
pub use report::*;

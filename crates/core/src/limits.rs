//! Field size limits for ingested events.
//!
//! The `#[validate]` derive macro requires literal values in attributes,
//! so the same numbers appear there. Keep both in sync when modifying.

/// Site identifier max length.
pub const MAX_SITE_ID_LEN: u64 = 255;

/// Event type max length.
pub const MAX_EVENT_TYPE_LEN: u64 = 255;

/// Page path max length.
/// Matches common URL length limits.
pub const MAX_PATH_LEN: u64 = 2048;

/// User ID max length.
/// UUIDs=36, emails=~50, custom IDs up to 255.
pub const MAX_USER_ID_LEN: u64 = 255;

/// Number of paths returned in a report.
pub const DEFAULT_TOP_PATHS: usize = 3;

//! Report query, filter, and read-model types.

use std::sync::LazyLock;

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, FieldError, Result, ValidationErrorCode};
use crate::events::PAGE_VIEW_EVENT;

/// Date label used when no date is requested.
pub const ALL_TIME: &str = "all-time";

/// Label for events recorded without a path.
pub const UNKNOWN_PATH: &str = "Unknown Path";

static DATE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid date regex"));

/// A validated report request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportQuery {
    pub site_id: String,
    pub date: Option<NaiveDate>,
}

impl ReportQuery {
    /// Validates raw query parameters.
    pub fn parse(site_id: Option<&str>, date: Option<&str>) -> Result<Self> {
        let mut errors = Vec::new();

        let site_id = match site_id {
            Some(s) if !s.is_empty() => Some(s.to_string()),
            _ => {
                errors.push(FieldError::new("site_id", "site_id is required"));
                None
            }
        };

        let date = match date {
            None => None,
            Some(raw) => match parse_date(raw) {
                Ok(date) => Some(date),
                Err(msg) => {
                    errors.push(FieldError::new("date", msg));
                    None
                }
            },
        };

        match site_id {
            Some(site_id) if errors.is_empty() => Ok(Self { site_id, date }),
            _ => Err(Error::validation(
                ValidationErrorCode::InvalidQuery,
                "Invalid query parameters",
                errors,
            )),
        }
    }

    /// Builds the filter shared by every aggregate query of the report.
    pub fn filter(&self) -> EventFilter {
        EventFilter {
            site_id: self.site_id.clone(),
            event_type: PAGE_VIEW_EVENT.to_string(),
            window: self.date.map(TimeWindow::day),
        }
    }

    /// "all-time" or the requested date.
    pub fn date_label(&self) -> String {
        self.date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| ALL_TIME.to_string())
    }
}

fn parse_date(raw: &str) -> std::result::Result<NaiveDate, String> {
    if !DATE_PATTERN.is_match(raw) {
        return Err("Date must be in YYYY-MM-DD format".to_string());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| format!("{} is not a calendar date", raw))
}

/// Half-open UTC time range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// The UTC calendar day `[date 00:00:00Z, date+1 00:00:00Z)`.
    pub fn day(date: NaiveDate) -> Self {
        let start = date.and_time(NaiveTime::default()).and_utc();
        let end = date
            .checked_add_days(Days::new(1))
            .map(|next| next.and_time(NaiveTime::default()).and_utc())
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self { start, end }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts < self.end
    }
}

/// Filter passed to every store aggregate query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    pub site_id: String,
    pub event_type: String,
    pub window: Option<TimeWindow>,
}

impl EventFilter {
    pub fn matches(&self, site_id: &str, event_type: &str, ts: DateTime<Utc>) -> bool {
        self.site_id == site_id
            && self.event_type == event_type
            && self.window.map_or(true, |w| w.contains(ts))
    }
}

/// How events without a user id count toward unique users.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnonymousUsers {
    /// Anonymous events add nothing to the unique user count.
    #[default]
    Exclude,
    /// All anonymous events together count as a single user.
    CountAsOne,
}

impl AnonymousUsers {
    /// Counts distinct user ids (as returned by the store, nulls included).
    pub fn count(&self, distinct: &[Option<String>]) -> u64 {
        match self {
            Self::Exclude => distinct.iter().filter(|u| u.is_some()).count() as u64,
            Self::CountAsOne => distinct.len() as u64,
        }
    }
}

/// Path with its view count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathViews {
    pub path: String,
    pub views: u64,
}

/// Aggregate report for one site and date window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub site_id: String,
    pub date: String,
    pub total_views: u64,
    pub unique_users: u64,
    pub top_paths: Vec<PathViews>,
}

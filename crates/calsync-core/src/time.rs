//! Event start/end times.
//!
//! Remote calendars report an event boundary either as an RFC 3339 timestamp
//! (`start.dateTime`) or as a bare date (`start.date`) for all-day events.
//! [`EventTime`] keeps that distinction instead of collapsing dates into
//! midnight timestamps.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a remote time value cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeParseError {
    /// Neither `dateTime` nor `date` was present.
    #[error("missing both dateTime and date")]
    Missing,
    /// `dateTime` was present but is not RFC 3339.
    #[error("invalid dateTime {value:?}: {reason}")]
    InvalidDateTime { value: String, reason: String },
    /// `date` was present but is not `YYYY-MM-DD`.
    #[error("invalid date {value:?}: {reason}")]
    InvalidDate { value: String, reason: String },
}

/// The start or end of a calendar event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum EventTime {
    /// A specific instant, normalised to UTC.
    DateTime(DateTime<Utc>),
    /// A calendar date without a time of day (all-day events).
    Date(NaiveDate),
}

impl EventTime {
    /// Parses the `{dateTime, date}` pair of a remote event boundary.
    ///
    /// `dateTime` wins when both are present, matching how the remote API
    /// documents the fields.
    pub fn parse(date_time: Option<&str>, date: Option<&str>) -> Result<Self, TimeParseError> {
        match (date_time, date) {
            (Some(dt), _) => DateTime::parse_from_rfc3339(dt)
                .map(|parsed| Self::DateTime(parsed.with_timezone(&Utc)))
                .map_err(|e| TimeParseError::InvalidDateTime {
                    value: dt.to_string(),
                    reason: e.to_string(),
                }),
            (None, Some(d)) => NaiveDate::parse_from_str(d, "%Y-%m-%d")
                .map(Self::Date)
                .map_err(|e| TimeParseError::InvalidDate {
                    value: d.to_string(),
                    reason: e.to_string(),
                }),
            (None, None) => Err(TimeParseError::Missing),
        }
    }

    /// Returns `true` for a date-only value.
    pub fn is_all_day(&self) -> bool {
        matches!(self, Self::Date(_))
    }

    /// Returns the instant if this is a `DateTime`.
    pub fn as_datetime(&self) -> Option<&DateTime<Utc>> {
        match self {
            Self::DateTime(dt) => Some(dt),
            Self::Date(_) => None,
        }
    }

    /// Returns the date if this is a `Date`.
    pub fn as_date(&self) -> Option<&NaiveDate> {
        match self {
            Self::Date(d) => Some(d),
            Self::DateTime(_) => None,
        }
    }

    /// Converts to a UTC instant for ordering and range queries.
    ///
    /// Dates map to midnight UTC.
    pub fn to_utc_datetime(&self) -> DateTime<Utc> {
        match self {
            Self::DateTime(dt) => *dt,
            Self::Date(date) => date.and_time(NaiveTime::MIN).and_utc(),
        }
    }

    /// Parses the storage form produced by [`EventTime::to_storage`].
    pub fn from_storage(value: &str) -> Result<Self, TimeParseError> {
        if value.len() == 10 {
            Self::parse(None, Some(value))
        } else {
            Self::parse(Some(value), None)
        }
    }

    /// Returns the string stored in the `start_time`/`end_time` columns.
    ///
    /// Instants are written as RFC 3339 with a `Z` suffix, dates as
    /// `YYYY-MM-DD`.
    pub fn to_storage(&self) -> String {
        match self {
            Self::DateTime(dt) => dt.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true),
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }
}

impl fmt::Display for EventTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_storage())
    }
}

impl PartialOrd for EventTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_utc_datetime().cmp(&other.to_utc_datetime())
    }
}

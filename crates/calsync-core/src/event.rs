//! Locally stored calendar events.
//!
//! A [`CalendarEvent`] is the persisted projection of one remote event for one
//! user, keyed by `(user_id, google_event_id)`. Optional remote fields stay
//! `None` when the remote payload did not carry them, so "not set" and
//! "cleared" remain distinguishable.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::time::EventTime;

/// Title shown for events that carry no summary.
pub const UNTITLED_EVENT: &str = "Untitled Event";

/// Remote event status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Confirmed,
    Tentative,
    Cancelled,
}

impl EventStatus {
    /// Returns the wire/storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Tentative => "tentative",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirmed" => Ok(Self::Confirmed),
            "tentative" => Ok(Self::Tentative),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown event status {other:?}")),
        }
    }
}

/// A participant of an event.
///
/// Known fields are typed; anything else the remote sends is kept in `extra`
/// so re-serialising an attendee loses nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendee {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organizer: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<bool>,
    #[serde(rename = "self", default, skip_serializing_if = "Option::is_none")]
    pub is_self: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The persisted content of one remote event for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub user_id: String,
    pub google_event_id: String,

    pub start_time: EventTime,
    pub end_time: EventTime,
    pub all_day: bool,

    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,

    pub creator_email: Option<String>,
    pub creator_name: Option<String>,
    pub organizer_email: Option<String>,
    pub organizer_name: Option<String>,
    pub ical_uid: Option<String>,
    /// Remote revision number; never decreases for a given remote event.
    pub sequence: Option<i64>,
    pub status: Option<EventStatus>,
    pub visibility: Option<String>,
    pub transparency: Option<String>,
    pub event_type: Option<String>,
    pub kind: Option<String>,

    pub attendees: Option<Vec<Attendee>>,
    pub conference_data: Option<serde_json::Value>,
    pub hangout_link: Option<String>,
    pub html_link: Option<String>,
    /// Recurrence rules as sent by the remote, unexpanded.
    pub recurrence: Option<Vec<String>>,
    /// The complete remote payload this row was built from.
    pub raw_data: serde_json::Value,
}

impl CalendarEvent {
    /// Returns the title to display, falling back to [`UNTITLED_EVENT`].
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(UNTITLED_EVENT)
    }

    /// Returns `true` if the event has not ended at `now`.
    pub fn is_upcoming_at(&self, now: DateTime<Utc>) -> bool {
        self.end_time.to_utc_datetime() > now
    }

    /// Returns `true` if applying `self` over `stored` would move the
    /// remote revision backwards.
    pub fn regresses(&self, stored: &CalendarEvent) -> bool {
        matches!((self.sequence, stored.sequence), (Some(incoming), Some(current)) if incoming < current)
    }
}

/// A [`CalendarEvent`] together with local bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event: CalendarEvent,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What an upsert did to the stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpsertOutcome {
    /// No row existed; one was inserted.
    Created,
    /// The row existed and its content changed.
    Updated,
    /// The row already held identical content; nothing was written.
    Unchanged,
    /// The incoming `sequence` is lower than the stored one; nothing was written.
    Stale,
}

impl UpsertOutcome {
    /// Decides the outcome of writing `incoming` over `existing`.
    ///
    /// Store implementations call this while holding their write lock so
    /// that the decision and the write are atomic.
    pub fn classify(existing: Option<&CalendarEvent>, incoming: &CalendarEvent) -> Self {
        match existing {
            None => Self::Created,
            Some(current) if incoming.regresses(current) => Self::Stale,
            Some(current) if current == incoming => Self::Unchanged,
            Some(_) => Self::Updated,
        }
    }

    /// Returns `true` if the store must write the incoming row.
    pub fn writes(&self) -> bool {
        matches!(self, Self::Created | Self::Updated)
    }
}

//! Remote event payloads.
//!
//! [`RemoteEvent`] mirrors one item of an events-list response. Fields are
//! all optional because incremental responses carry cancelled events as
//! little more than `{id, status}`. The untouched JSON item is kept in
//! [`RemoteEvent::raw`] so the store can persist it verbatim.

use calsync_core::Attendee;
use serde::{Deserialize, Serialize};

/// A `{dateTime, date, timeZone}` boundary as sent by the remote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEventTime {
    pub date_time: Option<String>,
    pub date: Option<String>,
    pub time_zone: Option<String>,
}

impl RemoteEventTime {
    /// A timed boundary.
    pub fn date_time(value: impl Into<String>) -> Self {
        Self {
            date_time: Some(value.into()),
            ..Default::default()
        }
    }

    /// An all-day boundary.
    pub fn date(value: impl Into<String>) -> Self {
        Self {
            date: Some(value.into()),
            ..Default::default()
        }
    }
}

/// Creator or organizer of an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemotePerson {
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// One event as returned by the remote events-list endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEvent {
    pub id: Option<String>,
    pub status: Option<String>,
    pub kind: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: Option<RemoteEventTime>,
    pub end: Option<RemoteEventTime>,
    pub creator: Option<RemotePerson>,
    pub organizer: Option<RemotePerson>,
    #[serde(rename = "iCalUID")]
    pub ical_uid: Option<String>,
    pub sequence: Option<i64>,
    pub visibility: Option<String>,
    pub transparency: Option<String>,
    pub event_type: Option<String>,
    pub attendees: Option<Vec<Attendee>>,
    pub conference_data: Option<serde_json::Value>,
    pub hangout_link: Option<String>,
    pub html_link: Option<String>,
    pub recurrence: Option<Vec<String>>,

    /// The item exactly as received.
    #[serde(skip)]
    pub raw: serde_json::Value,
}

impl RemoteEvent {
    /// Parses one response item, keeping the untouched JSON in `raw`.
    pub fn from_json(item: serde_json::Value) -> Result<Self, serde_json::Error> {
        let mut event: RemoteEvent = serde_json::from_value(item.clone())?;
        event.raw = item;
        Ok(event)
    }

    /// Returns the event id, or `"<missing id>"` for log messages.
    pub fn id_for_log(&self) -> &str {
        self.id.as_deref().unwrap_or("<missing id>")
    }

    /// Returns `true` if the remote marks this event as cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.status.as_deref() == Some("cancelled")
    }
}

//! Token and event storage contracts.
//!
//! [`TokenStore`] owns per-user credentials and the sync cursor;
//! [`EventStore`] owns the stored calendar events. Both are consumed by the
//! sync engine through trait objects, so the same backend can serve both
//! roles:
//!
//! - [`MemoryStore`] keeps everything in process memory
//! - [`SqliteStore`] persists to a SQLite database

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use calsync_core::{CalendarEvent, Credential, StoredEvent, SyncCursor, UpsertOutcome};
use calsync_providers::BoxFuture;
use chrono::{DateTime, Utc};

use crate::error::StoreResult;

/// Per-user credentials and sync cursor.
pub trait TokenStore: Send + Sync {
    /// Returns the user's credential, or `None` if calendar access was never
    /// granted.
    fn get_credential<'a>(&'a self, user_id: &'a str)
    -> BoxFuture<'a, StoreResult<Option<Credential>>>;

    /// Stores the user's credential, replacing any previous one.
    fn set_credential<'a>(
        &'a self,
        user_id: &'a str,
        credential: &'a Credential,
    ) -> BoxFuture<'a, StoreResult<()>>;

    /// Returns the user's cursor; a user that never synced gets the default
    /// (full resync) cursor.
    fn get_cursor<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, StoreResult<SyncCursor>>;

    /// Stores the user's cursor together with its `last_sync_at`.
    fn set_cursor<'a>(
        &'a self,
        user_id: &'a str,
        cursor: &'a SyncCursor,
    ) -> BoxFuture<'a, StoreResult<()>>;
}

/// Stored calendar events, keyed by `(user_id, google_event_id)`.
pub trait EventStore: Send + Sync {
    /// Inserts or replaces the row for `event`.
    ///
    /// The outcome is decided with [`UpsertOutcome::classify`] atomically with
    /// the write: `Unchanged` and `Stale` leave the row untouched, including
    /// its `updated_at`.
    fn upsert_event<'a>(&'a self, event: &'a CalendarEvent)
    -> BoxFuture<'a, StoreResult<UpsertOutcome>>;

    /// Deletes a row. Returns `false` if there was nothing to delete.
    fn delete_event<'a>(
        &'a self,
        user_id: &'a str,
        google_event_id: &'a str,
    ) -> BoxFuture<'a, StoreResult<bool>>;

    fn get_event<'a>(
        &'a self,
        user_id: &'a str,
        google_event_id: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<StoredEvent>>>;

    /// Returns every stored event of the user, ordered by start time.
    fn list_events<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, StoreResult<Vec<StoredEvent>>>;

    /// Returns the events overlapping `[from, to)`, ordered by start time.
    ///
    /// All-day events span from midnight UTC of their start date to midnight
    /// UTC of their (exclusive) end date.
    fn events_between<'a>(
        &'a self,
        user_id: &'a str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> BoxFuture<'a, StoreResult<Vec<StoredEvent>>>;

    /// Returns the earliest-starting event that has not ended at `now`.
    fn next_event<'a>(
        &'a self,
        user_id: &'a str,
        now: DateTime<Utc>,
    ) -> BoxFuture<'a, StoreResult<Option<StoredEvent>>>;
}

/// Returns true if `event` overlaps `[from, to)`.
pub(crate) fn overlaps(event: &CalendarEvent, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
    event.start_time.to_utc_datetime() < to && event.end_time.to_utc_datetime() > from
}

#[cfg(test)]
pub(crate) mod fixtures {
    use calsync_core::{CalendarEvent, EventStatus, EventTime};

    pub fn sample_event(id: &str, sequence: Option<i64>) -> CalendarEvent {
        let mut event = event_at(id, "2024-01-01T09:00:00Z", "2024-01-01T09:30:00Z");
        event.sequence = sequence;
        event
    }

    pub fn event_at(id: &str, start: &str, end: &str) -> CalendarEvent {
        CalendarEvent {
            user_id: "user-1".to_string(),
            google_event_id: id.to_string(),
            start_time: EventTime::from_storage(start).unwrap(),
            end_time: EventTime::from_storage(end).unwrap(),
            all_day: start.len() == 10,
            title: Some("Standup".to_string()),
            description: None,
            location: None,
            creator_email: Some("me@example.com".to_string()),
            creator_name: None,
            organizer_email: Some("me@example.com".to_string()),
            organizer_name: None,
            ical_uid: Some(format!("{id}@google.com")),
            sequence: None,
            status: Some(EventStatus::Confirmed),
            visibility: None,
            transparency: None,
            event_type: Some("default".to_string()),
            kind: Some("calendar#event".to_string()),
            attendees: None,
            conference_data: None,
            hangout_link: None,
            html_link: None,
            recurrence: None,
            raw_data: serde_json::json!({ "id": id, "start": { "dateTime": start } }),
        }
    }
}

//! SQLite-backed store.
//!
//! Two tables:
//!
//! - `calendar_events`: one row per `(user_id, google_event_id)`; structured
//!   fields (`attendees`, `conference_data`, `recurrence`, `raw_data`) are
//!   JSON text. `start_at`/`end_at` hold fixed-width UTC instants for range
//!   queries.
//! - `sync_profiles`: one row per user with the OAuth tokens and the sync
//!   cursor.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use calsync_core::{
    CalendarEvent, Credential, EventStatus, EventTime, StoredEvent, SyncCursor, UpsertOutcome,
};
use calsync_providers::BoxFuture;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{EventStore, TokenStore};
use crate::error::{StoreError, StoreResult};

const EVENT_COLUMNS: &str = "user_id, google_event_id, start_time, end_time, all_day, \
     title, description, location, creator_email, creator_name, organizer_email, \
     organizer_name, ical_uid, sequence, status, visibility, transparency, event_type, kind, \
     attendees, conference_data, hangout_link, html_link, recurrence, raw_data, \
     created_at, updated_at";

/// A [`TokenStore`] and [`EventStore`] persisted in SQLite.
///
/// The connection sits behind a mutex; every operation is a short
/// synchronous statement or transaction.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `path` and its parent
    /// directory.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        debug!(path = %path.display(), "opening sqlite store");
        Self::from_connection(Connection::open(path)?)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> StoreResult<()> {
        self.conn()?.execute_batch(
            "CREATE TABLE IF NOT EXISTS calendar_events (
                user_id          TEXT NOT NULL,
                google_event_id  TEXT NOT NULL,
                start_time       TEXT NOT NULL,
                end_time         TEXT NOT NULL,
                start_at         TEXT NOT NULL,
                end_at           TEXT NOT NULL,
                all_day          INTEGER NOT NULL,
                title            TEXT,
                description      TEXT,
                location         TEXT,
                creator_email    TEXT,
                creator_name     TEXT,
                organizer_email  TEXT,
                organizer_name   TEXT,
                ical_uid         TEXT,
                sequence         INTEGER,
                status           TEXT,
                visibility       TEXT,
                transparency     TEXT,
                event_type       TEXT,
                kind             TEXT,
                attendees        TEXT,
                conference_data  TEXT,
                hangout_link     TEXT,
                html_link        TEXT,
                recurrence       TEXT,
                raw_data         TEXT NOT NULL,
                created_at       TEXT NOT NULL,
                updated_at       TEXT NOT NULL,
                PRIMARY KEY (user_id, google_event_id)
            );

            CREATE INDEX IF NOT EXISTS idx_calendar_events_user_start
                ON calendar_events(user_id, start_at);

            CREATE TABLE IF NOT EXISTS sync_profiles (
                user_id                TEXT PRIMARY KEY,
                access_token           TEXT,
                refresh_token          TEXT,
                credential_updated_at  TEXT,
                sync_token             TEXT,
                last_sync_at           TEXT
            );",
        )?;
        Ok(())
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn load_credential(&self, user_id: &str) -> StoreResult<Option<Credential>> {
        let row = self
            .conn()?
            .query_row(
                "SELECT access_token, refresh_token, credential_updated_at
                 FROM sync_profiles WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((Some(access_token), refresh_token, updated_at)) = row else {
            return Ok(None);
        };

        Ok(Some(Credential {
            access_token,
            refresh_token,
            updated_at: match updated_at {
                Some(value) => parse_timestamp(&value)?,
                None => DateTime::<Utc>::UNIX_EPOCH,
            },
        }))
    }

    fn save_credential(&self, user_id: &str, credential: &Credential) -> StoreResult<()> {
        self.conn()?.execute(
            "INSERT INTO sync_profiles (user_id, access_token, refresh_token, credential_updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                credential_updated_at = excluded.credential_updated_at",
            params![
                user_id,
                credential.access_token,
                credential.refresh_token,
                timestamp(credential.updated_at),
            ],
        )?;
        Ok(())
    }

    fn load_cursor(&self, user_id: &str) -> StoreResult<SyncCursor> {
        let row = self
            .conn()?
            .query_row(
                "SELECT sync_token, last_sync_at FROM sync_profiles WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, Option<String>>(1)?,
                    ))
                },
            )
            .optional()?;

        let Some((sync_token, last_sync_at)) = row else {
            return Ok(SyncCursor::default());
        };

        Ok(SyncCursor::new(
            sync_token,
            last_sync_at.as_deref().map(parse_timestamp).transpose()?,
        ))
    }

    fn save_cursor(&self, user_id: &str, cursor: &SyncCursor) -> StoreResult<()> {
        self.conn()?.execute(
            "INSERT INTO sync_profiles (user_id, sync_token, last_sync_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET
                sync_token = excluded.sync_token,
                last_sync_at = excluded.last_sync_at",
            params![
                user_id,
                cursor.sync_token,
                cursor.last_sync_at.map(timestamp),
            ],
        )?;
        Ok(())
    }

    fn upsert(&self, event: &CalendarEvent) -> StoreResult<UpsertOutcome> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let existing = tx
            .query_row(
                &format!(
                    "SELECT {EVENT_COLUMNS} FROM calendar_events
                     WHERE user_id = ?1 AND google_event_id = ?2"
                ),
                params![event.user_id, event.google_event_id],
                EventRow::from_row,
            )
            .optional()?
            .map(EventRow::into_stored)
            .transpose()?;

        let outcome = UpsertOutcome::classify(existing.as_ref().map(|s| &s.event), event);
        if outcome.writes() {
            let now = Utc::now();
            let created_at = existing.map_or(now, |stored| stored.created_at);
            tx.execute(
                &format!(
                    "INSERT OR REPLACE INTO calendar_events ({EVENT_COLUMNS}, start_at, end_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                             ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29)"
                ),
                params![
                    event.user_id,
                    event.google_event_id,
                    event.start_time.to_storage(),
                    event.end_time.to_storage(),
                    event.all_day,
                    event.title,
                    event.description,
                    event.location,
                    event.creator_email,
                    event.creator_name,
                    event.organizer_email,
                    event.organizer_name,
                    event.ical_uid,
                    event.sequence,
                    event.status.map(|s| s.as_str()),
                    event.visibility,
                    event.transparency,
                    event.event_type,
                    event.kind,
                    json_column(&event.attendees)?,
                    json_column(&event.conference_data)?,
                    event.hangout_link,
                    event.html_link,
                    json_column(&event.recurrence)?,
                    serde_json::to_string(&event.raw_data)?,
                    timestamp(created_at),
                    timestamp(now),
                    sort_key(&event.start_time),
                    sort_key(&event.end_time),
                ],
            )?;
        }

        tx.commit()?;
        Ok(outcome)
    }

    fn delete(&self, user_id: &str, google_event_id: &str) -> StoreResult<bool> {
        let removed = self.conn()?.execute(
            "DELETE FROM calendar_events WHERE user_id = ?1 AND google_event_id = ?2",
            params![user_id, google_event_id],
        )?;
        Ok(removed > 0)
    }

    fn query_events(
        &self,
        filter: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> StoreResult<Vec<StoredEvent>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM calendar_events WHERE {filter}
             ORDER BY start_at, google_event_id"
        ))?;
        let events = stmt
            .query_map(params, EventRow::from_row)?
            .map(|row| row.map_err(StoreError::from).and_then(EventRow::into_stored))
            .collect::<StoreResult<Vec<_>>>();
        events
    }
}

impl TokenStore for SqliteStore {
    fn get_credential<'a>(
        &'a self,
        user_id: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<Credential>>> {
        Box::pin(async move { self.load_credential(user_id) })
    }

    fn set_credential<'a>(
        &'a self,
        user_id: &'a str,
        credential: &'a Credential,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move { self.save_credential(user_id, credential) })
    }

    fn get_cursor<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, StoreResult<SyncCursor>> {
        Box::pin(async move { self.load_cursor(user_id) })
    }

    fn set_cursor<'a>(
        &'a self,
        user_id: &'a str,
        cursor: &'a SyncCursor,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move { self.save_cursor(user_id, cursor) })
    }
}

impl EventStore for SqliteStore {
    fn upsert_event<'a>(
        &'a self,
        event: &'a CalendarEvent,
    ) -> BoxFuture<'a, StoreResult<UpsertOutcome>> {
        Box::pin(async move { self.upsert(event) })
    }

    fn delete_event<'a>(
        &'a self,
        user_id: &'a str,
        google_event_id: &'a str,
    ) -> BoxFuture<'a, StoreResult<bool>> {
        Box::pin(async move { self.delete(user_id, google_event_id) })
    }

    fn get_event<'a>(
        &'a self,
        user_id: &'a str,
        google_event_id: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<StoredEvent>>> {
        Box::pin(async move {
            Ok(self
                .query_events(
                    "user_id = ?1 AND google_event_id = ?2",
                    params![user_id, google_event_id],
                )?
                .into_iter()
                .next())
        })
    }

    fn list_events<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, StoreResult<Vec<StoredEvent>>> {
        Box::pin(async move { self.query_events("user_id = ?1", params![user_id]) })
    }

    fn events_between<'a>(
        &'a self,
        user_id: &'a str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> BoxFuture<'a, StoreResult<Vec<StoredEvent>>> {
        Box::pin(async move {
            self.query_events(
                "user_id = ?1 AND start_at < ?3 AND end_at > ?2",
                params![user_id, instant_key(from), instant_key(to)],
            )
        })
    }

    fn next_event<'a>(
        &'a self,
        user_id: &'a str,
        now: DateTime<Utc>,
    ) -> BoxFuture<'a, StoreResult<Option<StoredEvent>>> {
        Box::pin(async move {
            Ok(self
                .query_events(
                    "user_id = ?1 AND end_at > ?2",
                    params![user_id, instant_key(now)],
                )?
                .into_iter()
                .next())
        })
    }
}

/// Raw column values of one `calendar_events` row.
struct EventRow {
    user_id: String,
    google_event_id: String,
    start_time: String,
    end_time: String,
    all_day: bool,
    title: Option<String>,
    description: Option<String>,
    location: Option<String>,
    creator_email: Option<String>,
    creator_name: Option<String>,
    organizer_email: Option<String>,
    organizer_name: Option<String>,
    ical_uid: Option<String>,
    sequence: Option<i64>,
    status: Option<String>,
    visibility: Option<String>,
    transparency: Option<String>,
    event_type: Option<String>,
    kind: Option<String>,
    attendees: Option<String>,
    conference_data: Option<String>,
    hangout_link: Option<String>,
    html_link: Option<String>,
    recurrence: Option<String>,
    raw_data: String,
    created_at: String,
    updated_at: String,
}

impl EventRow {
    /// Reads a row selected with [`EVENT_COLUMNS`].
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            user_id: row.get(0)?,
            google_event_id: row.get(1)?,
            start_time: row.get(2)?,
            end_time: row.get(3)?,
            all_day: row.get(4)?,
            title: row.get(5)?,
            description: row.get(6)?,
            location: row.get(7)?,
            creator_email: row.get(8)?,
            creator_name: row.get(9)?,
            organizer_email: row.get(10)?,
            organizer_name: row.get(11)?,
            ical_uid: row.get(12)?,
            sequence: row.get(13)?,
            status: row.get(14)?,
            visibility: row.get(15)?,
            transparency: row.get(16)?,
            event_type: row.get(17)?,
            kind: row.get(18)?,
            attendees: row.get(19)?,
            conference_data: row.get(20)?,
            hangout_link: row.get(21)?,
            html_link: row.get(22)?,
            recurrence: row.get(23)?,
            raw_data: row.get(24)?,
            created_at: row.get(25)?,
            updated_at: row.get(26)?,
        })
    }

    fn into_stored(self) -> StoreResult<StoredEvent> {
        let status = self
            .status
            .as_deref()
            .map(str::parse::<EventStatus>)
            .transpose()
            .map_err(StoreError::invalid_data)?;

        let event = CalendarEvent {
            start_time: parse_event_time(&self.start_time)?,
            end_time: parse_event_time(&self.end_time)?,
            all_day: self.all_day,
            title: self.title,
            description: self.description,
            location: self.location,
            creator_email: self.creator_email,
            creator_name: self.creator_name,
            organizer_email: self.organizer_email,
            organizer_name: self.organizer_name,
            ical_uid: self.ical_uid,
            sequence: self.sequence,
            status,
            visibility: self.visibility,
            transparency: self.transparency,
            event_type: self.event_type,
            kind: self.kind,
            attendees: from_json_column(self.attendees)?,
            conference_data: from_json_column(self.conference_data)?,
            hangout_link: self.hangout_link,
            html_link: self.html_link,
            recurrence: from_json_column(self.recurrence)?,
            raw_data: serde_json::from_str(&self.raw_data)?,
            user_id: self.user_id,
            google_event_id: self.google_event_id,
        };

        Ok(StoredEvent {
            event,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

fn json_column<T: Serialize>(value: &Option<T>) -> StoreResult<Option<String>> {
    Ok(value.as_ref().map(serde_json::to_string).transpose()?)
}

fn from_json_column<T: DeserializeOwned>(value: Option<String>) -> StoreResult<Option<T>> {
    Ok(value.as_deref().map(serde_json::from_str).transpose()?)
}

fn parse_event_time(value: &str) -> StoreResult<EventTime> {
    EventTime::from_storage(value)
        .map_err(|e| StoreError::invalid_data(format!("bad event time {value:?}: {e}")))
}

fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_timestamp(value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::invalid_data(format!("bad timestamp {value:?}: {e}")))
}

/// Fixed-width UTC form, so that string comparison orders instants.
fn instant_key(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn sort_key(value: &EventTime) -> String {
    instant_key(value.to_utc_datetime())
}

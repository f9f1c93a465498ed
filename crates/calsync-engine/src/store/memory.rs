//! In-process store.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use calsync_core::{CalendarEvent, Credential, StoredEvent, SyncCursor, UpsertOutcome};
use calsync_providers::BoxFuture;
use chrono::{DateTime, Utc};

use super::{EventStore, TokenStore, overlaps};
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Default)]
struct MemoryState {
    credentials: HashMap<String, Credential>,
    cursors: HashMap<String, SyncCursor>,
    /// Keyed by `(user_id, google_event_id)`.
    events: HashMap<(String, String), StoredEvent>,
}

/// A [`TokenStore`] and [`EventStore`] kept in memory.
///
/// Used in tests and for short-lived embedding; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> StoreResult<MutexGuard<'_, MemoryState>> {
        self.state.lock().map_err(|_| StoreError::Poisoned)
    }

    fn upsert(&self, event: &CalendarEvent) -> StoreResult<UpsertOutcome> {
        let mut state = self.state()?;
        let key = (event.user_id.clone(), event.google_event_id.clone());
        let existing = state.events.get(&key);
        let outcome = UpsertOutcome::classify(existing.map(|stored| &stored.event), event);

        let now = Utc::now();
        match outcome {
            UpsertOutcome::Created => {
                state.events.insert(
                    key,
                    StoredEvent {
                        event: event.clone(),
                        created_at: now,
                        updated_at: now,
                    },
                );
            }
            UpsertOutcome::Updated => {
                if let Some(stored) = state.events.get_mut(&key) {
                    stored.event = event.clone();
                    stored.updated_at = now;
                }
            }
            UpsertOutcome::Unchanged | UpsertOutcome::Stale => {}
        }
        Ok(outcome)
    }

    /// Returns the user's events matching `filter`, ordered by start time.
    fn collect(
        &self,
        user_id: &str,
        filter: impl Fn(&CalendarEvent) -> bool,
    ) -> StoreResult<Vec<StoredEvent>> {
        let state = self.state()?;
        let mut events: Vec<StoredEvent> = state
            .events
            .iter()
            .filter(|((user, _), stored)| user == user_id && filter(&stored.event))
            .map(|(_, stored)| stored.clone())
            .collect();
        events.sort_by(|a, b| {
            a.event
                .start_time
                .to_utc_datetime()
                .cmp(&b.event.start_time.to_utc_datetime())
                .then_with(|| a.event.google_event_id.cmp(&b.event.google_event_id))
        });
        Ok(events)
    }
}

impl TokenStore for MemoryStore {
    fn get_credential<'a>(
        &'a self,
        user_id: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<Credential>>> {
        Box::pin(async move { Ok(self.state()?.credentials.get(user_id).cloned()) })
    }

    fn set_credential<'a>(
        &'a self,
        user_id: &'a str,
        credential: &'a Credential,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            self.state()?
                .credentials
                .insert(user_id.to_string(), credential.clone());
            Ok(())
        })
    }

    fn get_cursor<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, StoreResult<SyncCursor>> {
        Box::pin(async move {
            Ok(self
                .state()?
                .cursors
                .get(user_id)
                .cloned()
                .unwrap_or_default())
        })
    }

    fn set_cursor<'a>(
        &'a self,
        user_id: &'a str,
        cursor: &'a SyncCursor,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            self.state()?
                .cursors
                .insert(user_id.to_string(), cursor.clone());
            Ok(())
        })
    }
}

impl EventStore for MemoryStore {
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
        Box::pin(async move {
            let key = (user_id.to_string(), google_event_id.to_string());
            Ok(self.state()?.events.remove(&key).is_some())
        })
    }

    fn get_event<'a>(
        &'a self,
        user_id: &'a str,
        google_event_id: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<StoredEvent>>> {
        Box::pin(async move {
            let key = (user_id.to_string(), google_event_id.to_string());
            Ok(self.state()?.events.get(&key).cloned())
        })
    }

    fn list_events<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, StoreResult<Vec<StoredEvent>>> {
        Box::pin(async move { self.collect(user_id, |_| true) })
    }

    fn events_between<'a>(
        &'a self,
        user_id: &'a str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> BoxFuture<'a, StoreResult<Vec<StoredEvent>>> {
        Box::pin(async move { self.collect(user_id, |event| overlaps(event, from, to)) })
    }

    fn next_event<'a>(
        &'a self,
        user_id: &'a str,
        now: DateTime<Utc>,
    ) -> BoxFuture<'a, StoreResult<Option<StoredEvent>>> {
        Box::pin(async move {
            Ok(self
                .collect(user_id, |event| event.is_upcoming_at(now))?
                .into_iter()
                .next())
        })
    }
}

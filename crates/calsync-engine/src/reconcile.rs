//! Event reconciliation.
//!
//! Turns one page of [`RemoteEvent`]s into store mutations:
//!
//! - `status == "cancelled"` deletes `(user_id, id)`; deleting a missing row
//!   is a no-op
//! - anything else is upserted, with every optional field carried over as-is
//!   (absent stays absent)
//! - a record that cannot be mapped is logged and skipped; only a store
//!   failure aborts the page

use std::sync::Arc;

use calsync_core::{CalendarEvent, EventStatus, EventTime, UpsertOutcome};
use calsync_providers::{EventPage, RemoteEvent, RemoteEventTime};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::store::EventStore;

/// Why a single remote event was not applied.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The record cannot be mapped; it is skipped.
    #[error("malformed event {}: {reason}", .event_id.as_deref().unwrap_or("<missing id>"))]
    Malformed {
        event_id: Option<String>,
        reason: String,
    },

    /// The store failed; the whole sync must stop.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ReconcileError {
    fn malformed(event: &RemoteEvent, reason: impl Into<String>) -> Self {
        Self::Malformed {
            event_id: event.id.clone(),
            reason: reason.into(),
        }
    }
}

/// The store mutation one remote event maps to.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Upsert(Box<CalendarEvent>),
    Delete { google_event_id: String },
}

/// Maps a remote event to the change to apply for `user_id`.
pub fn plan_change(user_id: &str, remote: &RemoteEvent) -> Result<Change, ReconcileError> {
    let Some(id) = remote.id.as_deref().filter(|id| !id.is_empty()) else {
        return Err(ReconcileError::malformed(remote, "event has no id"));
    };

    if remote.is_cancelled() {
        return Ok(Change::Delete {
            google_event_id: id.to_string(),
        });
    }

    Ok(Change::Upsert(Box::new(to_calendar_event(user_id, id, remote)?)))
}

fn to_calendar_event(
    user_id: &str,
    id: &str,
    remote: &RemoteEvent,
) -> Result<CalendarEvent, ReconcileError> {
    let start = remote
        .start
        .as_ref()
        .ok_or_else(|| ReconcileError::malformed(remote, "event has no start"))?;
    let start_time = parse_boundary(remote, "start", start)?;
    let end_time = match &remote.end {
        Some(end) => parse_boundary(remote, "end", end)?,
        None => return Err(ReconcileError::malformed(remote, "event has no end")),
    };

    let status = remote
        .status
        .as_deref()
        .map(str::parse::<EventStatus>)
        .transpose()
        .map_err(|reason| ReconcileError::malformed(remote, reason))?;

    let raw_data = if remote.raw.is_null() {
        serde_json::to_value(remote).map_err(|e| ReconcileError::malformed(remote, e.to_string()))?
    } else {
        remote.raw.clone()
    };

    Ok(CalendarEvent {
        user_id: user_id.to_string(),
        google_event_id: id.to_string(),
        all_day: start.date_time.is_none(),
        start_time,
        end_time,
        title: remote.summary.clone(),
        description: remote.description.clone(),
        location: remote.location.clone(),
        creator_email: remote.creator.as_ref().and_then(|p| p.email.clone()),
        creator_name: remote.creator.as_ref().and_then(|p| p.display_name.clone()),
        organizer_email: remote.organizer.as_ref().and_then(|p| p.email.clone()),
        organizer_name: remote.organizer.as_ref().and_then(|p| p.display_name.clone()),
        ical_uid: remote.ical_uid.clone(),
        sequence: remote.sequence,
        status,
        visibility: remote.visibility.clone(),
        transparency: remote.transparency.clone(),
        event_type: remote.event_type.clone(),
        kind: remote.kind.clone(),
        attendees: remote.attendees.clone(),
        conference_data: remote.conference_data.clone(),
        hangout_link: remote.hangout_link.clone(),
        html_link: remote.html_link.clone(),
        recurrence: remote.recurrence.clone(),
        raw_data,
    })
}

fn parse_boundary(
    remote: &RemoteEvent,
    which: &str,
    time: &RemoteEventTime,
) -> Result<EventTime, ReconcileError> {
    EventTime::parse(time.date_time.as_deref(), time.date.as_deref())
        .map_err(|e| ReconcileError::malformed(remote, format!("{which}: {e}")))
}

/// Counts for one or more reconciled pages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PageOutcome {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Cancellations applied, whether or not a row existed.
    pub cancelled: usize,
    pub stale: usize,
    pub malformed: usize,
}

impl PageOutcome {
    fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Created => self.created += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
            UpsertOutcome::Stale => self.stale += 1,
        }
    }
}

/// Applies pages of remote events to an [`EventStore`].
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn EventStore>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler").finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// Applies one remote event.
    pub async fn apply(
        &self,
        user_id: &str,
        remote: &RemoteEvent,
    ) -> Result<Option<UpsertOutcome>, ReconcileError> {
        match plan_change(user_id, remote)? {
            Change::Delete { google_event_id } => {
                let removed = self.store.delete_event(user_id, &google_event_id).await?;
                debug!(event_id = %google_event_id, removed, "applied cancellation");
                Ok(None)
            }
            Change::Upsert(event) => {
                let outcome = self.store.upsert_event(&event).await?;
                if outcome == UpsertOutcome::Stale {
                    warn!(
                        event_id = %event.google_event_id,
                        sequence = ?event.sequence,
                        "ignoring out-of-order event update"
                    );
                }
                Ok(Some(outcome))
            }
        }
    }

    /// Applies every event of `page`.
    ///
    /// Malformed records are counted and skipped. The first store failure is
    /// returned; events before it stay applied.
    pub async fn apply_page(
        &self,
        user_id: &str,
        page: &EventPage,
    ) -> Result<PageOutcome, StoreError> {
        let mut outcome = PageOutcome::default();

        for (event_id, reason) in &page.malformed {
            warn!(
                event_id = event_id.as_deref().unwrap_or("<missing id>"),
                reason = %reason,
                "skipping malformed event"
            );
            outcome.malformed += 1;
        }

        for remote in &page.events {
            match self.apply(user_id, remote).await {
                Ok(Some(upsert)) => outcome.record(upsert),
                Ok(None) => outcome.cancelled += 1,
                Err(ReconcileError::Malformed { event_id, reason }) => {
                    warn!(
                        event_id = event_id.as_deref().unwrap_or("<missing id>"),
                        reason = %reason,
                        "skipping malformed event"
                    );
                    outcome.malformed += 1;
                }
                Err(ReconcileError::Store(err)) => return Err(err),
            }
        }

        Ok(outcome)
    }
}

//! Core types: stored events, event times, credentials, sync cursors, tracing

pub mod credential;
pub mod event;
pub mod time;
pub mod tracing;

pub use credential::{Credential, SyncCursor};
pub use event::{Attendee, CalendarEvent, EventStatus, StoredEvent, UNTITLED_EVENT, UpsertOutcome};
pub use time::{EventTime, TimeParseError};
pub use self::tracing::{LogFormat, TracingConfig, TracingError, init_tracing};

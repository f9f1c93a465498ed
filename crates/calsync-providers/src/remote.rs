//! The Remote Calendar Client contract.
//!
//! A [`RemoteCalendar`] fetches one page of events at a time and exchanges
//! refresh tokens for access tokens. It holds no per-user state: the caller
//! passes the access token and the fetch position on every call.

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};

use crate::error::ProviderResult;
use crate::remote_event::RemoteEvent;

/// Page size requested from the remote API.
pub const MAX_RESULTS: u32 = 250;

/// A boxed future for async trait methods.
///
/// Keeps [`RemoteCalendar`] object-safe so the orchestrator can hold an
/// `Arc<dyn RemoteCalendar>`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Which slice of the calendar a fetch covers.
///
/// The remote API refuses a sync token combined with a time range, so the two
/// are separate variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchMode {
    /// Only changes since the given cursor.
    Incremental { cursor: String },
    /// Every event in the window. `time_min: None` means "from now" at the
    /// moment each page is requested, so paginating callers pin it.
    Window {
        time_min: Option<DateTime<Utc>>,
        time_max: Option<DateTime<Utc>>,
    },
}

impl Default for FetchMode {
    fn default() -> Self {
        Self::Window {
            time_min: None,
            time_max: None,
        }
    }
}

/// Parameters for one page fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchRequest {
    pub mode: FetchMode,
    /// Continuation token from the previous page of the same sequence.
    pub page_token: Option<String>,
}

impl FetchRequest {
    /// An incremental fetch from `cursor`.
    pub fn incremental(cursor: impl Into<String>) -> Self {
        Self {
            mode: FetchMode::Incremental {
                cursor: cursor.into(),
            },
            page_token: None,
        }
    }

    /// A full fetch of the given window.
    pub fn window(time_min: Option<DateTime<Utc>>, time_max: Option<DateTime<Utc>>) -> Self {
        Self {
            mode: FetchMode::Window { time_min, time_max },
            page_token: None,
        }
    }

    /// Builder method to continue at the given page.
    pub fn with_page_token(mut self, token: Option<String>) -> Self {
        self.page_token = token;
        self
    }

    /// Returns the cursor for incremental fetches.
    pub fn since_cursor(&self) -> Option<&str> {
        match &self.mode {
            FetchMode::Incremental { cursor } => Some(cursor),
            FetchMode::Window { .. } => None,
        }
    }

    pub fn is_incremental(&self) -> bool {
        matches!(self.mode, FetchMode::Incremental { .. })
    }
}

/// One page of an events-list response.
#[derive(Debug, Clone, Default)]
pub struct EventPage {
    pub events: Vec<RemoteEvent>,
    /// Present only on the last page of a sequence.
    pub next_cursor: Option<String>,
    /// Present when more pages follow.
    pub next_page_token: Option<String>,
    /// Items that could not be parsed at all, as `(id, reason)`.
    pub malformed: Vec<(Option<String>, String)>,
}

impl EventPage {
    /// Creates a page with events.
    pub fn with_events(events: Vec<RemoteEvent>) -> Self {
        Self {
            events,
            ..Default::default()
        }
    }

    /// Builder method to set the next cursor.
    pub fn with_next_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.next_cursor = Some(cursor.into());
        self
    }

    /// Builder method to set the next page token.
    pub fn with_next_page_token(mut self, token: impl Into<String>) -> Self {
        self.next_page_token = Some(token.into());
        self
    }

    /// Returns true if this is the last page of the sequence.
    pub fn is_last(&self) -> bool {
        self.next_page_token.is_none()
    }
}

/// The remote calendar backend.
///
/// # Errors
///
/// - `fetch_events` fails with `AuthExpired` on HTTP 401,
///   `CursorInvalidated` on HTTP 410 and `RemoteUnavailable` for any other
///   non-2xx status or transport failure.
/// - `refresh_access_token` fails with `RefreshFailed` when the token
///   endpoint rejects the refresh token.
pub trait RemoteCalendar: Send + Sync {
    /// Returns the provider name (e.g. "google").
    fn name(&self) -> &str;

    /// Fetches one page of events from `calendar_id`.
    fn fetch_events<'a>(
        &'a self,
        access_token: &'a str,
        calendar_id: &'a str,
        request: &'a FetchRequest,
    ) -> BoxFuture<'a, ProviderResult<EventPage>>;

    /// Exchanges a refresh token for a new access token.
    fn refresh_access_token<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, ProviderResult<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_request_is_open_window() {
        let request = FetchRequest::default();
        assert_eq!(
            request.mode,
            FetchMode::Window {
                time_min: None,
                time_max: None
            }
        );
        assert!(request.since_cursor().is_none());
        assert!(!request.is_incremental());
    }

    #[test]
    fn incremental_request_carries_cursor_only() {
        let request = FetchRequest::incremental("cursor-1").with_page_token(Some("p2".into()));
        assert_eq!(request.since_cursor(), Some("cursor-1"));
        assert_eq!(request.page_token.as_deref(), Some("p2"));
        assert!(request.is_incremental());
    }

    #[test]
    fn page_builders() {
        let page = EventPage::with_events(vec![]).with_next_page_token("p2");
        assert!(!page.is_last());
        let page = EventPage::default().with_next_cursor("c");
        assert!(page.is_last());
        assert_eq!(page.next_cursor.as_deref(), Some("c"));
    }
}

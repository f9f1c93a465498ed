//! The sync orchestrator.
//!
//! One invocation of [`CalendarSync::sync_calendar`] walks a small state
//! machine:
//!
//! ```text
//! LoadCredential ─▶ FetchPage ─▶ Reconcile ─┬─▶ FetchPage (next page)
//!                    ▲    │                  └─▶ UpdateCursor ─▶ Done
//!                    │    ├─ AuthExpired ──▶ AuthRetry (once)
//!                    └────┴─ CursorInvalidated ──▶ full resync (once)
//! ```
//!
//! The cursor is written only in `UpdateCursor`, after every page of the
//! fetch sequence has been reconciled. Any failure before that leaves the
//! stored cursor where it was, so the next invocation replays the same
//! changes.

use std::sync::Arc;

use calsync_core::{Credential, SyncCursor};
use calsync_providers::{EventPage, FetchRequest, ProviderError, ProviderErrorCode, RemoteCalendar};
use chrono::Utc;
use serde::Serialize;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::error::SyncError;
use crate::locks::UserLocks;
use crate::reconcile::{PageOutcome, Reconciler};
use crate::store::{EventStore, TokenStore};

/// What to sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    pub calendar_id: String,
    /// Upper bound of a full resync window, relative to now.
    pub lookahead: Option<chrono::Duration>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::new("primary")
    }
}

impl SyncOptions {
    pub fn new(calendar_id: impl Into<String>) -> Self {
        Self {
            calendar_id: calendar_id.into(),
            lookahead: None,
        }
    }

    pub fn with_lookahead(mut self, lookahead: chrono::Duration) -> Self {
        self.lookahead = Some(lookahead);
        self
    }

    /// A window starting now. Both bounds are fixed here so every page of
    /// the sequence repeats the query its page token was issued for.
    fn full_resync_request(&self) -> FetchRequest {
        let now = Utc::now();
        FetchRequest::window(Some(now), self.lookahead.map(|ahead| now + ahead))
    }
}

/// Summary of one successful sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub cancelled: usize,
    pub stale: usize,
    pub malformed: usize,
    /// Pages fetched and reconciled.
    pub pages: usize,
    /// Whether the sync ran without a cursor.
    pub full_resync: bool,
}

impl SyncReport {
    /// Number of events applied: upserts plus cancellations.
    pub fn count(&self) -> usize {
        self.created + self.updated + self.unchanged + self.cancelled
    }

    fn absorb(&mut self, page: PageOutcome) {
        self.created += page.created;
        self.updated += page.updated;
        self.unchanged += page.unchanged;
        self.cancelled += page.cancelled;
        self.stale += page.stale;
        self.malformed += page.malformed;
        self.pages += 1;
    }
}

enum SyncState {
    LoadCredential,
    FetchPage(FetchRequest),
    AuthRetry(FetchRequest),
    Reconcile(FetchRequest, EventPage),
    UpdateCursor(Option<String>),
    Done,
}

/// Per-invocation state. Nothing here outlives one sync.
struct Invocation<'a> {
    user_id: &'a str,
    credential: Option<Credential>,
    cursor: SyncCursor,
    auth_retried: bool,
    cursor_reset: bool,
    report: SyncReport,
}

/// Per-user sync entry point.
pub struct CalendarSync {
    remote: Arc<dyn RemoteCalendar>,
    tokens: Arc<dyn TokenStore>,
    reconciler: Reconciler,
    options: SyncOptions,
    locks: UserLocks,
}

impl std::fmt::Debug for CalendarSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalendarSync")
            .field("remote", &self.remote.name())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl CalendarSync {
    pub fn new(
        remote: Arc<dyn RemoteCalendar>,
        tokens: Arc<dyn TokenStore>,
        events: Arc<dyn EventStore>,
    ) -> Self {
        Self {
            remote,
            tokens,
            reconciler: Reconciler::new(events),
            options: SyncOptions::default(),
            locks: UserLocks::new(),
        }
    }

    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    /// Shares `locks` with other holders, e.g. a second `CalendarSync` over
    /// the same stores.
    pub fn with_locks(mut self, locks: UserLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Syncs one user's calendar.
    ///
    /// Not safe to run concurrently for the same user; see
    /// [`CalendarSync::sync_calendar_serialized`].
    ///
    /// # Errors
    ///
    /// - [`SyncError::NotConnected`] when there is no usable credential or
    ///   the refresh token was rejected.
    /// - [`SyncError::RemoteUnavailable`] for remote or store failures; the
    ///   stored cursor is unchanged.
    pub async fn sync_calendar(&self, user_id: &str) -> Result<SyncReport, SyncError> {
        let span = info_span!("sync", user_id = %user_id, calendar_id = %self.options.calendar_id);
        async {
            match self.run(user_id).await {
                Ok(report) => {
                    info!(
                        count = report.count(),
                        created = report.created,
                        updated = report.updated,
                        cancelled = report.cancelled,
                        malformed = report.malformed,
                        pages = report.pages,
                        full_resync = report.full_resync,
                        "sync finished"
                    );
                    Ok(report)
                }
                Err(err) => {
                    error!(error = %err, "sync failed");
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Like [`CalendarSync::sync_calendar`], waiting for any in-flight sync of
    /// the same user to finish first.
    pub async fn sync_calendar_serialized(&self, user_id: &str) -> Result<SyncReport, SyncError> {
        let _guard = self.locks.acquire(user_id).await;
        self.sync_calendar(user_id).await
    }

    async fn run(&self, user_id: &str) -> Result<SyncReport, SyncError> {
        let mut inv = Invocation {
            user_id,
            credential: None,
            cursor: SyncCursor::default(),
            auth_retried: false,
            cursor_reset: false,
            report: SyncReport::default(),
        };
        let mut state = SyncState::LoadCredential;

        loop {
            state = match state {
                SyncState::LoadCredential => self.load_credential(&mut inv).await?,
                SyncState::FetchPage(request) => self.fetch_page(&mut inv, request).await?,
                SyncState::AuthRetry(request) => self.refresh(&mut inv, request).await?,
                SyncState::Reconcile(request, page) => {
                    let outcome = self.reconciler.apply_page(user_id, &page).await?;
                    inv.report.absorb(outcome);
                    debug!(page = inv.report.pages, events = page.events.len(), "reconciled page");
                    match page.next_page_token {
                        Some(token) => SyncState::FetchPage(request.with_page_token(Some(token))),
                        None => SyncState::UpdateCursor(page.next_cursor),
                    }
                }
                SyncState::UpdateCursor(next_cursor) => {
                    if next_cursor.is_none() {
                        warn!("fetch sequence ended without a new cursor");
                    }
                    let cursor = inv.cursor.advanced(next_cursor, Utc::now());
                    self.tokens.set_cursor(user_id, &cursor).await?;
                    SyncState::Done
                }
                SyncState::Done => return Ok(inv.report),
            };
        }
    }

    async fn load_credential(&self, inv: &mut Invocation<'_>) -> Result<SyncState, SyncError> {
        let credential = self
            .tokens
            .get_credential(inv.user_id)
            .await?
            .filter(Credential::is_usable)
            .ok_or_else(|| SyncError::not_connected("no calendar access token stored"))?;
        inv.credential = Some(credential);
        inv.cursor = self.tokens.get_cursor(inv.user_id).await?;

        let request = match inv.cursor.sync_token.as_deref() {
            Some(token) if !inv.cursor.requires_full_resync() => {
                debug!("incremental sync");
                FetchRequest::incremental(token)
            }
            _ => {
                debug!("full resync");
                inv.report.full_resync = true;
                self.options.full_resync_request()
            }
        };
        Ok(SyncState::FetchPage(request))
    }

    async fn fetch_page(
        &self,
        inv: &mut Invocation<'_>,
        request: FetchRequest,
    ) -> Result<SyncState, SyncError> {
        let access_token = match &inv.credential {
            Some(credential) => credential.access_token.as_str(),
            None => return Err(SyncError::not_connected("credential not loaded")),
        };

        let result = self
            .remote
            .fetch_events(access_token, &self.options.calendar_id, &request)
            .await;

        let err = match result {
            Ok(page) => return Ok(SyncState::Reconcile(request, page)),
            Err(err) => err,
        };

        match err.code() {
            ProviderErrorCode::AuthExpired if !inv.auth_retried => {
                info!("access token rejected, refreshing");
                Ok(SyncState::AuthRetry(request))
            }
            ProviderErrorCode::AuthExpired => Err(SyncError::not_connected(format!(
                "access token rejected after refresh: {}",
                err
            ))),
            ProviderErrorCode::CursorInvalidated if !inv.cursor_reset => {
                info!("sync cursor invalidated, restarting with full resync");
                inv.cursor_reset = true;
                inv.cursor = inv.cursor.invalidated();
                self.tokens.set_cursor(inv.user_id, &inv.cursor).await?;
                // Only the pass that moves the cursor is reported.
                inv.report = SyncReport {
                    full_resync: true,
                    ..SyncReport::default()
                };
                Ok(SyncState::FetchPage(self.options.full_resync_request()))
            }
            ProviderErrorCode::CursorInvalidated => Err(SyncError::unavailable(format!(
                "cursor invalidated again during full resync: {}",
                err
            ))),
            _ => Err(remote_failure(err)),
        }
    }

    async fn refresh(
        &self,
        inv: &mut Invocation<'_>,
        request: FetchRequest,
    ) -> Result<SyncState, SyncError> {
        inv.auth_retried = true;

        let Some(credential) = inv.credential.take() else {
            return Err(SyncError::not_connected("credential not loaded"));
        };
        let Some(refresh_token) = credential.refresh_token() else {
            return Err(SyncError::not_connected(
                "access token expired and no refresh token is stored",
            ));
        };

        let access_token = self
            .remote
            .refresh_access_token(refresh_token)
            .await
            .map_err(remote_failure)?;

        let refreshed = credential.with_access_token(access_token);
        self.tokens.set_credential(inv.user_id, &refreshed).await?;
        info!("access token refreshed");

        inv.credential = Some(refreshed);
        Ok(SyncState::FetchPage(request))
    }
}

/// Collapses a provider failure into the two boundary kinds.
fn remote_failure(err: ProviderError) -> SyncError {
    match err.code() {
        ProviderErrorCode::RefreshFailed | ProviderErrorCode::AuthExpired => {
            SyncError::not_connected(err.to_string())
        }
        ProviderErrorCode::CursorInvalidated
        | ProviderErrorCode::RemoteUnavailable
        | ProviderErrorCode::InvalidResponse
        | ProviderErrorCode::Configuration => SyncError::unavailable(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{StoreError, StoreResult};
    use crate::store::MemoryStore;
    use calsync_core::{CalendarEvent, StoredEvent, UpsertOutcome};
    use calsync_providers::{BoxFuture, FetchMode, ProviderResult, RemoteEvent};
    use chrono::DateTime;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    const USER: &str = "user-1";

    /// A remote that replays scripted responses and records every call.
    #[derive(Default)]
    struct ScriptedRemote {
        pages: Mutex<VecDeque<ProviderResult<EventPage>>>,
        refreshes: Mutex<VecDeque<ProviderResult<String>>>,
        fetches: Mutex<Vec<(String, FetchRequest)>>,
        refresh_calls: Mutex<Vec<String>>,
    }

    impl ScriptedRemote {
        fn new() -> Self {
            Self::default()
        }

        fn page(self, page: EventPage) -> Self {
            self.pages.lock().unwrap().push_back(Ok(page));
            self
        }

        fn fail(self, err: ProviderError) -> Self {
            self.pages.lock().unwrap().push_back(Err(err));
            self
        }

        fn refresh_ok(self, token: &str) -> Self {
            self.refreshes
                .lock()
                .unwrap()
                .push_back(Ok(token.to_string()));
            self
        }

        fn refresh_err(self, err: ProviderError) -> Self {
            self.refreshes.lock().unwrap().push_back(Err(err));
            self
        }

        fn fetches(&self) -> Vec<(String, FetchRequest)> {
            self.fetches.lock().unwrap().clone()
        }

        fn refresh_calls(&self) -> Vec<String> {
            self.refresh_calls.lock().unwrap().clone()
        }
    }

    impl RemoteCalendar for ScriptedRemote {
        fn name(&self) -> &str {
            "scripted"
        }

        fn fetch_events<'a>(
            &'a self,
            access_token: &'a str,
            _calendar_id: &'a str,
            request: &'a FetchRequest,
        ) -> BoxFuture<'a, ProviderResult<EventPage>> {
            self.fetches
                .lock()
                .unwrap()
                .push((access_token.to_string(), request.clone()));
            let next = self.pages.lock().unwrap().pop_front();
            Box::pin(async move {
                next.unwrap_or_else(|| Err(ProviderError::unavailable("script exhausted")))
            })
        }

        fn refresh_access_token<'a>(
            &'a self,
            refresh_token: &'a str,
        ) -> BoxFuture<'a, ProviderResult<String>> {
            self.refresh_calls
                .lock()
                .unwrap()
                .push(refresh_token.to_string());
            let next = self.refreshes.lock().unwrap().pop_front();
            Box::pin(async move {
                next.unwrap_or_else(|| Err(ProviderError::refresh_failed("script exhausted")))
            })
        }
    }

    /// An event store that fails upserts of one event id.
    struct FailingStore {
        inner: MemoryStore,
        fail_on: String,
    }

    impl EventStore for FailingStore {
        fn upsert_event<'a>(
            &'a self,
            event: &'a CalendarEvent,
        ) -> BoxFuture<'a, StoreResult<UpsertOutcome>> {
            if event.google_event_id == self.fail_on {
                return Box::pin(async { Err(StoreError::invalid_data("connection lost")) });
            }
            self.inner.upsert_event(event)
        }

        fn delete_event<'a>(
            &'a self,
            user_id: &'a str,
            google_event_id: &'a str,
        ) -> BoxFuture<'a, StoreResult<bool>> {
            self.inner.delete_event(user_id, google_event_id)
        }

        fn get_event<'a>(
            &'a self,
            user_id: &'a str,
            google_event_id: &'a str,
        ) -> BoxFuture<'a, StoreResult<Option<StoredEvent>>> {
            self.inner.get_event(user_id, google_event_id)
        }

        fn list_events<'a>(
            &'a self,
            user_id: &'a str,
        ) -> BoxFuture<'a, StoreResult<Vec<StoredEvent>>> {
            self.inner.list_events(user_id)
        }

        fn events_between<'a>(
            &'a self,
            user_id: &'a str,
            from: DateTime<Utc>,
            to: DateTime<Utc>,
        ) -> BoxFuture<'a, StoreResult<Vec<StoredEvent>>> {
            self.inner.events_between(user_id, from, to)
        }

        fn next_event<'a>(
            &'a self,
            user_id: &'a str,
            now: DateTime<Utc>,
        ) -> BoxFuture<'a, StoreResult<Option<StoredEvent>>> {
            self.inner.next_event(user_id, now)
        }
    }

    fn event(id: &str, summary: &str) -> RemoteEvent {
        RemoteEvent::from_json(json!({
            "id": id,
            "status": "confirmed",
            "summary": summary,
            "start": { "dateTime": "2024-01-01T09:00:00Z" },
            "end": { "dateTime": "2024-01-01T09:30:00Z" }
        }))
        .unwrap()
    }

    fn cancelled(id: &str) -> RemoteEvent {
        RemoteEvent::from_json(json!({ "id": id, "status": "cancelled" })).unwrap()
    }

    async fn connected_store(refresh_token: Option<&str>, cursor: Option<&str>) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store
            .set_credential(
                USER,
                &Credential::new("access-1", refresh_token.map(String::from)),
            )
            .await
            .unwrap();
        if let Some(cursor) = cursor {
            store
                .set_cursor(USER, &SyncCursor::new(Some(cursor.to_string()), None))
                .await
                .unwrap();
        }
        store
    }

    fn engine(remote: &Arc<ScriptedRemote>, store: &Arc<MemoryStore>) -> CalendarSync {
        CalendarSync::new(remote.clone(), store.clone(), store.clone())
    }

    #[tokio::test]
    async fn first_sync_stores_standup_and_cursor() {
        let store = connected_store(Some("refresh-1"), None).await;
        let remote = Arc::new(
            ScriptedRemote::new()
                .page(EventPage::with_events(vec![event("abc", "Standup")]).with_next_cursor("tok-1")),
        );

        let report = engine(&remote, &store).sync_calendar(USER).await.unwrap();

        assert_eq!(report.count(), 1);
        assert_eq!(report.created, 1);
        assert!(report.full_resync);

        let stored = store.get_event(USER, "abc").await.unwrap().unwrap();
        assert_eq!(stored.event.title.as_deref(), Some("Standup"));
        assert!(!stored.event.all_day);
        assert_eq!(stored.event.start_time.to_storage(), "2024-01-01T09:00:00Z");

        let cursor = store.get_cursor(USER).await.unwrap();
        assert_eq!(cursor.sync_token.as_deref(), Some("tok-1"));
        assert!(cursor.last_sync_at.is_some());

        let fetches = remote.fetches();
        assert_eq!(fetches.len(), 1);
        assert_eq!(fetches[0].0, "access-1");
        assert!(matches!(
            fetches[0].1.mode,
            FetchMode::Window { time_min: Some(_), .. }
        ));
    }

    #[tokio::test]
    async fn incremental_sync_uses_cursor_and_follows_pages() {
        let store = connected_store(None, Some("tok-1")).await;
        let remote = Arc::new(
            ScriptedRemote::new()
                .page(EventPage::with_events(vec![event("a", "One")]).with_next_page_token("p2"))
                .page(EventPage::with_events(vec![event("b", "Two")]).with_next_cursor("tok-2")),
        );

        let report = engine(&remote, &store).sync_calendar(USER).await.unwrap();
        assert_eq!(report.pages, 2);
        assert_eq!(report.created, 2);
        assert!(!report.full_resync);

        let fetches = remote.fetches();
        assert_eq!(fetches[0].1, FetchRequest::incremental("tok-1"));
        assert_eq!(
            fetches[1].1,
            FetchRequest::incremental("tok-1").with_page_token(Some("p2".to_string()))
        );
        assert_eq!(
            store.get_cursor(USER).await.unwrap().sync_token.as_deref(),
            Some("tok-2")
        );
    }

    #[tokio::test]
    async fn sync_without_new_cursor_keeps_old_one_and_stamps_time() {
        let store = connected_store(None, Some("tok-1")).await;
        let remote = Arc::new(ScriptedRemote::new().page(EventPage::default()));

        let report = engine(&remote, &store).sync_calendar(USER).await.unwrap();
        assert_eq!(report.count(), 0);

        let cursor = store.get_cursor(USER).await.unwrap();
        assert_eq!(cursor.sync_token.as_deref(), Some("tok-1"));
        assert!(cursor.last_sync_at.is_some());
    }

    #[tokio::test]
    async fn cancellations_are_counted_and_applied() {
        let store = connected_store(None, None).await;
        let remote = Arc::new(
            ScriptedRemote::new()
                .page(EventPage::with_events(vec![event("abc", "Standup")]).with_next_cursor("tok-1"))
                .page(
                    EventPage::with_events(vec![cancelled("abc"), cancelled("unknown")])
                        .with_next_cursor("tok-2"),
                ),
        );
        let sync = engine(&remote, &store);

        sync.sync_calendar(USER).await.unwrap();
        let report = sync.sync_calendar(USER).await.unwrap();

        assert_eq!(report.cancelled, 2);
        assert_eq!(report.count(), 2);
        assert!(store.get_event(USER, "abc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn redelivered_page_is_idempotent() {
        let store = connected_store(None, None).await;
        let page = EventPage::with_events(vec![event("abc", "Standup"), event("def", "Review")])
            .with_next_cursor("tok-1");
        let remote = Arc::new(ScriptedRemote::new().page(page.clone()).page(page));
        let sync = engine(&remote, &store);

        sync.sync_calendar(USER).await.unwrap();
        let before = store.list_events(USER).await.unwrap();

        let report = sync.sync_calendar(USER).await.unwrap();
        assert_eq!(report.unchanged, 2);
        assert_eq!(store.list_events(USER).await.unwrap(), before);
    }

    #[tokio::test]
    async fn malformed_event_is_skipped() {
        let store = connected_store(None, None).await;
        let broken = RemoteEvent::from_json(json!({ "id": "broken", "summary": "No start" })).unwrap();
        let remote = Arc::new(ScriptedRemote::new().page(
            EventPage::with_events(vec![broken, event("abc", "Standup")]).with_next_cursor("tok-1"),
        ));

        let report = engine(&remote, &store).sync_calendar(USER).await.unwrap();
        assert_eq!(report.malformed, 1);
        assert_eq!(report.created, 1);
        assert!(store.get_event(USER, "broken").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn store_failure_on_second_page_keeps_cursor() {
        let tokens = connected_store(None, Some("tok-old")).await;
        let events = Arc::new(FailingStore {
            inner: MemoryStore::new(),
            fail_on: "b".to_string(),
        });
        let remote = Arc::new(
            ScriptedRemote::new()
                .page(EventPage::with_events(vec![event("a", "One")]).with_next_page_token("p2"))
                .page(EventPage::with_events(vec![event("b", "Two")]).with_next_cursor("tok-new")),
        );
        let sync = CalendarSync::new(remote.clone(), tokens.clone(), events.clone());

        let err = sync.sync_calendar(USER).await.unwrap_err();

        assert!(matches!(err, SyncError::RemoteUnavailable { .. }));
        assert!(err.is_retryable());
        assert_eq!(remote.fetches().len(), 2);
        let cursor = tokens.get_cursor(USER).await.unwrap();
        assert_eq!(cursor.sync_token.as_deref(), Some("tok-old"));
        assert!(cursor.last_sync_at.is_none());
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_once_and_persisted() {
        let store = connected_store(Some("refresh-1"), Some("tok-1")).await;
        let remote = Arc::new(
            ScriptedRemote::new()
                .fail(ProviderError::auth_expired("401"))
                .page(EventPage::with_events(vec![event("abc", "Standup")]).with_next_cursor("tok-2"))
                .refresh_ok("access-2"),
        );

        let report = engine(&remote, &store).sync_calendar(USER).await.unwrap();
        assert_eq!(report.created, 1);

        assert_eq!(remote.refresh_calls(), ["refresh-1"]);
        let fetches = remote.fetches();
        assert_eq!(fetches[0].0, "access-1");
        assert_eq!(fetches[1].0, "access-2");
        assert_eq!(fetches[1].1, FetchRequest::incremental("tok-1"));

        let credential = store.get_credential(USER).await.unwrap().unwrap();
        assert_eq!(credential.access_token, "access-2");
        assert_eq!(credential.refresh_token(), Some("refresh-1"));
    }

    #[tokio::test]
    async fn second_auth_failure_is_not_connected() {
        let store = connected_store(Some("refresh-1"), Some("tok-1")).await;
        let remote = Arc::new(
            ScriptedRemote::new()
                .fail(ProviderError::auth_expired("401"))
                .fail(ProviderError::auth_expired("401 again"))
                .refresh_ok("access-2"),
        );

        let err = engine(&remote, &store).sync_calendar(USER).await.unwrap_err();
        assert!(matches!(err, SyncError::NotConnected { .. }));
        assert_eq!(err.user_message(), "not connected, please reconnect");
        assert_eq!(remote.refresh_calls().len(), 1);
        assert_eq!(
            store.get_cursor(USER).await.unwrap().sync_token.as_deref(),
            Some("tok-1")
        );
    }

    #[tokio::test]
    async fn expired_token_without_refresh_token_is_not_connected() {
        let store = connected_store(None, None).await;
        let remote = Arc::new(ScriptedRemote::new().fail(ProviderError::auth_expired("401")));

        let err = engine(&remote, &store).sync_calendar(USER).await.unwrap_err();
        assert!(matches!(err, SyncError::NotConnected { .. }));
        assert!(remote.refresh_calls().is_empty());
    }

    #[tokio::test]
    async fn rejected_refresh_token_is_not_connected() {
        let store = connected_store(Some("revoked"), None).await;
        let remote = Arc::new(
            ScriptedRemote::new()
                .fail(ProviderError::auth_expired("401"))
                .refresh_err(ProviderError::refresh_failed("invalid_grant")),
        );

        let err = engine(&remote, &store).sync_calendar(USER).await.unwrap_err();
        assert!(matches!(err, SyncError::NotConnected { .. }));
        assert_eq!(
            store.get_credential(USER).await.unwrap().unwrap().access_token,
            "access-1"
        );
    }

    #[tokio::test]
    async fn refresh_endpoint_outage_is_retryable() {
        let store = connected_store(Some("refresh-1"), None).await;
        let remote = Arc::new(
            ScriptedRemote::new()
                .fail(ProviderError::auth_expired("401"))
                .refresh_err(ProviderError::unavailable("token endpoint 503")),
        );

        let err = engine(&remote, &store).sync_calendar(USER).await.unwrap_err();
        assert!(matches!(err, SyncError::RemoteUnavailable { .. }));
    }

    #[tokio::test]
    async fn missing_credential_is_not_connected_without_fetching() {
        let store = Arc::new(MemoryStore::new());
        let remote = Arc::new(ScriptedRemote::new());

        let err = engine(&remote, &store).sync_calendar(USER).await.unwrap_err();
        assert!(matches!(err, SyncError::NotConnected { .. }));
        assert!(remote.fetches().is_empty());

        store
            .set_credential(USER, &Credential::new("", Some("refresh".to_string())))
            .await
            .unwrap();
        let err = engine(&remote, &store).sync_calendar(USER).await.unwrap_err();
        assert!(matches!(err, SyncError::NotConnected { .. }));
        assert!(remote.fetches().is_empty());
    }

    #[tokio::test]
    async fn invalidated_cursor_restarts_as_full_resync() {
        let store = connected_store(None, Some("tok-stale")).await;
        let remote = Arc::new(
            ScriptedRemote::new()
                .fail(ProviderError::cursor_invalidated("410"))
                .page(EventPage::with_events(vec![event("abc", "Standup")]).with_next_cursor("tok-fresh")),
        );

        let report = engine(&remote, &store).sync_calendar(USER).await.unwrap();
        assert!(report.full_resync);
        assert_eq!(report.created, 1);

        let fetches = remote.fetches();
        assert_eq!(fetches[0].1, FetchRequest::incremental("tok-stale"));
        assert!(!fetches[1].1.is_incremental());
        assert_eq!(
            store.get_cursor(USER).await.unwrap().sync_token.as_deref(),
            Some("tok-fresh")
        );
    }

    #[tokio::test]
    async fn invalidation_mid_pagination_reports_only_resync_pass() {
        let store = connected_store(None, Some("tok-stale")).await;
        let remote = Arc::new(
            ScriptedRemote::new()
                .page(EventPage::with_events(vec![event("abc", "Standup")]).with_next_page_token("p2"))
                .fail(ProviderError::cursor_invalidated("410"))
                .page(EventPage::with_events(vec![event("abc", "Standup")]).with_next_cursor("tok-fresh")),
        );

        let report = engine(&remote, &store).sync_calendar(USER).await.unwrap();

        assert!(report.full_resync);
        assert_eq!(report.pages, 1);
        assert_eq!(report.created, 0);
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.count(), 1);
        assert_eq!(store.list_events(USER).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn full_resync_pages_share_one_window() {
        let store = connected_store(None, None).await;
        let remote = Arc::new(
            ScriptedRemote::new()
                .page(EventPage::with_events(vec![event("a", "One")]).with_next_page_token("p2"))
                .page(EventPage::with_events(vec![event("b", "Two")]).with_next_cursor("tok-1")),
        );
        let sync = engine(&remote, &store)
            .with_options(SyncOptions::default().with_lookahead(chrono::Duration::days(7)));

        sync.sync_calendar(USER).await.unwrap();

        let fetches = remote.fetches();
        assert_eq!(fetches.len(), 2);
        assert_eq!(fetches[0].1.mode, fetches[1].1.mode);
        assert!(matches!(
            fetches[0].1.mode,
            FetchMode::Window { time_min: Some(_), time_max: Some(_) }
        ));
        assert_eq!(fetches[1].1.page_token.as_deref(), Some("p2"));
    }

    #[tokio::test]
    async fn second_invalidation_is_unavailable() {
        let store = connected_store(None, Some("tok-stale")).await;
        let remote = Arc::new(
            ScriptedRemote::new()
                .fail(ProviderError::cursor_invalidated("410"))
                .fail(ProviderError::cursor_invalidated("410 again")),
        );

        let err = engine(&remote, &store).sync_calendar(USER).await.unwrap_err();
        assert!(matches!(err, SyncError::RemoteUnavailable { .. }));
        assert_eq!(remote.fetches().len(), 2);
        assert!(store.get_cursor(USER).await.unwrap().requires_full_resync());
    }

    #[tokio::test]
    async fn remote_outage_leaves_cursor_unchanged() {
        let store = connected_store(Some("refresh-1"), Some("tok-1")).await;
        let remote = Arc::new(
            ScriptedRemote::new()
                .fail(ProviderError::unavailable("503").with_status(503)),
        );

        let err = engine(&remote, &store).sync_calendar(USER).await.unwrap_err();
        assert_eq!(err.user_message(), "sync failed, will retry later");
        assert_eq!(
            store.get_cursor(USER).await.unwrap(),
            SyncCursor::new(Some("tok-1".to_string()), None)
        );
        assert!(remote.refresh_calls().is_empty());
    }

    #[tokio::test]
    async fn lookahead_bounds_full_resync_window() {
        let store = connected_store(None, None).await;
        let remote = Arc::new(ScriptedRemote::new().page(EventPage::default().with_next_cursor("t")));
        let sync = engine(&remote, &store)
            .with_options(SyncOptions::new("work").with_lookahead(chrono::Duration::days(30)));

        sync.sync_calendar(USER).await.unwrap();

        match &remote.fetches()[0].1.mode {
            FetchMode::Window { time_min, time_max } => {
                let min = time_min.unwrap();
                let max = time_max.unwrap();
                assert_eq!(max - min, chrono::Duration::days(30));
                assert!(max > Utc::now() + chrono::Duration::days(29));
            }
            other => panic!("expected window fetch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn serialized_syncs_share_user_lock() {
        let store = connected_store(None, None).await;
        let remote = Arc::new(
            ScriptedRemote::new()
                .page(EventPage::default().with_next_cursor("t1"))
                .page(EventPage::default().with_next_cursor("t2")),
        );
        let locks = UserLocks::new();
        let sync = engine(&remote, &store).with_locks(locks.clone());

        let held = locks.acquire(USER).await;
        let pending = sync.sync_calendar_serialized(USER);
        tokio::pin!(pending);
        assert!(
            tokio::time::timeout(std::time::Duration::from_millis(20), &mut pending)
                .await
                .is_err()
        );
        assert!(remote.fetches().is_empty());

        drop(held);
        pending.await.unwrap();
        assert_eq!(remote.fetches().len(), 1);
    }
}

//! Google Calendar API client.
//!
//! Fetches single pages of the events-list endpoint and classifies every
//! failure into a [`ProviderErrorCode`](crate::ProviderErrorCode).

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{ProviderError, ProviderResult};
use crate::remote::{BoxFuture, EventPage, FetchMode, FetchRequest, MAX_RESULTS, RemoteCalendar};
use crate::remote_event::RemoteEvent;

use super::config::GoogleConfig;
use super::oauth::OAuthClient;

const PROVIDER_NAME: &str = "google";

/// Google Calendar API client.
#[derive(Debug, Clone)]
pub struct GoogleCalendarClient {
    config: GoogleConfig,
    http_client: reqwest::Client,
    oauth: OAuthClient,
}

/// Events-list response envelope. Items stay as JSON so a single bad item
/// does not fail the page.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventListResponse {
    #[serde(default)]
    items: Vec<serde_json::Value>,
    next_page_token: Option<String>,
    next_sync_token: Option<String>,
}

impl GoogleCalendarClient {
    /// Creates a client from a validated configuration.
    pub fn new(config: GoogleConfig) -> ProviderResult<Self> {
        config.validate().map_err(|e| {
            ProviderError::configuration(e).with_provider(PROVIDER_NAME)
        })?;

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| {
                ProviderError::configuration(format!("failed to create HTTP client: {}", e))
                    .with_provider(PROVIDER_NAME)
                    .with_source(e)
            })?;

        let oauth = OAuthClient::new(
            config.credentials.clone(),
            config.token_url.clone(),
            http_client.clone(),
        );

        Ok(Self {
            config,
            http_client,
            oauth,
        })
    }

    pub fn config(&self) -> &GoogleConfig {
        &self.config
    }

    /// Fetches a single page of events.
    pub async fn list_events_page(
        &self,
        access_token: &str,
        calendar_id: &str,
        request: &FetchRequest,
    ) -> ProviderResult<EventPage> {
        let url = self.config.events_url(calendar_id);
        let query = list_query(request, Utc::now());

        debug!(
            calendar_id,
            incremental = request.is_incremental(),
            page_token = request.page_token.is_some(),
            "fetching events page"
        );

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(access_token)
            .query(&query)
            .send()
            .await
            .map_err(|e| {
                let message = if e.is_timeout() {
                    "request timeout".to_string()
                } else if e.is_connect() {
                    format!("connection failed: {}", e)
                } else {
                    format!("request failed: {}", e)
                };
                ProviderError::unavailable(message)
                    .with_provider(PROVIDER_NAME)
                    .with_source(e)
            })?;

        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(
                ProviderError::auth_expired("access token expired or invalid")
                    .with_provider(PROVIDER_NAME)
                    .with_status(status.as_u16()),
            );
        }

        if status == reqwest::StatusCode::GONE {
            return Err(
                ProviderError::cursor_invalidated("sync token is no longer valid")
                    .with_provider(PROVIDER_NAME)
                    .with_status(status.as_u16()),
            );
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(
                ProviderError::unavailable(format!("API error ({}): {}", status, body))
                    .with_provider(PROVIDER_NAME)
                    .with_status(status.as_u16()),
            );
        }

        let body = response.text().await.map_err(|e| {
            ProviderError::unavailable(format!("failed to read response: {}", e))
                .with_provider(PROVIDER_NAME)
        })?;

        let list: EventListResponse = serde_json::from_str(&body).map_err(|e| {
            ProviderError::invalid_response(format!("failed to parse response: {}", e))
                .with_provider(PROVIDER_NAME)
        })?;

        Ok(into_page(list))
    }
}

/// Builds the events-list query for one request.
///
/// `singleEvents` is always on so recurring series arrive as instances.
/// `orderBy` is only sent with a time window; the API rejects it together
/// with a sync token.
fn list_query(request: &FetchRequest, now: DateTime<Utc>) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("maxResults", MAX_RESULTS.to_string()),
        ("singleEvents", "true".to_string()),
    ];

    match &request.mode {
        FetchMode::Incremental { cursor } => {
            query.push(("syncToken", cursor.clone()));
        }
        FetchMode::Window { time_min, time_max } => {
            query.push(("orderBy", "startTime".to_string()));
            query.push(("timeMin", format_time(time_min.unwrap_or(now))));
            if let Some(max) = time_max {
                query.push(("timeMax", format_time(*max)));
            }
        }
    }

    if let Some(token) = &request.page_token {
        query.push(("pageToken", token.clone()));
    }

    query
}

fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn into_page(list: EventListResponse) -> EventPage {
    let mut page = EventPage {
        next_cursor: list.next_sync_token,
        next_page_token: list.next_page_token,
        ..Default::default()
    };

    for item in list.items {
        let id = item
            .get("id")
            .and_then(|v| v.as_str())
            .map(String::from);
        match RemoteEvent::from_json(item) {
            Ok(event) => page.events.push(event),
            Err(e) => {
                warn!(event_id = id.as_deref().unwrap_or("<missing id>"), error = %e, "skipping unparseable event");
                page.malformed.push((id, e.to_string()));
            }
        }
    }

    page
}

impl RemoteCalendar for GoogleCalendarClient {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn fetch_events<'a>(
        &'a self,
        access_token: &'a str,
        calendar_id: &'a str,
        request: &'a FetchRequest,
    ) -> BoxFuture<'a, ProviderResult<EventPage>> {
        Box::pin(self.list_events_page(access_token, calendar_id, request))
    }

    fn refresh_access_token<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, ProviderResult<String>> {
        Box::pin(self.oauth.refresh_token(refresh_token))
    }
}

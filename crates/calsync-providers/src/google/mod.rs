//! Google Calendar backend.
//!
//! [`GoogleCalendarClient`] implements [`RemoteCalendar`](crate::RemoteCalendar)
//! against the Calendar API v3 events-list endpoint:
//!
//! - incremental fetches with `syncToken`, full fetches with a time window
//! - `singleEvents=true`, 250 items per page
//! - access-token renewal through the OAuth refresh-token grant
//!
//! # Example
//!
//! ```ignore
//! use calsync_providers::google::{GoogleCalendarClient, GoogleConfig, OAuthCredentials};
//! use calsync_providers::{FetchRequest, RemoteCalendar};
//!
//! let credentials = OAuthCredentials::new("id.apps.googleusercontent.com", "secret");
//! let client = GoogleCalendarClient::new(GoogleConfig::new(credentials))?;
//!
//! let page = client
//!     .fetch_events(&access_token, "primary", &FetchRequest::incremental(cursor))
//!     .await?;
//! ```

mod client;
mod config;
mod oauth;

pub use client::GoogleCalendarClient;
pub use config::{GoogleConfig, OAuthCredentials};
pub use oauth::OAuthClient;

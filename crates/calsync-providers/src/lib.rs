//! Remote calendar backends.
//!
//! - [`RemoteCalendar`] - The contract the sync engine talks to
//! - [`RemoteEvent`] - One event as the remote sends it
//! - [`ProviderError`] - Classified failures
//! - [`google`] - The Google Calendar implementation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  Google API     │
//! └────────┬────────┘
//!          │ events.list / token
//!          ▼
//! ┌──────────────────────┐
//! │ GoogleCalendarClient │
//! └────────┬─────────────┘
//!          │  RemoteCalendar
//!          ▼
//!   ┌─────────────┐
//!   │  EventPage  │──▶ calsync-engine
//!   └─────────────┘
//! ```

pub mod error;
#[cfg(feature = "google")]
pub mod google;
pub mod remote;
pub mod remote_event;

pub use error::{ProviderError, ProviderErrorCode, ProviderResult};
pub use remote::{BoxFuture, EventPage, FetchMode, FetchRequest, MAX_RESULTS, RemoteCalendar};
pub use remote_event::{RemoteEvent, RemoteEventTime, RemotePerson};

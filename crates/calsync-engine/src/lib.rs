//! Calendar sync engine: stores, reconciler, orchestrator.
//!
//! This crate keeps a per-user mirror of a remote calendar:
//! - Token and event storage contracts, with in-memory and SQLite backends
//! - Reconciliation of remote event pages into stored rows
//! - The sync state machine: auth refresh, cursor resets, pagination
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────────┐
//!                 │ CalendarSync │
//!                 └──────┬───────┘
//!        ┌───────────────┼─────────────────┐
//!        ▼               ▼                 ▼
//! ┌──────────────┐ ┌────────────┐  ┌──────────────┐
//! │RemoteCalendar│ │ TokenStore │  │  Reconciler  │
//! └──────────────┘ └────────────┘  └──────┬───────┘
//!                                         ▼
//!                                  ┌──────────────┐
//!                                  │  EventStore  │
//!                                  └──────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use calsync_engine::{CalendarSync, SqliteStore, SyncConfig};
//! use calsync_providers::google::GoogleCalendarClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SyncConfig::load()?;
//!     let store = Arc::new(SqliteStore::open(config.database_path())?);
//!     let remote = Arc::new(GoogleCalendarClient::new(config.google_config()?)?);
//!
//!     let sync = CalendarSync::new(remote, store.clone(), store)
//!         .with_options(config.sync_options());
//!     let report = sync.sync_calendar_serialized("user-1").await?;
//!     println!("synced {} events", report.count());
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod locks;
mod reconcile;
pub mod store;
mod sync;

pub use config::{GoogleSettings, SyncConfig, SyncSettings};
pub use error::{ConfigError, StoreError, StoreResult, SyncError};
pub use locks::{UserGuard, UserLocks};
pub use reconcile::{Change, PageOutcome, ReconcileError, Reconciler, plan_change};
pub use store::{EventStore, MemoryStore, SqliteStore, TokenStore};
pub use sync::{CalendarSync, SyncOptions, SyncReport};

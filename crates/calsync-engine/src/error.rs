//! Engine error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by token and event stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite failure (connectivity, constraint, I/O).
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A structured column could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error while preparing the database location.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A lock guarding the store was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    Poisoned,

    /// A stored value does not decode into the data model.
    #[error("invalid stored data: {message}")]
    InvalidData { message: String },
}

impl StoreError {
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }
}

/// The only failures that leave [`CalendarSync`](crate::CalendarSync).
///
/// The reason is for logs; callers show [`SyncError::user_message`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// No usable credential: the user has to connect the calendar again.
    #[error("not connected: {reason}")]
    NotConnected { reason: String },

    /// The remote or the store failed; the cursor was left unchanged.
    #[error("remote unavailable: {reason}")]
    RemoteUnavailable { reason: String },
}

impl SyncError {
    pub fn not_connected(reason: impl Into<String>) -> Self {
        Self::NotConnected {
            reason: reason.into(),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::RemoteUnavailable {
            reason: reason.into(),
        }
    }

    /// Returns the stable message shown to the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NotConnected { .. } => "not connected, please reconnect",
            Self::RemoteUnavailable { .. } => "sync failed, will retry later",
        }
    }

    /// Returns true if running the sync again later may succeed without
    /// user action.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RemoteUnavailable { .. })
    }

    pub fn reason(&self) -> &str {
        match self {
            Self::NotConnected { reason } | Self::RemoteUnavailable { reason } => reason,
        }
    }
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        Self::unavailable(format!("store failure: {}", err))
    }
}

/// Errors raised while loading [`SyncConfig`](crate::SyncConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

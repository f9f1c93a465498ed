//! Per-user OAuth credentials and the incremental sync cursor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OAuth tokens granted for a user's calendar.
///
/// Expiry is not tracked here: an expired access token is discovered when the
/// remote API rejects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Short-lived bearer token for API requests.
    pub access_token: String,
    /// Long-lived token used to mint new access tokens. `None` means the user
    /// has to re-authenticate when the access token expires.
    pub refresh_token: Option<String>,
    /// When the tokens were last written.
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    /// Creates a credential as granted by the identity provider.
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            updated_at: Utc::now(),
        }
    }

    /// Returns `true` if the credential carries a non-empty access token.
    pub fn is_usable(&self) -> bool {
        !self.access_token.is_empty()
    }

    /// Returns the refresh token, treating an empty string as absent.
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|t| !t.is_empty())
    }

    /// Replaces the access token after a refresh, keeping the refresh token.
    pub fn with_access_token(mut self, access_token: impl Into<String>) -> Self {
        self.access_token = access_token.into();
        self.updated_at = Utc::now();
        self
    }
}

/// Incremental sync position for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    /// Opaque token from the remote API; `None` means a full resync is needed.
    pub sync_token: Option<String>,
    /// When the last successful sync finished.
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl SyncCursor {
    /// Creates a cursor holding the given token.
    pub fn new(sync_token: Option<String>, last_sync_at: Option<DateTime<Utc>>) -> Self {
        Self {
            sync_token,
            last_sync_at,
        }
    }

    /// Returns `true` if the next fetch has to be a full resync.
    pub fn requires_full_resync(&self) -> bool {
        self.sync_token.as_deref().is_none_or(str::is_empty)
    }

    /// Returns the cursor to persist after a successful sync.
    ///
    /// A sync that produced no new token keeps the previous one.
    pub fn advanced(&self, next_token: Option<String>, at: DateTime<Utc>) -> Self {
        Self {
            sync_token: next_token.or_else(|| self.sync_token.clone()),
            last_sync_at: Some(at),
        }
    }

    /// Returns the cursor with its token discarded.
    pub fn invalidated(&self) -> Self {
        Self {
            sync_token: None,
            last_sync_at: self.last_sync_at,
        }
    }
}

//! Engine configuration.
//!
//! All settings live in `~/.config/calsync/config.toml` by default:
//!
//! ```toml
//! [google]
//! client_id = "env::GOOGLE_CLIENT_ID"
//! client_secret = "env::GOOGLE_CLIENT_SECRET"
//! timeout_secs = 30
//!
//! [sync]
//! calendar_id = "primary"
//! lookahead_days = 90
//! database_path = "/var/lib/calsync/calsync.db"
//! ```
//!
//! Credential values are either plain text or `env::VAR_NAME` references.
//! When a value is missing entirely, `GOOGLE_CLIENT_ID` /
//! `GOOGLE_CLIENT_SECRET` are read from the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use calsync_providers::google::{GoogleConfig, OAuthCredentials};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::sync::SyncOptions;

const ENV_PREFIX: &str = "env::";
const CLIENT_ID_VAR: &str = "GOOGLE_CLIENT_ID";
const CLIENT_SECRET_VAR: &str = "GOOGLE_CLIENT_SECRET";

/// Configuration for the sync engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Google Calendar settings.
    pub google: GoogleSettings,

    /// Sync behaviour and storage.
    pub sync: SyncSettings,
}

/// Google Calendar API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleSettings {
    /// OAuth client ID (plain or `env::VAR`).
    pub client_id: Option<String>,

    /// OAuth client secret (plain or `env::VAR`).
    pub client_secret: Option<String>,

    /// Override for the Calendar API base URL.
    pub api_base_url: Option<String>,

    /// Override for the OAuth token endpoint.
    pub token_url: Option<String>,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for GoogleSettings {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            api_base_url: None,
            token_url: None,
            timeout_secs: GoogleConfig::DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Sync settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Calendar to sync.
    pub calendar_id: String,

    /// Upper bound of a full resync, in days from now. Unbounded if unset.
    pub lookahead_days: Option<u32>,

    /// SQLite database location.
    pub database_path: Option<PathBuf>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            calendar_id: "primary".to_string(),
            lookahead_days: None,
            database_path: None,
        }
    }
}

impl SyncConfig {
    /// Loads configuration from the default path, falling back to defaults
    /// when the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parses and validates a TOML document.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values serde cannot check.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync.calendar_id.trim().is_empty() {
            return Err(ConfigError::invalid("sync.calendar_id must not be empty"));
        }
        if self.sync.lookahead_days == Some(0) {
            return Err(ConfigError::invalid("sync.lookahead_days must be positive"));
        }
        if self.google.timeout_secs == 0 {
            return Err(ConfigError::invalid("google.timeout_secs must be positive"));
        }
        Ok(())
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("calsync")
    }

    /// Returns the default data directory.
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("calsync")
    }

    /// Returns the SQLite database path.
    pub fn database_path(&self) -> PathBuf {
        self.sync
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join("calsync.db"))
    }

    /// Returns the orchestrator options.
    pub fn sync_options(&self) -> SyncOptions {
        let mut options = SyncOptions::new(self.sync.calendar_id.clone());
        if let Some(days) = self.sync.lookahead_days {
            options = options.with_lookahead(chrono::Duration::days(i64::from(days)));
        }
        options
    }

    /// Builds the Google client configuration, resolving credentials from
    /// the process environment.
    pub fn google_config(&self) -> Result<GoogleConfig, ConfigError> {
        self.google_config_with(|name| std::env::var(name).ok())
    }

    /// Like [`SyncConfig::google_config`], with an explicit variable lookup.
    pub fn google_config_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<GoogleConfig, ConfigError> {
        let settings = &self.google;
        let credentials = settings.resolve_credentials(&lookup)?;

        let mut config = GoogleConfig::new(credentials)
            .with_timeout(Duration::from_secs(settings.timeout_secs));
        if let Some(url) = &settings.api_base_url {
            config = config.with_api_base_url(url);
        }
        if let Some(url) = &settings.token_url {
            config = config.with_token_url(url);
        }

        config.validate().map_err(ConfigError::invalid)?;
        Ok(config)
    }
}

impl GoogleSettings {
    /// Resolves the OAuth client credentials.
    pub(crate) fn resolve_credentials(
        &self,
        lookup: &impl Fn(&str) -> Option<String>,
    ) -> Result<OAuthCredentials, ConfigError> {
        let client_id = resolve_value("client_id", self.client_id.as_deref(), CLIENT_ID_VAR, lookup)?;
        let client_secret = resolve_value(
            "client_secret",
            self.client_secret.as_deref(),
            CLIENT_SECRET_VAR,
            lookup,
        )?;

        let credentials = OAuthCredentials::new(client_id, client_secret);
        credentials.validate().map_err(ConfigError::invalid)?;
        Ok(credentials)
    }
}

fn resolve_value(
    field: &str,
    value: Option<&str>,
    fallback_var: &str,
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<String, ConfigError> {
    match value {
        Some(raw) => match raw.strip_prefix(ENV_PREFIX) {
            Some(var) => lookup(var).ok_or_else(|| {
                ConfigError::invalid(format!(
                    "google.{field} references environment variable {var}, which is not set"
                ))
            }),
            None => Ok(raw.to_string()),
        },
        None => lookup(fallback_var).ok_or_else(|| {
            ConfigError::invalid(format!(
                "google.{field} is not configured and {fallback_var} is not set"
            ))
        }),
    }
}

//! Tracing setup shared by the calsync crates.
//!
//! Embedders running the sync engine in a service call [`init_tracing`] once
//! at startup:
//!
//! ```ignore
//! use calsync_core::tracing::{init_tracing, TracingConfig};
//!
//! init_tracing(TracingConfig::service())?;
//! ```
//!
//! `RUST_LOG` wins over the configured level; an explicit
//! [`TracingConfig::with_filter`] wins over both.

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    prelude::*,
};

/// Targets the default filter enables.
const CRATE_TARGETS: [&str; 3] = ["calsync_core", "calsync_providers", "calsync_engine"];

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("tracing already initialised: {0}")]
    AlreadyInitialised(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("invalid log filter: {0}")]
    InvalidFilter(#[from] tracing_subscriber::filter::ParseError),
}

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, for a terminal.
    #[default]
    Pretty,
    Compact,
    /// One JSON object per line, for log collectors.
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    pub level: Level,
    pub format: LogFormat,
    /// Full `EnvFilter` directive; replaces the per-crate default.
    pub filter: Option<String>,
    /// Adds file/line and span open/close events.
    pub verbose: bool,
    pub timestamps: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Pretty,
            filter: None,
            verbose: false,
            timestamps: true,
        }
    }
}

impl TracingConfig {
    /// Compact, untimed lines at `DEBUG` with source locations.
    #[must_use]
    pub fn debug() -> Self {
        Self {
            level: Level::DEBUG,
            format: LogFormat::Compact,
            verbose: true,
            timestamps: false,
            ..Self::default()
        }
    }

    /// JSON at `INFO` with span events, so each `sync` span is logged with
    /// its duration.
    #[must_use]
    pub fn service() -> Self {
        Self {
            format: LogFormat::Json,
            verbose: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_filter(mut self, directive: impl Into<String>) -> Self {
        self.filter = Some(directive.into());
        self
    }

    /// Builds the filter: explicit directive, then `RUST_LOG`, then
    /// [`default_directive`].
    fn env_filter(&self) -> Result<EnvFilter, TracingError> {
        match &self.filter {
            Some(directive) => Ok(EnvFilter::try_new(directive)?),
            None => Ok(EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_directive(self.level)))),
        }
    }
}

/// `calsync_core=<level>,calsync_providers=<level>,calsync_engine=<level>`.
pub fn default_directive(level: Level) -> String {
    CRATE_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Fails if a global subscriber is already set or the filter directive does
/// not parse.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let filter = config.env_filter()?;

    let spans = if config.verbose {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let layer = fmt::layer()
        .with_file(config.verbose)
        .with_line_number(config.verbose)
        .with_span_events(spans);

    let layer = match config.format {
        LogFormat::Json => layer.json().boxed(),
        LogFormat::Pretty if config.timestamps => layer.pretty().boxed(),
        LogFormat::Pretty => layer.pretty().without_time().boxed(),
        LogFormat::Compact if config.timestamps => layer.compact().boxed(),
        LogFormat::Compact => layer.compact().without_time().boxed(),
    };

    tracing::subscriber::set_global_default(
        tracing_subscriber::registry().with(layer.with_filter(filter)),
    )?;
    Ok(())
}

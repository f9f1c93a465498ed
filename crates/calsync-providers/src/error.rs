//! Error types for remote calendar operations.
//!
//! Every failure of the Remote Calendar Client is classified into a
//! [`ProviderErrorCode`]. The sync orchestrator branches on the code, never on
//! the message: messages carry raw provider text for logs only.

use std::fmt;
use thiserror::Error;

/// What went wrong, as far as the caller needs to know.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorCode {
    /// The access token was rejected (HTTP 401).
    AuthExpired,
    /// The sync cursor is too old to diff against (HTTP 410); a full resync
    /// is required.
    CursorInvalidated,
    /// Any other failure to get a usable answer from the remote: network
    /// errors, timeouts, non-2xx statuses.
    RemoteUnavailable,
    /// The refresh token was rejected; the user must re-authenticate.
    RefreshFailed,
    /// The remote answered 2xx with a body we could not parse.
    InvalidResponse,
    /// Client-side configuration is missing or invalid.
    Configuration,
}

impl ProviderErrorCode {
    /// Returns true if the failed call may succeed when repeated after the
    /// caller repairs its state (here: refreshing the access token).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::AuthExpired)
    }

    /// Returns a stable name for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthExpired => "auth_expired",
            Self::CursorInvalidated => "cursor_invalidated",
            Self::RemoteUnavailable => "remote_unavailable",
            Self::RefreshFailed => "refresh_failed",
            Self::InvalidResponse => "invalid_response",
            Self::Configuration => "configuration",
        }
    }
}

impl fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error that occurred while talking to a remote calendar.
#[derive(Debug, Error)]
pub struct ProviderError {
    code: ProviderErrorCode,
    message: String,
    /// The provider that generated this error (e.g. "google").
    provider: Option<String>,
    /// HTTP status, when the failure came from a response.
    status: Option<u16>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ProviderError {
    /// An error of `code`; `message` is for logs.
    pub fn new(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider: None,
            status: None,
            source: None,
        }
    }

    pub fn auth_expired(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::AuthExpired, message)
    }

    pub fn cursor_invalidated(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::CursorInvalidated, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::RemoteUnavailable, message)
    }

    pub fn refresh_failed(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::RefreshFailed, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InvalidResponse, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Configuration, message)
    }

    /// Tags the error with the backend that raised it.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Records the HTTP status that produced this error.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Attaches the underlying transport or parse error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> ProviderErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Shorthand for `self.code().is_retryable()`.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref provider) = self.provider {
            write!(f, "[{}] ", provider)?;
        }
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(status) = self.status {
            write!(f, " (HTTP {})", status)?;
        }
        Ok(())
    }
}

/// Result of a remote call.
pub type ProviderResult<T> = Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_auth_expiry_is_retryable() {
        assert!(ProviderErrorCode::AuthExpired.is_retryable());
        assert!(!ProviderErrorCode::CursorInvalidated.is_retryable());
        assert!(!ProviderErrorCode::RemoteUnavailable.is_retryable());
        assert!(!ProviderErrorCode::RefreshFailed.is_retryable());
        assert!(!ProviderErrorCode::InvalidResponse.is_retryable());
    }

    #[test]
    fn constructors_set_codes() {
        assert_eq!(
            ProviderError::auth_expired("x").code(),
            ProviderErrorCode::AuthExpired
        );
        assert_eq!(
            ProviderError::cursor_invalidated("x").code(),
            ProviderErrorCode::CursorInvalidated
        );
        assert_eq!(
            ProviderError::unavailable("x").code(),
            ProviderErrorCode::RemoteUnavailable
        );
        assert_eq!(
            ProviderError::refresh_failed("x").code(),
            ProviderErrorCode::RefreshFailed
        );
    }

    #[test]
    fn display_includes_provider_and_status() {
        let err = ProviderError::unavailable("backend error")
            .with_provider("google")
            .with_status(503);
        let display = err.to_string();
        assert!(display.contains("[google]"));
        assert!(display.contains("remote_unavailable"));
        assert!(display.contains("backend error"));
        assert!(display.contains("HTTP 503"));
        assert_eq!(err.status(), Some(503));
    }

    #[test]
    fn source_is_exposed() {
        use std::error::Error;
        let io_err = std::io::Error::other("connection reset");
        let err = ProviderError::unavailable("request failed").with_source(io_err);
        assert!(err.source().is_some());
    }
}

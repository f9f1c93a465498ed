//! OAuth 2.0 refresh-token grant against Google's token endpoint.
//!
//! The initial authorization-code grant happens in the identity provider;
//! this side only renews access tokens.

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{ProviderError, ProviderResult};

use super::config::OAuthCredentials;

/// OAuth client for the refresh-token grant.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    credentials: OAuthCredentials,
    token_url: String,
    http_client: reqwest::Client,
}

/// Successful token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Error body returned by the token endpoint.
#[derive(Debug, Default, Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

impl OAuthClient {
    pub fn new(
        credentials: OAuthCredentials,
        token_url: impl Into<String>,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            credentials,
            token_url: token_url.into(),
            http_client,
        }
    }

    /// Exchanges `refresh_token` for a new access token.
    ///
    /// # Errors
    ///
    /// - `RefreshFailed` when the endpoint answers 400 or 401 (revoked,
    ///   expired or unknown refresh token, `invalid_grant`).
    /// - `RemoteUnavailable` for transport failures and other statuses.
    /// - `InvalidResponse` when a 2xx body has no access token.
    pub async fn refresh_token(&self, refresh_token: &str) -> ProviderResult<String> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
        ];

        debug!(token_url = %self.token_url, "refreshing access token");

        let response = self
            .http_client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                ProviderError::unavailable(format!("token refresh request failed: {}", e))
                    .with_provider("google")
                    .with_source(e)
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            ProviderError::unavailable(format!("failed to read token response: {}", e))
                .with_provider("google")
        })?;

        if status == reqwest::StatusCode::BAD_REQUEST || status == reqwest::StatusCode::UNAUTHORIZED
        {
            let detail: TokenErrorResponse = serde_json::from_str(&body).unwrap_or_default();
            warn!(
                status = status.as_u16(),
                error = detail.error.as_deref().unwrap_or("unknown"),
                "refresh token rejected"
            );
            return Err(ProviderError::refresh_failed(format!(
                "refresh token rejected: {}",
                detail
                    .error_description
                    .or(detail.error)
                    .unwrap_or_else(|| body.clone())
            ))
            .with_provider("google")
            .with_status(status.as_u16()));
        }

        if !status.is_success() {
            return Err(
                ProviderError::unavailable(format!("token endpoint error: {}", body))
                    .with_provider("google")
                    .with_status(status.as_u16()),
            );
        }

        let token: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            ProviderError::invalid_response(format!("invalid token response: {}", e))
                .with_provider("google")
        })?;

        if token.access_token.is_empty() {
            return Err(
                ProviderError::invalid_response("token response carried an empty access_token")
                    .with_provider("google"),
            );
        }

        info!(expires_in = ?token.expires_in, "refreshed access token");
        Ok(token.access_token)
    }
}

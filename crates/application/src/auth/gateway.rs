//! Authenticated request wrapper.
//!
//! Attaches the bearer token, refreshes ahead of sending when the token is
//! missing or expired, and retries exactly once after a 401.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use sessionkit_domain::{ApiRequest, ApiResponse, AuthError, StaleTokenPolicy};
use url::Url;

use super::expiry::ExpiryOracle;
use super::refresh::RefreshCoordinator;
use super::token_store::TokenStore;
use crate::ports::HttpClient;

/// Sends requests on behalf of the current session.
#[derive(Clone)]
pub struct AuthenticatedRequestGateway {
    store: TokenStore,
    refresher: RefreshCoordinator,
    http: Arc<dyn HttpClient>,
    oracle: ExpiryOracle,
    policy: StaleTokenPolicy,
    base_url: Option<Url>,
    request_timeout: Option<Duration>,
}

impl AuthenticatedRequestGateway {
    /// Create a gateway with the default soft-fail policy and no base URL.
    pub fn new(
        store: TokenStore,
        refresher: RefreshCoordinator,
        http: Arc<dyn HttpClient>,
        oracle: ExpiryOracle,
    ) -> Self {
        Self {
            store,
            refresher,
            http,
            oracle,
            policy: StaleTokenPolicy::default(),
            base_url: None,
            request_timeout: None,
        }
    }

    /// Set what happens when an expired token cannot be refreshed.
    #[must_use]
    pub const fn with_policy(mut self, policy: StaleTokenPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Resolve relative request URLs against `base_url`.
    #[must_use]
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// Timeout applied to requests that do not carry their own.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Send `request` with the session's bearer token.
    ///
    /// Any response that arrives is returned as `Ok`, whatever its status.
    /// A 401 triggers one refresh and one resend; the resent response is
    /// final even if it is another 401.
    ///
    /// # Errors
    ///
    /// - `MissingToken` when there is no session at all. Nothing is sent.
    /// - `AuthenticationFailed` when a token could not be obtained, or the
    ///   refresh after a 401 failed. The session is cleared in that case.
    /// - `Transport` when the request could not be sent.
    pub async fn fetch_with_auth(&self, request: ApiRequest) -> Result<ApiResponse, AuthError> {
        let token = self.usable_token().await?;
        let request = self.prepare(request)?;

        let response = self.send(&request, &token).await?;
        if !response.is_unauthorized() {
            return Ok(response);
        }

        tracing::debug!(url = %request.url, "request unauthorized, refreshing once");
        match self.refresher.refresh().await {
            Ok(pair) => {
                tracing::debug!(url = %request.url, "retrying with refreshed token");
                self.send(&request, &pair.access_token).await
            }
            Err(e) => {
                tracing::info!(error = %e, "could not recover from 401, ending session");
                self.end_session_using(&token);
                Err(AuthError::AuthenticationFailed)
            }
        }
    }

    async fn usable_token(&self) -> Result<String, AuthError> {
        let Some(token) = self.store.access_token() else {
            return match self.refresher.refresh().await {
                Ok(pair) => Ok(pair.access_token),
                Err(AuthError::MissingToken) => Err(AuthError::MissingToken),
                Err(e) => {
                    tracing::debug!(error = %e, "no access token and refresh failed");
                    Err(AuthError::AuthenticationFailed)
                }
            };
        };

        if !self.oracle.is_expired(&token) {
            return Ok(token);
        }

        match self.refresher.refresh().await {
            Ok(pair) => Ok(pair.access_token),
            Err(e) if self.policy.allows_stale() => {
                tracing::warn!(error = %e, "refresh of expired token failed, sending it anyway");
                Ok(token)
            }
            Err(e) => {
                tracing::debug!(error = %e, "refresh of expired token failed");
                Err(AuthError::AuthenticationFailed)
            }
        }
    }

    fn prepare(&self, mut request: ApiRequest) -> Result<ApiRequest, AuthError> {
        let url = request
            .resolve_url(self.base_url.as_ref())
            .map_err(|e| AuthError::Transport {
                message: e.to_string(),
            })?;
        request.url = url.into();
        if request.timeout.is_none() {
            request.timeout = self.request_timeout;
        }
        Ok(request)
    }

    async fn send(&self, request: &ApiRequest, token: &str) -> Result<ApiResponse, AuthError> {
        self.http
            .execute(&request.with_bearer(token))
            .await
            .map_err(|e| AuthError::Transport {
                message: e.to_string(),
            })
    }

    /// Clear the session unless it was replaced since `token` was sent.
    fn end_session_using(&self, token: &str) {
        if self.store.access_token().as_deref() == Some(token) {
            self.store.clear();
        }
    }
}

impl fmt::Debug for AuthenticatedRequestGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatedRequestGateway")
            .field("policy", &self.policy)
            .field("base_url", &self.base_url.as_ref().map(Url::as_str))
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

//! Single-flight token renewal.
//!
//! At most one refresh call is in flight per coordinator. Callers arriving
//! while it runs wait on the same outcome instead of issuing their own call.
//! The call runs in its own task, so it settles (and releases the pending
//! marker) even if every caller stops waiting.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sessionkit_domain::{ApiRequest, AuthError, RefreshResponse, TokenPair};
use tokio::sync::watch;
use url::Url;

use super::token_store::TokenStore;
use crate::ports::HttpClient;

/// What every waiter of one refresh receives.
pub type RefreshOutcome = Result<TokenPair, AuthError>;

type PendingRefresh = watch::Receiver<Option<RefreshOutcome>>;

struct RefreshInner {
    store: TokenStore,
    http: Arc<dyn HttpClient>,
    endpoint: Url,
    timeout: Option<Duration>,
    pending: Mutex<Option<PendingRefresh>>,
}

/// Clears the pending marker when the refresh task ends, however it ends.
struct PendingMarker<'a>(&'a Mutex<Option<PendingRefresh>>);

impl Drop for PendingMarker<'_> {
    fn drop(&mut self) {
        self.0.lock().take();
    }
}

/// Renews the token pair against the refresh endpoint, deduplicating
/// concurrent attempts.
///
/// Cloning yields another handle sharing the same pending operation.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<RefreshInner>,
}

impl RefreshCoordinator {
    /// Create a coordinator posting to `endpoint`.
    ///
    /// `timeout` bounds each refresh call; `None` waits indefinitely.
    pub fn new(
        store: TokenStore,
        http: Arc<dyn HttpClient>,
        endpoint: Url,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            inner: Arc::new(RefreshInner {
                store,
                http,
                endpoint,
                timeout,
                pending: Mutex::new(None),
            }),
        }
    }

    /// Whether a refresh call is currently in flight.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.inner.pending.lock().is_some()
    }

    /// Exchange the stored refresh token for a new pair.
    ///
    /// On success the store already holds the new pair when this returns.
    /// On failure the session has been cleared (unless it was replaced while
    /// the call was in flight).
    ///
    /// # Errors
    ///
    /// `MissingToken` immediately, without a network call, when no refresh
    /// token is stored; otherwise the shared `RefreshFailed` of the call.
    pub async fn refresh(&self) -> RefreshOutcome {
        let mut pending = self.join_or_start()?;
        match pending.wait_for(Option::is_some).await {
            Ok(outcome) => Option::clone(&outcome).unwrap_or_else(|| {
                Err(AuthError::refresh_failed("refresh settled without a result"))
            }),
            Err(_) => Err(AuthError::refresh_failed(
                "refresh task ended without a result",
            )),
        }
    }

    fn join_or_start(&self) -> Result<PendingRefresh, AuthError> {
        let refresh_token = self
            .inner
            .store
            .refresh_token()
            .ok_or(AuthError::MissingToken)?;

        let receiver = {
            let mut pending = self.inner.pending.lock();
            if let Some(existing) = pending.as_ref() {
                tracing::debug!("joining in-flight token refresh");
                return Ok(existing.clone());
            }
            let (sender, receiver) = watch::channel(None);
            *pending = Some(receiver.clone());

            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move { inner.run(&refresh_token, sender).await });
            receiver
        };
        Ok(receiver)
    }
}

impl RefreshInner {
    async fn run(&self, refresh_token: &str, sender: watch::Sender<Option<RefreshOutcome>>) {
        let marker = PendingMarker(&self.pending);
        let outcome = self.settle(refresh_token).await;
        drop(marker);
        sender.send_replace(Some(outcome));
    }

    async fn settle(&self, refresh_token: &str) -> RefreshOutcome {
        tracing::debug!(endpoint = %self.endpoint, "refreshing access token");

        let requested = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.request_pair(refresh_token))
                .await
                .unwrap_or_else(|_| {
                    Err(AuthError::refresh_failed(format!(
                        "refresh timed out after {} ms",
                        limit.as_millis()
                    )))
                }),
            None => self.request_pair(refresh_token).await,
        };

        let error = match requested {
            Ok(pair) => match self.store.compare_and_set(refresh_token, &pair) {
                Ok(true) => {
                    tracing::info!("access token refreshed");
                    return Ok(pair);
                }
                Ok(false) => {
                    tracing::warn!("session changed during refresh, discarding new tokens");
                    return Err(AuthError::refresh_failed("session changed during refresh"));
                }
                Err(e) => AuthError::refresh_failed(e.to_string()),
            },
            Err(e) => e,
        };

        tracing::warn!(error = %error, "token refresh failed, ending session");
        self.store.compare_and_clear(refresh_token);
        Err(error)
    }

    async fn request_pair(&self, refresh_token: &str) -> RefreshOutcome {
        let request = ApiRequest::post(self.endpoint.as_str())
            .with_json(&serde_json::json!({ "refresh_token": refresh_token }))
            .map_err(|e| AuthError::refresh_failed(e.to_string()))?;

        let response = self
            .http
            .execute(&request)
            .await
            .map_err(|e| AuthError::refresh_failed(e.to_string()))?;

        if !response.is_success() {
            return Err(AuthError::refresh_failed(format!(
                "refresh rejected with status {}",
                response.status
            )));
        }

        let body: RefreshResponse = response
            .json()
            .map_err(|e| AuthError::refresh_failed(format!("malformed refresh response: {e}")))?;
        if body.access_token.is_empty() {
            return Err(AuthError::refresh_failed("refresh response has no access token"));
        }
        Ok(body.into())
    }
}

impl fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("endpoint", &self.inner.endpoint.as_str())
            .field("timeout", &self.inner.timeout)
            .field("pending", &self.is_pending())
            .finish_non_exhaustive()
    }
}

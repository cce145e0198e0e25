//! The session service object handed to UI collaborators.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sessionkit_domain::request::join_path;
use sessionkit_domain::{
    ApiRequest, ApiResponse, AuthChange, AuthError, AuthStatus, DomainError, SessionSettings,
    SessionState,
};
use url::Url;

use super::event_bus::{AuthEventBus, Subscription};
use super::expiry::ExpiryOracle;
use super::gateway::AuthenticatedRequestGateway;
use super::refresh::{RefreshCoordinator, RefreshOutcome};
use super::scheduler::AutoRenewScheduler;
use super::token_store::{TokenKeys, TokenStore};
use crate::ports::{Clock, HttpClient, KeyValueStore};

/// Composes token storage, refresh, renewal and the request gateway.
///
/// Build one per application with [`SessionManager::new`] and share the
/// returned `Arc`.
pub struct SessionManager {
    settings: SessionSettings,
    base_url: Url,
    store: TokenStore,
    oracle: ExpiryOracle,
    refresher: RefreshCoordinator,
    gateway: AuthenticatedRequestGateway,
    scheduler: AutoRenewScheduler,
    http: Arc<dyn HttpClient>,
}

impl SessionManager {
    /// Wire the session core over the given adapters.
    ///
    /// A session already present in `storage` is restored but auto-renew is
    /// not started; call [`SessionManager::resume`] for that. Auto-renew
    /// starts whenever a session begins afterwards (login, or a refresh from
    /// a refresh-only state) and stops when it ends.
    ///
    /// # Errors
    ///
    /// Returns an error if `settings` fail validation.
    pub fn new(
        settings: SessionSettings,
        storage: Arc<dyn KeyValueStore>,
        http: Arc<dyn HttpClient>,
        clock: Arc<dyn Clock>,
    ) -> Result<Arc<Self>, DomainError> {
        settings.validate()?;
        let base_url = settings.base_url()?;
        let refresh_url = join_path(&base_url, &settings.refresh_path)?;

        let events = AuthEventBus::new();
        let store = TokenStore::new(storage, TokenKeys::from_settings(&settings), events.clone());
        let oracle = ExpiryOracle::new(clock);
        let refresher = RefreshCoordinator::new(
            store.clone(),
            Arc::clone(&http),
            refresh_url,
            settings.refresh_timeout(),
        );
        let gateway = AuthenticatedRequestGateway::new(
            store.clone(),
            refresher.clone(),
            Arc::clone(&http),
            oracle.clone(),
        )
        .with_policy(settings.stale_token_policy)
        .with_base_url(base_url.clone())
        .with_request_timeout(settings.request_timeout());
        let scheduler = AutoRenewScheduler::new(
            refresher.clone(),
            store.clone(),
            oracle.clone(),
            settings.auto_renew_interval(),
        );

        let manager = Arc::new(Self {
            settings,
            base_url,
            store,
            oracle,
            refresher,
            gateway,
            scheduler,
            http,
        });

        let weak = Arc::downgrade(&manager);
        events
            .subscribe(move |change| {
                let Some(manager) = weak.upgrade() else {
                    return;
                };
                if change.is_authenticated {
                    manager.scheduler.start();
                } else {
                    manager.scheduler.stop();
                }
            })
            .detach();

        Ok(manager)
    }

    /// The settings this manager was built with.
    #[must_use]
    pub const fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// The current access token.
    #[must_use]
    pub fn get_token(&self) -> Option<String> {
        self.store.access_token()
    }

    /// The current refresh token.
    #[must_use]
    pub fn get_refresh_token(&self) -> Option<String> {
        self.store.refresh_token()
    }

    /// Whether a session exists.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.store.state()
    }

    /// Start a session and (re)start auto-renew.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` for an empty access token or `Storage` if the
    /// pair could not be persisted.
    pub fn set_tokens(&self, access: &str, refresh: Option<&str>) -> Result<(), AuthError> {
        let replacing = self.store.state().is_authenticated();
        self.store.set(access, refresh)?;
        // A new session starts auto-renew through the auth-change subscription.
        if replacing {
            self.scheduler.start();
        }
        Ok(())
    }

    /// End the session locally and stop auto-renew.
    pub fn clear_tokens(&self) {
        self.store.clear();
        self.scheduler.stop();
    }

    /// Start auto-renew for a session restored from storage.
    ///
    /// Returns false when there is no session to renew.
    pub fn resume(&self) -> bool {
        if self.store.refresh_token().is_none() {
            return false;
        }
        self.scheduler.start()
    }

    /// Whether auto-renew is currently scheduled.
    #[must_use]
    pub fn is_auto_renewing(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Stop background work. The session itself is kept.
    pub fn shutdown(&self) {
        self.scheduler.stop();
    }

    /// Send `request` with the session's bearer token, refreshing as needed.
    ///
    /// # Errors
    ///
    /// See [`AuthenticatedRequestGateway::fetch_with_auth`].
    pub async fn fetch_with_auth(&self, request: ApiRequest) -> Result<ApiResponse, AuthError> {
        self.gateway.fetch_with_auth(request).await
    }

    /// Renew the token pair now.
    ///
    /// # Errors
    ///
    /// See [`RefreshCoordinator::refresh`].
    pub async fn refresh(&self) -> RefreshOutcome {
        self.refresher.refresh().await
    }

    /// Ask the backend who the current user is.
    ///
    /// Never fails: anything other than a 2xx JSON profile is reported as
    /// unauthenticated. Without tokens no request is made.
    pub async fn check_auth(&self) -> AuthStatus {
        let status = self.fetch_profile().await;
        tracing::debug!(authenticated = status.is_authenticated(), "auth check finished");
        status
    }

    async fn fetch_profile(&self) -> AuthStatus {
        if self.store.access_token().is_none() && self.store.refresh_token().is_none() {
            return AuthStatus::Unauthenticated;
        }

        let request = ApiRequest::get(self.settings.me_path.as_str());
        let response = match self.gateway.fetch_with_auth(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(error = %e, "auth check failed");
                return AuthStatus::Unauthenticated;
            }
        };

        if !response.is_success() {
            tracing::debug!(status = %response.status, "auth check rejected");
            return AuthStatus::Unauthenticated;
        }
        match response.json() {
            Ok(profile) => AuthStatus::Authenticated { profile },
            Err(e) => {
                tracing::debug!(error = %e, "auth check returned an unreadable profile");
                AuthStatus::Unauthenticated
            }
        }
    }

    /// Tell the backend the session is over, then clear it locally.
    ///
    /// The backend call is best-effort; local state is cleared regardless.
    pub async fn logout(&self) {
        if let Some(access) = self.store.access_token() {
            match self.logout_request(&access) {
                Ok(request) => {
                    if let Err(e) = self.http.execute(&request).await {
                        tracing::debug!(error = %e, "logout request failed");
                    }
                }
                Err(e) => tracing::debug!(error = %e, "could not build logout request"),
            }
        }
        self.clear_tokens();
        tracing::info!("logged out");
    }

    fn logout_request(&self, access: &str) -> Result<ApiRequest, DomainError> {
        let url = join_path(&self.base_url, &self.settings.logout_path)?;
        let body = serde_json::json!({ "refresh_token": self.store.refresh_token() });
        let request = ApiRequest::post(url.as_str())
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .with_timeout(self.settings.request_timeout());
        Ok(request.with_bearer(access))
    }

    /// Register for authenticated/unauthenticated transitions.
    ///
    /// Callbacks run synchronously on the thread that changed the session.
    pub fn subscribe_auth_changes<F>(&self, callback: F) -> Subscription
    where
        F: Fn(AuthChange) + Send + Sync + 'static,
    {
        self.store.events().subscribe(callback)
    }

    /// Check a token against the injected clock. Undecodable tokens are expired.
    #[must_use]
    pub fn is_token_expired(&self, token: &str) -> bool {
        self.oracle.is_expired(token)
    }

    /// When `token` expires, if it carries a readable `exp`.
    #[must_use]
    pub fn token_expires_at(&self, token: &str) -> Option<DateTime<Utc>> {
        self.oracle.expires_at(token)
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("base_url", &self.base_url.as_str())
            .field("store", &self.store)
            .field("refresher", &self.refresher)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

//! Session settings
//!
//! Endpoints, timers and policies for the session core. Every field has a
//! serde default so partial configuration files are accepted.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{DomainError, DomainResult};

/// What the gateway does when a proactive refresh of an expired token fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StaleTokenPolicy {
    /// Send the request with the stale token and let the server decide.
    #[default]
    SoftFail,
    /// Reject the request with `AuthenticationFailed`.
    Strict,
}

impl StaleTokenPolicy {
    /// Returns true if requests may proceed with a stale token.
    #[must_use]
    pub const fn allows_stale(self) -> bool {
        matches!(self, Self::SoftFail)
    }
}

/// Settings for the session core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Backend base URL; relative request URLs are joined onto it.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Token refresh endpoint path.
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,

    /// Current-user endpoint path.
    #[serde(default = "default_me_path")]
    pub me_path: String,

    /// Logout endpoint path.
    #[serde(default = "default_logout_path")]
    pub logout_path: String,

    /// Seconds between opportunistic renewals.
    #[serde(default = "default_auto_renew_interval_secs")]
    pub auto_renew_interval_secs: u64,

    /// Upper bound on a refresh call, in seconds. Zero disables the bound.
    #[serde(default = "default_refresh_timeout_secs")]
    pub refresh_timeout_secs: u64,

    /// Per-request timeout for wrapped requests, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Behaviour when a proactive refresh fails.
    #[serde(default)]
    pub stale_token_policy: StaleTokenPolicy,

    /// Storage key of the access token.
    #[serde(default = "default_access_token_key")]
    pub access_token_key: String,

    /// Storage key of the refresh token.
    #[serde(default = "default_refresh_token_key")]
    pub refresh_token_key: String,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_refresh_path() -> String {
    "/auth/refresh".to_string()
}

fn default_me_path() -> String {
    "/auth/me".to_string()
}

fn default_logout_path() -> String {
    "/auth/logout".to_string()
}

const fn default_auto_renew_interval_secs() -> u64 {
    30 * 60
}

const fn default_refresh_timeout_secs() -> u64 {
    30
}

const fn default_request_timeout_secs() -> u64 {
    60
}

fn default_access_token_key() -> String {
    "access_token".to_string()
}

fn default_refresh_token_key() -> String {
    "refresh_token".to_string()
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            refresh_path: default_refresh_path(),
            me_path: default_me_path(),
            logout_path: default_logout_path(),
            auto_renew_interval_secs: default_auto_renew_interval_secs(),
            refresh_timeout_secs: default_refresh_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            stale_token_policy: StaleTokenPolicy::default(),
            access_token_key: default_access_token_key(),
            refresh_token_key: default_refresh_token_key(),
        }
    }
}

impl SessionSettings {
    /// Settings pointing at `base_url`, everything else default.
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Parsed base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is not an absolute URL.
    pub fn base_url(&self) -> DomainResult<Url> {
        Url::parse(&self.base_url)
            .map_err(|e| DomainError::InvalidUrl(format!("{e}: {}", self.base_url)))
    }

    /// Interval between opportunistic renewals.
    #[must_use]
    pub const fn auto_renew_interval(&self) -> Duration {
        Duration::from_secs(self.auto_renew_interval_secs)
    }

    /// Refresh call bound, `None` when disabled.
    #[must_use]
    pub const fn refresh_timeout(&self) -> Option<Duration> {
        if self.refresh_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.refresh_timeout_secs))
        }
    }

    /// Per-request timeout for wrapped requests.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Checks that the settings are usable.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> DomainResult<()> {
        self.base_url()?;

        for (key, path) in [
            ("refresh_path", &self.refresh_path),
            ("me_path", &self.me_path),
            ("logout_path", &self.logout_path),
        ] {
            if !path.starts_with('/') {
                return Err(DomainError::InvalidSetting {
                    key,
                    reason: format!("path must start with '/': {path}"),
                });
            }
        }

        if self.auto_renew_interval_secs == 0 {
            return Err(DomainError::InvalidSetting {
                key: "auto_renew_interval_secs",
                reason: "must be greater than zero".to_string(),
            });
        }

        if self.access_token_key.is_empty() || self.access_token_key == self.refresh_token_key {
            return Err(DomainError::InvalidSetting {
                key: "access_token_key",
                reason: "storage keys must be non-empty and distinct".to_string(),
            });
        }

        Ok(())
    }
}

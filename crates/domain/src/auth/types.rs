//! Session and token types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The access/refresh credential pair held by a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    /// Short-lived bearer credential presented on every authenticated request.
    pub access_token: String,
    /// Longer-lived opaque credential exchanged for a new pair.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl TokenPair {
    /// Create a pair from an access token and optional refresh token.
    #[must_use]
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
        }
    }

    /// Check if the pair carries a refresh token.
    #[must_use]
    pub const fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }
}

/// Whether a session currently exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// A non-empty access token is stored.
    Authenticated,
    /// No access token is stored.
    #[default]
    Unauthenticated,
}

impl SessionState {
    /// Derive the state from an optional access token.
    #[must_use]
    pub fn from_access_token(token: Option<&str>) -> Self {
        match token {
            Some(t) if !t.is_empty() => Self::Authenticated,
            _ => Self::Unauthenticated,
        }
    }

    /// Returns true for [`SessionState::Authenticated`].
    #[must_use]
    pub const fn is_authenticated(self) -> bool {
        matches!(self, Self::Authenticated)
    }
}

/// Notification published on every authenticated/unauthenticated transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthChange {
    /// The state after the transition.
    pub is_authenticated: bool,
}

impl AuthChange {
    /// Event for a session that just began.
    #[must_use]
    pub const fn authenticated() -> Self {
        Self {
            is_authenticated: true,
        }
    }

    /// Event for a session that just ended.
    #[must_use]
    pub const fn unauthenticated() -> Self {
        Self {
            is_authenticated: false,
        }
    }
}

impl From<SessionState> for AuthChange {
    fn from(state: SessionState) -> Self {
        match state {
            SessionState::Authenticated => Self::authenticated(),
            SessionState::Unauthenticated => Self::unauthenticated(),
        }
    }
}

/// Result of asking the backend for the current user.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthStatus {
    /// The token was accepted; the profile is whatever the backend returned.
    Authenticated {
        /// User profile document.
        profile: serde_json::Value,
    },
    /// No session, or the backend refused it.
    Unauthenticated,
}

impl AuthStatus {
    /// Returns true if the backend accepted the session.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }
}

/// Token refresh endpoint response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshResponse {
    /// The newly issued access token.
    pub access_token: String,
    /// The rotated refresh token.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Usually "bearer".
    #[serde(default)]
    pub token_type: Option<String>,
}

impl From<RefreshResponse> for TokenPair {
    fn from(response: RefreshResponse) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
        }
    }
}

/// Authentication errors.
///
/// Cloneable so a single refresh outcome can be handed to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No access or refresh token is available where one is required.
    #[error("no token available")]
    MissingToken,

    /// The refresh endpoint rejected the refresh token, or the call failed.
    #[error("failed to refresh token: {message}")]
    RefreshFailed {
        /// Error description.
        message: String,
    },

    /// Authorization could not be established for the request.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// A token was rejected before being stored.
    #[error("invalid token: {reason}")]
    InvalidToken {
        /// Why it was rejected.
        reason: String,
    },

    /// The wrapped request failed at the network level.
    #[error("transport error: {message}")]
    Transport {
        /// Error description.
        message: String,
    },

    /// The durable token store could not be written.
    #[error("token storage error: {message}")]
    Storage {
        /// Error description.
        message: String,
    },
}

impl AuthError {
    /// Shorthand for [`AuthError::RefreshFailed`].
    #[must_use]
    pub fn refresh_failed(message: impl Into<String>) -> Self {
        Self::RefreshFailed {
            message: message.into(),
        }
    }

    /// Returns true for errors that end the session locally.
    #[must_use]
    pub const fn ends_session(&self) -> bool {
        matches!(self, Self::RefreshFailed { .. } | Self::AuthenticationFailed)
    }
}

//! Expiry checks against an injected clock.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sessionkit_domain::{decode_claims, is_token_expired};

use crate::ports::Clock;

/// Answers "is this token expired" using the claims carried by the token.
#[derive(Clone)]
pub struct ExpiryOracle {
    clock: Arc<dyn Clock>,
}

impl ExpiryOracle {
    /// Create an oracle reading time from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Check if `token` is expired now. Undecodable tokens count as expired.
    #[must_use]
    pub fn is_expired(&self, token: &str) -> bool {
        is_token_expired(token, self.clock.now())
    }

    /// When `token` expires, if it can be decoded and carries `exp`.
    #[must_use]
    pub fn expires_at(&self, token: &str) -> Option<DateTime<Utc>> {
        decode_claims(token).ok()?.expires_at()
    }

    /// Current time according to the injected clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

impl fmt::Debug for ExpiryOracle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpiryOracle").finish_non_exhaustive()
    }
}

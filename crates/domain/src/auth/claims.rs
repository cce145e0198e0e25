//! Bearer token claims decoding and expiry checks.
//!
//! Tokens are treated as `header.claims.signature` with a base64url-encoded
//! JSON claims segment. The signature is never verified here; the backend
//! remains the authority on validity.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while decoding a token's claims.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimsError {
    /// The token does not have three dot-separated segments.
    #[error("expected 3 token segments, found {0}")]
    SegmentCount(usize),

    /// The claims segment is not valid base64url.
    #[error("claims segment is not base64url: {0}")]
    Encoding(String),

    /// The claims segment is not a JSON object.
    #[error("claims segment is not a JSON object: {0}")]
    Json(String),
}

/// Decoded claims of an access token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Expiry, seconds since the epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<f64>,
    /// Every other claim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TokenClaims {
    /// Expiry as a timestamp, if the claim is present and representable.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let exp = self.exp.filter(|e| e.is_finite())?;
        #[allow(clippy::cast_possible_truncation)]
        DateTime::from_timestamp_millis((exp * 1000.0) as i64)
    }

    /// The `sub` claim, when it is a string.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.extra.get("sub").and_then(serde_json::Value::as_str)
    }

    /// Check if the token is expired at `now`. A missing `exp` counts as expired.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_none_or(|expires_at| expires_at < now)
    }
}

/// Decode the claims segment of a token.
///
/// # Errors
///
/// Returns an error if the token is not three segments or the middle
/// segment is not base64url-encoded JSON.
pub fn decode_claims(token: &str) -> Result<TokenClaims, ClaimsError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(ClaimsError::SegmentCount(segments.len()));
    }

    let payload = segments[1].trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| ClaimsError::Encoding(e.to_string()))?;

    serde_json::from_slice(&bytes).map_err(|e| ClaimsError::Json(e.to_string()))
}

/// Check if a token is expired at `now`.
///
/// Fails closed: anything that cannot be decoded, or lacks a numeric `exp`,
/// is reported as expired. No clock-skew leeway is applied.
#[must_use]
pub fn is_token_expired(token: &str, now: DateTime<Utc>) -> bool {
    decode_claims(token).map_or(true, |claims| claims.is_expired_at(now))
}

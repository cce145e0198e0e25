//! Domain error types

use thiserror::Error;

/// Domain-level errors that can occur during validation or processing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The provided URL is invalid or malformed.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// A required header name is invalid.
    #[error("invalid header name: {0}")]
    InvalidHeaderName(String),

    /// The HTTP method is not supported.
    #[error("unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    /// A settings value is out of range or malformed.
    #[error("invalid setting `{key}`: {reason}")]
    InvalidSetting {
        /// Settings key.
        key: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Result type alias for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

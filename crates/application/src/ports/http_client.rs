//! HTTP Client port

use async_trait::async_trait;
use sessionkit_domain::{ApiRequest, ApiResponse};

/// Errors raised while sending a request.
///
/// Any received response, whatever its status, is not an error at this level.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HttpClientError {
    /// The URL could not be parsed or resolved.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The request did not complete within its timeout.
    #[error("request timed out after {timeout_ms} ms")]
    Timeout {
        /// Timeout that was exceeded.
        timeout_ms: u64,
    },

    /// The connection could not be established.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Any other transport failure.
    #[error("{0}")]
    Other(String),
}

/// Port for executing HTTP requests.
///
/// This trait abstracts the HTTP client implementation, allowing
/// the session services to be independent of specific HTTP libraries.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Executes a request and returns the response.
    ///
    /// `request.url` is absolute by the time it reaches this port.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails due to network issues,
    /// timeout, or an unusable URL.
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, HttpClientError>;
}

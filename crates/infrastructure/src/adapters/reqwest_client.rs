//! HTTP Client implementation using reqwest.
//!
//! This adapter implements the `HttpClient` port using the reqwest library.
//! Every response is handed back as-is; only transport failures are errors.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use sessionkit_application::ports::{HttpClient, HttpClientError};
use sessionkit_domain::{ApiRequest, ApiResponse, HttpMethod};

/// Timeout used when a request does not carry its own.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const MAX_REDIRECTS: usize = 10;

/// HTTP client implementation using reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    /// Creates a new HTTP client with default settings.
    ///
    /// Default configuration:
    /// - Follow redirects: up to 10
    /// - TLS verification: enabled
    /// - User-Agent: "SessionKit/<version>"
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be created.
    pub fn new() -> Result<Self, HttpClientError> {
        let client = Client::builder()
            .user_agent(concat!("SessionKit/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|e| HttpClientError::Other(e.to_string()))?;

        Ok(Self { client })
    }

    /// Creates a new HTTP client with a custom reqwest client.
    #[must_use]
    pub const fn with_client(client: Client) -> Self {
        Self { client }
    }

    const fn to_reqwest_method(method: HttpMethod) -> Method {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Delete => Method::DELETE,
        }
    }

    /// Maps reqwest errors to the port's `HttpClientError`.
    fn map_error(error: &reqwest::Error, timeout_ms: u64) -> HttpClientError {
        if error.is_timeout() {
            return HttpClientError::Timeout { timeout_ms };
        }

        if error.is_connect() {
            let host = error
                .url()
                .and_then(Url::host_str)
                .unwrap_or("unknown")
                .to_string();
            return HttpClientError::ConnectionFailed(format!("{host}: {error}"));
        }

        if error.is_redirect() {
            return HttpClientError::Other(format!("more than {MAX_REDIRECTS} redirects"));
        }

        HttpClientError::Other(error.to_string())
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, HttpClientError> {
        let url = Url::parse(&request.url)
            .map_err(|e| HttpClientError::InvalidUrl(format!("{e}: {}", request.url)))?;
        let timeout = request.timeout.unwrap_or(DEFAULT_TIMEOUT);
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);

        let start = Instant::now();

        let mut builder = self
            .client
            .request(Self::to_reqwest_method(request.method), url)
            .timeout(timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Self::map_error(&e, timeout_ms))?;

        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("<binary>").to_string()))
            .collect();

        let body = response
            .bytes()
            .await
            .map_err(|e| HttpClientError::Other(format!("failed to read body: {e}")))?
            .to_vec();

        let duration = start.elapsed();
        tracing::debug!(
            method = %request.method,
            status,
            elapsed_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            "request completed"
        );

        Ok(ApiResponse::new(status, headers, body).with_duration(duration))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Serves one canned HTTP/1.1 response and returns the raw request head.
    async fn one_shot_server(response: String) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut head = Vec::new();
            let mut chunk = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&chunk[..n]);
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&head).to_lowercase()
        });
        (base, handle)
    }

    #[test]
    fn test_to_reqwest_method() {
        assert_eq!(
            ReqwestHttpClient::to_reqwest_method(HttpMethod::Get),
            Method::GET
        );
        assert_eq!(
            ReqwestHttpClient::to_reqwest_method(HttpMethod::Patch),
            Method::PATCH
        );
        assert_eq!(
            ReqwestHttpClient::to_reqwest_method(HttpMethod::Delete),
            Method::DELETE
        );
    }

    #[test]
    fn test_client_creation() {
        assert!(ReqwestHttpClient::new().is_ok());
    }

    #[tokio::test]
    async fn test_unauthorized_response_is_not_an_error() {
        let (base, server) = one_shot_server(
            "HTTP/1.1 401 Unauthorized\r\ncontent-length: 5\r\nconnection: close\r\n\r\nnope!"
                .to_string(),
        )
        .await;
        let client = ReqwestHttpClient::new().unwrap();
        let request = ApiRequest::get(format!("{base}/auth/me")).with_bearer("t1");

        let response = client.execute(&request).await.unwrap();

        assert!(response.is_unauthorized());
        assert_eq!(response.text(), "nope!");
        let head = server.await.unwrap();
        assert!(head.starts_with("get /auth/me http/1.1"));
        assert!(head.contains("authorization: bearer t1"));
    }

    #[tokio::test]
    async fn test_json_response_is_read() {
        let body = r#"{"access_token":"a2","refresh_token":"r2"}"#;
        let raw = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        let (base, _server) = one_shot_server(raw).await;
        let client = ReqwestHttpClient::new().unwrap();

        let response = client
            .execute(&ApiRequest::get(format!("{base}/auth/refresh")))
            .await
            .unwrap();

        assert!(response.is_success());
        assert_eq!(
            response.headers.get("content-type").map(String::as_str),
            Some("application/json")
        );
        let parsed: sessionkit_domain::RefreshResponse = response.json().unwrap();
        assert_eq!(parsed.access_token, "a2");
    }

    #[tokio::test]
    async fn test_refused_connection_is_connection_failed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ReqwestHttpClient::new().unwrap();
        let result = client
            .execute(&ApiRequest::get(format!("http://{addr}/")))
            .await;

        assert!(matches!(result, Err(HttpClientError::ConnectionFailed(_))));
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _hold = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let client = ReqwestHttpClient::new().unwrap();
        let request =
            ApiRequest::get(format!("http://{addr}/slow")).with_timeout(Duration::from_millis(100));
        let result = client.execute(&request).await;

        assert_eq!(result, Err(HttpClientError::Timeout { timeout_ms: 100 }));
    }

    #[tokio::test]
    async fn test_relative_url_is_rejected() {
        let client = ReqwestHttpClient::new().unwrap();
        let result = client.execute(&ApiRequest::get("/auth/me")).await;
        assert!(matches!(result, Err(HttpClientError::InvalidUrl(_))));
    }
}

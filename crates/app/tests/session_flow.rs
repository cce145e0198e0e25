//! End-to-end session flows over the real file store and a scripted backend.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use sessionkit_application::{HttpClient, HttpClientError, KeyValueStore, SessionManager};
use sessionkit_domain::{ApiRequest, ApiResponse, AuthError, SessionSettings};
use sessionkit_infrastructure::{FileKeyValueStore, SystemClock};

const BASE: &str = "http://backend.test";

fn jwt(sub: &str, ttl: chrono::Duration) -> String {
    let exp = (chrono::Utc::now() + ttl).timestamp();
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
    let claims = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"{sub}","exp":{exp}}}"#));
    format!("{header}.{claims}.sig")
}

/// Issues rotating token pairs and serves `/items`, which only accepts the
/// latest access token.
#[derive(Default)]
struct Backend {
    issued: Mutex<u32>,
    current: Mutex<Option<String>>,
    refresh_ok: Mutex<bool>,
    refresh_delay: Option<Duration>,
    calls: Mutex<HashMap<String, usize>>,
}

impl Backend {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            refresh_ok: Mutex::new(true),
            ..Self::default()
        })
    }

    fn slow_refresh(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            refresh_ok: Mutex::new(true),
            refresh_delay: Some(delay),
            ..Self::default()
        })
    }

    fn reject_refresh(&self) {
        *self.refresh_ok.lock() = false;
    }

    fn accept(&self, access: &str) {
        *self.current.lock() = Some(access.to_string());
    }

    fn calls_to(&self, path: &str) -> usize {
        self.calls.lock().get(path).copied().unwrap_or(0)
    }

    fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    fn issue(&self) -> (String, String) {
        let mut issued = self.issued.lock();
        *issued += 1;
        let access = jwt(&format!("access-{issued}"), chrono::Duration::hours(1));
        *self.current.lock() = Some(access.clone());
        (access, format!("refresh-{issued}"))
    }
}

#[async_trait]
impl HttpClient for Backend {
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, HttpClientError> {
        let path = request.url.strip_prefix(BASE).unwrap_or(&request.url).to_string();
        *self.calls.lock().entry(path.clone()).or_default() += 1;

        match path.as_str() {
            "/auth/refresh" => {
                if let Some(delay) = self.refresh_delay {
                    tokio::time::sleep(delay).await;
                }
                if !*self.refresh_ok.lock() {
                    return Ok(ApiResponse::with_status(401, r#"{"detail":"expired"}"#));
                }
                let (access, refresh) = self.issue();
                let body = serde_json::json!({ "access_token": access, "refresh_token": refresh });
                Ok(ApiResponse::with_status(200, body.to_string()))
            }
            "/items" => {
                let current = self.current.lock().clone();
                if current.is_some() && request.bearer_token() == current.as_deref() {
                    Ok(ApiResponse::with_status(200, r#"{"items":[1,2,3]}"#))
                } else {
                    Ok(ApiResponse::with_status(401, ""))
                }
            }
            "/auth/logout" => Ok(ApiResponse::with_status(204, "")),
            _ => Ok(ApiResponse::with_status(404, "")),
        }
    }
}

fn manager_at(path: &Path, backend: &Arc<Backend>) -> Arc<SessionManager> {
    SessionManager::new(
        SessionSettings::with_base_url(BASE),
        Arc::new(FileKeyValueStore::open(path).unwrap()),
        backend.clone(),
        Arc::new(SystemClock::new()),
    )
    .unwrap()
}

#[tokio::test]
async fn test_session_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    let backend = Backend::new();
    let access = jwt("user-1", chrono::Duration::hours(1));
    backend.accept(&access);

    {
        let first = manager_at(&path, &backend);
        first.set_tokens(&access, Some("r0")).unwrap();
        first.shutdown();
    }

    let second = manager_at(&path, &backend);
    assert_eq!(second.get_token().as_deref(), Some(access.as_str()));
    assert_eq!(second.get_refresh_token().as_deref(), Some("r0"));
    assert!(!second.is_auto_renewing());

    let response = second.fetch_with_auth(ApiRequest::get("/items")).await.unwrap();
    assert_eq!(response.status.0, 200);
    assert_eq!(backend.calls_to("/auth/refresh"), 0);
}

#[tokio::test]
async fn test_refresh_without_session_makes_no_call() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Backend::new();
    let session = manager_at(&dir.path().join("session.json"), &backend);

    let result = session.refresh().await;

    assert_eq!(result, Err(AuthError::MissingToken));
    assert_eq!(backend.total_calls(), 0);
    assert_eq!(session.get_token(), None);
}

#[tokio::test]
async fn test_concurrent_rejections_share_one_refresh() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Backend::slow_refresh(Duration::from_millis(20));
    let session = manager_at(&dir.path().join("session.json"), &backend);
    // Valid by its claims, but the backend no longer accepts it.
    session
        .set_tokens(&jwt("user-1", chrono::Duration::hours(1)), Some("r0"))
        .unwrap();
    session.shutdown();

    let (a, b) = tokio::join!(
        session.fetch_with_auth(ApiRequest::get("/items")),
        session.fetch_with_auth(ApiRequest::get("/items")),
    );

    assert_eq!(a.unwrap().status.0, 200);
    assert_eq!(b.unwrap().status.0, 200);
    assert_eq!(backend.calls_to("/auth/refresh"), 1);
    assert_eq!(backend.calls_to("/items"), 4);
    assert_eq!(session.get_refresh_token().as_deref(), Some("refresh-1"));
}

#[tokio::test]
async fn test_rejected_refresh_clears_persisted_session() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    let backend = Backend::new();
    backend.reject_refresh();
    let session = manager_at(&path, &backend);
    session
        .set_tokens(&jwt("user-1", chrono::Duration::hours(1)), Some("r0"))
        .unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _sub = session.subscribe_auth_changes(move |change| {
        sink.lock().push(change.is_authenticated);
    });

    let result = session.fetch_with_auth(ApiRequest::get("/items")).await;

    assert_eq!(result.unwrap_err(), AuthError::AuthenticationFailed);
    assert_eq!(session.get_token(), None);
    assert!(!session.is_auto_renewing());
    assert_eq!(*seen.lock(), vec![false]);

    let reopened = FileKeyValueStore::open(&path).unwrap();
    assert_eq!(reopened.get("access_token").unwrap(), None);
    assert_eq!(reopened.get("refresh_token").unwrap(), None);
}

#[tokio::test]
async fn test_logout_notifies_backend_and_clears_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    let backend = Backend::new();
    let session = manager_at(&path, &backend);
    session
        .set_tokens(&jwt("user-1", chrono::Duration::hours(1)), Some("r0"))
        .unwrap();

    session.logout().await;

    assert_eq!(backend.calls_to("/auth/logout"), 1);
    assert_eq!(session.get_token(), None);
    let reopened = FileKeyValueStore::open(&path).unwrap();
    assert_eq!(reopened.get("refresh_token").unwrap(), None);
}

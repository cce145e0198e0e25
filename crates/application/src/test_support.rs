//! Test doubles shared by the unit tests of this crate.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sessionkit_domain::{ApiRequest, ApiResponse};
use url::Url;

use crate::auth::event_bus::{AuthEventBus, Subscription};
use crate::ports::{Clock, HttpClient, HttpClientError, KeyValueStore, StorageError};

pub const REFRESH_PATH: &str = "/auth/refresh";
pub const API_BASE: &str = "http://api.test";

pub fn refresh_url() -> Url {
    Url::parse(&format!("{API_BASE}{REFRESH_PATH}")).unwrap()
}

pub fn api_base() -> Url {
    Url::parse(API_BASE).unwrap()
}

/// 200 response carrying a new pair.
pub fn refresh_ok(access: &str, refresh: &str) -> ApiResponse {
    let body = serde_json::json!({
        "access_token": access,
        "refresh_token": refresh,
        "token_type": "bearer",
    });
    ApiResponse::with_status(200, body.to_string())
}

/// An unsigned JWT whose `exp` lies `ttl` after `now`.
pub fn token_expiring_in(now: DateTime<Utc>, ttl: chrono::Duration) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let exp = (now + ttl).timestamp();
    let claims = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"user-1","exp":{exp}}}"#));
    format!("{header}.{claims}.sig")
}

/// Records the `is_authenticated` flag of every published change.
pub fn record_events(bus: &AuthEventBus) -> (Subscription, Arc<Mutex<Vec<bool>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let sub = bus.subscribe(move |change| sink.lock().push(change.is_authenticated));
    (sub, seen)
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
    failing: Mutex<bool>,
    failing_key: Mutex<Option<String>>,
}

impl MemoryStorage {
    pub fn put(&self, key: &str, value: &str) {
        self.values.lock().insert(key.to_string(), value.to_string());
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    pub fn fail_writes(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    /// Make writes to `key` alone fail.
    pub fn fail_writes_to(&self, key: &str) {
        *self.failing_key.lock() = Some(key.to_string());
    }

    fn check_writable(&self, key: &str) -> Result<(), StorageError> {
        if *self.failing.lock() || self.failing_key.lock().as_deref() == Some(key) {
            return Err(StorageError::Unavailable("quota exceeded".to_string()));
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.value(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.check_writable(key)?;
        self.put(key, value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.check_writable(key)?;
        self.values.lock().remove(key);
        Ok(())
    }
}

#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now: Mutex::new(Utc::now()),
        }
    }
}

impl ManualClock {
    pub fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }

    pub fn advance(&self, by: chrono::Duration) {
        *self.now.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        Self::now(self)
    }
}

type Responder = dyn Fn(&ApiRequest) -> Result<ApiResponse, HttpClientError> + Send + Sync;

/// HTTP double answering from a closure and recording every request.
pub struct ScriptedHttp {
    respond: Box<Responder>,
    delays: Vec<(String, Duration)>,
    seen: Mutex<Vec<ApiRequest>>,
}

impl ScriptedHttp {
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(&ApiRequest) -> Result<ApiResponse, HttpClientError> + Send + Sync + 'static,
    {
        Self {
            respond: Box::new(respond),
            delays: Vec::new(),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Sleep `delay` before answering requests whose URL ends with `path`.
    pub fn with_delay(mut self, path: &str, delay: Duration) -> Self {
        self.delays.push((path.to_string(), delay));
        self
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.seen
            .lock()
            .iter()
            .filter(|r| r.url.ends_with(path))
            .count()
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl HttpClient for ScriptedHttp {
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, HttpClientError> {
        self.seen.lock().push(request.clone());
        let delay = self
            .delays
            .iter()
            .find(|(path, _)| request.url.ends_with(path.as_str()))
            .map(|(_, delay)| *delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        (self.respond)(request)
    }
}

//! Token storage with auth-change notification.
//!
//! The pair lives in an in-memory snapshot guarded by a lock and is written
//! through to a [`KeyValueStore`] in one batch. Readers only ever see whole
//! pairs, and transitions are published in the order they happened.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use sessionkit_domain::{AuthChange, AuthError, SessionSettings, SessionState, TokenPair};

use super::event_bus::AuthEventBus;
use crate::ports::KeyValueStore;

/// Storage keys for the two persisted values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenKeys {
    /// Key of the access token.
    pub access: String,
    /// Key of the refresh token.
    pub refresh: String,
}

impl TokenKeys {
    /// Keys configured in `settings`.
    #[must_use]
    pub fn from_settings(settings: &SessionSettings) -> Self {
        Self {
            access: settings.access_token_key.clone(),
            refresh: settings.refresh_token_key.clone(),
        }
    }
}

impl Default for TokenKeys {
    fn default() -> Self {
        Self::from_settings(&SessionSettings::default())
    }
}

/// Both values, replaced together.
///
/// A refresh token without an access token is possible after restoring a
/// session whose access token was never persisted; the gateway then
/// refreshes before the first request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Snapshot {
    access: Option<String>,
    refresh: Option<String>,
}

impl Snapshot {
    fn state(&self) -> SessionState {
        SessionState::from_access_token(self.access.as_deref())
    }
}

struct StoreInner {
    storage: Arc<dyn KeyValueStore>,
    keys: TokenKeys,
    current: RwLock<Snapshot>,
    events: AuthEventBus,
    /// Transitions not yet delivered, in the order they happened.
    pending: Mutex<VecDeque<AuthChange>>,
    /// Held by whichever thread is delivering `pending`.
    delivering: Mutex<()>,
}

/// Durable holder of the access/refresh pair.
///
/// Cloning yields another handle to the same store.
#[derive(Clone)]
pub struct TokenStore {
    inner: Arc<StoreInner>,
}

impl TokenStore {
    /// Create a store over `storage`, restoring whatever it already holds.
    ///
    /// Restoring never publishes an event; subscribers query the initial
    /// state themselves.
    pub fn new(storage: Arc<dyn KeyValueStore>, keys: TokenKeys, events: AuthEventBus) -> Self {
        let snapshot = Self::restore(storage.as_ref(), &keys);
        tracing::debug!(
            restored = snapshot.state().is_authenticated(),
            "token store initialised"
        );

        Self {
            inner: Arc::new(StoreInner {
                storage,
                keys,
                current: RwLock::new(snapshot),
                events,
                pending: Mutex::new(VecDeque::new()),
                delivering: Mutex::new(()),
            }),
        }
    }

    fn restore(storage: &dyn KeyValueStore, keys: &TokenKeys) -> Snapshot {
        let read = |key: &str| match storage.get(key) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to restore token");
                None
            }
        };

        Snapshot {
            access: read(&keys.access),
            refresh: read(&keys.refresh),
        }
    }

    /// The current access token.
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.inner.current.read().access.clone()
    }

    /// The current refresh token.
    #[must_use]
    pub fn refresh_token(&self) -> Option<String> {
        self.inner.current.read().refresh.clone()
    }

    /// The current pair, if an access token is stored.
    #[must_use]
    pub fn pair(&self) -> Option<TokenPair> {
        let current = self.inner.current.read();
        current
            .access
            .as_ref()
            .map(|access| TokenPair::new(access.clone(), current.refresh.clone()))
    }

    /// Whether a session currently exists.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.current.read().state()
    }

    /// The bus transitions are published on.
    #[must_use]
    pub fn events(&self) -> &AuthEventBus {
        &self.inner.events
    }

    /// Replace the pair. A missing refresh token removes the stored one.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` for an empty access token, or `Storage` if the
    /// durable store rejects the write; the in-memory pair is then unchanged.
    pub fn set(&self, access: &str, refresh: Option<&str>) -> Result<(), AuthError> {
        let next = Self::validated(access, refresh)?;
        {
            let mut current = self.inner.current.write();
            self.persist(&next)?;
            self.replace(&mut current, next);
        }
        self.deliver();
        Ok(())
    }

    /// Replace the pair only if the stored refresh token is still `expected`.
    ///
    /// Returns `Ok(false)` without touching anything when the session was
    /// cleared or replaced in the meantime.
    ///
    /// # Errors
    ///
    /// Same as [`TokenStore::set`].
    pub fn compare_and_set(&self, expected: &str, pair: &TokenPair) -> Result<bool, AuthError> {
        let next = Self::validated(&pair.access_token, pair.refresh_token.as_deref())?;
        {
            let mut current = self.inner.current.write();
            if current.refresh.as_deref() != Some(expected) {
                return Ok(false);
            }
            self.persist(&next)?;
            self.replace(&mut current, next);
        }
        self.deliver();
        Ok(true)
    }

    /// Remove both tokens.
    ///
    /// The in-memory pair is always cleared; durable failures are logged so
    /// a local logout can never be blocked by storage.
    pub fn clear(&self) {
        {
            let mut current = self.inner.current.write();
            self.erase();
            self.replace(&mut current, Snapshot::default());
        }
        self.deliver();
    }

    /// Remove both tokens only if the stored refresh token is still `expected`.
    pub fn compare_and_clear(&self, expected: &str) -> bool {
        {
            let mut current = self.inner.current.write();
            if current.refresh.as_deref() != Some(expected) {
                return false;
            }
            self.erase();
            self.replace(&mut current, Snapshot::default());
        }
        self.deliver();
        true
    }

    fn validated(access: &str, refresh: Option<&str>) -> Result<Snapshot, AuthError> {
        if access.is_empty() {
            return Err(AuthError::InvalidToken {
                reason: "access token must not be empty".to_string(),
            });
        }
        Ok(Snapshot {
            access: Some(access.to_string()),
            refresh: refresh.filter(|r| !r.is_empty()).map(str::to_string),
        })
    }

    fn persist(&self, next: &Snapshot) -> Result<(), AuthError> {
        let keys = &self.inner.keys;
        self.inner
            .storage
            .write_batch(&[
                (keys.access.as_str(), next.access.as_deref()),
                (keys.refresh.as_str(), next.refresh.as_deref()),
            ])
            .map_err(|e| AuthError::Storage {
                message: e.to_string(),
            })
    }

    fn erase(&self) {
        let storage = self.inner.storage.as_ref();
        for key in [&self.inner.keys.access, &self.inner.keys.refresh] {
            if let Err(e) = storage.remove(key) {
                tracing::warn!(key = %key, error = %e, "failed to remove persisted token");
            }
        }
    }

    /// Swap in `next` and queue the transition, if any. Must be called with
    /// the write lock held so the queue order matches the state order.
    fn replace(&self, current: &mut Snapshot, next: Snapshot) {
        let before = current.state();
        *current = next;
        let after = current.state();
        if before != after {
            self.inner.pending.lock().push_back(AuthChange::from(after));
        }
    }

    /// Publish queued transitions in order.
    ///
    /// Only one thread delivers at a time; a change queued while another
    /// thread (or an outer callback on this one) is delivering is published
    /// by that delivery loop.
    fn deliver(&self) {
        loop {
            let Some(guard) = self.inner.delivering.try_lock() else {
                return;
            };
            loop {
                let next = self.inner.pending.lock().pop_front();
                let Some(change) = next else { break };
                self.inner.events.publish(change);
            }
            drop(guard);
            if self.inner.pending.lock().is_empty() {
                return;
            }
        }
    }
}

impl fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenStore")
            .field("keys", &self.inner.keys)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

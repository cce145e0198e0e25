//! Auth state change notifications.
//!
//! Delivery is synchronous: `publish` runs every callback registered at that
//! moment before returning. There is no replay; a late subscriber reads the
//! current state from the token store instead.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use sessionkit_domain::AuthChange;

type Callback = Arc<dyn Fn(AuthChange) + Send + Sync>;

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(u64, Callback)>>,
}

impl BusInner {
    fn remove(&self, id: u64) {
        self.subscribers.lock().retain(|(sid, _)| *sid != id);
    }
}

/// Publish/subscribe channel for authenticated/unauthenticated transitions.
///
/// Cloning yields another handle to the same bus.
#[derive(Clone, Default)]
pub struct AuthEventBus {
    inner: Arc<BusInner>,
}

impl AuthEventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for future transitions.
    ///
    /// The callback stays registered until the returned [`Subscription`] is
    /// dropped or unsubscribed.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(AuthChange) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.lock().push((id, Arc::new(callback)));
        Subscription {
            id,
            bus: Arc::downgrade(&self.inner),
            active: true,
        }
    }

    /// Deliver `change` to every current subscriber, returning how many ran.
    ///
    /// The subscriber list is snapshotted first, so callbacks may subscribe,
    /// unsubscribe or read the token store without deadlocking.
    pub fn publish(&self, change: AuthChange) -> usize {
        let snapshot: Vec<Callback> = self
            .inner
            .subscribers
            .lock()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        tracing::debug!(
            is_authenticated = change.is_authenticated,
            subscribers = snapshot.len(),
            "publishing auth change"
        );

        for callback in &snapshot {
            callback(change);
        }
        snapshot.len()
    }

    /// Number of registered callbacks.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }
}

impl fmt::Debug for AuthEventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthEventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Handle to a registered callback. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    bus: Weak<BusInner>,
    active: bool,
}

impl Subscription {
    /// Remove the callback now.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    /// Keep the callback registered for the lifetime of the bus.
    pub fn detach(mut self) {
        self.active = false;
    }

    fn release(&mut self) {
        if std::mem::take(&mut self.active)
            && let Some(bus) = self.bus.upgrade()
        {
            bus.remove(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

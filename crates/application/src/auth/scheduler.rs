//! Opportunistic background renewal.
//!
//! Best-effort only: failures are logged and dropped. Requests stay correct
//! without it because the gateway refreshes on demand.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::expiry::ExpiryOracle;
use super::refresh::RefreshCoordinator;
use super::token_store::TokenStore;

/// What a single renewal tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalTick {
    /// No session, or no refresh token to renew with.
    NoSession,
    /// The access token is already expired; left to the request path.
    AlreadyExpired,
    /// A refresh was attempted and succeeded.
    Renewed,
    /// A refresh was attempted and failed.
    Failed,
}

/// Periodic task renewing the session before its access token expires.
///
/// The task is owned: starting again replaces it, and dropping the
/// scheduler aborts it.
#[derive(Debug)]
pub struct AutoRenewScheduler {
    refresher: RefreshCoordinator,
    store: TokenStore,
    oracle: ExpiryOracle,
    interval: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl AutoRenewScheduler {
    /// Create a stopped scheduler ticking every `interval`.
    pub fn new(
        refresher: RefreshCoordinator,
        store: TokenStore,
        oracle: ExpiryOracle,
        interval: Duration,
    ) -> Self {
        Self {
            refresher,
            store,
            oracle,
            interval,
            task: Mutex::new(None),
        }
    }

    /// The tick interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Start ticking, cancelling any task already running.
    ///
    /// The first tick fires one full interval from now. Returns false when
    /// called outside a tokio runtime, in which case nothing is started.
    pub fn start(&self) -> bool {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no async runtime, auto-renew not started");
            return false;
        };

        let refresher = self.refresher.clone();
        let store = self.store.clone();
        let oracle = self.oracle.clone();
        let interval = self.interval;

        let mut task = self.task.lock();
        if let Some(previous) = task.take() {
            previous.abort();
        }
        *task = Some(runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                renew_once(&refresher, &store, &oracle).await;
            }
        }));

        tracing::debug!(interval_secs = interval.as_secs(), "auto-renew started");
        true
    }

    /// Stop ticking. Returns whether a task was running.
    pub fn stop(&self) -> bool {
        let Some(task) = self.task.lock().take() else {
            return false;
        };
        task.abort();
        tracing::debug!("auto-renew stopped");
        true
    }

    /// Whether the periodic task is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Run one tick immediately, outside the timer.
    pub async fn tick_now(&self) -> RenewalTick {
        renew_once(&self.refresher, &self.store, &self.oracle).await
    }
}

impl Drop for AutoRenewScheduler {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

async fn renew_once(
    refresher: &RefreshCoordinator,
    store: &TokenStore,
    oracle: &ExpiryOracle,
) -> RenewalTick {
    let (Some(access), Some(_)) = (store.access_token(), store.refresh_token()) else {
        return RenewalTick::NoSession;
    };
    if oracle.is_expired(&access) {
        tracing::debug!("access token already expired, skipping auto-renew");
        return RenewalTick::AlreadyExpired;
    }

    match refresher.refresh().await {
        Ok(_) => RenewalTick::Renewed,
        Err(e) => {
            tracing::debug!(error = %e, "auto-renew failed");
            RenewalTick::Failed
        }
    }
}

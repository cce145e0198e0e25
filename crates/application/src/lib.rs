//! SessionKit Application - Session services and ports
//!
//! This crate defines the application layer with:
//! - Port traits (interfaces for the clock, HTTP and durable storage)
//! - The session services built on them
//! - The `SessionManager` facade consumed by UI code

pub mod auth;
pub mod ports;

#[cfg(test)]
pub(crate) mod test_support;

pub use auth::{
    AuthEventBus, AuthenticatedRequestGateway, AutoRenewScheduler, ExpiryOracle,
    RefreshCoordinator, RefreshOutcome, RenewalTick, SessionManager, Subscription, TokenKeys,
    TokenStore,
};
pub use ports::{Clock, HttpClient, HttpClientError, KeyValueStore, StorageError};

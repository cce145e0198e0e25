//! Session lifecycle services.
//!
//! This module provides:
//! - Durable token storage with change notification
//! - Fail-closed expiry checks
//! - Single-flight refresh and opportunistic background renewal
//! - The authenticated request gateway and the `SessionManager` facade

pub mod event_bus;
pub mod expiry;
pub mod gateway;
pub mod refresh;
pub mod scheduler;
pub mod session;
pub mod token_store;

pub use event_bus::{AuthEventBus, Subscription};
pub use expiry::ExpiryOracle;
pub use gateway::AuthenticatedRequestGateway;
pub use refresh::{RefreshCoordinator, RefreshOutcome};
pub use scheduler::{AutoRenewScheduler, RenewalTick};
pub use session::SessionManager;
pub use token_store::{TokenKeys, TokenStore};

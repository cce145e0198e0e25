//! SessionKit Domain - Core session types
//!
//! This crate defines the domain model for the session core.
//! All types here are pure Rust with no I/O dependencies.

pub mod auth;
pub mod error;
pub mod request;
pub mod response;
pub mod settings;

pub use auth::{
    AuthChange, AuthError, AuthStatus, ClaimsError, RefreshResponse, SessionState, TokenClaims,
    TokenPair, decode_claims, is_token_expired,
};
pub use error::{DomainError, DomainResult};
pub use request::{ApiRequest, HttpMethod};
pub use response::{ApiResponse, StatusCode};
pub use settings::{SessionSettings, StaleTokenPolicy};

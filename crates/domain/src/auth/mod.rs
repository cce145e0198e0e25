//! Authentication domain types

mod claims;
mod types;

pub use claims::{ClaimsError, TokenClaims, decode_claims, is_token_expired};
pub use types::{AuthChange, AuthError, AuthStatus, RefreshResponse, SessionState, TokenPair};

//! HTTP middleware and extractors

pub mod auth;
pub mod gate;
pub mod internal_auth;

pub use auth::{AuthError, AuthSession};
pub use gate::routing_gate;
pub use internal_auth::{require_internal_secret, InternalAuthState};

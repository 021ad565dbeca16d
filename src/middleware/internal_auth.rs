//! Shared-secret enforcement for the internal channel
//!
//! Privileged operations (platform-role grants, context invalidation) are
//! authenticated with a static shared secret instead of a user session.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use sha2::{Digest, Sha256};

/// Header carrying the shared secret
pub const INTERNAL_SECRET_HEADER: &str = "x-internal-secret";

/// Shared state for the internal-auth middleware
#[derive(Clone)]
pub struct InternalAuthState {
    secret: String,
}

impl InternalAuthState {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

/// Reject internal-channel requests without the correct shared secret
pub async fn require_internal_secret(
    State(auth_state): State<InternalAuthState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(INTERNAL_SECRET_HEADER)
        .and_then(|value| value.to_str().ok());

    match presented {
        Some(secret) if digests_match(secret, &auth_state.secret) => next.run(request).await,
        _ => forbidden_response(),
    }
}

/// Compare SHA-256 digests so the comparison cost does not depend on where
/// the candidate diverges from the secret
fn digests_match(candidate: &str, secret: &str) -> bool {
    Sha256::digest(candidate.as_bytes()) == Sha256::digest(secret.as_bytes())
}

fn forbidden_response() -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(json!({
            "error": "Invalid internal credentials",
            "code": "FORBIDDEN"
        })),
    )
        .into_response()
}

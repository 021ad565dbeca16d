//! Session authentication extractor
//!
//! Provides the `AuthSession` extractor for handlers that require a verified
//! session. Requests without one short-circuit to 401 before any resolution
//! logic runs.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
};

use crate::domain::Session;
use crate::state::HasPortalContext;

/// A verified session extracted from the Authorization header
#[derive(Debug, Clone)]
pub struct AuthSession(pub Session);

/// Authentication errors
#[derive(Debug, Clone)]
pub enum AuthError {
    /// No Authorization header present
    MissingToken,
    /// Invalid Authorization header format
    InvalidHeader(String),
    /// Token validation failed
    InvalidToken(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "Missing authorization token"),
            AuthError::InvalidHeader(_) => {
                (StatusCode::UNAUTHORIZED, "Invalid authorization header")
            }
            AuthError::InvalidToken(_) => (StatusCode::UNAUTHORIZED, "Invalid or expired session"),
        };

        let body = serde_json::json!({
            "error": message,
            "code": "UNAUTHORIZED"
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Extract and validate Bearer token from Authorization header
pub(crate) fn extract_bearer_token(headers: &axum::http::HeaderMap) -> Result<&str, AuthError> {
    let auth_header = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::InvalidHeader("Invalid header encoding".to_string()))?;

    auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        AuthError::InvalidHeader("Authorization header must use Bearer scheme".to_string())
    })
}

impl<S> FromRequestParts<S> for AuthSession
where
    S: HasPortalContext + Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)?;

        let session = state
            .jwt_manager()
            .verify_session(token)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        Ok(AuthSession(session))
    }
}

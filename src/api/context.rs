//! Portal context API handlers

use crate::api::SuccessResponse;
use crate::domain::{PortalKind, ResolvedContext};
use crate::error::AppError;
use crate::gate::PortalContext;
use crate::middleware::auth::AuthSession;
use crate::middleware::gate::{context_token_from_headers, write_context_cookie};
use crate::service::InitializedContext;
use crate::state::HasPortalContext;
use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body of the resolution responses (init and switch)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextResponse {
    pub portal_kind: PortalKind,
    pub organization_id: Option<Uuid>,
    pub redirect_path: String,
}

impl From<&ResolvedContext> for ContextResponse {
    fn from(resolved: &ResolvedContext) -> Self {
        Self {
            portal_kind: resolved.portal,
            organization_id: resolved.organization_id,
            redirect_path: resolved.redirect_path.clone(),
        }
    }
}

/// Current cache entry as shown to the UI (org switcher, header badge)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextEntryView {
    pub portal_kind: PortalKind,
    pub organization_id: Option<Uuid>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Response of the read-only context endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextStatusResponse {
    pub resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextEntryView>,
}

/// Body of the context-switch request
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SwitchContextInput {
    pub organization_id: Uuid,
}

/// Initialize the caller's portal context (cache-miss trigger).
///
/// Idempotent: repeated calls against unchanged data return the same
/// resolution and overwrite the cache cookie with a fresh TTL.
pub async fn init<S: HasPortalContext>(
    State(state): State<S>,
    AuthSession(session): AuthSession,
) -> Result<Response, AppError> {
    let initialized = state.context_service().initialize(&session).await?;
    Ok(resolution_response(&state, initialized))
}

/// Return the current context cache entry for UI display
pub async fn current<S: HasPortalContext>(
    State(state): State<S>,
    AuthSession(session): AuthSession,
    headers: HeaderMap,
) -> Result<Json<ContextStatusResponse>, AppError> {
    let token = context_token_from_headers(&headers);
    let entry = state
        .context_service()
        .current(&session, token.as_deref())?;

    Ok(Json(match entry {
        Some(entry) => ContextStatusResponse {
            resolved: true,
            context: Some(ContextEntryView {
                portal_kind: entry.portal,
                organization_id: entry.organization_id,
                issued_at: entry.issued_at,
                expires_at: entry.expires_at,
            }),
        },
        None => ContextStatusResponse {
            resolved: false,
            context: None,
        },
    }))
}

/// Switch the active organization. Requires an active membership in the
/// target; the cache cookie is only rewritten on success.
pub async fn switch<S: HasPortalContext>(
    State(state): State<S>,
    AuthSession(session): AuthSession,
    Json(input): Json<SwitchContextInput>,
) -> Result<Response, AppError> {
    let switched = state
        .context_service()
        .switch(&session, input.organization_id)
        .await?;
    Ok(resolution_response(&state, switched))
}

/// What business handlers see once the Routing Gate has run. Stands in for
/// the portal dashboards, which live outside this service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalEntryResponse {
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub portal_kind: Option<PortalKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<Uuid>,
}

/// Entry point for gated portal routes: echoes the context the gate resolved
pub async fn portal_entry(
    Extension(context): Extension<PortalContext>,
) -> Json<PortalEntryResponse> {
    Json(match context {
        PortalContext::Resolved {
            portal,
            organization_id,
        } => PortalEntryResponse {
            degraded: false,
            portal_kind: Some(portal),
            organization_id,
        },
        PortalContext::Degraded => PortalEntryResponse {
            degraded: true,
            portal_kind: None,
            organization_id: None,
        },
    })
}

fn resolution_response<S: HasPortalContext>(state: &S, initialized: InitializedContext) -> Response {
    let ttl_secs = state.context_service().codec().ttl().num_seconds();
    let body = Json(SuccessResponse::new(ContextResponse::from(
        &initialized.resolved,
    )));

    let mut response = body.into_response();
    write_context_cookie(response.headers_mut(), &initialized.token, ttl_secs);
    response
}

//! Privileged internal-channel handlers
//!
//! These routes sit behind the shared-secret middleware, outside the normal
//! session flow.

use crate::api::{MessageResponse, SuccessResponse};
use crate::domain::{PlatformRole, PlatformRoleGrant};
use crate::error::AppError;
use crate::state::{HasPlatformRoles, HasPortalContext};
use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body of the platform-role grant request
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GrantPlatformRoleInput {
    pub subject_id: Uuid,
    pub role: PlatformRole,
}

/// Body of the context invalidation request
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InvalidateContextInput {
    pub subject_id: Uuid,
}

/// Grant a platform role.
///
/// Deliberately leaves every context cache entry untouched: session claims
/// are immutable, so the grant becomes visible only after the subject's
/// session is re-issued and Initialization runs again.
pub async fn grant_platform_role<S: HasPlatformRoles>(
    State(state): State<S>,
    Json(input): Json<GrantPlatformRoleInput>,
) -> Result<Json<SuccessResponse<PlatformRoleGrant>>, AppError> {
    let grant = state
        .platform_role_service()
        .grant(input.subject_id, input.role)
        .await?;

    Ok(Json(SuccessResponse::new(grant)))
}

/// Revoke a subject's platform role
pub async fn revoke_platform_role<S: HasPlatformRoles>(
    State(state): State<S>,
    Path(subject_id): Path<Uuid>,
) -> Result<Json<MessageResponse>, AppError> {
    let removed = state.platform_role_service().revoke(subject_id).await?;

    if !removed {
        return Err(AppError::NotFound(format!(
            "No platform role for subject {}",
            subject_id
        )));
    }

    Ok(Json(MessageResponse::new("Platform role revoked.")))
}

/// Record a context invalidation epoch for a subject.
///
/// Membership-removal, organization-suspension, and sign-out flows call this
/// so the Routing Gate discards entries minted before the event, ahead of
/// their TTL.
pub async fn invalidate_context<S: HasPortalContext>(
    State(state): State<S>,
    Json(input): Json<InvalidateContextInput>,
) -> Result<Json<MessageResponse>, AppError> {
    state
        .context_service()
        .mark_stale(input.subject_id)
        .await?;

    Ok(Json(MessageResponse::new("Context invalidated.")))
}

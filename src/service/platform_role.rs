//! Platform-role administration
//!
//! Runs on the privileged shared-secret channel only. A grant never touches
//! any context cache entry: session claims are immutable, so the new role
//! takes effect when the Identity Provider re-issues the subject's session
//! and Initialization runs again.

use crate::domain::{PlatformRole, PlatformRoleGrant};
use crate::error::Result;
use crate::repository::PlatformRoleRepository;
use std::sync::Arc;
use uuid::Uuid;

pub struct PlatformRoleService<P: PlatformRoleRepository> {
    repo: Arc<P>,
}

impl<P: PlatformRoleRepository> PlatformRoleService<P> {
    pub fn new(repo: Arc<P>) -> Self {
        Self { repo }
    }

    /// Grant (or re-grant) a platform role to a subject
    pub async fn grant(&self, subject_id: Uuid, role: PlatformRole) -> Result<PlatformRoleGrant> {
        let grant = self.repo.upsert(subject_id, role).await?;

        tracing::info!(
            subject = %subject_id,
            role = %grant.role,
            "platform role granted; effective at next session issue"
        );

        Ok(grant)
    }

    /// Revoke a subject's platform role. Returns whether a grant existed.
    pub async fn revoke(&self, subject_id: Uuid) -> Result<bool> {
        let removed = self.repo.remove(subject_id).await?;

        if removed {
            tracing::info!(subject = %subject_id, "platform role revoked");
        }

        Ok(removed)
    }

    /// Current grant for a subject, if any
    pub async fn find(&self, subject_id: Uuid) -> Result<Option<PlatformRoleGrant>> {
        self.repo.find_by_subject(subject_id).await
    }
}

//! Membership repository

use crate::domain::Membership;
use crate::error::Result;
use async_trait::async_trait;
use sqlx::MySqlPool;
use uuid::Uuid;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MembershipRepository: Send + Sync {
    /// All memberships held by a subject, oldest first
    async fn list_by_subject(&self, subject_id: Uuid) -> Result<Vec<Membership>>;
    /// A single membership, if the subject belongs to the organization
    async fn find(&self, subject_id: Uuid, organization_id: Uuid) -> Result<Option<Membership>>;
}

pub struct MembershipRepositoryImpl {
    pool: MySqlPool,
}

impl MembershipRepositoryImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MembershipRepository for MembershipRepositoryImpl {
    async fn list_by_subject(&self, subject_id: Uuid) -> Result<Vec<Membership>> {
        let memberships = sqlx::query_as::<_, Membership>(
            r#"
            SELECT organization_id, subject_id, role, created_at
            FROM memberships
            WHERE subject_id = ?
            ORDER BY created_at ASC, organization_id ASC
            "#,
        )
        .bind(subject_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(memberships)
    }

    async fn find(&self, subject_id: Uuid, organization_id: Uuid) -> Result<Option<Membership>> {
        let membership = sqlx::query_as::<_, Membership>(
            r#"
            SELECT organization_id, subject_id, role, created_at
            FROM memberships
            WHERE subject_id = ? AND organization_id = ?
            "#,
        )
        .bind(subject_id)
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(membership)
    }
}

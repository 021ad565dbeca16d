//! Platform-role repository
//!
//! Grants live in the Membership Store but are only read back into sessions
//! when the Identity Provider re-issues them; nothing in the request path
//! consults this table.

use crate::domain::{PlatformRole, PlatformRoleGrant};
use crate::error::Result;
use async_trait::async_trait;
use sqlx::MySqlPool;
use uuid::Uuid;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlatformRoleRepository: Send + Sync {
    async fn find_by_subject(&self, subject_id: Uuid) -> Result<Option<PlatformRoleGrant>>;
    async fn upsert(&self, subject_id: Uuid, role: PlatformRole) -> Result<PlatformRoleGrant>;
    async fn remove(&self, subject_id: Uuid) -> Result<bool>;
}

pub struct PlatformRoleRepositoryImpl {
    pool: MySqlPool,
}

impl PlatformRoleRepositoryImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlatformRoleRepository for PlatformRoleRepositoryImpl {
    async fn find_by_subject(&self, subject_id: Uuid) -> Result<Option<PlatformRoleGrant>> {
        let grant = sqlx::query_as::<_, PlatformRoleGrant>(
            r#"
            SELECT subject_id, role, granted_at
            FROM platform_roles
            WHERE subject_id = ?
            "#,
        )
        .bind(subject_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(grant)
    }

    async fn upsert(&self, subject_id: Uuid, role: PlatformRole) -> Result<PlatformRoleGrant> {
        sqlx::query(
            r#"
            INSERT INTO platform_roles (subject_id, role, granted_at)
            VALUES (?, ?, NOW())
            ON DUPLICATE KEY UPDATE role = VALUES(role), granted_at = NOW()
            "#,
        )
        .bind(subject_id)
        .bind(role)
        .execute(&self.pool)
        .await?;

        self.find_by_subject(subject_id).await?.ok_or_else(|| {
            crate::error::AppError::Internal(anyhow::anyhow!("Failed to persist platform role"))
        })
    }

    async fn remove(&self, subject_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM platform_roles WHERE subject_id = ?")
            .bind(subject_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

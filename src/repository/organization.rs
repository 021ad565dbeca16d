//! Organization repository

use crate::domain::Organization;
use crate::error::Result;
use async_trait::async_trait;
use sqlx::{MySqlPool, QueryBuilder};
use uuid::Uuid;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrganizationRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Organization>>;
    /// Organizations for a set of ids. Missing ids are silently absent from
    /// the result; callers treat them as not-active.
    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Organization>>;
}

pub struct OrganizationRepositoryImpl {
    pool: MySqlPool,
}

impl OrganizationRepositoryImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrganizationRepository for OrganizationRepositoryImpl {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Organization>> {
        let organization = sqlx::query_as::<_, Organization>(
            r#"
            SELECT id, name, slug, org_type, status, created_at, updated_at
            FROM organizations
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(organization)
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Organization>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::new(
            "SELECT id, name, slug, org_type, status, created_at, updated_at \
             FROM organizations WHERE id IN (",
        );
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let organizations = builder
            .build_query_as::<Organization>()
            .fetch_all(&self.pool)
            .await?;

        Ok(organizations)
    }
}

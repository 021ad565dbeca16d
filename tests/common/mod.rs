//! Common test utilities
//!
//! An in-memory Membership Store behind the repository traits, plus a test
//! state wired into the real router, so the full request path runs without
//! MySQL or Redis.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, Response, StatusCode},
    Router,
};
use chrono::{DateTime, Utc};
use medbridge_core::cache::ContextTokenCodec;
use medbridge_core::config::{
    Config, ContextConfig, DatabaseConfig, InternalApiConfig, JwtConfig, RedisConfig,
};
use medbridge_core::domain::{
    Membership, MembershipRole, OrgStatus, OrgType, Organization, PlatformRole, PlatformRoleGrant,
};
use medbridge_core::error::{AppError, Result as AppResult};
use medbridge_core::jwt::JwtManager;
use medbridge_core::repository::{
    MembershipRepository, OrganizationRepository, PlatformRoleRepository,
};
use medbridge_core::server::build_router;
use medbridge_core::service::{ContextService, PlatformRoleService, UpstreamPolicy};
use medbridge_core::state::{HasPlatformRoles, HasPortalContext};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_INTERNAL_SECRET: &str = "internal-test-secret";

/// Shared in-memory backing store for the repository fakes
#[derive(Clone, Default)]
pub struct InMemoryStore {
    memberships: Arc<Mutex<Vec<Membership>>>,
    organizations: Arc<Mutex<Vec<Organization>>>,
    platform_roles: Arc<Mutex<HashMap<Uuid, PlatformRoleGrant>>>,
    fail_reads: Arc<AtomicBool>,
}

impl InMemoryStore {
    pub fn add_organization(
        &self,
        org_type: OrgType,
        status: OrgStatus,
        created_at: DateTime<Utc>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.organizations.lock().unwrap().push(Organization {
            id,
            name: format!("org-{}", id),
            slug: format!("org-{}", id),
            org_type,
            status,
            created_at,
            updated_at: created_at,
        });
        id
    }

    pub fn add_membership(&self, subject_id: Uuid, organization_id: Uuid, created_at: DateTime<Utc>) {
        self.memberships.lock().unwrap().push(Membership {
            organization_id,
            subject_id,
            role: MembershipRole::Member,
            created_at,
        });
    }

    pub fn remove_membership(&self, subject_id: Uuid, organization_id: Uuid) {
        self.memberships
            .lock()
            .unwrap()
            .retain(|m| !(m.subject_id == subject_id && m.organization_id == organization_id));
    }

    pub fn suspend_organization(&self, organization_id: Uuid) {
        for org in self.organizations.lock().unwrap().iter_mut() {
            if org.id == organization_id {
                org.status = OrgStatus::Suspended;
            }
        }
    }

    pub fn platform_role(&self, subject_id: Uuid) -> Option<PlatformRoleGrant> {
        self.platform_roles.lock().unwrap().get(&subject_id).cloned()
    }

    /// Make every store read fail, simulating an unreachable upstream
    pub fn set_unreachable(&self, unreachable: bool) {
        self.fail_reads.store(unreachable, Ordering::SeqCst);
    }

    fn check_reachable(&self) -> AppResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            Err(AppError::UpstreamUnavailable(
                "membership store unreachable".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[derive(Clone)]
pub struct InMemoryMembershipRepo(InMemoryStore);

#[async_trait]
impl MembershipRepository for InMemoryMembershipRepo {
    async fn list_by_subject(&self, subject_id: Uuid) -> AppResult<Vec<Membership>> {
        self.0.check_reachable()?;
        let mut memberships: Vec<Membership> = self
            .0
            .memberships
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.subject_id == subject_id)
            .cloned()
            .collect();
        memberships.sort_by_key(|m| (m.created_at, m.organization_id));
        Ok(memberships)
    }

    async fn find(&self, subject_id: Uuid, organization_id: Uuid) -> AppResult<Option<Membership>> {
        self.0.check_reachable()?;
        Ok(self
            .0
            .memberships
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.subject_id == subject_id && m.organization_id == organization_id)
            .cloned())
    }
}

#[derive(Clone)]
pub struct InMemoryOrganizationRepo(InMemoryStore);

#[async_trait]
impl OrganizationRepository for InMemoryOrganizationRepo {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Organization>> {
        self.0.check_reachable()?;
        Ok(self
            .0
            .organizations
            .lock()
            .unwrap()
            .iter()
            .find(|org| org.id == id)
            .cloned())
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> AppResult<Vec<Organization>> {
        self.0.check_reachable()?;
        Ok(self
            .0
            .organizations
            .lock()
            .unwrap()
            .iter()
            .filter(|org| ids.contains(&org.id))
            .cloned()
            .collect())
    }
}

#[derive(Clone)]
pub struct InMemoryPlatformRoleRepo(InMemoryStore);

#[async_trait]
impl PlatformRoleRepository for InMemoryPlatformRoleRepo {
    async fn find_by_subject(&self, subject_id: Uuid) -> AppResult<Option<PlatformRoleGrant>> {
        Ok(self.0.platform_roles.lock().unwrap().get(&subject_id).cloned())
    }

    async fn upsert(&self, subject_id: Uuid, role: PlatformRole) -> AppResult<PlatformRoleGrant> {
        let grant = PlatformRoleGrant {
            subject_id,
            role,
            granted_at: Utc::now(),
        };
        self.0
            .platform_roles
            .lock()
            .unwrap()
            .insert(subject_id, grant.clone());
        Ok(grant)
    }

    async fn remove(&self, subject_id: Uuid) -> AppResult<bool> {
        Ok(self
            .0
            .platform_roles
            .lock()
            .unwrap()
            .remove(&subject_id)
            .is_some())
    }
}

/// Test state implementing the DI traits over the in-memory store
#[derive(Clone)]
pub struct TestState {
    config: Arc<Config>,
    context_service: Arc<ContextService<InMemoryMembershipRepo, InMemoryOrganizationRepo>>,
    platform_role_service: Arc<PlatformRoleService<InMemoryPlatformRoleRepo>>,
    jwt_manager: JwtManager,
}

impl HasPortalContext for TestState {
    type MembershipRepo = InMemoryMembershipRepo;
    type OrganizationRepo = InMemoryOrganizationRepo;

    fn config(&self) -> &Config {
        &self.config
    }

    fn context_service(&self) -> &ContextService<Self::MembershipRepo, Self::OrganizationRepo> {
        &self.context_service
    }

    fn jwt_manager(&self) -> &JwtManager {
        &self.jwt_manager
    }

    async fn check_ready(&self) -> (bool, bool) {
        (true, true)
    }
}

impl HasPlatformRoles for TestState {
    type PlatformRoleRepo = InMemoryPlatformRoleRepo;

    fn platform_role_service(&self) -> &PlatformRoleService<Self::PlatformRoleRepo> {
        &self.platform_role_service
    }
}

fn test_config() -> Config {
    Config {
        http_host: "127.0.0.1".to_string(),
        http_port: 0,
        database: DatabaseConfig {
            url: "mysql://unused".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        redis: RedisConfig {
            url: "redis://unused".to_string(),
        },
        jwt: JwtConfig {
            secret: "integration-test-jwt-secret".to_string(),
            issuer: "https://id.medbridge.test".to_string(),
            session_ttl_secs: 3600,
            private_key_pem: None,
            public_key_pem: None,
        },
        context: ContextConfig {
            signing_secret: "integration-test-signing-secret".to_string(),
            cache_ttl_secs: 300,
            upstream_timeout_ms: 1000,
            retry_backoff_ms: 0,
            empty_retry_attempts: 0,
            empty_retry_backoff_ms: 0,
        },
        internal: InternalApiConfig {
            shared_secret: TEST_INTERNAL_SECRET.to_string(),
        },
    }
}

/// The whole application against an in-memory Membership Store
pub struct TestApp {
    pub router: Router,
    pub store: InMemoryStore,
    pub jwt_manager: JwtManager,
    pub codec: ContextTokenCodec,
}

impl TestApp {
    pub fn spawn() -> Self {
        Self::with_cache_ttl(300)
    }

    pub fn with_cache_ttl(cache_ttl_secs: i64) -> Self {
        let mut config = test_config();
        config.context.cache_ttl_secs = cache_ttl_secs;

        let store = InMemoryStore::default();
        let jwt_manager = JwtManager::new(config.jwt.clone());
        let codec = ContextTokenCodec::new(&config.context.signing_secret, cache_ttl_secs);

        let context_service = Arc::new(ContextService::new(
            Arc::new(InMemoryMembershipRepo(store.clone())),
            Arc::new(InMemoryOrganizationRepo(store.clone())),
            codec.clone(),
            None,
            UpstreamPolicy {
                timeout: Duration::from_secs(1),
                retry_backoff: Duration::ZERO,
                empty_retry_attempts: 0,
                empty_retry_backoff: Duration::ZERO,
            },
        ));
        let platform_role_service = Arc::new(PlatformRoleService::new(Arc::new(
            InMemoryPlatformRoleRepo(store.clone()),
        )));

        let state = TestState {
            config: Arc::new(config),
            context_service,
            platform_role_service,
            jwt_manager: jwt_manager.clone(),
        };

        TestApp {
            router: build_router(state),
            store,
            jwt_manager,
            codec,
        }
    }

    pub fn session_token(&self, subject_id: Uuid, platform_role: Option<PlatformRole>) -> String {
        self.jwt_manager
            .create_session_token(subject_id, platform_role)
            .unwrap()
    }

    pub async fn request(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, bearer: &str, cookie: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder()
            .method("GET")
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", bearer));
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, format!("mb_ctx={}", cookie));
        }
        self.request(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post_json(
        &self,
        uri: &str,
        bearer: &str,
        cookie: Option<&str>,
        body: serde_json::Value,
    ) -> Response<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", bearer))
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, format!("mb_ctx={}", cookie));
        }
        self.request(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    pub async fn post_internal(&self, uri: &str, secret: &str, body: serde_json::Value) -> Response<Body> {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("x-internal-secret", secret)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.request(request).await
    }
}

/// Read the mb_ctx token out of a Set-Cookie header, if present
pub fn context_cookie(response: &Response<Body>) -> Option<String> {
    let value = response.headers().get(header::SET_COOKIE)?.to_str().ok()?;
    let token = value.strip_prefix("mb_ctx=")?;
    Some(token.split(';').next()?.to_string())
}

pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn assert_status(response: &Response<Body>, expected: StatusCode) {
    assert_eq!(response.status(), expected);
}

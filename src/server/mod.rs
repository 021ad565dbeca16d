//! Server initialization and routing

use crate::api;
use crate::cache::{ContextTokenCodec, InvalidationStore};
use crate::config::Config;
use crate::jwt::JwtManager;
use crate::middleware::{require_internal_secret, routing_gate, InternalAuthState};
use crate::repository::{
    membership::MembershipRepositoryImpl, organization::OrganizationRepositoryImpl,
    platform_role::PlatformRoleRepositoryImpl,
};
use crate::service::{ContextService, PlatformRoleService, UpstreamPolicy};
use crate::state::{HasPlatformRoles, HasPortalContext};
use anyhow::Result;
use axum::{
    routing::{delete, get, post},
    Router,
};
use sqlx::{mysql::MySqlPoolOptions, MySqlPool};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db_pool: MySqlPool,
    pub context_service:
        Arc<ContextService<MembershipRepositoryImpl, OrganizationRepositoryImpl>>,
    pub platform_role_service: Arc<PlatformRoleService<PlatformRoleRepositoryImpl>>,
    pub jwt_manager: JwtManager,
    pub invalidations: InvalidationStore,
}

impl HasPortalContext for AppState {
    type MembershipRepo = MembershipRepositoryImpl;
    type OrganizationRepo = OrganizationRepositoryImpl;

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
        let db_ok = sqlx::query("SELECT 1").execute(&self.db_pool).await.is_ok();
        let cache_ok = self.invalidations.ping().await.is_ok();
        (db_ok, cache_ok)
    }
}

impl HasPlatformRoles for AppState {
    type PlatformRoleRepo = PlatformRoleRepositoryImpl;

    fn platform_role_service(&self) -> &PlatformRoleService<Self::PlatformRoleRepo> {
        &self.platform_role_service
    }
}

/// Run the server
pub async fn run(config: Config) -> Result<()> {
    // Create database connection pool
    let db_pool = MySqlPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await?;

    info!("Connected to database");

    // Create invalidation store
    let invalidations = InvalidationStore::new(&config.redis).await?;
    info!("Connected to Redis");

    // Create repositories
    let membership_repo = Arc::new(MembershipRepositoryImpl::new(db_pool.clone()));
    let organization_repo = Arc::new(OrganizationRepositoryImpl::new(db_pool.clone()));
    let platform_role_repo = Arc::new(PlatformRoleRepositoryImpl::new(db_pool.clone()));

    // Create JWT manager and cache token codec
    let jwt_manager = JwtManager::new(config.jwt.clone());
    let codec = ContextTokenCodec::new(
        &config.context.signing_secret,
        config.context.cache_ttl_secs,
    );

    // Create services
    let context_service = Arc::new(ContextService::new(
        membership_repo,
        organization_repo,
        codec,
        Some(invalidations.clone()),
        UpstreamPolicy::from(&config.context),
    ));
    let platform_role_service = Arc::new(PlatformRoleService::new(platform_role_repo));

    // Create app state
    let state = AppState {
        config: Arc::new(config.clone()),
        db_pool,
        context_service,
        platform_role_service,
        jwt_manager,
        invalidations,
    };

    let app = build_router(state);

    let http_addr = config.http_addr();
    let listener = TcpListener::bind(&http_addr).await?;
    info!("HTTP server started on {}", http_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the HTTP router with generic state type
///
/// This function is generic over the state type, allowing it to work with
/// both production `AppState` and test implementations.
pub fn build_router<S>(state: S) -> Router
where
    S: HasPortalContext + HasPlatformRoles,
{
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let internal_auth = InternalAuthState::new(state.config().internal.shared_secret.clone());

    // Privileged channel: shared secret, no session
    let internal_routes = Router::new()
        .route(
            "/internal/platform-role",
            post(api::admin::grant_platform_role::<S>),
        )
        .route(
            "/internal/platform-role/{subject_id}",
            delete(api::admin::revoke_platform_role::<S>),
        )
        .route(
            "/internal/context/invalidate",
            post(api::admin::invalidate_context::<S>),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            internal_auth,
            require_internal_secret,
        ));

    // Portal-scoped routes sit behind the Routing Gate; the real dashboards
    // live in the business services, which consume the forwarded context
    let portal_routes = Router::new()
        .route("/hospital/dashboard", get(api::context::portal_entry))
        .route("/provider/dashboard", get(api::context::portal_entry))
        .route("/admin/dashboard", get(api::context::portal_entry))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            routing_gate::<S>,
        ));

    Router::new()
        // Health endpoints
        .route("/health", get(api::health::health))
        .route("/health/ready", get(api::health::ready::<S>))
        // Context endpoints
        .route("/api/v1/context", get(api::context::current::<S>))
        .route("/api/v1/context/init", post(api::context::init::<S>))
        .route("/api/v1/context/switch", post(api::context::switch::<S>))
        .merge(internal_routes)
        .merge(portal_routes)
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

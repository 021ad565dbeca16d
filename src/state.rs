//! Application state traits for dependency injection
//!
//! Handlers and middleware are generic over these traits so the same code
//! drives both the production `AppState` and in-memory test states.

use crate::config::Config;
use crate::jwt::JwtManager;
use crate::repository::{MembershipRepository, OrganizationRepository, PlatformRoleRepository};
use crate::service::{ContextService, PlatformRoleService};

/// State providing the portal context machinery
pub trait HasPortalContext: Clone + Send + Sync + 'static {
    /// The membership repository type
    type MembershipRepo: MembershipRepository;
    /// The organization repository type
    type OrganizationRepo: OrganizationRepository;

    /// Get the application configuration
    fn config(&self) -> &Config;

    /// Get the context service
    fn context_service(&self) -> &ContextService<Self::MembershipRepo, Self::OrganizationRepo>;

    /// Get the JWT manager for session verification
    fn jwt_manager(&self) -> &JwtManager;

    /// Check if the system is ready (database and cache are healthy).
    /// Returns (db_ok, cache_ok) tuple
    fn check_ready(&self) -> impl std::future::Future<Output = (bool, bool)> + Send;
}

/// State providing privileged platform-role administration
pub trait HasPlatformRoles: Clone + Send + Sync + 'static {
    /// The platform-role repository type
    type PlatformRoleRepo: PlatformRoleRepository;

    /// Get the platform-role service
    fn platform_role_service(&self) -> &PlatformRoleService<Self::PlatformRoleRepo>;
}

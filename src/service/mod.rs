//! Business logic services

pub mod context;
pub mod platform_role;

pub use context::{ContextService, InitializedContext, UpstreamPolicy};
pub use platform_role::PlatformRoleService;

//! Data access layer for the Membership Store (Repository pattern)

pub mod membership;
pub mod organization;
pub mod platform_role;

pub use membership::MembershipRepository;
pub use organization::OrganizationRepository;
pub use platform_role::PlatformRoleRepository;

//! Resolved portal context and the derived cache entry

use super::organization::OrgType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The top-level application surface a subject is routed into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortalKind {
    Hospital,
    Provider,
    Admin,
    None,
}

impl PortalKind {
    /// Leading path segment of this portal's routes, if it has one
    pub fn path_segment(&self) -> Option<&'static str> {
        match self {
            PortalKind::Hospital => Some("hospital"),
            PortalKind::Provider => Some("provider"),
            PortalKind::Admin => Some("admin"),
            PortalKind::None => None,
        }
    }
}

impl From<OrgType> for PortalKind {
    fn from(org_type: OrgType) -> Self {
        match org_type {
            OrgType::Hospital => PortalKind::Hospital,
            OrgType::Provider => PortalKind::Provider,
        }
    }
}

impl std::fmt::Display for PortalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortalKind::Hospital => write!(f, "hospital"),
            PortalKind::Provider => write!(f, "provider"),
            PortalKind::Admin => write!(f, "admin"),
            PortalKind::None => write!(f, "none"),
        }
    }
}

/// Output of the Context Resolver: where the subject belongs right now.
/// Blocked and onboarding states are ordinary variants of this value,
/// never errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedContext {
    pub portal: PortalKind,
    pub organization_id: Option<Uuid>,
    pub redirect_path: String,
}

/// Short-TTL record of the last resolution. Derived, never authoritative:
/// it must always be re-derivable from Session + Membership + Organization,
/// and business reads re-validate the organization against live state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextCacheEntry {
    pub subject_id: Uuid,
    pub organization_id: Option<Uuid>,
    pub portal: PortalKind,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ContextCacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

//! Routing Gate
//!
//! Per-request state machine deciding whether to trust the presented cache
//! token, re-resolve, or call Initialization. The classification here is
//! purely local (signature, TTL, subject, invalidation epoch, role claims);
//! the live membership re-check and the re-initialization itself live in the
//! middleware layer driving this machine.

use crate::cache::ContextTokenCodec;
use crate::domain::{ContextCacheEntry, PortalKind, Session};
use crate::error::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Why a structurally valid entry can no longer be trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleReason {
    /// TTL elapsed
    Expired,
    /// Issued before the subject's invalidation epoch
    Invalidated,
    /// Session claims and cached portal disagree about platform-admin
    RoleChanged,
    /// Live check found no membership for the cached organization
    MembershipRevoked,
    /// Live check found the cached organization suspended
    OrganizationSuspended,
}

/// Gate state for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateState {
    NoCache,
    CacheValid(ContextCacheEntry),
    CacheStale(StaleReason),
}

/// Context handed to downstream business handlers once the gate has run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortalContext {
    /// Resolution succeeded; business queries scope to this organization
    Resolved {
        portal: PortalKind,
        organization_id: Option<Uuid>,
    },
    /// Upstream was unreachable after retry; no negative result was cached.
    /// The business layer shows a recoverable error instead of trapping the
    /// user outside the product.
    Degraded,
}

/// Classify the presented token without touching any upstream.
///
/// A missing token is `NoCache`; an expired or superseded one is
/// `CacheStale`; a tampered, malformed, or foreign-subject token is a hard
/// error (those never happen to well-behaved clients).
pub fn classify(
    token: Option<&str>,
    codec: &ContextTokenCodec,
    session: &Session,
    invalidated_after: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<GateState> {
    let token = match token {
        Some(t) => t,
        None => return Ok(GateState::NoCache),
    };

    let entry = codec.decode(token, session.subject_id)?;

    if entry.is_expired(now) {
        return Ok(GateState::CacheStale(StaleReason::Expired));
    }

    if let Some(epoch) = invalidated_after {
        if entry.issued_at <= epoch {
            return Ok(GateState::CacheStale(StaleReason::Invalidated));
        }
    }

    // portal == admin iff the session claims say so; a re-issued session
    // with different claims invalidates entries minted under the old ones
    if (entry.portal == PortalKind::Admin) != session.is_platform_admin() {
        return Ok(GateState::CacheStale(StaleReason::RoleChanged));
    }

    Ok(GateState::CacheValid(entry))
}

/// Portal implied by a request path's leading segment, if any
pub fn portal_segment(path: &str) -> Option<PortalKind> {
    let first = path.trim_start_matches('/').split('/').next()?;
    match first {
        "hospital" => Some(PortalKind::Hospital),
        "provider" => Some(PortalKind::Provider),
        "admin" => Some(PortalKind::Admin),
        _ => None,
    }
}

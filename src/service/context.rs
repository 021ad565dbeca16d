//! Context resolution business logic
//!
//! Drives the pure Resolver against the Membership Store, mints signed cache
//! entries, and applies the cross-cutting upstream failure policy: every
//! store read runs under a short timeout and is retried once with backoff
//! before the caller sees `UpstreamUnavailable`.

use crate::cache::{ContextTokenCodec, InvalidationStore};
use crate::config::ContextConfig;
use crate::domain::{
    ContextCacheEntry, Membership, Organization, PortalKind, ResolvedContext, Session,
};
use crate::error::{AppError, Result};
use crate::gate::StaleReason;
use crate::repository::{MembershipRepository, OrganizationRepository};
use crate::resolver;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use uuid::Uuid;

/// Timeout/retry tunables for Membership Store reads
#[derive(Debug, Clone)]
pub struct UpstreamPolicy {
    pub timeout: Duration,
    pub retry_backoff: Duration,
    pub empty_retry_attempts: u32,
    pub empty_retry_backoff: Duration,
}

impl From<&ContextConfig> for UpstreamPolicy {
    fn from(config: &ContextConfig) -> Self {
        Self {
            timeout: config.upstream_timeout(),
            retry_backoff: config.retry_backoff(),
            empty_retry_attempts: config.empty_retry_attempts,
            empty_retry_backoff: config.empty_retry_backoff(),
        }
    }
}

/// A fresh resolution together with its signed cache entry
#[derive(Debug, Clone)]
pub struct InitializedContext {
    pub resolved: ResolvedContext,
    pub entry: ContextCacheEntry,
    pub token: String,
}

pub struct ContextService<M: MembershipRepository, O: OrganizationRepository> {
    membership_repo: Arc<M>,
    organization_repo: Arc<O>,
    codec: ContextTokenCodec,
    invalidations: Option<InvalidationStore>,
    policy: UpstreamPolicy,
}

impl<M: MembershipRepository, O: OrganizationRepository> ContextService<M, O> {
    pub fn new(
        membership_repo: Arc<M>,
        organization_repo: Arc<O>,
        codec: ContextTokenCodec,
        invalidations: Option<InvalidationStore>,
        policy: UpstreamPolicy,
    ) -> Self {
        Self {
            membership_repo,
            organization_repo,
            codec,
            invalidations,
            policy,
        }
    }

    pub fn codec(&self) -> &ContextTokenCodec {
        &self.codec
    }

    /// Load the subject's memberships and their organizations
    pub async fn load_subject_state(
        &self,
        subject_id: Uuid,
    ) -> Result<(Vec<Membership>, Vec<Organization>)> {
        let memberships = self
            .guarded("membership lookup", || {
                self.membership_repo.list_by_subject(subject_id)
            })
            .await?;

        let org_ids: Vec<Uuid> = memberships.iter().map(|m| m.organization_id).collect();
        let organizations = self
            .guarded("organization lookup", || {
                self.organization_repo.find_by_ids(&org_ids)
            })
            .await?;

        Ok((memberships, organizations))
    }

    /// Initialize (or re-initialize) the subject's portal context.
    ///
    /// Idempotent: repeated calls against unchanged underlying data produce
    /// the same resolution; only the entry timestamps move.
    pub async fn initialize(&self, session: &Session) -> Result<InitializedContext> {
        let (mut memberships, mut organizations) =
            self.load_subject_state(session.subject_id).await?;

        // A subject who signed up moments ago may outrun membership-store
        // propagation; an empty read here is re-checked before it becomes an
        // onboarding redirect.
        if memberships.is_empty() && !session.is_platform_admin() {
            let mut backoff = self.policy.empty_retry_backoff;
            for attempt in 1..=self.policy.empty_retry_attempts {
                sleep(backoff).await;
                backoff *= 2;

                let (m, o) = self.load_subject_state(session.subject_id).await?;
                if !m.is_empty() {
                    memberships = m;
                    organizations = o;
                    break;
                }
                tracing::debug!(
                    subject = %session.subject_id,
                    attempt,
                    "membership store still empty for subject"
                );
            }
        }

        let resolved = resolver::resolve(session, &memberships, &organizations);
        let (entry, token) = self.codec.mint(
            session.subject_id,
            resolved.organization_id,
            resolved.portal,
            Utc::now(),
        );

        tracing::info!(
            subject = %session.subject_id,
            portal = %resolved.portal,
            organization = ?resolved.organization_id,
            "portal context initialized"
        );

        Ok(InitializedContext {
            resolved,
            entry,
            token,
        })
    }

    /// Switch the active organization to an explicit choice.
    ///
    /// No Resolver re-run: the user's pick takes precedence. Fails without
    /// minting anything when the subject is not a member or the target is
    /// suspended, leaving the presented cache token untouched.
    pub async fn switch(
        &self,
        session: &Session,
        organization_id: Uuid,
    ) -> Result<InitializedContext> {
        let membership = self
            .guarded("membership lookup", || {
                self.membership_repo.find(session.subject_id, organization_id)
            })
            .await?
            .ok_or(AppError::NotAMember(organization_id))?;

        let organization = self
            .guarded("organization lookup", || {
                self.organization_repo.find_by_id(organization_id)
            })
            .await?
            .ok_or(AppError::NotAMember(organization_id))?;

        if !organization.is_active() {
            return Err(AppError::OrganizationSuspended(organization_id));
        }

        let portal = PortalKind::from(organization.org_type);
        let (entry, token) = self.codec.mint(
            session.subject_id,
            Some(membership.organization_id),
            portal,
            Utc::now(),
        );

        tracing::info!(
            subject = %session.subject_id,
            organization = %organization_id,
            portal = %portal,
            "active organization switched"
        );

        Ok(InitializedContext {
            resolved: ResolvedContext {
                portal,
                organization_id: Some(organization_id),
                redirect_path: resolver::dashboard_path(portal),
            },
            entry,
            token,
        })
    }

    /// Decode the presented token for UI display. Expired or absent tokens
    /// read as "not yet resolved"; tampered ones are hard errors.
    pub fn current(
        &self,
        session: &Session,
        token: Option<&str>,
    ) -> Result<Option<ContextCacheEntry>> {
        let Some(token) = token else {
            return Ok(None);
        };

        let entry = self.codec.decode(token, session.subject_id)?;
        if entry.is_expired(Utc::now()) {
            return Ok(None);
        }

        Ok(Some(entry))
    }

    /// Re-check a structurally valid entry against live membership state.
    ///
    /// The cache is a routing optimization, not an authorization boundary:
    /// a revoked membership or suspended organization makes the entry stale
    /// no matter how much TTL remains.
    pub async fn revalidate(&self, entry: &ContextCacheEntry) -> Result<Option<StaleReason>> {
        let Some(organization_id) = entry.organization_id else {
            return Ok(None);
        };

        let membership = self
            .guarded("membership lookup", || {
                self.membership_repo.find(entry.subject_id, organization_id)
            })
            .await?;
        if membership.is_none() {
            return Ok(Some(StaleReason::MembershipRevoked));
        }

        let organization = self
            .guarded("organization lookup", || {
                self.organization_repo.find_by_id(organization_id)
            })
            .await?;

        match organization {
            Some(org) if org.is_active() => Ok(None),
            _ => Ok(Some(StaleReason::OrganizationSuspended)),
        }
    }

    /// The subject's invalidation epoch. A Redis failure degrades to "no
    /// epoch" with a warning rather than failing the request pipeline.
    pub async fn invalidation_epoch(&self, subject_id: Uuid) -> Option<DateTime<Utc>> {
        let store = self.invalidations.as_ref()?;
        match store.invalidated_after(subject_id).await {
            Ok(epoch) => epoch,
            Err(err) => {
                tracing::warn!(
                    subject = %subject_id,
                    error = %err,
                    "invalidation epoch unavailable; proceeding without it"
                );
                None
            }
        }
    }

    /// Record that every entry minted so far for this subject is stale
    pub async fn mark_stale(&self, subject_id: Uuid) -> Result<()> {
        match &self.invalidations {
            Some(store) => store.mark_stale(subject_id, Utc::now()).await,
            None => Ok(()),
        }
    }

    /// Run one store read under the failure policy: short timeout, one
    /// retried attempt with backoff, then `UpstreamUnavailable`.
    async fn guarded<T, F, Fut>(&self, what: &str, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match timeout(self.policy.timeout, op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "{} failed, retrying once", what);
            }
            Err(_) => {
                tracing::warn!("{} timed out, retrying once", what);
            }
        }

        sleep(self.policy.retry_backoff).await;

        match timeout(self.policy.timeout, op()).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(AppError::UpstreamUnavailable(format!("{}: {}", what, err))),
            Err(_) => Err(AppError::UpstreamUnavailable(format!("{} timed out", what))),
        }
    }
}

//! Context Resolver
//!
//! Pure decision function mapping a verified session plus the subject's
//! memberships and organizations to a portal and an active organization.
//! Deterministic on identical input, so concurrent callers converge on the
//! same answer without coordination.

use crate::domain::{Membership, Organization, PortalKind, ResolvedContext, Session};
use std::collections::HashMap;
use uuid::Uuid;

/// Redirect target for platform admins
pub const ADMIN_DASHBOARD_PATH: &str = "/admin/dashboard";
/// Redirect target for subjects with no memberships (onboarding)
pub const ONBOARDING_PATH: &str = "/org/create";
/// Redirect target when every membership's organization is suspended
pub const SUSPENDED_PATH: &str = "/org/suspended";

/// Dashboard path for an organization-backed portal
pub fn dashboard_path(portal: PortalKind) -> String {
    format!("/{}/dashboard", portal)
}

/// Resolve the portal context for a session.
///
/// Priority order, first match wins:
/// 1. platform admin claim — admin portal, no organization
/// 2. no memberships — onboarding
/// 3. primary membership among active organizations — that organization's portal
/// 4. memberships exist but none active — blocked
pub fn resolve(
    session: &Session,
    memberships: &[Membership],
    organizations: &[Organization],
) -> ResolvedContext {
    if session.is_platform_admin() {
        return ResolvedContext {
            portal: PortalKind::Admin,
            organization_id: None,
            redirect_path: ADMIN_DASHBOARD_PATH.to_string(),
        };
    }

    if memberships.is_empty() {
        return ResolvedContext {
            portal: PortalKind::None,
            organization_id: None,
            redirect_path: ONBOARDING_PATH.to_string(),
        };
    }

    let by_id: HashMap<Uuid, &Organization> =
        organizations.iter().map(|org| (org.id, org)).collect();

    match primary_membership(memberships, &by_id) {
        Some((membership, organization)) => {
            let portal = PortalKind::from(organization.org_type);
            ResolvedContext {
                portal,
                organization_id: Some(membership.organization_id),
                redirect_path: dashboard_path(portal),
            }
        }
        None => ResolvedContext {
            portal: PortalKind::None,
            organization_id: None,
            redirect_path: SUSPENDED_PATH.to_string(),
        },
    }
}

/// Pick the primary membership: the one whose organization is active, with
/// the earliest membership creation time, ties broken by ascending
/// organization id. Memberships whose organization is missing from the
/// loaded slice count as not active.
fn primary_membership<'a>(
    memberships: &'a [Membership],
    organizations: &HashMap<Uuid, &'a Organization>,
) -> Option<(&'a Membership, &'a Organization)> {
    memberships
        .iter()
        .filter_map(|m| {
            organizations
                .get(&m.organization_id)
                .filter(|org| org.is_active())
                .map(|org| (m, *org))
        })
        .min_by_key(|(m, _)| (m.created_at, m.organization_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MembershipRole, OrgStatus, OrgType, PlatformRole};
    use chrono::{DateTime, Duration, Utc};
    use pretty_assertions::assert_eq;

    fn session(platform_role: Option<PlatformRole>) -> Session {
        let now = Utc::now();
        Session {
            subject_id: Uuid::new_v4(),
            issued_at: now,
            expires_at: now + Duration::hours(1),
            platform_role,
        }
    }

    fn org(id: Uuid, org_type: OrgType, status: OrgStatus) -> Organization {
        let now = Utc::now();
        Organization {
            id,
            name: "Org".to_string(),
            slug: "org".to_string(),
            org_type,
            status,
            created_at: now,
            updated_at: now,
        }
    }

    fn membership(subject: &Session, organization_id: Uuid, created_at: DateTime<Utc>) -> Membership {
        Membership {
            organization_id,
            subject_id: subject.subject_id,
            role: MembershipRole::Member,
            created_at,
        }
    }

    #[test]
    fn test_platform_admin_wins_regardless_of_memberships() {
        let session = session(Some(PlatformRole::PlatformAdmin));
        let org_id = Uuid::new_v4();
        let memberships = vec![membership(&session, org_id, Utc::now())];
        let organizations = vec![org(org_id, OrgType::Hospital, OrgStatus::Active)];

        let resolved = resolve(&session, &memberships, &organizations);

        assert_eq!(resolved.portal, PortalKind::Admin);
        assert_eq!(resolved.organization_id, None);
        assert_eq!(resolved.redirect_path, ADMIN_DASHBOARD_PATH);
    }

    #[test]
    fn test_platform_admin_with_empty_memberships() {
        let session = session(Some(PlatformRole::PlatformAdmin));

        let resolved = resolve(&session, &[], &[]);

        assert_eq!(resolved.portal, PortalKind::Admin);
        assert_eq!(resolved.organization_id, None);
    }

    #[test]
    fn test_no_memberships_routes_to_onboarding() {
        let session = session(None);

        let resolved = resolve(&session, &[], &[]);

        assert_eq!(resolved.portal, PortalKind::None);
        assert_eq!(resolved.organization_id, None);
        assert_eq!(resolved.redirect_path, ONBOARDING_PATH);
    }

    #[test]
    fn test_single_active_membership_routes_to_its_portal() {
        let session = session(None);
        let org_id = Uuid::new_v4();
        let memberships = vec![membership(&session, org_id, Utc::now())];
        let organizations = vec![org(org_id, OrgType::Provider, OrgStatus::Active)];

        let resolved = resolve(&session, &memberships, &organizations);

        assert_eq!(resolved.portal, PortalKind::Provider);
        assert_eq!(resolved.organization_id, Some(org_id));
        assert_eq!(resolved.redirect_path, "/provider/dashboard");
    }

    #[test]
    fn test_earliest_membership_wins() {
        // Scenario A: hospital membership from January, provider from February
        let session = session(None);
        let hospital_id = Uuid::new_v4();
        let provider_id = Uuid::new_v4();
        let january = "2024-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let february = "2024-02-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();

        let memberships = vec![
            membership(&session, provider_id, february),
            membership(&session, hospital_id, january),
        ];
        let organizations = vec![
            org(provider_id, OrgType::Provider, OrgStatus::Active),
            org(hospital_id, OrgType::Hospital, OrgStatus::Active),
        ];

        let resolved = resolve(&session, &memberships, &organizations);

        assert_eq!(resolved.portal, PortalKind::Hospital);
        assert_eq!(resolved.organization_id, Some(hospital_id));
        assert_eq!(resolved.redirect_path, "/hospital/dashboard");
    }

    #[test]
    fn test_suspended_primary_falls_through_to_next_active() {
        let session = session(None);
        let suspended_id = Uuid::new_v4();
        let active_id = Uuid::new_v4();
        let earlier = Utc::now() - Duration::days(30);
        let later = Utc::now() - Duration::days(1);

        let memberships = vec![
            membership(&session, suspended_id, earlier),
            membership(&session, active_id, later),
        ];
        let organizations = vec![
            org(suspended_id, OrgType::Hospital, OrgStatus::Suspended),
            org(active_id, OrgType::Provider, OrgStatus::Active),
        ];

        let resolved = resolve(&session, &memberships, &organizations);

        assert_eq!(resolved.portal, PortalKind::Provider);
        assert_eq!(resolved.organization_id, Some(active_id));
    }

    #[test]
    fn test_all_suspended_is_blocked_not_dashboard() {
        let session = session(None);
        let org_id = Uuid::new_v4();
        let memberships = vec![membership(&session, org_id, Utc::now())];
        let organizations = vec![org(org_id, OrgType::Hospital, OrgStatus::Suspended)];

        let resolved = resolve(&session, &memberships, &organizations);

        assert_eq!(resolved.portal, PortalKind::None);
        assert_eq!(resolved.organization_id, None);
        assert_eq!(resolved.redirect_path, SUSPENDED_PATH);
    }

    #[test]
    fn test_membership_with_missing_organization_is_skipped() {
        let session = session(None);
        let missing_id = Uuid::new_v4();
        let present_id = Uuid::new_v4();
        let earlier = Utc::now() - Duration::days(10);

        let memberships = vec![
            membership(&session, missing_id, earlier),
            membership(&session, present_id, Utc::now()),
        ];
        let organizations = vec![org(present_id, OrgType::Hospital, OrgStatus::Active)];

        let resolved = resolve(&session, &memberships, &organizations);

        assert_eq!(resolved.organization_id, Some(present_id));
    }

    #[test]
    fn test_created_at_tie_broken_by_organization_id() {
        let session = session(None);
        let id_a = Uuid::parse_str("00000000-0000-0000-0000-00000000000a").unwrap();
        let id_b = Uuid::parse_str("00000000-0000-0000-0000-00000000000b").unwrap();
        let same_time = "2024-03-15T12:00:00Z".parse::<DateTime<Utc>>().unwrap();

        // Supply in descending id order to prove input order is irrelevant
        let memberships = vec![
            membership(&session, id_b, same_time),
            membership(&session, id_a, same_time),
        ];
        let organizations = vec![
            org(id_b, OrgType::Provider, OrgStatus::Active),
            org(id_a, OrgType::Hospital, OrgStatus::Active),
        ];

        let resolved = resolve(&session, &memberships, &organizations);

        assert_eq!(resolved.organization_id, Some(id_a));
        assert_eq!(resolved.portal, PortalKind::Hospital);
    }

    #[test]
    fn test_resolution_is_stable_across_repeated_calls() {
        let session = session(None);
        let hospital_id = Uuid::new_v4();
        let provider_id = Uuid::new_v4();

        let memberships = vec![
            membership(&session, hospital_id, Utc::now() - Duration::days(5)),
            membership(&session, provider_id, Utc::now() - Duration::days(3)),
        ];
        let organizations = vec![
            org(hospital_id, OrgType::Hospital, OrgStatus::Active),
            org(provider_id, OrgType::Provider, OrgStatus::Active),
        ];

        let first = resolve(&session, &memberships, &organizations);
        for _ in 0..10 {
            assert_eq!(resolve(&session, &memberships, &organizations), first);
        }
    }

    #[test]
    fn test_resolution_ignores_input_ordering() {
        // Scenario D relies on order-independent convergence
        let session = session(None);
        let hospital_id = Uuid::new_v4();
        let provider_id = Uuid::new_v4();

        let m1 = membership(&session, hospital_id, Utc::now() - Duration::days(5));
        let m2 = membership(&session, provider_id, Utc::now() - Duration::days(3));
        let o1 = org(hospital_id, OrgType::Hospital, OrgStatus::Active);
        let o2 = org(provider_id, OrgType::Provider, OrgStatus::Active);

        let forward = resolve(&session, &[m1.clone(), m2.clone()], &[o1.clone(), o2.clone()]);
        let reversed = resolve(&session, &[m2, m1], &[o2, o1]);

        assert_eq!(forward, reversed);
    }

    #[test]
    fn test_dashboard_path_format() {
        assert_eq!(dashboard_path(PortalKind::Hospital), "/hospital/dashboard");
        assert_eq!(dashboard_path(PortalKind::Provider), "/provider/dashboard");
        assert_eq!(dashboard_path(PortalKind::Admin), "/admin/dashboard");
    }
}

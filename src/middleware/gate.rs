//! Routing Gate middleware
//!
//! Applied to portal-scoped routes. Classifies the presented cache token,
//! re-validates or re-initializes as needed, then forwards the request
//! carrying the resolved organization id, redirects to the correct portal,
//! or degrades gracefully when the Membership Store is unreachable.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{
        header::{HeaderValue, COOKIE, LOCATION, SET_COOKIE},
        HeaderMap, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;

use crate::domain::{PortalKind, ResolvedContext, Session};
use crate::error::AppError;
use crate::gate::{self, GateState, PortalContext};
use crate::middleware::auth::AuthSession;
use crate::state::HasPortalContext;

/// Site-wide cookie carrying the signed context cache token
pub const CONTEXT_COOKIE: &str = "mb_ctx";

/// Header fallback for non-browser clients
pub const CONTEXT_TOKEN_HEADER: &str = "x-context-token";

/// Header carrying the resolved organization id to downstream services
pub const ORG_ID_HEADER: &str = "x-org-id";

/// Per-request Routing Gate
pub async fn routing_gate<S: HasPortalContext>(
    State(state): State<S>,
    AuthSession(session): AuthSession,
    request: Request,
    next: Next,
) -> Response {
    let service = state.context_service();
    let token = context_token_from_headers(request.headers());
    let epoch = service.invalidation_epoch(session.subject_id).await;

    let classified = match gate::classify(
        token.as_deref(),
        service.codec(),
        &session,
        epoch,
        Utc::now(),
    ) {
        Ok(classified) => classified,
        Err(err) => return err.into_response(),
    };

    // A structurally valid entry still gets its organization re-checked
    // against live state; the cache is never an authorization boundary.
    let classified = match classified {
        GateState::CacheValid(entry) => match service.revalidate(&entry).await {
            Ok(None) => GateState::CacheValid(entry),
            Ok(Some(reason)) => GateState::CacheStale(reason),
            Err(AppError::UpstreamUnavailable(_)) => {
                return degraded_forward(request, next).await;
            }
            Err(err) => return err.into_response(),
        },
        other => other,
    };

    let ttl_secs = service.codec().ttl().num_seconds();

    // NO_CACHE / CACHE_STALE run Initialization; CACHE_VALID trusts the entry
    let (resolved, fresh_token) = match classified {
        GateState::CacheValid(entry) => {
            let redirect_path = match entry.portal.path_segment() {
                Some(_) => crate::resolver::dashboard_path(entry.portal),
                None => crate::resolver::ONBOARDING_PATH.to_string(),
            };
            let resolved = ResolvedContext {
                portal: entry.portal,
                organization_id: entry.organization_id,
                redirect_path,
            };
            (resolved, None)
        }
        GateState::NoCache | GateState::CacheStale(_) => {
            match service.initialize(&session).await {
                Ok(init) => (init.resolved, Some(init.token)),
                Err(AppError::UpstreamUnavailable(_)) => {
                    // Never cache a negative result; let the business layer
                    // show a recoverable error instead
                    return degraded_forward(request, next).await;
                }
                Err(err) => return err.into_response(),
            }
        }
    };

    // A user can navigate to a portal path they don't belong to; confirm
    // with a cheap local re-resolution before redirecting them away.
    if let Some(requested) = gate::portal_segment(request.uri().path()) {
        if requested != resolved.portal {
            let confirmed = if fresh_token.is_some() {
                // Just initialized: the resolution is already current
                resolved
            } else {
                match reresolve_local(&state, &session).await {
                    Ok(confirmed) => confirmed,
                    Err(AppError::UpstreamUnavailable(_)) => {
                        return degraded_forward(request, next).await;
                    }
                    Err(err) => return err.into_response(),
                }
            };

            if requested != confirmed.portal {
                return redirect_response(
                    &confirmed.redirect_path,
                    fresh_token.as_deref(),
                    ttl_secs,
                );
            }

            // Underlying data moved since the entry was minted; forward with
            // the re-resolved context without rewriting the cache
            return forward(request, next, confirmed, fresh_token, ttl_secs).await;
        }
    }

    forward(request, next, resolved, fresh_token, ttl_secs).await
}

/// Re-run the Resolver on freshly loaded state without touching the cache
async fn reresolve_local<S: HasPortalContext>(
    state: &S,
    session: &Session,
) -> crate::error::Result<ResolvedContext> {
    let (memberships, organizations) = state
        .context_service()
        .load_subject_state(session.subject_id)
        .await?;
    Ok(crate::resolver::resolve(session, &memberships, &organizations))
}

async fn forward(
    mut request: Request,
    next: Next,
    resolved: ResolvedContext,
    fresh_token: Option<String>,
    ttl_secs: i64,
) -> Response {
    if let Some(organization_id) = resolved.organization_id {
        if let Ok(value) = HeaderValue::from_str(&organization_id.to_string()) {
            request.headers_mut().insert(ORG_ID_HEADER, value);
        }
    }
    request.extensions_mut().insert(PortalContext::Resolved {
        portal: resolved.portal,
        organization_id: resolved.organization_id,
    });

    let mut response = next.run(request).await;
    if let Some(token) = fresh_token {
        write_context_cookie(response.headers_mut(), &token, ttl_secs);
    }
    response
}

async fn degraded_forward(mut request: Request, next: Next) -> Response {
    tracing::warn!("routing gate degraded: forwarding without resolved organization");
    request.extensions_mut().insert(PortalContext::Degraded);
    next.run(request).await
}

fn redirect_response(location: &str, fresh_token: Option<&str>, ttl_secs: i64) -> Response {
    let mut response = (
        StatusCode::SEE_OTHER,
        [(LOCATION, location.to_string())],
        Body::empty(),
    )
        .into_response();
    if let Some(token) = fresh_token {
        write_context_cookie(response.headers_mut(), token, ttl_secs);
    }
    response
}

/// Pull the cache token from the context cookie, falling back to the header
pub fn context_token_from_headers(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = cookie_value(headers, CONTEXT_COOKIE) {
        return Some(token);
    }

    headers
        .get(CONTEXT_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Build the Set-Cookie value for a freshly minted token
pub fn context_cookie_value(token: &str, ttl_secs: i64) -> String {
    format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
        CONTEXT_COOKIE, token, ttl_secs
    )
}

pub(crate) fn write_context_cookie(headers: &mut HeaderMap, token: &str, ttl_secs: i64) {
    if let Ok(value) = HeaderValue::from_str(&context_cookie_value(token, ttl_secs)) {
        headers.insert(SET_COOKIE, value);
    }
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookies = headers.get(COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

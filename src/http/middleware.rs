//! Request-gating middleware: authentication, permission guards, and
//! rate limiting, composable per route.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request};
use axum::http::header::COOKIE;
use axum::middleware::Next;
use axum::response::Response;
use tracing::warn;

use crate::auth::{AuthorizationGate, AuthorizationVerdict, Directory, RequestPrincipal, Requirement};
use crate::ratelimit::{
    AccessTier, BypassRules, Category, RateLimitKey, RateLimiter, RateLimitPolicy, RequestOutcome,
    WindowSnapshot,
};

use super::responder;

/// Shared state the gating middleware runs against. Cheap to clone;
/// every request task gets its own handle.
#[derive(Clone)]
pub struct GateState {
    pub gate: Arc<AuthorizationGate>,
    pub directory: Arc<dyn Directory>,
    pub limiter: Arc<RateLimiter>,
    pub policy: Arc<RateLimitPolicy>,
    pub bypass: Arc<BypassRules>,
    pub cookie_name: String,
    pub trusted_proxies: Arc<Vec<IpAddr>>,
}

/// Pull the session credential out of the request's cookie header.
fn credential(req: &Request, cookie_name: &str) -> Option<String> {
    for header in req.headers().get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            if let Some((name, token)) = pair.trim().split_once('=') {
                if name == cookie_name && !token.is_empty() {
                    return Some(token.to_string());
                }
            }
        }
    }
    None
}

/// Originating client IP. `X-Forwarded-For` is believed only when the
/// connected peer is a configured trusted proxy; any other peer is
/// attributed its own address, so a direct client cannot smuggle a
/// private or trusted address into the header.
fn client_ip(req: &Request, trusted_proxies: &[IpAddr]) -> IpAddr {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

    if !trusted_proxies.contains(&peer) {
        return peer;
    }

    if let Some(forwarded) = req.headers().get("x-forwarded-for") {
        if let Ok(value) = forwarded.to_str() {
            if let Some(first) = value.split(',').next() {
                if let Ok(ip) = first.trim().parse() {
                    return ip;
                }
            }
        }
    }

    peer
}

/// Authentication-only gate. Attaches the resolved principal to the
/// request context on success.
pub async fn authenticate(state: GateState, req: Request, next: Next) -> Response {
    run_gate(state, None, req, next).await
}

/// Full gate: authentication plus a permission check for a resource
/// domain and required mask.
pub async fn authorize(
    state: GateState,
    requirement: Requirement,
    req: Request,
    next: Next,
) -> Response {
    run_gate(state, Some(requirement), req, next).await
}

async fn run_gate(
    state: GateState,
    requirement: Option<Requirement>,
    mut req: Request,
    next: Next,
) -> Response {
    let raw = credential(&req, &state.cookie_name);

    match state.gate.authorize(raw.as_deref(), requirement.as_ref()).await {
        AuthorizationVerdict::Allow(principal) => {
            req.extensions_mut().insert(principal);
            next.run(req).await
        }
        AuthorizationVerdict::Deny(reason) => {
            warn!(
                reason = ?reason,
                path = %req.uri().path(),
                ip = %client_ip(&req, &state.trusted_proxies),
                "Request denied by authorization gate"
            );
            responder::auth_denied(reason)
        }
    }
}

/// IP-bucketed rate limit for anonymous categories (global, login,
/// signup). Runs before any identity work.
pub async fn limit_by_ip(
    state: GateState,
    category: Category,
    req: Request,
    next: Next,
) -> Response {
    let ip = client_ip(&req, &state.trusted_proxies);
    if state.bypass.is_exempt(req.method(), req.uri().path(), ip) {
        return next.run(req).await;
    }

    let key = RateLimitKey::for_ip(category, ip.to_string());
    run_limiter(state, category, key, None, req, next).await
}

/// Identity-bucketed rate limit for authenticated API traffic. Must be
/// composed after the gate so the principal is available.
pub async fn limit_api(state: GateState, req: Request, next: Next) -> Response {
    limit_authenticated(state, false, req, next).await
}

/// Tier-scaled rate limit: capacity depends on the authenticated
/// identity's access tier. Must be composed after the gate.
pub async fn limit_tiered(state: GateState, req: Request, next: Next) -> Response {
    limit_authenticated(state, true, req, next).await
}

async fn limit_authenticated(
    state: GateState,
    tiered: bool,
    req: Request,
    next: Next,
) -> Response {
    let ip = client_ip(&req, &state.trusted_proxies);
    if state.bypass.is_exempt(req.method(), req.uri().path(), ip) {
        return next.run(req).await;
    }

    let principal = req.extensions().get::<RequestPrincipal>().cloned();
    let (category, key, identity) = match principal {
        Some(principal) => {
            let category = if tiered {
                Category::Tiered(resolve_tier(&state, &principal).await)
            } else {
                Category::Api
            };
            (
                category,
                RateLimitKey::for_identity(category, principal.subject_id.clone()),
                Some(principal.subject_id),
            )
        }
        None => {
            // Composed before the gate, or on an unauthenticated route:
            // fall back to IP bucketing at the base API quota.
            warn!(
                path = %req.uri().path(),
                "No principal on request; rate limiting by IP"
            );
            (
                Category::Api,
                RateLimitKey::for_ip(Category::Api, ip.to_string()),
                None,
            )
        }
    };

    run_limiter(state, category, key, identity, req, next).await
}

/// Access tier for a principal. Uses the role name the gate already
/// loaded when it ran a permission check; otherwise resolves the role
/// from the directory. Any failure falls back to the base tier.
async fn resolve_tier(state: &GateState, principal: &RequestPrincipal) -> AccessTier {
    if let Some(name) = &principal.role_name {
        return AccessTier::from_role_name(name);
    }

    match state.directory.find_role(&principal.role_id).await {
        Ok(Some(role)) => AccessTier::from_role_name(&role.name),
        _ => AccessTier::User,
    }
}

async fn run_limiter(
    state: GateState,
    category: Category,
    key: RateLimitKey,
    identity: Option<String>,
    mut req: Request,
    next: Next,
) -> Response {
    let quota = state.policy.quota(category);
    let snapshot = state.limiter.check(&key, &quota);

    if !snapshot.allowed {
        warn!(
            ip = %client_ip(&req, &state.trusted_proxies),
            identity = identity.as_deref().unwrap_or("-"),
            category = category.as_str(),
            path = %req.uri().path(),
            retry_after_secs = snapshot.retry_after_secs,
            "Rate limit exceeded"
        );
        return responder::rate_limited(category, &snapshot);
    }

    // Remaining/reset metadata for optional success-path headers.
    req.extensions_mut().insert::<WindowSnapshot>(snapshot);

    let response = next.run(req).await;

    // The entry increment was provisional; reverse it if this quota
    // does not count the completed request's outcome.
    let outcome = RequestOutcome::from_status(response.status().as_u16());
    state
        .limiter
        .settle(&key, &quota, outcome, snapshot.window_started_at_ms);

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;

    fn request_with_headers(headers: &[(&str, &str)]) -> Request {
        let mut builder = HttpRequest::builder().uri("/todos");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_credential_from_cookie_header() {
        let req = request_with_headers(&[("cookie", "theme=dark; access_token=abc.def.ghi")]);
        assert_eq!(
            credential(&req, "access_token"),
            Some("abc.def.ghi".to_string())
        );
    }

    #[test]
    fn test_credential_absent() {
        let req = request_with_headers(&[("cookie", "theme=dark")]);
        assert_eq!(credential(&req, "access_token"), None);

        let req = request_with_headers(&[]);
        assert_eq!(credential(&req, "access_token"), None);
    }

    #[test]
    fn test_credential_empty_value_is_absent() {
        let req = request_with_headers(&[("cookie", "access_token=")]);
        assert_eq!(credential(&req, "access_token"), None);
    }

    fn peer(req: &mut Request, addr: &str) {
        req.extensions_mut()
            .insert(ConnectInfo::<SocketAddr>(addr.parse().unwrap()));
    }

    #[test]
    fn test_client_ip_from_trusted_proxy_uses_forwarded_header() {
        let proxies: Vec<IpAddr> = vec!["198.51.100.2".parse().unwrap()];
        let mut req = request_with_headers(&[("x-forwarded-for", "203.0.113.9, 10.0.0.1")]);
        peer(&mut req, "198.51.100.2:4000");

        assert_eq!(
            client_ip(&req, &proxies),
            "203.0.113.9".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn test_client_ip_ignores_forwarded_header_from_untrusted_peer() {
        // A direct client claiming a private origin must still be
        // attributed its own public address.
        let mut req = request_with_headers(&[("x-forwarded-for", "10.0.0.1")]);
        peer(&mut req, "203.0.113.9:4000");

        assert_eq!(
            client_ip(&req, &[]),
            "203.0.113.9".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn test_client_ip_without_proxies_uses_peer() {
        let mut req = request_with_headers(&[]);
        peer(&mut req, "198.51.100.2:4000");
        assert_eq!(
            client_ip(&req, &[]),
            "198.51.100.2".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn test_client_ip_unknown_when_unroutable() {
        let req = request_with_headers(&[]);
        assert_eq!(client_ip(&req, &[]), IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    }
}

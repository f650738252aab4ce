//! Perimeter admission stages: security headers, HTTPS enforcement, and
//! the client IP allowlist.

use std::net::IpAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use std::net::SocketAddr;
use tracing::warn;

use crate::http::constants::{HEADER_FORWARDED_FOR, HEADER_FORWARDED_PROTO};
use crate::http::errors::ApiError;
use crate::state::ApiState;

const SECURITY_HEADERS: [(&str, &str); 5] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("referrer-policy", "no-referrer"),
    ("cross-origin-resource-policy", "same-site"),
    ("x-permitted-cross-domain-policies", "none"),
];

/// Stamp the unconditional security headers on every response.
pub(crate) async fn security_headers(req: Request<Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    for (name, value) in SECURITY_HEADERS {
        response
            .headers_mut()
            .insert(name, HeaderValue::from_static(value));
    }
    response
}

/// Reject plaintext requests when HTTPS is required.
///
/// The gateway itself listens in cleartext behind a TLS-terminating proxy,
/// so the only accepted proof of TLS is a trusted `X-Forwarded-Proto`.
pub(crate) async fn require_https(
    State(state): State<Arc<ApiState>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.config.require_https {
        return Ok(next.run(req).await);
    }
    if state.config.trust_proxy {
        let forwarded_scheme = req
            .headers()
            .get(HEADER_FORWARDED_PROTO)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim);
        if forwarded_scheme == Some("https") {
            return Ok(next.run(req).await);
        }
    }
    state.metrics.inc_admission_rejected("https");
    Err(ApiError::forbidden("HTTPS required"))
}

/// Enforce exact membership in the configured client allowlist.
pub(crate) async fn ip_allowlist(
    State(state): State<Arc<ApiState>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(allowlist) = &state.config.ip_allowlist else {
        return Ok(next.run(req).await);
    };
    let client = client_ip(&req, state.config.trust_proxy);
    if client.is_some_and(|ip| allowlist.contains(&ip)) {
        return Ok(next.run(req).await);
    }
    warn!(client = ?client, "rejected request from non-allowlisted address");
    state.metrics.inc_admission_rejected("ip_allowlist");
    Err(ApiError::forbidden("IP not allowed"))
}

/// Resolve the client address, honouring `X-Forwarded-For` when trusted.
///
/// IPv4-mapped IPv6 addresses normalize to IPv4 so allowlists can be
/// written in dotted-quad form.
pub(crate) fn client_ip(req: &Request<Body>, trust_proxy: bool) -> Option<IpAddr> {
    if trust_proxy
        && let Some(forwarded) = req
            .headers()
            .get(HEADER_FORWARDED_FOR)
            .and_then(|value| value.to_str().ok())
        && let Some(first) = forwarded.split(',').next()
        && let Ok(ip) = first.trim().parse::<IpAddr>()
    {
        return Some(normalize_mapped_ipv4(ip));
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| normalize_mapped_ipv4(info.0.ip()))
}

fn normalize_mapped_ipv4(ip: IpAddr) -> IpAddr {
    if let IpAddr::V6(v6) = ip
        && let Some(v4) = v6.to_ipv4_mapped()
    {
        return IpAddr::V4(v4);
    }
    ip
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapped_ipv6_normalizes_to_ipv4() {
        let mapped: IpAddr = "::ffff:10.0.0.7".parse().expect("mapped address parses");
        assert_eq!(normalize_mapped_ipv4(mapped).to_string(), "10.0.0.7");

        let plain: IpAddr = "2001:db8::1".parse().expect("v6 address parses");
        assert_eq!(normalize_mapped_ipv4(plain), plain);

        let v4: IpAddr = "192.168.1.1".parse().expect("v4 address parses");
        assert_eq!(normalize_mapped_ipv4(v4), v4);
    }

    #[test]
    fn forwarded_for_is_ignored_without_trust() {
        let req = Request::builder()
            .header(HEADER_FORWARDED_FOR, "203.0.113.9")
            .body(Body::empty())
            .expect("request builds");
        assert_eq!(client_ip(&req, false), None);
        assert_eq!(
            client_ip(&req, true),
            Some("203.0.113.9".parse().expect("address parses"))
        );
    }

    #[test]
    fn first_forwarded_hop_wins() {
        let req = Request::builder()
            .header(HEADER_FORWARDED_FOR, "198.51.100.2, 10.0.0.1")
            .body(Body::empty())
            .expect("request builds");
        assert_eq!(
            client_ip(&req, true),
            Some("198.51.100.2".parse().expect("address parses"))
        );
    }
}

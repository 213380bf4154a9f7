//! Per-IP quota enforcement for public endpoints.
//!
//! Wraps [`IpQuotaLimiter`] as an axum middleware. Requests whose IP cannot
//! be determined are let through.
//!
//! The deployment runs behind Cloudflare and the Fly.io edge, which overwrite
//! the client IP headers before a request reaches the server. Under that
//! assumption the IP is taken from those headers, falling back to the socket
//! address. Anywhere a client can reach the server directly the headers are
//! forgeable, so `MARKETBOARD_TRUST_PROXY_HEADERS=false` must be set to key
//! quotas on the socket address alone.

use std::net::{IpAddr, SocketAddr};

use std::convert::Infallible;

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::IpQuotaConfig;
use crate::error::AppError;
use crate::ip_quota::IpQuotaLimiter;
use crate::state::AppState;

/// Header carrying the window's call limit.
pub const RATE_LIMIT_LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
/// Header carrying the calls left in the window.
pub const RATE_LIMIT_REMAINING_HEADER: HeaderName =
    HeaderName::from_static("x-ratelimit-remaining");

/// State for [`enforce_ip_quota`]: a limiter and the quota it applies.
#[derive(Debug, Clone)]
pub struct IpQuotaGuard {
    limiter: IpQuotaLimiter,
    config: IpQuotaConfig,
    trust_proxy_headers: bool,
}

impl IpQuotaGuard {
    #[must_use]
    pub const fn new(
        limiter: IpQuotaLimiter,
        config: IpQuotaConfig,
        trust_proxy_headers: bool,
    ) -> Self {
        Self {
            limiter,
            config,
            trust_proxy_headers,
        }
    }
}

// =============================================================================
// Client IP Extraction
// =============================================================================

fn header_ip(headers: &HeaderMap, name: &str) -> Option<IpAddr> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
}

/// Resolve the client IP.
///
/// With `trust_proxy_headers` set, checks `CF-Connecting-IP`, the first
/// `X-Forwarded-For` entry, `X-Real-IP` and `Fly-Client-IP` in that order,
/// then `peer`. Otherwise only `peer` is used.
#[must_use]
pub fn client_ip(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_proxy_headers: bool,
) -> Option<IpAddr> {
    if !trust_proxy_headers {
        return peer.map(|addr| addr.ip());
    }

    if let Some(ip) = header_ip(headers, "cf-connecting-ip") {
        return Some(ip);
    }

    if let Some(ip) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
    {
        return Some(ip);
    }

    header_ip(headers, "x-real-ip")
        .or_else(|| header_ip(headers, "fly-client-ip"))
        .or_else(|| peer.map(|addr| addr.ip()))
}

/// Extractor for the resolved client IP, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIp(pub Option<IpAddr>);

impl FromRequestParts<AppState> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(Self(client_ip(
            &parts.headers,
            peer,
            state.trust_proxy_headers(),
        )))
    }
}

// =============================================================================
// Middleware
// =============================================================================

/// Count the request against the caller's IP quota.
///
/// Rejected requests get a 429 with `Retry-After`. Every response carries
/// `X-RateLimit-Limit` and `X-RateLimit-Remaining`.
pub async fn enforce_ip_quota(
    State(guard): State<IpQuotaGuard>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let Some(ip) = client_ip(request.headers(), peer, guard.trust_proxy_headers) else {
        tracing::warn!(
            path = %request.uri().path(),
            "Could not determine client IP, skipping IP quota"
        );
        return next.run(request).await;
    };

    let config = &guard.config;
    let decision = guard
        .limiter
        .check_and_increment(ip, &config.quota_key, config.max_quota, config.ttl)
        .await;

    let mut response = if decision.allowed {
        next.run(request).await
    } else {
        let retry_after_secs = decision
            .retry_after_secs
            .filter(|secs| *secs > 0)
            .unwrap_or_else(|| config.ttl.as_secs().max(1));
        AppError::RateLimited { retry_after_secs }.into_response()
    };

    let headers = response.headers_mut();
    headers.insert(RATE_LIMIT_LIMIT_HEADER, HeaderValue::from(config.max_quota));
    headers.insert(
        RATE_LIMIT_REMAINING_HEADER,
        HeaderValue::from(decision.remaining),
    );

    response
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode, header},
        middleware,
        routing::get,
    };
    use tower::ServiceExt;

    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_client_ip_prefers_cloudflare() {
        let map = headers(&[
            ("cf-connecting-ip", "198.51.100.1"),
            ("x-forwarded-for", "198.51.100.2"),
        ]);
        assert_eq!(client_ip(&map, None, true), Some("198.51.100.1".parse().unwrap()));
    }

    #[test]
    fn test_client_ip_first_forwarded_entry() {
        let map = headers(&[("x-forwarded-for", " 198.51.100.7 , 10.0.0.1")]);
        assert_eq!(client_ip(&map, None, true), Some("198.51.100.7".parse().unwrap()));
    }

    #[test]
    fn test_client_ip_skips_garbage_headers() {
        let map = headers(&[
            ("cf-connecting-ip", "not-an-ip"),
            ("fly-client-ip", "2001:db8::1"),
        ]);
        assert_eq!(client_ip(&map, None, true), Some("2001:db8::1".parse().unwrap()));
    }

    #[test]
    fn test_client_ip_falls_back_to_peer() {
        let peer: SocketAddr = "192.0.2.44:51000".parse().unwrap();
        assert_eq!(
            client_ip(&HeaderMap::new(), Some(peer), true),
            Some("192.0.2.44".parse().unwrap())
        );
        assert_eq!(client_ip(&HeaderMap::new(), None, true), None);
    }

    #[test]
    fn test_client_ip_ignores_headers_when_untrusted() {
        let map = headers(&[
            ("cf-connecting-ip", "198.51.100.1"),
            ("x-forwarded-for", "198.51.100.2"),
            ("x-real-ip", "198.51.100.3"),
            ("fly-client-ip", "198.51.100.4"),
        ]);
        let peer: SocketAddr = "192.0.2.44:51000".parse().unwrap();
        assert_eq!(
            client_ip(&map, Some(peer), false),
            Some("192.0.2.44".parse().unwrap())
        );
        assert_eq!(client_ip(&map, None, false), None);
    }

    fn app_with_trust(max_quota: u32, trust_proxy_headers: bool) -> Router {
        let guard = IpQuotaGuard::new(
            IpQuotaLimiter::in_memory(),
            IpQuotaConfig {
                quota_key: "test_read".to_owned(),
                max_quota,
                ttl: Duration::from_secs(30),
            },
            trust_proxy_headers,
        );
        Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(guard, enforce_ip_quota))
    }

    fn app(max_quota: u32) -> Router {
        app_with_trust(max_quota, true)
    }

    fn request_from(ip: &str) -> Request<Body> {
        Request::builder()
            .uri("/")
            .header("x-real-ip", ip)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_sets_rate_limit_headers() {
        let response = app(3).oneshot(request_from("192.0.2.1")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(RATE_LIMIT_LIMIT_HEADER).unwrap(), "3");
        assert_eq!(
            response.headers().get(RATE_LIMIT_REMAINING_HEADER).unwrap(),
            "2"
        );
    }

    #[tokio::test]
    async fn test_rejects_once_window_is_exhausted() {
        let app = app(2);

        for _ in 0..2 {
            let response = app.clone().oneshot(request_from("192.0.2.2")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app.clone().oneshot(request_from("192.0.2.2")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(RATE_LIMIT_REMAINING_HEADER).unwrap(),
            "0"
        );
        let retry_after: u64 = response
            .headers()
            .get(header::RETRY_AFTER)
            .unwrap()
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!((1..=30).contains(&retry_after));

        // Other clients are unaffected.
        let response = app.oneshot(request_from("192.0.2.3")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_client_ip_is_allowed() {
        let response = app(0)
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(RATE_LIMIT_LIMIT_HEADER).is_none());
    }

    #[tokio::test]
    async fn test_forged_header_does_not_spread_quota_when_untrusted() {
        let app = app_with_trust(1, false);
        let peer: SocketAddr = "192.0.2.9:40000".parse().unwrap();
        let request = |forged: &str| {
            let mut request = request_from(forged);
            request.extensions_mut().insert(ConnectInfo(peer));
            request
        };

        let response = app.clone().oneshot(request("198.51.100.1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // A fresh forged IP still counts against the socket address.
        let response = app.oneshot(request("198.51.100.2")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}

//! Correlation IDs for listing writes and quota checks.
//!
//! Each request's ID lands on the `request` span, so a quota drift warning
//! raised inside a listing transaction can be traced back to the write that
//! surfaced it. The same ID is tagged on the Sentry scope and returned as
//! `x-request-id`, which a seller can quote when a listing was refused for
//! quota.
//!
//! An ID set by Cloudflare or the Fly.io edge is kept when it is short
//! printable ASCII. Anything else is replaced with a UUID v4 so caller
//! supplied junk never reaches the logs.

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use tracing::Span;
use uuid::Uuid;

/// The HTTP header name for request IDs.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest upstream ID that is kept verbatim.
const MAX_REQUEST_ID_LEN: usize = 128;

fn upstream_request_id(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .filter(|s| {
            !s.is_empty()
                && s.len() <= MAX_REQUEST_ID_LEN
                && s.bytes().all(|b| b.is_ascii_graphic())
        })
}

/// Tag the request with a correlation ID.
pub async fn request_id_middleware(request: Request, next: Next) -> Response {
    let request_id = upstream_request_id(&request)
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    Span::current().record("request_id", &request_id);

    sentry::configure_scope(|scope| {
        scope.set_tag("request_id", &request_id);
    });

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}

//! HTTP middleware stack for the marketboard server.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layer (capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. IP quota (public read routes only)

pub mod identity;
pub mod ip_quota;
pub mod request_id;

pub use identity::{CurrentUser, USER_ID_HEADER};
pub use ip_quota::{ClientIp, IpQuotaGuard, client_ip, enforce_ip_quota};
pub use request_id::request_id_middleware;

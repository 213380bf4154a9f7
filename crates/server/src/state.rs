//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::{IpQuotaConfig, ListingQuotaConfig, ServerConfig};
use crate::ip_quota::IpQuotaLimiter;
use crate::middleware::IpQuotaGuard;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    pool: PgPool,
    limiter: IpQuotaLimiter,
    listings: ListingQuotaConfig,
    public_read_quota: IpQuotaConfig,
    trust_proxy_headers: bool,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Server configuration
    /// * `pool` - `PostgreSQL` connection pool
    /// * `limiter` - IP quota limiter (Redis or in-memory)
    #[must_use]
    pub fn new(config: &ServerConfig, pool: PgPool, limiter: IpQuotaLimiter) -> Self {
        Self::from_parts(
            pool,
            limiter,
            config.listings,
            config.public_read_quota.clone(),
            config.trust_proxy_headers,
        )
    }

    /// Create application state from its parts.
    #[must_use]
    pub fn from_parts(
        pool: PgPool,
        limiter: IpQuotaLimiter,
        listings: ListingQuotaConfig,
        public_read_quota: IpQuotaConfig,
        trust_proxy_headers: bool,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                pool,
                limiter,
                listings,
                public_read_quota,
                trust_proxy_headers,
            }),
        }
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Get a reference to the IP quota limiter.
    #[must_use]
    pub fn limiter(&self) -> &IpQuotaLimiter {
        &self.inner.limiter
    }

    /// Maximum active listings per user.
    #[must_use]
    pub fn max_active_listings(&self) -> i32 {
        self.inner.listings.max_active
    }

    /// Quota applied to public read endpoints.
    #[must_use]
    pub fn public_read_quota(&self) -> &IpQuotaConfig {
        &self.inner.public_read_quota
    }

    /// Whether client IP headers from a proxy are trusted.
    #[must_use]
    pub fn trust_proxy_headers(&self) -> bool {
        self.inner.trust_proxy_headers
    }

    /// Middleware state enforcing the public read quota.
    #[must_use]
    pub fn public_read_guard(&self) -> IpQuotaGuard {
        IpQuotaGuard::new(
            self.inner.limiter.clone(),
            self.inner.public_read_quota.clone(),
            self.inner.trust_proxy_headers,
        )
    }
}

//! Per-IP fixed-window quotas backed by a shared counter store.
//!
//! # Failure posture
//!
//! Unlike listing writes (which fail closed), the IP quota fails OPEN: if the
//! counter store errors, the request is allowed and a warning is logged.
//! Store errors never reach the client.
//!
//! # Backends
//!
//! - [`RedisCounterStore`] - shared across server processes (production)
//! - [`MemoryCounterStore`] - single process, used when `REDIS_URL` is unset

mod memory_store;
mod redis_store;

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use marketboard_core::ip_quota::{QuotaDecision, QuotaStatus, WindowCount, counter_key};

pub use memory_store::MemoryCounterStore;
pub use redis_store::RedisCounterStore;

/// Errors from a counter store backend.
#[derive(Debug, Error)]
pub enum CounterStoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Atomic fixed-window counters.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment `key` and return the post-increment window.
    ///
    /// Must be atomic across concurrent callers. The expiry is set to `ttl`
    /// only when the increment creates the key; later increments in the same
    /// window leave it unchanged.
    async fn increment(&self, key: &str, ttl: Duration) -> Result<WindowCount, CounterStoreError>;

    /// Read the current window without incrementing.
    async fn peek(&self, key: &str) -> Result<Option<WindowCount>, CounterStoreError>;

    /// Drop the window for `key`.
    async fn reset(&self, key: &str) -> Result<(), CounterStoreError>;
}

/// Per-IP quota limiter.
///
/// Cheaply cloneable; clones share the same store.
#[derive(Clone)]
pub struct IpQuotaLimiter {
    store: Arc<dyn CounterStore>,
}

impl IpQuotaLimiter {
    #[must_use]
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    /// Limiter over a process-local store.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCounterStore::new()))
    }

    /// Count one operation for `ip` under `quota_key` and decide whether it
    /// is allowed.
    ///
    /// Rejected calls still count toward the window. Store errors allow the
    /// call.
    pub async fn check_and_increment(
        &self,
        ip: IpAddr,
        quota_key: &str,
        max_quota: u32,
        ttl: Duration,
    ) -> QuotaDecision {
        let key = counter_key(ip, quota_key);
        match self.store.increment(&key, ttl).await {
            Ok(window) => {
                let decision = QuotaDecision::from_window(window, max_quota);
                if !decision.allowed {
                    tracing::debug!(
                        ip = %ip,
                        quota_key,
                        count = window.count,
                        max_quota,
                        "IP quota exceeded"
                    );
                }
                decision
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    ip = %ip,
                    quota_key,
                    "IP quota store unavailable, allowing request"
                );
                QuotaDecision::fail_open(max_quota)
            }
        }
    }

    /// Current usage of `ip` under `quota_key` without counting a call.
    pub async fn status(&self, ip: IpAddr, quota_key: &str, max_quota: u32) -> QuotaStatus {
        let key = counter_key(ip, quota_key);
        match self.store.peek(&key).await {
            Ok(window) => QuotaStatus::from_window(window, max_quota),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    ip = %ip,
                    quota_key,
                    "IP quota store unavailable, reporting unused quota"
                );
                QuotaStatus::unused(max_quota)
            }
        }
    }

    /// Clear the window of `ip` under `quota_key` (operator use).
    ///
    /// # Errors
    ///
    /// Returns `CounterStoreError` if the store fails; resets do not fail open.
    pub async fn reset(&self, ip: IpAddr, quota_key: &str) -> Result<(), CounterStoreError> {
        self.store.reset(&counter_key(ip, quota_key)).await?;
        tracing::info!(ip = %ip, quota_key, "IP quota reset");
        Ok(())
    }
}

impl std::fmt::Debug for IpQuotaLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpQuotaLimiter").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Store that fails every call.
    struct BrokenStore;

    #[async_trait]
    impl CounterStore for BrokenStore {
        async fn increment(&self, _: &str, _: Duration) -> Result<WindowCount, CounterStoreError> {
            Err(CounterStoreError::Unavailable("connection refused".to_owned()))
        }

        async fn peek(&self, _: &str) -> Result<Option<WindowCount>, CounterStoreError> {
            Err(CounterStoreError::Unavailable("connection refused".to_owned()))
        }

        async fn reset(&self, _: &str) -> Result<(), CounterStoreError> {
            Err(CounterStoreError::Unavailable("connection refused".to_owned()))
        }
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_allows_until_max_then_rejects() {
        let limiter = IpQuotaLimiter::in_memory();
        let ttl = Duration::from_secs(60);
        let client = ip("198.51.100.7");

        for expected_remaining in [2, 1, 0] {
            let decision = limiter.check_and_increment(client, "search", 3, ttl).await;
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let decision = limiter.check_and_increment(client, "search", 3, ttl).await;
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert!(decision.retry_after_secs.is_some());
    }

    #[tokio::test]
    async fn test_rejected_calls_still_count() {
        let limiter = IpQuotaLimiter::in_memory();
        let ttl = Duration::from_secs(60);
        let client = ip("198.51.100.8");

        for _ in 0..5 {
            limiter.check_and_increment(client, "search", 2, ttl).await;
        }

        let status = limiter.status(client, "search", 2).await;
        assert_eq!(status.used, 5);
        assert_eq!(status.remaining, 0);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let limiter = IpQuotaLimiter::in_memory();
        let ttl = Duration::from_secs(60);
        let a = ip("192.0.2.1");
        let b = ip("192.0.2.2");

        assert!(limiter.check_and_increment(a, "search", 1, ttl).await.allowed);
        assert!(!limiter.check_and_increment(a, "search", 1, ttl).await.allowed);
        assert!(limiter.check_and_increment(b, "search", 1, ttl).await.allowed);
        assert!(limiter.check_and_increment(a, "drops", 1, ttl).await.allowed);
    }

    #[tokio::test]
    async fn test_status_does_not_increment() {
        let limiter = IpQuotaLimiter::in_memory();
        let client = ip("2001:db8::1");

        assert_eq!(
            limiter.status(client, "search", 10).await,
            QuotaStatus::unused(10)
        );
        limiter
            .check_and_increment(client, "search", 10, Duration::from_secs(60))
            .await;
        let status = limiter.status(client, "search", 10).await;
        assert_eq!(status.used, 1);
        assert_eq!(status.remaining, 9);
        assert_eq!(limiter.status(client, "search", 10).await.used, 1);
    }

    #[tokio::test]
    async fn test_reset_clears_window() {
        let limiter = IpQuotaLimiter::in_memory();
        let client = ip("192.0.2.50");
        let ttl = Duration::from_secs(60);

        limiter.check_and_increment(client, "search", 1, ttl).await;
        assert!(!limiter.check_and_increment(client, "search", 1, ttl).await.allowed);

        limiter.reset(client, "search").await.unwrap();
        assert!(limiter.check_and_increment(client, "search", 1, ttl).await.allowed);
    }

    #[tokio::test]
    async fn test_fails_open_when_store_errors() {
        let limiter = IpQuotaLimiter::new(Arc::new(BrokenStore));
        let client = ip("192.0.2.99");

        let decision = limiter
            .check_and_increment(client, "search", 0, Duration::from_secs(60))
            .await;
        assert!(decision.allowed);

        let status = limiter.status(client, "search", 4).await;
        assert_eq!(status, QuotaStatus::unused(4));

        assert!(limiter.reset(client, "search").await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_calls_admit_exactly_max() {
        const CALLS: u32 = 32;
        let limiter = IpQuotaLimiter::in_memory();
        let client = ip("203.0.113.200");

        let handles: Vec<_> = (0..CALLS)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move {
                    limiter
                        .check_and_increment(client, "burst", CALLS - 1, Duration::from_secs(60))
                        .await
                })
            })
            .collect();

        let mut allowed = 0;
        let mut rejected = 0;
        for handle in handles {
            if handle.await.unwrap().allowed {
                allowed += 1;
            } else {
                rejected += 1;
            }
        }

        assert_eq!(allowed, CALLS - 1);
        assert_eq!(rejected, 1);
    }
}

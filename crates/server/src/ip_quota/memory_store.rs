//! Process-local counter store on a moka cache.
//!
//! Each entry carries its own window deadline; the cache's per-entry expiry
//! evicts it once the deadline passes. Upserts on the same key are
//! serialized by moka, which makes `increment` atomic within the process.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;

use marketboard_core::ip_quota::WindowCount;

use super::{CounterStore, CounterStoreError};

const DEFAULT_CAPACITY: u64 = 100_000;

#[derive(Debug, Clone, Copy)]
struct Window {
    count: i64,
    resets_at: Instant,
}

impl Window {
    fn is_live(&self, now: Instant) -> bool {
        self.resets_at > now
    }

    fn to_count(self, now: Instant) -> WindowCount {
        WindowCount {
            count: self.count,
            ttl_remaining: Some(self.resets_at.saturating_duration_since(now)),
        }
    }
}

/// Expire each entry at its own window deadline.
struct WindowExpiry;

impl Expiry<String, Window> for WindowExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Window,
        created_at: Instant,
    ) -> Option<Duration> {
        Some(value.resets_at.saturating_duration_since(created_at))
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Window,
        updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.resets_at.saturating_duration_since(updated_at))
    }
}

/// In-memory fixed-window counter store.
#[derive(Clone)]
pub struct MemoryCounterStore {
    windows: Cache<String, Window>,
}

impl MemoryCounterStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Store holding at most `capacity` live windows.
    #[must_use]
    pub fn with_capacity(capacity: u64) -> Self {
        Self {
            windows: Cache::builder()
                .max_capacity(capacity)
                .expire_after(WindowExpiry)
                .build(),
        }
    }
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, key: &str, ttl: Duration) -> Result<WindowCount, CounterStoreError> {
        let entry = self
            .windows
            .entry(key.to_owned())
            .and_upsert_with(|existing| {
                let now = Instant::now();
                let window = match existing.map(|e| e.into_value()) {
                    Some(w) if w.is_live(now) => Window {
                        count: w.count + 1,
                        ..w
                    },
                    _ => Window {
                        count: 1,
                        resets_at: now + ttl,
                    },
                };
                std::future::ready(window)
            })
            .await;

        Ok(entry.into_value().to_count(Instant::now()))
    }

    async fn peek(&self, key: &str) -> Result<Option<WindowCount>, CounterStoreError> {
        let now = Instant::now();
        Ok(self
            .windows
            .get(key)
            .await
            .filter(|w| w.is_live(now))
            .map(|w| w.to_count(now)))
    }

    async fn reset(&self, key: &str) -> Result<(), CounterStoreError> {
        self.windows.invalidate(key).await;
        Ok(())
    }
}

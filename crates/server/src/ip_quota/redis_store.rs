//! Redis-backed counter store.
//!
//! `increment` runs a single Lua script, so `INCR`, the first-hit `EXPIRE`
//! and the `TTL` read are one atomic step for every server process sharing
//! the Redis instance.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use marketboard_core::ip_quota::WindowCount;

use super::{CounterStore, CounterStoreError};

/// INCR the key; set the expiry only when this call created it.
///
/// Returns `{count, ttl}`.
const INCREMENT_SCRIPT: &str = r"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return {count, redis.call('TTL', KEYS[1])}
";

/// Fixed-window counters in Redis.
#[derive(Clone)]
pub struct RedisCounterStore {
    conn: ConnectionManager,
    script: redis::Script,
}

impl RedisCounterStore {
    /// Connect to Redis at `url`.
    ///
    /// # Errors
    ///
    /// Returns `CounterStoreError::Redis` if the URL is invalid or the first
    /// connection fails.
    pub async fn connect(url: &str) -> Result<Self, CounterStoreError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!("Redis counter store connected");
        Ok(Self::from_connection(conn))
    }

    #[must_use]
    pub fn from_connection(conn: ConnectionManager) -> Self {
        Self {
            conn,
            script: redis::Script::new(INCREMENT_SCRIPT),
        }
    }
}

/// Convert a Redis `TTL` reply. Negative replies mean "no expiry" or "no key".
fn ttl_from_reply(ttl: i64) -> Option<Duration> {
    u64::try_from(ttl).ok().map(Duration::from_secs)
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment(&self, key: &str, ttl: Duration) -> Result<WindowCount, CounterStoreError> {
        let mut conn = self.conn.clone();
        // EXPIRE takes whole seconds; a sub-second window still needs one.
        let ttl_secs = ttl.as_secs().max(1);

        let (count, ttl_reply): (i64, i64) = self
            .script
            .key(key)
            .arg(ttl_secs)
            .invoke_async(&mut conn)
            .await?;

        Ok(WindowCount {
            count,
            ttl_remaining: ttl_from_reply(ttl_reply),
        })
    }

    async fn peek(&self, key: &str) -> Result<Option<WindowCount>, CounterStoreError> {
        let mut conn = self.conn.clone();
        let count: Option<i64> = conn.get(key).await?;
        let Some(count) = count else {
            return Ok(None);
        };
        let ttl_reply: i64 = conn.ttl(key).await?;

        Ok(Some(WindowCount {
            count,
            ttl_remaining: ttl_from_reply(ttl_reply),
        }))
    }

    async fn reset(&self, key: &str) -> Result<(), CounterStoreError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }
}

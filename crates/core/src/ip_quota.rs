//! Fixed-window per-IP quota decisions.
//!
//! The counter store only knows how to increment a key and report its TTL.
//! Turning a post-increment count into allow/deny lives here so that every
//! store backend makes the same decision.

use std::net::IpAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Prefix of every IP quota key in the counter store.
pub const KEY_PREFIX: &str = "ip_quota";

/// Build the counter store key for an `(ip, quota_key)` pair.
#[must_use]
pub fn counter_key(ip: IpAddr, quota_key: &str) -> String {
    format!("{KEY_PREFIX}:{quota_key}:{ip}")
}

/// Counter value of one fixed window as reported by a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    /// Number of increments in the current window, rejected ones included.
    pub count: i64,
    /// Time until the window resets, if the store reported one.
    pub ttl_remaining: Option<Duration>,
}

/// Outcome of `check_and_increment`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaDecision {
    pub allowed: bool,
    pub remaining: u32,
    /// Seconds until the window resets; set on rejections only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl QuotaDecision {
    /// Decision used when the counter store is unavailable.
    #[must_use]
    pub const fn fail_open(max_quota: u32) -> Self {
        Self {
            allowed: true,
            remaining: max_quota,
            retry_after_secs: None,
        }
    }

    /// Decide from a post-increment window count.
    ///
    /// The call is rejected once the count exceeds `max_quota`. Rejected
    /// calls were still counted by the store.
    #[must_use]
    pub fn from_window(window: WindowCount, max_quota: u32) -> Self {
        let max = i64::from(max_quota);
        if window.count > max {
            Self {
                allowed: false,
                remaining: 0,
                retry_after_secs: Some(window.ttl_remaining.map_or(0, |ttl| ttl.as_secs())),
            }
        } else {
            Self {
                allowed: true,
                remaining: remaining(window.count, max_quota),
                retry_after_secs: None,
            }
        }
    }
}

/// Read-only view of a quota, as returned by `getStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaStatus {
    pub used: i64,
    pub remaining: u32,
}

impl QuotaStatus {
    /// Status of a key that has no live window.
    #[must_use]
    pub const fn unused(max_quota: u32) -> Self {
        Self {
            used: 0,
            remaining: max_quota,
        }
    }

    #[must_use]
    pub fn from_window(window: Option<WindowCount>, max_quota: u32) -> Self {
        window.map_or(Self::unused(max_quota), |w| Self {
            used: w.count,
            remaining: remaining(w.count, max_quota),
        })
    }
}

fn remaining(count: i64, max_quota: u32) -> u32 {
    let left = i64::from(max_quota).saturating_sub(count).max(0);
    u32::try_from(left).unwrap_or(max_quota)
}

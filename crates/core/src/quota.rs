//! Quota counter rules.
//!
//! Every listing write produces a [`QuotaDelta`] from the listing's state
//! before and after the write. The server applies that delta to the owner's
//! `active_listings_count` inside the same transaction as the listing write,
//! so the counter and the listing commit or roll back together.
//!
//! `None` on either side of [`quota_delta`] means "row does not exist":
//! `(None, Some(_))` is an insert, `(Some(_), None)` a hard delete.

use serde::{Deserialize, Serialize};

use crate::types::ListingSnapshot;

/// Relative adjustment of a quota counter caused by one listing write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuotaDelta {
    Increment,
    Decrement,
    Unchanged,
}

impl QuotaDelta {
    /// Signed value of the delta.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::Increment => 1,
            Self::Decrement => -1,
            Self::Unchanged => 0,
        }
    }

    /// Whether this delta occupies a new quota slot.
    #[must_use]
    pub const fn takes_slot(self) -> bool {
        matches!(self, Self::Increment)
    }
}

/// Compute the quota delta for a listing transition.
#[must_use]
pub const fn quota_delta(
    before: Option<&ListingSnapshot>,
    after: Option<&ListingSnapshot>,
) -> QuotaDelta {
    let was_counted = match before {
        Some(s) => s.counts_toward_quota(),
        None => false,
    };
    let is_counted = match after {
        Some(s) => s.counts_toward_quota(),
        None => false,
    };

    match (was_counted, is_counted) {
        (false, true) => QuotaDelta::Increment,
        (true, false) => QuotaDelta::Decrement,
        _ => QuotaDelta::Unchanged,
    }
}

/// Result of applying a delta to a stored counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaAdjustment {
    /// New counter value, never negative.
    pub value: i32,
    /// The decrement would have gone below zero and was clamped.
    ///
    /// A clamp means the counter had already drifted before this write.
    pub clamped: bool,
}

/// Apply `delta` to `current`, clamping at zero.
///
/// A negative `current` (only possible through manual edits) is treated as
/// zero before the delta is applied.
#[must_use]
pub const fn apply_delta(current: i32, delta: QuotaDelta) -> QuotaAdjustment {
    let base = if current < 0 { 0 } else { current };
    let raw = base.saturating_add(delta.as_i32());
    if raw < 0 {
        QuotaAdjustment {
            value: 0,
            clamped: true,
        }
    } else {
        QuotaAdjustment {
            value: raw,
            clamped: current < 0,
        }
    }
}

/// A user's quota as exposed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaSummary {
    pub active_listings: i32,
    pub max_active_listings: i32,
    pub remaining: i32,
}

impl QuotaSummary {
    #[must_use]
    pub fn new(active_listings: i32, max_active_listings: i32) -> Self {
        Self {
            active_listings,
            max_active_listings,
            remaining: (max_active_listings - active_listings).max(0),
        }
    }

    /// Whether one more listing may start counting.
    #[must_use]
    pub const fn has_free_slot(&self) -> bool {
        self.active_listings < self.max_active_listings
    }
}

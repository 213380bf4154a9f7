//! Listing domain type.
//!
//! Separate from the database row type in `db::listings`.

use chrono::{DateTime, Utc};
use serde::Serialize;

use marketboard_core::{ItemId, ListingId, ListingSnapshot, ListingStatus, TradeType, UserId};

/// A marketplace listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Listing {
    pub id: ListingId,
    pub user_id: UserId,
    pub trade_type: TradeType,
    pub item_id: ItemId,
    pub wanted_item_ids: Vec<ItemId>,
    pub quantity: i32,
    pub price: Option<i64>,
    pub status: ListingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Listing {
    /// The quota-relevant state of this listing.
    #[must_use]
    pub const fn snapshot(&self) -> ListingSnapshot {
        ListingSnapshot {
            status: self.status,
            deleted_at: self.deleted_at,
        }
    }

    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

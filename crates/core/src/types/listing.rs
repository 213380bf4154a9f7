//! Marketplace listing types.
//!
//! A listing is either counted against its owner's quota or not. Only the
//! combination of `ListingStatus::Active` and "not soft-deleted" counts; see
//! [`ListingSnapshot::counts_toward_quota`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::id::ItemId;

/// Maximum number of wanted items on an exchange listing.
pub const MAX_WANTED_ITEMS: usize = 5;

/// Listing lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "market.listing_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    /// Visible in the marketplace and counted against the owner's quota.
    #[default]
    Active,
    /// Trade completed.
    Sold,
    /// Withdrawn by the owner.
    Cancelled,
}

impl std::fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Sold => write!(f, "sold"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for ListingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "sold" => Ok(Self::Sold),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("invalid listing status: {s}")),
        }
    }
}

/// What the listing owner wants to do with the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "market.trade_type", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum TradeType {
    Sell,
    Buy,
    /// Swap the listed item for one of the wanted items.
    Exchange,
}

impl std::fmt::Display for TradeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sell => write!(f, "sell"),
            Self::Buy => write!(f, "buy"),
            Self::Exchange => write!(f, "exchange"),
        }
    }
}

/// The parts of a listing that decide whether it counts toward quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingSnapshot {
    pub status: ListingStatus,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ListingSnapshot {
    /// A live listing with the given status.
    #[must_use]
    pub const fn live(status: ListingStatus) -> Self {
        Self {
            status,
            deleted_at: None,
        }
    }

    /// Whether this listing occupies one of its owner's quota slots.
    #[must_use]
    pub const fn counts_toward_quota(&self) -> bool {
        matches!(self.status, ListingStatus::Active) && self.deleted_at.is_none()
    }

    /// Copy of this snapshot marked as soft-deleted at `at`.
    ///
    /// An already deleted snapshot keeps its original timestamp.
    #[must_use]
    pub fn soft_deleted(self, at: DateTime<Utc>) -> Self {
        Self {
            deleted_at: self.deleted_at.or(Some(at)),
            ..self
        }
    }
}

/// Errors from validating a new listing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListingValidationError {
    #[error("quantity must be at least 1")]
    InvalidQuantity,
    #[error("price must not be negative")]
    NegativePrice,
    #[error("exchange listings need at least one wanted item")]
    MissingWantedItems,
    #[error("only exchange listings may name wanted items")]
    UnexpectedWantedItems,
    #[error("at most {MAX_WANTED_ITEMS} wanted items are allowed (got {0})")]
    TooManyWantedItems(usize),
    #[error("an item cannot be exchanged for itself")]
    SelfExchange,
}

/// Input for creating a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewListing {
    pub trade_type: TradeType,
    pub item_id: ItemId,
    #[serde(default)]
    pub wanted_item_ids: Vec<ItemId>,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
    #[serde(default)]
    pub price: Option<i64>,
    #[serde(default)]
    pub status: ListingStatus,
}

const fn default_quantity() -> i32 {
    1
}

impl NewListing {
    /// Check the shape of the listing before it reaches the database.
    ///
    /// # Errors
    ///
    /// Returns the first `ListingValidationError` found.
    pub fn validate(&self) -> Result<(), ListingValidationError> {
        if self.quantity < 1 {
            return Err(ListingValidationError::InvalidQuantity);
        }
        if self.price.is_some_and(|p| p < 0) {
            return Err(ListingValidationError::NegativePrice);
        }

        match self.trade_type {
            TradeType::Exchange => {
                if self.wanted_item_ids.is_empty() {
                    return Err(ListingValidationError::MissingWantedItems);
                }
                if self.wanted_item_ids.len() > MAX_WANTED_ITEMS {
                    return Err(ListingValidationError::TooManyWantedItems(
                        self.wanted_item_ids.len(),
                    ));
                }
                if self.wanted_item_ids.contains(&self.item_id) {
                    return Err(ListingValidationError::SelfExchange);
                }
            }
            TradeType::Sell | TradeType::Buy => {
                if !self.wanted_item_ids.is_empty() {
                    return Err(ListingValidationError::UnexpectedWantedItems);
                }
            }
        }

        Ok(())
    }

    /// Snapshot of the listing as it will be inserted.
    #[must_use]
    pub const fn snapshot(&self) -> ListingSnapshot {
        ListingSnapshot::live(self.status)
    }
}

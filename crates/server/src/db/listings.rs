//! Listing repository with transactional quota accounting.
//!
//! Every write here runs in one transaction that:
//! 1. creates (if needed) and locks the owner's quota row,
//! 2. mutates the listing,
//! 3. applies the quota delta computed by `marketboard_core::quota`.
//!
//! If any step fails the transaction is dropped and rolled back, so a
//! listing never commits without its counter adjustment.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use marketboard_core::quota::{QuotaSummary, apply_delta, quota_delta};
use marketboard_core::{ItemId, ListingId, ListingStatus, NewListing, TradeType, UserId};

use super::{RepositoryError, quotas};
use crate::models::Listing;

// =============================================================================
// Internal Row Types
// =============================================================================

/// Internal row type for listing queries.
#[derive(Debug, sqlx::FromRow)]
struct ListingRow {
    id: i32,
    user_id: i32,
    trade_type: TradeType,
    item_id: i32,
    wanted_item_ids: Vec<i32>,
    quantity: i32,
    price: Option<i64>,
    status: ListingStatus,
    deleted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ListingRow> for Listing {
    fn from(row: ListingRow) -> Self {
        Self {
            id: ListingId::new(row.id),
            user_id: UserId::new(row.user_id),
            trade_type: row.trade_type,
            item_id: ItemId::new(row.item_id),
            wanted_item_ids: row.wanted_item_ids.into_iter().map(ItemId::new).collect(),
            quantity: row.quantity,
            price: row.price,
            status: row.status,
            deleted_at: row.deleted_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Lock one of `user_id`'s listings. The quota row must already be locked.
async fn lock_listing(
    conn: &mut PgConnection,
    user_id: UserId,
    listing_id: ListingId,
) -> Result<Listing, RepositoryError> {
    let row = sqlx::query_as::<_, ListingRow>(
        r"
        SELECT id, user_id, trade_type, item_id, wanted_item_ids, quantity, price,
               status, deleted_at, created_at, updated_at
        FROM market.listings
        WHERE id = $1 AND user_id = $2
        FOR UPDATE
        ",
    )
    .bind(listing_id)
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(RepositoryError::NotFound)?;

    Ok(row.into())
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for listing database operations.
pub struct ListingRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ListingRepository<'a> {
    /// Create a new listing repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get a listing that has not been soft-deleted.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: ListingId) -> Result<Option<Listing>, RepositoryError> {
        let row = sqlx::query_as::<_, ListingRow>(
            r"
            SELECT id, user_id, trade_type, item_id, wanted_item_ids, quantity, price,
                   status, deleted_at, created_at, updated_at
            FROM market.listings
            WHERE id = $1 AND deleted_at IS NULL
            ",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Listing::from))
    }

    /// Active listings for an item, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_active_for_item(
        &self,
        item_id: ItemId,
        limit: i64,
    ) -> Result<Vec<Listing>, RepositoryError> {
        let rows = sqlx::query_as::<_, ListingRow>(
            r"
            SELECT id, user_id, trade_type, item_id, wanted_item_ids, quantity, price,
                   status, deleted_at, created_at, updated_at
            FROM market.listings
            WHERE item_id = $1 AND status = 'active' AND deleted_at IS NULL
            ORDER BY created_at DESC
            LIMIT $2
            ",
        )
        .bind(item_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Listing::from).collect())
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Create a listing and count it against the owner's quota.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Validation` if the input is malformed.
    /// Returns `RepositoryError::QuotaExceeded` if an active listing would
    /// exceed `max_active`.
    /// Returns `RepositoryError::Conflict` if the user does not exist.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn create(
        &self,
        user_id: UserId,
        input: &NewListing,
        max_active: i32,
    ) -> Result<Listing, RepositoryError> {
        input.validate()?;

        let mut tx = self.pool.begin().await?;
        let current = quotas::lock_counter(&mut tx, user_id).await?;

        let delta = quota_delta(None, Some(&input.snapshot()));
        if delta.takes_slot() && !QuotaSummary::new(current, max_active).has_free_slot() {
            return Err(RepositoryError::QuotaExceeded { limit: max_active });
        }

        let wanted: Vec<i32> = input.wanted_item_ids.iter().map(ItemId::as_i32).collect();
        let row = sqlx::query_as::<_, ListingRow>(
            r"
            INSERT INTO market.listings
                (user_id, trade_type, item_id, wanted_item_ids, quantity, price, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, user_id, trade_type, item_id, wanted_item_ids, quantity, price,
                      status, deleted_at, created_at, updated_at
            ",
        )
        .bind(user_id)
        .bind(input.trade_type)
        .bind(input.item_id)
        .bind(&wanted)
        .bind(input.quantity)
        .bind(input.price)
        .bind(input.status)
        .fetch_one(&mut *tx)
        .await
        .map_err(super::map_write_error)?;

        quotas::store_adjustment(&mut tx, user_id, current, apply_delta(current, delta)).await?;
        tx.commit().await?;

        let listing = Listing::from(row);
        tracing::info!(
            listing_id = %listing.id,
            user_id = %user_id,
            status = %listing.status,
            "Listing created"
        );
        Ok(listing)
    }

    /// Change a listing's status, adjusting the owner's quota.
    ///
    /// Setting the current status again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the listing does not exist, is
    /// owned by another user, or was soft-deleted.
    /// Returns `RepositoryError::QuotaExceeded` if reactivating would exceed
    /// `max_active`.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn update_status(
        &self,
        user_id: UserId,
        listing_id: ListingId,
        status: ListingStatus,
        max_active: i32,
    ) -> Result<Listing, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let current = quotas::lock_counter(&mut tx, user_id).await?;
        let before = lock_listing(&mut tx, user_id, listing_id).await?;

        if before.is_deleted() {
            return Err(RepositoryError::NotFound);
        }
        if before.status == status {
            tx.commit().await?;
            return Ok(before);
        }

        let mut after_snapshot = before.snapshot();
        after_snapshot.status = status;
        let delta = quota_delta(Some(&before.snapshot()), Some(&after_snapshot));
        if delta.takes_slot() && !QuotaSummary::new(current, max_active).has_free_slot() {
            return Err(RepositoryError::QuotaExceeded { limit: max_active });
        }

        let row = sqlx::query_as::<_, ListingRow>(
            r"
            UPDATE market.listings
            SET status = $2, updated_at = now()
            WHERE id = $1
            RETURNING id, user_id, trade_type, item_id, wanted_item_ids, quantity, price,
                      status, deleted_at, created_at, updated_at
            ",
        )
        .bind(listing_id)
        .bind(status)
        .fetch_one(&mut *tx)
        .await?;

        quotas::store_adjustment(&mut tx, user_id, current, apply_delta(current, delta)).await?;
        tx.commit().await?;

        tracing::info!(
            listing_id = %listing_id,
            user_id = %user_id,
            from = %before.status,
            to = %status,
            "Listing status changed"
        );
        Ok(row.into())
    }

    /// Soft-delete a listing, releasing its quota slot if it was active.
    ///
    /// Deleting an already deleted listing returns it unchanged.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the listing does not exist or is
    /// owned by another user.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn soft_delete(
        &self,
        user_id: UserId,
        listing_id: ListingId,
    ) -> Result<Listing, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let current = quotas::lock_counter(&mut tx, user_id).await?;
        let before = lock_listing(&mut tx, user_id, listing_id).await?;

        if before.is_deleted() {
            tx.commit().await?;
            return Ok(before);
        }

        let row = sqlx::query_as::<_, ListingRow>(
            r"
            UPDATE market.listings
            SET deleted_at = now(), updated_at = now()
            WHERE id = $1
            RETURNING id, user_id, trade_type, item_id, wanted_item_ids, quantity, price,
                      status, deleted_at, created_at, updated_at
            ",
        )
        .bind(listing_id)
        .fetch_one(&mut *tx)
        .await?;
        let after = Listing::from(row);

        let delta = quota_delta(Some(&before.snapshot()), Some(&after.snapshot()));
        quotas::store_adjustment(&mut tx, user_id, current, apply_delta(current, delta)).await?;
        tx.commit().await?;

        tracing::info!(listing_id = %listing_id, user_id = %user_id, "Listing soft-deleted");
        Ok(after)
    }

    /// Permanently delete a listing (operator use).
    ///
    /// Returns `None` if no listing has this ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if any query fails.
    pub async fn purge(&self, listing_id: ListingId) -> Result<Option<Listing>, RepositoryError> {
        let owner = sqlx::query_scalar::<_, UserId>(
            "SELECT user_id FROM market.listings WHERE id = $1",
        )
        .bind(listing_id)
        .fetch_optional(self.pool)
        .await?;

        let Some(user_id) = owner else {
            return Ok(None);
        };

        let mut tx = self.pool.begin().await?;
        let current = quotas::lock_counter(&mut tx, user_id).await?;

        let row = sqlx::query_as::<_, ListingRow>(
            r"
            DELETE FROM market.listings
            WHERE id = $1 AND user_id = $2
            RETURNING id, user_id, trade_type, item_id, wanted_item_ids, quantity, price,
                      status, deleted_at, created_at, updated_at
            ",
        )
        .bind(listing_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            // Deleted by someone else between the owner lookup and the lock.
            tx.commit().await?;
            return Ok(None);
        };
        let removed = Listing::from(row);

        let delta = quota_delta(Some(&removed.snapshot()), None);
        quotas::store_adjustment(&mut tx, user_id, current, apply_delta(current, delta)).await?;
        tx.commit().await?;

        tracing::info!(listing_id = %listing_id, user_id = %user_id, "Listing purged");
        Ok(Some(removed))
    }
}

//! Quota counter storage.
//!
//! Lock order for any write touching a user's listings is: quota row first
//! (`SELECT ... FOR UPDATE`), listing rows second. Reconciliation takes the
//! same quota row lock, so a recount never races a listing write for the
//! same user.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use marketboard_core::reconcile::{ReconcileMode, RecountOutcome};
use marketboard_core::UserId;
use marketboard_core::quota::QuotaAdjustment;

use super::RepositoryError;

/// A stored quota counter row.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct QuotaRecord {
    pub user_id: UserId,
    pub active_listings_count: i32,
    pub updated_at: DateTime<Utc>,
}

/// Create the user's quota row if missing and lock it for this transaction.
///
/// Returns the stored `active_listings_count`.
pub(crate) async fn lock_counter(
    conn: &mut PgConnection,
    user_id: UserId,
) -> Result<i32, RepositoryError> {
    sqlx::query(
        r"
        INSERT INTO market.user_quotas (user_id)
        VALUES ($1)
        ON CONFLICT (user_id) DO NOTHING
        ",
    )
    .bind(user_id)
    .execute(&mut *conn)
    .await
    .map_err(super::map_write_error)?;

    let count = sqlx::query_scalar::<_, i32>(
        r"
        SELECT active_listings_count
        FROM market.user_quotas
        WHERE user_id = $1
        FOR UPDATE
        ",
    )
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(count)
}

/// Overwrite a locked counter with an absolute value.
pub(crate) async fn write_counter(
    conn: &mut PgConnection,
    user_id: UserId,
    value: i32,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        UPDATE market.user_quotas
        SET active_listings_count = $2, updated_at = now()
        WHERE user_id = $1
        ",
    )
    .bind(user_id)
    .bind(value)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Store an adjustment computed from a locked counter.
pub(crate) async fn store_adjustment(
    conn: &mut PgConnection,
    user_id: UserId,
    previous: i32,
    adjustment: QuotaAdjustment,
) -> Result<(), RepositoryError> {
    if adjustment.clamped {
        tracing::warn!(
            user_id = %user_id,
            previous,
            "Quota counter clamped at zero; counter had drifted before this write"
        );
    }
    // A clamp still stamps `updated_at`, recording when the drift surfaced.
    if adjustment.value != previous || adjustment.clamped {
        write_counter(conn, user_id, adjustment.value).await?;
    }
    Ok(())
}

/// Ground-truth count of a user's active, non-deleted listings.
async fn count_active(conn: &mut PgConnection, user_id: UserId) -> Result<i32, RepositoryError> {
    let count = sqlx::query_scalar::<_, i64>(
        r"
        SELECT COUNT(*)
        FROM market.listings
        WHERE user_id = $1 AND status = 'active' AND deleted_at IS NULL
        ",
    )
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;

    i32::try_from(count).map_err(|_| {
        RepositoryError::DataCorruption(format!("active listing count {count} overflows i32"))
    })
}

/// Repository for quota counter reads and reconciliation writes.
pub struct QuotaRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> QuotaRepository<'a> {
    /// Create a new quota repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a user's quota row.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, user_id: UserId) -> Result<Option<QuotaRecord>, RepositoryError> {
        let record = sqlx::query_as::<_, QuotaRecord>(
            r"
            SELECT user_id, active_listings_count, updated_at
            FROM market.user_quotas
            WHERE user_id = $1
            ",
        )
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(record)
    }

    /// Users that have a quota row, in ID order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn holders(&self, only: Option<UserId>) -> Result<Vec<UserId>, RepositoryError> {
        let ids = sqlx::query_scalar::<_, UserId>(
            r"
            SELECT user_id
            FROM market.user_quotas
            WHERE $1::INTEGER IS NULL OR user_id = $1
            ORDER BY user_id
            ",
        )
        .bind(only)
        .fetch_all(self.pool)
        .await?;

        Ok(ids)
    }

    /// Recount one user's active listings and overwrite a drifted counter.
    ///
    /// Runs in its own transaction holding the user's quota row lock.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user has no quota row.
    /// Returns `RepositoryError::Database` if any query fails.
    pub async fn recount(
        &self,
        user_id: UserId,
        mode: ReconcileMode,
    ) -> Result<RecountOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let recorded = sqlx::query_scalar::<_, i32>(
            r"
            SELECT active_listings_count
            FROM market.user_quotas
            WHERE user_id = $1
            FOR UPDATE
            ",
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        let actual = count_active(&mut *tx, user_id).await?;

        let repaired = recorded != actual && mode == ReconcileMode::Apply;
        if repaired {
            write_counter(&mut *tx, user_id, actual).await?;
        }

        tx.commit().await?;

        Ok(RecountOutcome {
            recorded,
            actual,
            repaired,
        })
    }

    /// Create quota rows for users that own listings but have no counter.
    ///
    /// New rows start at zero; the following recount sets the real value.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn seed_missing(&self) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r"
            INSERT INTO market.user_quotas (user_id)
            SELECT DISTINCT l.user_id
            FROM market.listings l
            LEFT JOIN market.user_quotas q ON q.user_id = l.user_id
            WHERE q.user_id IS NULL
            ON CONFLICT (user_id) DO NOTHING
            ",
        )
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

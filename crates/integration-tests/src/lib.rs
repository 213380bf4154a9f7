//! Integration test support for Marketboard.
//!
//! # Running Tests
//!
//! ```bash
//! # In-memory scenarios only
//! cargo test -p marketboard-integration-tests
//!
//! # Including PostgreSQL and Redis backed tests
//! DATABASE_URL=postgres://localhost/marketboard_test \
//! REDIS_URL=redis://127.0.0.1:6379 \
//!     cargo test -p marketboard-integration-tests -- --include-ignored
//! ```
//!
//! # Test Categories
//!
//! - `listing_quota` - Listing write path keeps counters in step (`PostgreSQL`)
//! - `reconciliation` - Drift repair over [`InMemoryMarket`] and `PostgreSQL`
//! - `ip_quota` - Limiter behaviour under concurrency (memory and Redis)

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use tokio::sync::Mutex;
use uuid::Uuid;

use marketboard_core::quota::{apply_delta, quota_delta};
use marketboard_core::reconcile::{ReconcileMode, RecountOutcome};
use marketboard_core::{ListingId, ListingSnapshot, ListingStatus, UserId};
use marketboard_server::config::get_database_url;
use marketboard_server::db::RepositoryError;
use marketboard_server::reconcile::QuotaLedger;

// =============================================================================
// PostgreSQL Context
// =============================================================================

/// Connection to a migrated test database.
pub struct TestContext {
    pub pool: PgPool,
}

impl TestContext {
    /// Connect to `MARKETBOARD_DATABASE_URL` / `DATABASE_URL` and apply migrations.
    ///
    /// # Panics
    ///
    /// Panics if the database is unreachable or migrations fail.
    #[allow(clippy::expect_used)]
    pub async fn new() -> Self {
        let url = get_database_url("MARKETBOARD_DATABASE_URL")
            .expect("DATABASE_URL must be set for database tests");
        let pool = PgPool::connect(url.expose_secret())
            .await
            .expect("Failed to connect to test database");
        sqlx::migrate!("../server/migrations")
            .run(&pool)
            .await
            .expect("Failed to run migrations");
        Self { pool }
    }

    /// Insert a fresh user with a unique Discord ID.
    ///
    /// # Panics
    ///
    /// Panics if the insert fails.
    #[allow(clippy::expect_used)]
    pub async fn create_user(&self, display_name: &str) -> UserId {
        sqlx::query_scalar::<_, UserId>(
            "INSERT INTO market.users (discord_id, display_name) VALUES ($1, $2) RETURNING id",
        )
        .bind(format!("test-{}", Uuid::new_v4()))
        .bind(display_name)
        .fetch_one(&self.pool)
        .await
        .expect("Failed to create test user")
    }

    /// Overwrite a counter behind the write path's back.
    ///
    /// # Panics
    ///
    /// Panics if the update fails.
    #[allow(clippy::expect_used)]
    pub async fn force_counter(&self, user_id: UserId, value: i32) {
        sqlx::query("UPDATE market.user_quotas SET active_listings_count = $2 WHERE user_id = $1")
            .bind(user_id)
            .bind(value)
            .execute(&self.pool)
            .await
            .expect("Failed to force counter");
    }
}

// =============================================================================
// In-Memory Market
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct StoredListing {
    owner: UserId,
    snapshot: ListingSnapshot,
}

#[derive(Debug, Default)]
struct MarketState {
    next_id: i32,
    listings: BTreeMap<ListingId, StoredListing>,
    counters: BTreeMap<UserId, i32>,
}

impl MarketState {
    fn apply(
        &mut self,
        owner: UserId,
        before: Option<&ListingSnapshot>,
        after: Option<&ListingSnapshot>,
    ) {
        let counter = self.counters.entry(owner).or_insert(0);
        *counter = apply_delta(*counter, quota_delta(before, after)).value;
    }

    fn actual(&self, owner: UserId) -> i32 {
        let count = self
            .listings
            .values()
            .filter(|l| l.owner == owner && l.snapshot.counts_toward_quota())
            .count();
        i32::try_from(count).unwrap_or(i32::MAX)
    }
}

/// Listings and counters held in memory, updated with the same quota
/// arithmetic as the `PostgreSQL` write path.
#[derive(Debug, Default)]
pub struct InMemoryMarket {
    state: Mutex<MarketState>,
}

impl InMemoryMarket {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a listing in `status`.
    pub async fn create(&self, owner: UserId, status: ListingStatus) -> ListingId {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let id = ListingId::new(state.next_id);
        let snapshot = ListingSnapshot::live(status);
        state.listings.insert(id, StoredListing { owner, snapshot });
        state.apply(owner, None, Some(&snapshot));
        id
    }

    /// Change a listing's status. Returns `false` if the listing is gone.
    pub async fn set_status(&self, id: ListingId, status: ListingStatus) -> bool {
        self.update(id, |s| ListingSnapshot { status, ..s }).await
    }

    /// Soft-delete a listing. Returns `false` if the listing is gone.
    pub async fn soft_delete(&self, id: ListingId) -> bool {
        self.update(id, |s| s.soft_deleted(Utc::now())).await
    }

    /// Remove a listing entirely. Returns `false` if the listing is gone.
    pub async fn purge(&self, id: ListingId) -> bool {
        let mut state = self.state.lock().await;
        let Some(listing) = state.listings.remove(&id) else {
            return false;
        };
        state.apply(listing.owner, Some(&listing.snapshot), None);
        true
    }

    async fn update(
        &self,
        id: ListingId,
        change: impl FnOnce(ListingSnapshot) -> ListingSnapshot + Send,
    ) -> bool {
        let mut state = self.state.lock().await;
        let Some(listing) = state.listings.get_mut(&id) else {
            return false;
        };
        let before = listing.snapshot;
        listing.snapshot = change(before);
        let (owner, after) = (listing.owner, listing.snapshot);
        state.apply(owner, Some(&before), Some(&after));
        true
    }

    /// Stored counter of `owner`.
    pub async fn counter(&self, owner: UserId) -> Option<i32> {
        self.state.lock().await.counters.get(&owner).copied()
    }

    /// Ground-truth count of `owner`'s active listings.
    pub async fn actual(&self, owner: UserId) -> i32 {
        self.state.lock().await.actual(owner)
    }

    /// Overwrite a counter, simulating drift.
    pub async fn force_counter(&self, owner: UserId, value: i32) {
        self.state.lock().await.counters.insert(owner, value);
    }
}

#[async_trait]
impl QuotaLedger for InMemoryMarket {
    async fn quota_holders(&self, only: Option<UserId>) -> Result<Vec<UserId>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .counters
            .keys()
            .copied()
            .filter(|id| only.is_none_or(|o| o == *id))
            .collect())
    }

    async fn recount(
        &self,
        user_id: UserId,
        mode: ReconcileMode,
    ) -> Result<RecountOutcome, RepositoryError> {
        let mut state = self.state.lock().await;
        let recorded = *state
            .counters
            .get(&user_id)
            .ok_or(RepositoryError::NotFound)?;
        let actual = state.actual(user_id);

        let repaired = recorded != actual && mode == ReconcileMode::Apply;
        if repaired {
            state.counters.insert(user_id, actual);
        }

        Ok(RecountOutcome {
            recorded,
            actual,
            repaired,
        })
    }
}

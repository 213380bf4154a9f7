//! Quota reconciliation scenarios.
//!
//! The in-memory scenarios run everywhere. The `PostgreSQL` ones need a
//! migrated database at `DATABASE_URL`.

#![allow(clippy::unwrap_used)]

use marketboard_core::reconcile::ReconcileMode;
use marketboard_core::{ItemId, ListingStatus, NewListing, TradeType, UserId};
use marketboard_integration_tests::{InMemoryMarket, TestContext};
use marketboard_server::db::{ListingRepository, QuotaRepository};
use marketboard_server::reconcile::{PgQuotaLedger, Reconciler};

// ============================================================================
// In-Memory Scenarios
// ============================================================================

#[tokio::test]
async fn test_counter_tracks_writes_and_reconcile_is_a_no_op() {
    let market = InMemoryMarket::new();
    let alice = UserId::new(1);

    let first = market.create(alice, ListingStatus::Active).await;
    market.create(alice, ListingStatus::Active).await;
    market.create(alice, ListingStatus::Active).await;
    assert_eq!(market.counter(alice).await, Some(3));

    assert!(market.soft_delete(first).await);
    assert_eq!(market.counter(alice).await, Some(2));

    let report = Reconciler::new(market, ReconcileMode::Apply)
        .run(None)
        .await
        .unwrap();
    assert_eq!(report.scanned, 1);
    assert_eq!(report.fixed, 0);
    assert_eq!(report.already_correct, 1);
}

#[tokio::test]
async fn test_reconcile_repairs_forced_drift() {
    let market = InMemoryMarket::new();
    let alice = UserId::new(1);
    let bob = UserId::new(2);

    market.create(alice, ListingStatus::Active).await;
    market.create(alice, ListingStatus::Active).await;
    market.create(bob, ListingStatus::Sold).await;
    market.force_counter(alice, 5).await;

    let reconciler = Reconciler::new(market, ReconcileMode::Apply);
    let report = reconciler.run(None).await.unwrap();

    assert_eq!(report.fixed, 1);
    assert_eq!(report.drift.len(), 1);
    let drift = report.drift.first().unwrap();
    assert_eq!(drift.user_id, alice);
    assert_eq!(drift.recorded, 5);
    assert_eq!(drift.actual, 2);
    assert_eq!(reconciler.ledger().counter(alice).await, Some(2));
    assert_eq!(reconciler.ledger().counter(bob).await, Some(0));

    let again = reconciler.run(None).await.unwrap();
    assert_eq!(again.fixed, 0);
}

#[tokio::test]
async fn test_status_cycle_keeps_counter_exact() {
    let market = InMemoryMarket::new();
    let alice = UserId::new(7);

    let listing = market.create(alice, ListingStatus::Active).await;
    market.set_status(listing, ListingStatus::Sold).await;
    market.set_status(listing, ListingStatus::Cancelled).await;
    market.set_status(listing, ListingStatus::Active).await;
    market.set_status(listing, ListingStatus::Active).await;
    assert_eq!(market.counter(alice).await, Some(1));

    market.soft_delete(listing).await;
    market.soft_delete(listing).await;
    assert_eq!(market.counter(alice).await, Some(0));

    market.purge(listing).await;
    assert_eq!(market.counter(alice).await, Some(0));
    assert_eq!(market.actual(alice).await, 0);
}

#[tokio::test]
async fn test_counter_clamps_at_zero() {
    let market = InMemoryMarket::new();
    let alice = UserId::new(3);

    let listing = market.create(alice, ListingStatus::Active).await;
    market.force_counter(alice, 0).await;
    market.purge(listing).await;

    assert_eq!(market.counter(alice).await, Some(0));
}

// ============================================================================
// PostgreSQL Scenarios
// ============================================================================

fn sell(item: i32) -> NewListing {
    NewListing {
        trade_type: TradeType::Sell,
        item_id: ItemId::new(item),
        wanted_item_ids: Vec::new(),
        quantity: 1,
        price: Some(1_000),
        status: ListingStatus::Active,
    }
}

#[tokio::test]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn test_pg_reconcile_repairs_drift() {
    let ctx = TestContext::new().await;
    let user = ctx.create_user("drifter").await;
    let listings = ListingRepository::new(&ctx.pool);

    listings.create(user, &sell(10), 10).await.unwrap();
    listings.create(user, &sell(11), 10).await.unwrap();
    ctx.force_counter(user, 5).await;

    let reconciler = Reconciler::new(PgQuotaLedger::new(ctx.pool.clone()), ReconcileMode::Apply);
    let report = reconciler.run(Some(user)).await.unwrap();
    assert_eq!(report.fixed, 1);

    let record = QuotaRepository::new(&ctx.pool).get(user).await.unwrap().unwrap();
    assert_eq!(record.active_listings_count, 2);

    let again = reconciler.run(Some(user)).await.unwrap();
    assert_eq!(again.fixed, 0);
    assert_eq!(again.already_correct, 1);
}

#[tokio::test]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn test_pg_dry_run_leaves_counter() {
    let ctx = TestContext::new().await;
    let user = ctx.create_user("dry").await;

    ListingRepository::new(&ctx.pool)
        .create(user, &sell(12), 10)
        .await
        .unwrap();
    ctx.force_counter(user, 4).await;

    let report = Reconciler::new(PgQuotaLedger::new(ctx.pool.clone()), ReconcileMode::DryRun)
        .run(Some(user))
        .await
        .unwrap();
    assert_eq!(report.drifted(), 1);
    assert_eq!(report.fixed, 0);

    let record = QuotaRepository::new(&ctx.pool).get(user).await.unwrap().unwrap();
    assert_eq!(record.active_listings_count, 4);
}

#[tokio::test]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn test_pg_seed_missing_counters() {
    let ctx = TestContext::new().await;
    let user = ctx.create_user("legacy").await;

    // A listing inserted without going through the write path.
    sqlx::query(
        "INSERT INTO market.listings (user_id, trade_type, item_id) VALUES ($1, 'sell', 13)",
    )
    .bind(user)
    .execute(&ctx.pool)
    .await
    .unwrap();

    let ledger = PgQuotaLedger::new(ctx.pool.clone());
    assert!(ledger.seed_missing().await.unwrap() >= 1);

    let report = Reconciler::new(ledger, ReconcileMode::Apply)
        .run(Some(user))
        .await
        .unwrap();
    assert_eq!(report.fixed, 1);

    let record = QuotaRepository::new(&ctx.pool).get(user).await.unwrap().unwrap();
    assert_eq!(record.active_listings_count, 1);
}

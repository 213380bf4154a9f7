//! Listing write path against `PostgreSQL`.
//!
//! Requires a database at `DATABASE_URL`; migrations are applied on connect.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use marketboard_core::{ItemId, ListingStatus, NewListing, TradeType, UserId};
use marketboard_integration_tests::TestContext;
use marketboard_server::db::{ListingRepository, QuotaRepository, RepositoryError};

fn listing(trade_type: TradeType, item: i32) -> NewListing {
    NewListing {
        trade_type,
        item_id: ItemId::new(item),
        wanted_item_ids: if trade_type == TradeType::Exchange {
            vec![ItemId::new(item + 1)]
        } else {
            Vec::new()
        },
        quantity: 1,
        price: None,
        status: ListingStatus::Active,
    }
}

async fn counter(ctx: &TestContext, user: UserId) -> i32 {
    QuotaRepository::new(&ctx.pool)
        .get(user)
        .await
        .unwrap()
        .map_or(0, |r| r.active_listings_count)
}

#[tokio::test]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn test_counter_follows_listing_lifecycle() {
    let ctx = TestContext::new().await;
    let user = ctx.create_user("lifecycle").await;
    let repo = ListingRepository::new(&ctx.pool);

    let a = repo.create(user, &listing(TradeType::Sell, 100), 10).await.unwrap();
    let b = repo.create(user, &listing(TradeType::Buy, 101), 10).await.unwrap();
    repo.create(user, &listing(TradeType::Exchange, 102), 10).await.unwrap();
    assert_eq!(counter(&ctx, user).await, 3);

    repo.soft_delete(user, a.id).await.unwrap();
    assert_eq!(counter(&ctx, user).await, 2);

    // Deleting twice changes nothing.
    repo.soft_delete(user, a.id).await.unwrap();
    assert_eq!(counter(&ctx, user).await, 2);

    repo.update_status(user, b.id, ListingStatus::Sold, 10).await.unwrap();
    assert_eq!(counter(&ctx, user).await, 1);

    repo.update_status(user, b.id, ListingStatus::Active, 10).await.unwrap();
    assert_eq!(counter(&ctx, user).await, 2);

    repo.purge(b.id).await.unwrap().unwrap();
    assert_eq!(counter(&ctx, user).await, 1);

    // Purging a soft-deleted listing releases nothing.
    repo.purge(a.id).await.unwrap().unwrap();
    assert_eq!(counter(&ctx, user).await, 1);
}

#[tokio::test]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn test_non_active_create_does_not_count() {
    let ctx = TestContext::new().await;
    let user = ctx.create_user("archived").await;
    let mut input = listing(TradeType::Sell, 110);
    input.status = ListingStatus::Sold;

    ListingRepository::new(&ctx.pool)
        .create(user, &input, 10)
        .await
        .unwrap();
    assert_eq!(counter(&ctx, user).await, 0);
}

#[tokio::test]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn test_cap_rejects_extra_active_listing() {
    let ctx = TestContext::new().await;
    let user = ctx.create_user("capped").await;
    let repo = ListingRepository::new(&ctx.pool);

    for item in 0..2 {
        repo.create(user, &listing(TradeType::Sell, 200 + item), 2).await.unwrap();
    }
    let err = repo
        .create(user, &listing(TradeType::Sell, 202), 2)
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::QuotaExceeded { limit: 2 }));
    assert_eq!(counter(&ctx, user).await, 2);
}

#[tokio::test]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn test_other_users_listing_is_not_found() {
    let ctx = TestContext::new().await;
    let owner = ctx.create_user("owner").await;
    let intruder = ctx.create_user("intruder").await;
    let repo = ListingRepository::new(&ctx.pool);

    let created = repo.create(owner, &listing(TradeType::Sell, 300), 10).await.unwrap();
    let err = repo.soft_delete(intruder, created.id).await.unwrap_err();
    assert!(matches!(err, RepositoryError::NotFound));
    assert_eq!(counter(&ctx, owner).await, 1);
}

#[tokio::test]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn test_concurrent_creates_never_lose_updates() {
    const WRITERS: i32 = 20;
    let ctx = Arc::new(TestContext::new().await);
    let user = ctx.create_user("concurrent").await;

    let handles: Vec<_> = (0..WRITERS)
        .map(|i| {
            let ctx = Arc::clone(&ctx);
            tokio::spawn(async move {
                ListingRepository::new(&ctx.pool)
                    .create(user, &listing(TradeType::Sell, 400 + i), 10)
                    .await
            })
        })
        .collect();

    let mut created = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(RepositoryError::QuotaExceeded { .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(created, 10);
    assert_eq!(counter(&ctx, user).await, 10);
}

#[tokio::test]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn test_create_for_missing_user_conflicts() {
    let ctx = TestContext::new().await;
    let err = ListingRepository::new(&ctx.pool)
        .create(UserId::new(i32::MAX), &listing(TradeType::Sell, 500), 10)
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Conflict(_)));
}

#[tokio::test]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn test_clamped_decrement_touches_updated_at() {
    let ctx = TestContext::new().await;
    let user = ctx.create_user("clamped").await;
    let repo = ListingRepository::new(&ctx.pool);
    let quotas = QuotaRepository::new(&ctx.pool);

    let created = repo.create(user, &listing(TradeType::Sell, 600), 10).await.unwrap();
    ctx.force_counter(user, 0).await;
    let before = quotas.get(user).await.unwrap().unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    repo.soft_delete(user, created.id).await.unwrap();

    let after = quotas.get(user).await.unwrap().unwrap();
    assert_eq!(after.active_listings_count, 0);
    assert!(after.updated_at > before.updated_at);
}

#[tokio::test]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn test_failed_counter_write_rolls_back_listing() {
    let ctx = TestContext::new().await;
    let user = ctx.create_user("rollback").await;
    let repo = ListingRepository::new(&ctx.pool);
    let constraint = format!("test_counter_cap_{}", user.as_i32());

    // Counter updates for this user fail once they would exceed 1.
    sqlx::query(&format!(
        "ALTER TABLE market.user_quotas ADD CONSTRAINT {constraint} \
         CHECK (user_id <> {user} OR active_listings_count <= 1) NOT VALID"
    ))
    .execute(&ctx.pool)
    .await
    .unwrap();

    repo.create(user, &listing(TradeType::Sell, 700), 10).await.unwrap();
    let result = repo.create(user, &listing(TradeType::Sell, 701), 10).await;

    sqlx::query(&format!(
        "ALTER TABLE market.user_quotas DROP CONSTRAINT {constraint}"
    ))
    .execute(&ctx.pool)
    .await
    .unwrap();

    assert!(matches!(result, Err(RepositoryError::Database(_))));

    let persisted: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM market.listings WHERE user_id = $1")
            .bind(user)
            .fetch_one(&ctx.pool)
            .await
            .unwrap();
    assert_eq!(persisted, 1);
    assert_eq!(counter(&ctx, user).await, 1);
}

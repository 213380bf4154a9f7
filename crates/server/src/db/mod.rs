//! Database operations for the marketplace `PostgreSQL`.
//!
//! # Schema: `market`
//!
//! ## Tables
//!
//! - `users` - Marketplace users (identity comes from the upstream auth proxy)
//! - `listings` - Sell/buy/exchange listings, soft-deleted via `deleted_at`
//! - `user_quotas` - One counter row per user holding `active_listings_count`
//!
//! `user_quotas` is only written by [`listings::ListingRepository`] (inside the
//! listing's own transaction) and by reconciliation.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p marketboard-cli -- migrate
//! ```

pub mod listings;
pub mod quotas;

use std::time::Duration;

use marketboard_core::ListingValidationError;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use listings::ListingRepository;
pub use quotas::QuotaRepository;

/// Errors from repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., foreign key to a missing user).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// The user already has the maximum number of active listings.
    #[error("active listing limit of {limit} reached")]
    QuotaExceeded { limit: i32 },

    /// Input rejected before reaching the database.
    #[error("invalid listing: {0}")]
    Validation(#[from] ListingValidationError),
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Map foreign key violations to `RepositoryError::Conflict`.
pub(crate) fn map_write_error(e: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_foreign_key_violation()
    {
        return RepositoryError::Conflict("user does not exist".to_owned());
    }
    RepositoryError::Database(e)
}

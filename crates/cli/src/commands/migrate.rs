//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! mb-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `MARKETBOARD_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! # Migration Files
//!
//! Migrations live in `crates/server/migrations/` and are embedded into the
//! binary at compile time.

use secrecy::ExposeSecret;
use sqlx::PgPool;

use marketboard_server::config::{ConfigError, get_database_url};

/// Errors from running migrations.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Run marketplace database migrations.
///
/// # Errors
///
/// Returns `MigrationError` if the database URL is missing, the connection
/// fails, or a migration fails to apply.
pub async fn run() -> Result<(), MigrationError> {
    dotenvy::dotenv().ok();

    let database_url = get_database_url("MARKETBOARD_DATABASE_URL")?;

    tracing::info!("Connecting to marketplace database...");
    let pool = PgPool::connect(database_url.expose_secret()).await?;

    tracing::info!("Running marketplace migrations...");
    sqlx::migrate!("../server/migrations").run(&pool).await?;

    tracing::info!("Marketplace migrations complete!");
    Ok(())
}

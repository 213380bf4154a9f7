//! `mb-cli` subcommand implementations.

pub mod ip_quota;
pub mod listings;
pub mod migrate;
pub mod quota;
pub mod reconcile;

use sqlx::PgPool;

use marketboard_server::config::get_database_url;
use marketboard_server::db;

/// Connect to the marketplace database named by `MARKETBOARD_DATABASE_URL`
/// (or `DATABASE_URL`).
pub async fn connect() -> Result<PgPool, Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let database_url = get_database_url("MARKETBOARD_DATABASE_URL")?;
    let pool = db::create_pool(&database_url).await?;
    tracing::debug!("Connected to database");
    Ok(pool)
}

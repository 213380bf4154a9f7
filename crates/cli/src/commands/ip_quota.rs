//! IP quota operator commands.
//!
//! Operates on the shared Redis counters named by `REDIS_URL`; in-process
//! counters of a running server are not reachable from here.

use std::net::IpAddr;
use std::sync::Arc;

use secrecy::ExposeSecret;

use marketboard_server::ip_quota::{IpQuotaLimiter, RedisCounterStore};

async fn limiter() -> Result<IpQuotaLimiter, Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let url = std::env::var("REDIS_URL")
        .map(secrecy::SecretString::from)
        .map_err(|_| "REDIS_URL not set")?;
    let store = RedisCounterStore::connect(url.expose_secret()).await?;
    Ok(IpQuotaLimiter::new(Arc::new(store)))
}

/// Print the window for `ip` under `quota_key`.
///
/// # Errors
///
/// Returns an error if Redis is not configured or unreachable.
pub async fn status(
    ip: IpAddr,
    quota_key: &str,
    max_quota: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let status = limiter().await?.status(ip, quota_key, max_quota).await;

    #[allow(clippy::print_stdout)]
    {
        println!("{}", serde_json::to_string_pretty(&status)?);
    }
    Ok(())
}

/// Clear the window for `ip` under `quota_key`.
///
/// # Errors
///
/// Returns an error if Redis is not configured, unreachable, or the delete fails.
pub async fn reset(ip: IpAddr, quota_key: &str) -> Result<(), Box<dyn std::error::Error>> {
    limiter().await?.reset(ip, quota_key).await?;
    Ok(())
}

//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `MARKETBOARD_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! ## Optional
//! - `MARKETBOARD_HOST` - Bind address (default: 127.0.0.1)
//! - `MARKETBOARD_PORT` - Listen port (default: 3000)
//! - `REDIS_URL` - Redis for IP quotas (default: in-process counters)
//! - `MARKETBOARD_MAX_ACTIVE_LISTINGS` - Active listings per user (default: 10)
//! - `MARKETBOARD_PUBLIC_READ_QUOTA_MAX` - Public reads per IP per window (default: 120)
//! - `MARKETBOARD_PUBLIC_READ_QUOTA_TTL_SECS` - Public read window length (default: 60)
//! - `MARKETBOARD_TRUST_PROXY_HEADERS` - Take the client IP from proxy headers (default: true).
//!   Set to `false` unless a proxy in front of the server overwrites those headers.
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Error sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Transaction sample rate (default: 0.0)

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

/// Quota key used for public read endpoints.
pub const PUBLIC_READ_QUOTA_KEY: &str = "public_read";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Marketboard server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// Redis URL for shared IP quota counters
    pub redis_url: Option<SecretString>,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Per-user listing quota
    pub listings: ListingQuotaConfig,
    /// Per-IP quota for public read endpoints
    pub public_read_quota: IpQuotaConfig,
    /// Whether client IP headers set by a proxy are trusted
    pub trust_proxy_headers: bool,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g. "production")
    pub sentry_environment: Option<String>,
    /// Fraction of errors sent to Sentry
    pub sentry_sample_rate: f32,
    /// Fraction of transactions traced
    pub sentry_traces_sample_rate: f32,
}

/// Per-user listing quota configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingQuotaConfig {
    /// Maximum number of simultaneously active listings per user
    pub max_active: i32,
}

impl Default for ListingQuotaConfig {
    fn default() -> Self {
        Self { max_active: 10 }
    }
}

/// Fixed-window per-IP quota configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpQuotaConfig {
    /// Counter namespace for this quota
    pub quota_key: String,
    /// Calls allowed per window
    pub max_quota: u32,
    /// Window length
    pub ttl: Duration,
}

impl Default for IpQuotaConfig {
    fn default() -> Self {
        Self {
            quota_key: PUBLIC_READ_QUOTA_KEY.to_owned(),
            max_quota: 120,
            ttl: Duration::from_secs(60),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("MARKETBOARD_DATABASE_URL")?;
        let redis_url = get_optional_env("REDIS_URL").map(SecretString::from);
        let host = parse_env_or_default("MARKETBOARD_HOST", "127.0.0.1")?;
        let port = parse_env_or_default("MARKETBOARD_PORT", "3000")?;

        let max_active: i32 = parse_env_or_default("MARKETBOARD_MAX_ACTIVE_LISTINGS", "10")?;
        if max_active < 0 {
            return Err(ConfigError::InvalidEnvVar(
                "MARKETBOARD_MAX_ACTIVE_LISTINGS".to_string(),
                "must not be negative".to_string(),
            ));
        }

        let public_read_quota = IpQuotaConfig {
            quota_key: PUBLIC_READ_QUOTA_KEY.to_owned(),
            max_quota: parse_env_or_default("MARKETBOARD_PUBLIC_READ_QUOTA_MAX", "120")?,
            ttl: Duration::from_secs(parse_env_or_default(
                "MARKETBOARD_PUBLIC_READ_QUOTA_TTL_SECS",
                "60",
            )?),
        };
        if public_read_quota.ttl.is_zero() {
            return Err(ConfigError::InvalidEnvVar(
                "MARKETBOARD_PUBLIC_READ_QUOTA_TTL_SECS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            database_url,
            redis_url,
            host,
            port,
            listings: ListingQuotaConfig { max_active },
            public_read_quota,
            trust_proxy_headers: parse_env_or_default("MARKETBOARD_TRUST_PROXY_HEADERS", "true")?,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: parse_env_or_default("SENTRY_SAMPLE_RATE", "1.0")?,
            sentry_traces_sample_rate: parse_env_or_default("SENTRY_TRACES_SAMPLE_RATE", "0.0")?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get database URL with fallback to generic `DATABASE_URL`.
pub fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Parse an environment variable, falling back to `default`.
fn parse_env_or_default<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    parse_value(key, &get_env_or_default(key, default))
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value_trims() {
        let port: u16 = parse_value("MARKETBOARD_PORT", " 8080 ").unwrap();
        assert_eq!(port, 8080);
    }

    #[test]
    fn test_parse_value_reports_key() {
        let err = parse_value::<u16>("MARKETBOARD_PORT", "not-a-port").unwrap_err();
        match err {
            ConfigError::InvalidEnvVar(key, _) => assert_eq!(key, "MARKETBOARD_PORT"),
            ConfigError::MissingEnvVar(_) => panic!("expected InvalidEnvVar"),
        }
    }

    #[test]
    fn test_parse_bool_flag() {
        let trust: bool = parse_value("MARKETBOARD_TRUST_PROXY_HEADERS", "false").unwrap();
        assert!(!trust);
        assert!(parse_value::<bool>("MARKETBOARD_TRUST_PROXY_HEADERS", "maybe").is_err());
    }

    #[test]
    fn test_parse_ip() {
        let host: IpAddr = parse_value("MARKETBOARD_HOST", "0.0.0.0").unwrap();
        assert!(host.is_unspecified());
    }

    #[test]
    fn test_defaults() {
        assert_eq!(ListingQuotaConfig::default().max_active, 10);
        let quota = IpQuotaConfig::default();
        assert_eq!(quota.quota_key, PUBLIC_READ_QUOTA_KEY);
        assert_eq!(quota.max_quota, 120);
        assert_eq!(quota.ttl, Duration::from_secs(60));
    }

    #[test]
    fn test_socket_addr() {
        let config = ServerConfig {
            database_url: SecretString::from("postgres://localhost/test"),
            redis_url: None,
            host: "127.0.0.1".parse().unwrap(),
            port: 3000,
            listings: ListingQuotaConfig::default(),
            public_read_quota: IpQuotaConfig::default(),
            trust_proxy_headers: true,
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 0.0,
        };

        let addr = config.socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 3000);
    }

    #[test]
    fn test_debug_redacts_database_url() {
        let url = SecretString::from("postgres://market:hunter2@db/market");
        let debug_output = format!("{url:?}");
        assert!(!debug_output.contains("hunter2"));
    }
}

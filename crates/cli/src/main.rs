//! Marketboard CLI - migrations, quota reconciliation and operator tools.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! mb-cli migrate
//!
//! # Repair drifted quota counters (all users, or one)
//! mb-cli reconcile
//! mb-cli reconcile --user-id 42 --dry-run
//!
//! # Inspect a user's quota counter
//! mb-cli quota show --user-id 42
//!
//! # Permanently delete a listing
//! mb-cli listings purge --id 1001
//!
//! # Inspect or clear an IP quota window
//! mb-cli ip-quota status --ip 203.0.113.9
//! mb-cli ip-quota reset --ip 203.0.113.9 --key public_read
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::net::IpAddr;

use clap::{Parser, Subcommand};

use marketboard_server::config::{IpQuotaConfig, PUBLIC_READ_QUOTA_KEY};

mod commands;

#[derive(Parser)]
#[command(name = "mb-cli")]
#[command(author, version, about = "Marketboard CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Recount active listings and repair drifted quota counters
    Reconcile {
        /// Only reconcile this user
        #[arg(long)]
        user_id: Option<i32>,

        /// Report drift without writing
        #[arg(long)]
        dry_run: bool,

        /// Create missing counters for listing owners first
        #[arg(long)]
        seed_missing: bool,
    },
    /// Inspect listing quotas
    Quota {
        #[command(subcommand)]
        action: QuotaAction,
    },
    /// Operator actions on listings
    Listings {
        #[command(subcommand)]
        action: ListingsAction,
    },
    /// Inspect or reset per-IP quota windows
    IpQuota {
        #[command(subcommand)]
        action: IpQuotaAction,
    },
}

#[derive(Subcommand)]
enum QuotaAction {
    /// Show a user's stored counter and live count
    Show {
        #[arg(long)]
        user_id: i32,
    },
}

#[derive(Subcommand)]
enum ListingsAction {
    /// Permanently delete a listing
    Purge {
        #[arg(long)]
        id: i32,
    },
}

#[derive(Subcommand)]
enum IpQuotaAction {
    /// Show the current window
    Status {
        /// Client IP address
        #[arg(long)]
        ip: IpAddr,

        /// Quota key
        #[arg(long, default_value = PUBLIC_READ_QUOTA_KEY)]
        key: String,

        /// Calls allowed per window (defaults to the server's public read quota)
        #[arg(
            long,
            env = "MARKETBOARD_PUBLIC_READ_QUOTA_MAX",
            default_value_t = IpQuotaConfig::default().max_quota
        )]
        max: u32,
    },
    /// Clear the current window
    Reset {
        /// Client IP address
        #[arg(long)]
        ip: IpAddr,

        /// Quota key
        #[arg(long, default_value = PUBLIC_READ_QUOTA_KEY)]
        key: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    // Load .env before parsing so env-backed defaults match the server
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Reconcile {
            user_id,
            dry_run,
            seed_missing,
        } => commands::reconcile::run(user_id, dry_run, seed_missing).await?,
        Commands::Quota { action } => match action {
            QuotaAction::Show { user_id } => commands::quota::show(user_id).await?,
        },
        Commands::Listings { action } => match action {
            ListingsAction::Purge { id } => commands::listings::purge(id).await?,
        },
        Commands::IpQuota { action } => match action {
            IpQuotaAction::Status { ip, key, max } => {
                commands::ip_quota::status(ip, &key, max).await?;
            }
            IpQuotaAction::Reset { ip, key } => commands::ip_quota::reset(ip, &key).await?,
        },
    }
    Ok(())
}

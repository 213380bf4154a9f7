//! Quota reconciliation command.
//!
//! Recounts active listings per user and repairs drifted counters. Safe to
//! run repeatedly and while the server is live.

use marketboard_core::UserId;
use marketboard_core::reconcile::ReconcileMode;
use marketboard_server::reconcile::{PgQuotaLedger, Reconciler};

/// Reconcile quota counters and print the report as JSON.
///
/// # Errors
///
/// Returns an error if the database is unreachable, or if any user's recount
/// failed (after every other user has been processed).
pub async fn run(
    user_id: Option<i32>,
    dry_run: bool,
    seed_missing: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let pool = super::connect().await?;
    let ledger = PgQuotaLedger::new(pool);

    if seed_missing {
        if dry_run {
            tracing::warn!("--seed-missing ignored in dry run");
        } else {
            ledger.seed_missing().await?;
        }
    }

    let mode = if dry_run {
        ReconcileMode::DryRun
    } else {
        ReconcileMode::Apply
    };
    let report = Reconciler::new(ledger, mode)
        .run(user_id.map(UserId::new))
        .await?;

    #[allow(clippy::print_stdout)]
    {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    if report.failed > 0 {
        return Err(format!(
            "{} of {} users failed to reconcile",
            report.failed, report.scanned
        )
        .into());
    }
    Ok(())
}

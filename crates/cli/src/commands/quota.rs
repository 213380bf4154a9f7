//! Quota inspection command.

use marketboard_core::UserId;
use marketboard_core::reconcile::ReconcileMode;
use marketboard_server::db::QuotaRepository;

/// Show a user's stored counter next to a live recount.
///
/// # Errors
///
/// Returns an error if the user has no counter or the database fails.
pub async fn show(user_id: i32) -> Result<(), Box<dyn std::error::Error>> {
    let pool = super::connect().await?;
    let repo = QuotaRepository::new(&pool);
    let user_id = UserId::new(user_id);

    let record = repo
        .get(user_id)
        .await?
        .ok_or_else(|| format!("user {user_id} has no quota counter"))?;
    let outcome = repo.recount(user_id, ReconcileMode::DryRun).await?;

    #[allow(clippy::print_stdout)]
    {
        println!("user:            {user_id}");
        println!("stored count:    {}", record.active_listings_count);
        println!("actual count:    {}", outcome.actual);
        println!("updated at:      {}", record.updated_at.to_rfc3339());
        if outcome.drifted() {
            println!("drift detected; run `mb-cli reconcile --user-id {user_id}`");
        }
    }
    Ok(())
}

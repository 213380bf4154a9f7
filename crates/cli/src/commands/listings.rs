//! Listing operator commands.

use marketboard_core::ListingId;
use marketboard_server::db::ListingRepository;

/// Permanently delete a listing, releasing its quota slot if it held one.
///
/// # Errors
///
/// Returns an error if the listing does not exist or the database fails.
pub async fn purge(id: i32) -> Result<(), Box<dyn std::error::Error>> {
    let pool = super::connect().await?;
    let listing_id = ListingId::new(id);

    let listing = ListingRepository::new(&pool)
        .purge(listing_id)
        .await?
        .ok_or_else(|| format!("listing {listing_id} not found"))?;

    tracing::info!(
        listing_id = %listing.id,
        user_id = %listing.user_id,
        status = %listing.status,
        "Listing purged"
    );
    Ok(())
}

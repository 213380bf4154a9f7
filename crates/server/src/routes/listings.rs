//! Listing route handlers.
//!
//! Reads are public and IP-quota limited. Writes act on behalf of the
//! [`CurrentUser`] and go through [`ListingRepository`], which keeps the
//! owner's quota counter in step within the same transaction.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::instrument;

use marketboard_core::{ItemId, ListingId, ListingStatus, NewListing};

use crate::db::ListingRepository;
use crate::error::{AppError, Result};
use crate::middleware::CurrentUser;
use crate::models::Listing;
use crate::state::AppState;

/// Default page size for item listings.
const DEFAULT_PAGE_SIZE: i64 = 50;
/// Largest page size a client may ask for.
const MAX_PAGE_SIZE: i64 = 100;

/// Query parameters for listing an item's active listings.
#[derive(Debug, Default, Deserialize)]
pub struct ItemListingsQuery {
    pub limit: Option<i64>,
}

impl ItemListingsQuery {
    fn page_size(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }
}

/// Body of a status change.
#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: ListingStatus,
}

/// `GET /api/listings/{id}`
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<ListingId>,
) -> Result<Json<Listing>> {
    ListingRepository::new(state.pool())
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("listing {id}")))
}

/// `GET /api/items/{item_id}/listings`
#[instrument(skip(state))]
pub async fn for_item(
    State(state): State<AppState>,
    Path(item_id): Path<ItemId>,
    Query(query): Query<ItemListingsQuery>,
) -> Result<Json<Vec<Listing>>> {
    let listings = ListingRepository::new(state.pool())
        .list_active_for_item(item_id, query.page_size())
        .await?;
    Ok(Json(listings))
}

/// `POST /api/listings`
#[instrument(skip(state, input))]
pub async fn create(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(input): Json<NewListing>,
) -> Result<(StatusCode, Json<Listing>)> {
    let listing = ListingRepository::new(state.pool())
        .create(user_id, &input, state.max_active_listings())
        .await?;
    Ok((StatusCode::CREATED, Json(listing)))
}

/// `PATCH /api/listings/{id}/status`
#[instrument(skip(state))]
pub async fn update_status(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<ListingId>,
    Json(update): Json<StatusUpdate>,
) -> Result<Json<Listing>> {
    let listing = ListingRepository::new(state.pool())
        .update_status(user_id, id, update.status, state.max_active_listings())
        .await?;
    Ok(Json(listing))
}

/// `DELETE /api/listings/{id}`
#[instrument(skip(state))]
pub async fn delete(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<ListingId>,
) -> Result<StatusCode> {
    ListingRepository::new(state.pool())
        .soft_delete(user_id, id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

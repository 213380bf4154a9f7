//! HTTP route handlers for the marketboard API.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                        - Liveness (main.rs)
//! GET    /health/ready                  - Readiness (main.rs)
//!
//! # Public reads (per-IP quota)
//! GET    /api/listings/{id}             - Listing detail
//! GET    /api/items/{item_id}/listings  - Active listings for an item
//!
//! # Quota status
//! GET    /api/ip-quota/{quota_key}      - Caller's IP quota window
//! GET    /api/me/quota                  - Caller's active listing quota
//!
//! # Listing writes (x-user-id)
//! POST   /api/listings                  - Create listing
//! PATCH  /api/listings/{id}/status      - Change status
//! DELETE /api/listings/{id}             - Soft delete
//! ```

pub mod listings;
pub mod quota;

use axum::{
    Router, middleware,
    routing::{delete, get, patch, post},
};

use crate::middleware::enforce_ip_quota;
use crate::state::AppState;

/// Public read routes, limited per client IP.
fn public_read_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/listings/{id}", get(listings::show))
        .route("/items/{item_id}/listings", get(listings::for_item))
        .route_layer(middleware::from_fn_with_state(
            state.public_read_guard(),
            enforce_ip_quota,
        ))
}

/// Authenticated listing writes and quota status.
fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/listings", post(listings::create))
        .route("/listings/{id}", delete(listings::delete))
        .route("/listings/{id}/status", patch(listings::update_status))
        .route("/me/quota", get(quota::mine))
        .route("/ip-quota/{quota_key}", get(quota::ip_status))
}

/// Build the `/api` router.
pub fn routes(state: &AppState) -> Router<AppState> {
    Router::new().nest(
        "/api",
        public_read_routes(state).merge(account_routes()),
    )
}

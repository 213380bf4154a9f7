//! Quota status handlers.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;
use tracing::instrument;

use marketboard_core::quota::QuotaSummary;

use crate::db::QuotaRepository;
use crate::error::{AppError, Result};
use crate::middleware::{ClientIp, CurrentUser};
use crate::state::AppState;

/// Response of `GET /api/ip-quota/{quota_key}`.
#[derive(Debug, Serialize)]
pub struct IpQuotaStatusResponse {
    pub quota_key: String,
    pub max_quota: u32,
    pub used: i64,
    pub remaining: u32,
}

/// `GET /api/me/quota`
///
/// A user without a counter row has no listings yet.
#[instrument(skip(state))]
pub async fn mine(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<QuotaSummary>> {
    let active = QuotaRepository::new(state.pool())
        .get(user_id)
        .await?
        .map_or(0, |record| record.active_listings_count);

    Ok(Json(QuotaSummary::new(active, state.max_active_listings())))
}

/// `GET /api/ip-quota/{quota_key}`
///
/// Reads the caller's window without counting a call.
#[instrument(skip(state))]
pub async fn ip_status(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Path(quota_key): Path<String>,
) -> Result<Json<IpQuotaStatusResponse>> {
    let config = state.public_read_quota();
    if quota_key != config.quota_key {
        return Err(AppError::NotFound(format!("quota {quota_key}")));
    }
    let ip = ip.ok_or_else(|| AppError::BadRequest("client IP unavailable".to_string()))?;

    let status = state
        .limiter()
        .status(ip, &config.quota_key, config.max_quota)
        .await;

    Ok(Json(IpQuotaStatusResponse {
        quota_key,
        max_quota: config.max_quota,
        used: status.used,
        remaining: status.remaining,
    }))
}

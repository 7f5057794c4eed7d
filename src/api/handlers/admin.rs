use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::Json,
};
use log::info;
use std::sync::Arc;

use super::{require_admin, AppState};
use crate::api::error::ApiError;
use crate::api::models::{RecentReviewsParams, RecomputeResponse, ReviewResponse};
use crate::database::DashboardStats;

pub async fn admin_stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<DashboardStats>, ApiError> {
    require_admin(&state, &headers)?;
    Ok(Json(state.service.stats().await?))
}

pub async fn admin_recompute(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<RecomputeResponse>, ApiError> {
    require_admin(&state, &headers)?;
    info!("Admin triggered aggregate recompute");
    let recomputed = state.service.recompute_all().await?;
    Ok(Json(RecomputeResponse { recomputed }))
}

pub async fn admin_reviews(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<RecentReviewsParams>,
) -> Result<Json<Vec<ReviewResponse>>, ApiError> {
    require_admin(&state, &headers)?;
    let reviews = state.service.list_recent_reviews(params.limit()).await?;
    Ok(Json(reviews.into_iter().map(ReviewResponse::from).collect()))
}

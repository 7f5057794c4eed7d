use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use std::sync::Arc;

use super::{actor, current_user, AppState};
use crate::api::error::ApiError;
use crate::api::models::{ReviewResponse, SubmissionResponse};
use crate::domain::{ReviewEdit, ReviewId, Submission};

pub async fn submit_review(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(submission): Json<Submission>,
) -> Result<(StatusCode, Json<SubmissionResponse>), ApiError> {
    let receipt = state.service.submit(submission, current_user(&headers)).await?;
    Ok((StatusCode::CREATED, Json(receipt.into())))
}

pub async fn get_review(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ReviewId>,
) -> Result<Json<ReviewResponse>, ApiError> {
    Ok(Json(state.service.get_review(id).await?.into()))
}

pub async fn my_reviews(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<ReviewResponse>>, ApiError> {
    let reviews = state.service.list_my_reviews(current_user(&headers)).await?;
    Ok(Json(reviews.into_iter().map(ReviewResponse::from).collect()))
}

pub async fn edit_review(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<ReviewId>,
    Json(edit): Json<ReviewEdit>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    let actor = actor(&state, &headers)?;
    let receipt = state.service.edit_review(id, edit, actor).await?;
    Ok(Json(receipt.into()))
}

pub async fn delete_review(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<ReviewId>,
) -> Result<StatusCode, ApiError> {
    let actor = actor(&state, &headers)?;
    state.service.delete_review(id, actor).await?;
    Ok(StatusCode::NO_CONTENT)
}

use axum::{
    extract::{Query, State},
    response::Json,
};
use std::sync::Arc;

use super::AppState;
use crate::api::error::ApiError;
use crate::api::models::{AggregateResponse, CourseDetailResponse, CourseListParams, ReviewResponse};
use crate::domain::{CourseIdentity, CourseIdentityPayload, Degree};
use crate::ranking::{CourseRankingEntry, FilterOptions, RankingFilter, RankingPage, SortKey};

pub async fn list_courses(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CourseListParams>,
) -> Result<Json<RankingPage>, ApiError> {
    let sort = match params.sort.as_deref() {
        Some(sort) => sort.parse::<SortKey>().map_err(ApiError::BadRequest)?,
        None => SortKey::default(),
    };
    let degree = match params.degree.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        Some(degree) => Some(
            Degree::parse(degree).ok_or_else(|| ApiError::BadRequest(format!("unknown degree '{}'", degree)))?,
        ),
        None => None,
    };

    let filter = RankingFilter {
        region: params.region,
        area: params.area,
        degree,
        is_free: params.free,
        min_score: params.min_score,
        text_search: params.search,
    };

    let page = state.service.rank(filter, sort, params.page.unwrap_or(1)).await?;
    Ok(Json(page))
}

pub async fn featured_courses(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<CourseRankingEntry>>, ApiError> {
    Ok(Json(state.service.featured().await?))
}

pub async fn filter_options(
    State(state): State<Arc<AppState>>,
) -> Result<Json<FilterOptions>, ApiError> {
    Ok(Json(state.service.filter_options().await?))
}

pub async fn course_detail(
    State(state): State<Arc<AppState>>,
    Query(payload): Query<CourseIdentityPayload>,
) -> Result<Json<CourseDetailResponse>, ApiError> {
    let identity = CourseIdentity::try_from(&payload)?;
    let aggregate = state.service.get_aggregate(identity.clone()).await?;
    let catalog = state.service.find_course(identity).await?;

    Ok(Json(CourseDetailResponse {
        aggregate: AggregateResponse::from(&aggregate),
        catalog: catalog.map(Into::into),
    }))
}

pub async fn course_reviews(
    State(state): State<Arc<AppState>>,
    Query(payload): Query<CourseIdentityPayload>,
) -> Result<Json<Vec<ReviewResponse>>, ApiError> {
    let identity = CourseIdentity::try_from(&payload)?;
    let reviews = state.service.list_course_reviews(identity).await?;
    Ok(Json(reviews.into_iter().map(ReviewResponse::from).collect()))
}

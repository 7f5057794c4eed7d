use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use log::error;

use super::models::ErrorResponse;
use crate::errors::ReviewError;

/// Error returned by HTTP handlers
#[derive(Debug)]
pub enum ApiError {
    Review(ReviewError),
    BadRequest(String),
}

impl From<ReviewError> for ApiError {
    fn from(err: ReviewError) -> Self {
        ApiError::Review(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Review(err) => match err {
                ReviewError::InvalidRating { .. }
                | ReviewError::IncompleteRating { .. }
                | ReviewError::UnknownCriterion(_)
                | ReviewError::DuplicateCriterion(_) => StatusCode::UNPROCESSABLE_ENTITY,
                ReviewError::InvalidWeights(_)
                | ReviewError::InvalidIdentity(_)
                | ReviewError::InvalidComment(_) => StatusCode::BAD_REQUEST,
                ReviewError::NotFound(_) => StatusCode::NOT_FOUND,
                ReviewError::Unauthorized => StatusCode::UNAUTHORIZED,
                ReviewError::Forbidden => StatusCode::FORBIDDEN,
                ReviewError::ConcurrentUpdateConflict { .. } => StatusCode::SERVICE_UNAVAILABLE,
                ReviewError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::BadRequest(message) => message.clone(),
            ApiError::Review(ReviewError::ConcurrentUpdateConflict { .. }) => {
                "The course is busy right now, please try again".to_string()
            }
            ApiError::Review(ReviewError::Storage(_)) => "Internal server error".to_string(),
            ApiError::Review(err) => err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let ApiError::Review(ReviewError::Storage(err)) = &self {
            error!("Storage failure: {:?}", err);
        }
        (status, Json(ErrorResponse { error: self.message() })).into_response()
    }
}

use axum::http::HeaderMap;

use crate::domain::Actor;
use crate::errors::ReviewError;
use crate::services::reviews::ReviewService;

pub mod admin;
pub mod courses;
pub mod reviews;

pub const USER_HEADER: &str = "x-user-id";

pub struct AppState {
    pub service: ReviewService,
}

/// Opaque user id set by the identity provider in front of the API
pub fn current_user(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// True when the request carries `Authorization: Bearer <admin token>`
pub fn is_admin(state: &AppState, headers: &HeaderMap) -> bool {
    let Some(token) = state.service.config().server.admin_token.as_deref() else {
        return false;
    };
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .is_some_and(|given| given == token)
}

pub fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ReviewError> {
    if is_admin(state, headers) {
        Ok(())
    } else {
        Err(ReviewError::Unauthorized)
    }
}

/// Admin when the admin token is present, otherwise the signed-in user
pub fn actor(state: &AppState, headers: &HeaderMap) -> Result<Actor, ReviewError> {
    if is_admin(state, headers) {
        return Ok(Actor::Admin);
    }
    current_user(headers).map(Actor::User).ok_or(ReviewError::Unauthorized)
}

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::api::handlers::{
    admin::{admin_recompute, admin_reviews, admin_stats},
    courses::{course_detail, course_reviews, featured_courses, filter_options, list_courses},
    reviews::{delete_review, edit_review, get_review, my_reviews, submit_review},
    AppState,
};

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/courses", get(list_courses))
        .route("/api/courses/featured", get(featured_courses))
        .route("/api/courses/filters", get(filter_options))
        .route("/api/course", get(course_detail))
        .route("/api/course/reviews", get(course_reviews))
        .route("/api/reviews", post(submit_review))
        .route("/api/reviews/:id", get(get_review).put(edit_review).delete(delete_review))
        .route("/api/my-reviews", get(my_reviews))
        .route("/api/admin/stats", get(admin_stats))
        .route("/api/admin/reviews", get(admin_reviews))
        .route("/api/admin/recompute", post(admin_recompute))
        .with_state(state)
}

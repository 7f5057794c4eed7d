use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::database::CourseAggregate;
use crate::domain::{CatalogCourse, Degree, Review, ReviewId};
use crate::rating::RatingVector;
use crate::services::reviews::SubmissionReceipt;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseListParams {
    pub page: Option<usize>,
    pub region: Option<String>,
    pub area: Option<String>,
    pub degree: Option<String>,
    pub free: Option<bool>,
    pub min_score: Option<f64>,
    pub search: Option<String>,
    pub sort: Option<String>,
}

/// Reviews returned by the admin feed when no limit is given
pub const DEFAULT_RECENT_LIMIT: usize = 50;
pub const MAX_RECENT_LIMIT: usize = 200;

#[derive(Debug, Deserialize)]
pub struct RecentReviewsParams {
    pub limit: Option<usize>,
}

impl RecentReviewsParams {
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_RECENT_LIMIT).clamp(1, MAX_RECENT_LIMIT)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResponse {
    pub university: String,
    pub course: String,
    pub degree: Option<Degree>,
    pub score: f64,
    pub review_count: i64,
    pub criterion_means: BTreeMap<&'static str, f64>,
    pub version: i64,
    pub updated_at: String,
}

impl From<&CourseAggregate> for AggregateResponse {
    fn from(aggregate: &CourseAggregate) -> Self {
        let identity = aggregate.identity();
        Self {
            university: identity.university().to_string(),
            course: identity.course().to_string(),
            degree: identity.degree(),
            score: aggregate.running_mean(),
            review_count: aggregate.review_count(),
            criterion_means: aggregate
                .criterion_means()
                .map(|(criterion, mean)| (criterion.as_str(), mean))
                .collect(),
            version: aggregate.version(),
            updated_at: aggregate.updated_at().format(TIMESTAMP_FORMAT).to_string(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogInfo {
    pub region: Option<String>,
    pub area: Option<String>,
    pub campus: Option<String>,
    pub is_free: bool,
    pub external_code: Option<String>,
}

impl From<CatalogCourse> for CatalogInfo {
    fn from(course: CatalogCourse) -> Self {
        Self {
            region: course.region,
            area: course.area,
            campus: course.campus,
            is_free: course.is_free,
            external_code: course.external_code,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseDetailResponse {
    #[serde(flatten)]
    pub aggregate: AggregateResponse,
    pub catalog: Option<CatalogInfo>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResponse {
    pub id: ReviewId,
    pub university: String,
    pub course: String,
    pub degree: Option<Degree>,
    pub submitter_id: String,
    pub ratings: RatingVector,
    pub comment: Option<String>,
    pub composite_score: f64,
    pub created_at: String,
}

impl From<Review> for ReviewResponse {
    fn from(review: Review) -> Self {
        Self {
            id: review.id,
            university: review.course.university().to_string(),
            course: review.course.course().to_string(),
            degree: review.course.degree(),
            submitter_id: review.submitter_id,
            ratings: review.ratings,
            comment: review.comment,
            composite_score: review.composite_score,
            created_at: review.created_at.format(TIMESTAMP_FORMAT).to_string(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResponse {
    pub review: ReviewResponse,
    pub aggregate: AggregateResponse,
}

impl From<SubmissionReceipt> for SubmissionResponse {
    fn from(receipt: SubmissionReceipt) -> Self {
        Self {
            aggregate: AggregateResponse::from(&receipt.aggregate),
            review: ReviewResponse::from(receipt.review),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecomputeResponse {
    pub recomputed: usize,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub mod engine;
pub mod filters;

use serde::Serialize;

use crate::domain::Degree;

pub use engine::{featured, rank, RankedCourse, RankingPage, SortKey};
pub use filters::RankingFilter;

/// Read-only view of a course aggregate joined with its catalog metadata.
/// Rebuilt from the store on every query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseRankingEntry {
    pub university: String,
    pub course: String,
    pub degree: Option<Degree>,
    pub score: f64,
    pub review_count: i64,
    pub region: Option<String>,
    pub area: Option<String>,
    pub campus: Option<String>,
    pub is_free: Option<bool>,
}

/// Values present in the catalog, for filter drop-downs
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOptions {
    pub regions: Vec<String>,
    pub areas: Vec<String>,
    pub degrees: Vec<Degree>,
}

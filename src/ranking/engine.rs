use serde::Serialize;
use std::cmp::Ordering;
use std::str::FromStr;

use super::{CourseRankingEntry, RankingFilter};
use crate::pagination::{Page, Pagination};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    #[default]
    ByScoreDesc,
    ByReviewCountDesc,
    ByNameAsc,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "score" | "rating" => Ok(SortKey::ByScoreDesc),
            "reviews" | "count" | "reviewcount" => Ok(SortKey::ByReviewCountDesc),
            "name" => Ok(SortKey::ByNameAsc),
            other => Err(format!("unknown sort key '{}' (expected score, reviews or name)", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedCourse {
    pub rank: usize,
    #[serde(flatten)]
    pub entry: CourseRankingEntry,
}

pub type RankingPage = Page<RankedCourse>;

/// Filter, order and paginate a snapshot of ranking entries.
///
/// The ordering is total, so identical inputs always give identical pages.
/// `rank` is the position in the full filtered ordering, not within the page.
pub fn rank(
    entries: Vec<CourseRankingEntry>,
    filter: &RankingFilter,
    sort: SortKey,
    pagination: Pagination,
) -> RankingPage {
    let mut filtered: Vec<_> = entries.into_iter().filter(|e| filter.matches(e)).collect();
    filtered.sort_by(|a, b| compare(sort, a, b));

    let total = filtered.len();
    let offset = pagination.offset();
    let items = pagination
        .slice(filtered)
        .into_iter()
        .enumerate()
        .map(|(i, entry)| RankedCourse { rank: offset.saturating_add(i + 1), entry })
        .collect();

    Page {
        items,
        total,
        page: pagination.page,
        page_size: pagination.page_size,
        total_pages: pagination.total_pages(total),
    }
}

/// Most reviewed courses, then best scored
pub fn featured(mut entries: Vec<CourseRankingEntry>, limit: usize) -> Vec<CourseRankingEntry> {
    entries.sort_by(|a, b| compare(SortKey::ByReviewCountDesc, a, b));
    entries.truncate(limit);
    entries
}

fn compare(sort: SortKey, a: &CourseRankingEntry, b: &CourseRankingEntry) -> Ordering {
    match sort {
        SortKey::ByScoreDesc => b
            .score
            .total_cmp(&a.score)
            .then_with(|| b.review_count.cmp(&a.review_count))
            .then_with(|| compare_names(a, b)),
        SortKey::ByReviewCountDesc => b
            .review_count
            .cmp(&a.review_count)
            .then_with(|| b.score.total_cmp(&a.score))
            .then_with(|| compare_names(a, b)),
        SortKey::ByNameAsc => compare_names(a, b),
    }
}

fn compare_names(a: &CourseRankingEntry, b: &CourseRankingEntry) -> Ordering {
    a.course
        .to_lowercase()
        .cmp(&b.course.to_lowercase())
        .then_with(|| a.university.to_lowercase().cmp(&b.university.to_lowercase()))
        .then_with(|| a.degree.cmp(&b.degree))
        .then_with(|| a.course.cmp(&b.course))
        .then_with(|| a.university.cmp(&b.university))
}

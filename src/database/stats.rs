use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;

use crate::rating::Criterion;

/// Review score from which a reviewer counts as recommending the course
pub const RECOMMEND_THRESHOLD: i64 = 4;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CriterionMean {
    pub criterion: Criterion,
    pub mean: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_reviews: i64,
    pub ranked_courses: i64,
    pub catalog_courses: i64,
    pub criterion_means: Vec<CriterionMean>,
    pub recommend_percentage: Option<f64>,
}

pub fn dashboard_stats(conn: &Connection) -> Result<DashboardStats> {
    let sql = format!(
        "SELECT COUNT(*), {}, SUM(CASE WHEN experience >= ?1 THEN 1 ELSE 0 END) FROM reviews",
        Criterion::ALL
            .iter()
            .map(|c| format!("AVG({})", c.as_str()))
            .collect::<Vec<_>>()
            .join(", ")
    );

    let (total_reviews, means, recommending) = conn
        .query_row(&sql, [RECOMMEND_THRESHOLD], |row| {
            let mut means = [None; Criterion::COUNT];
            for (offset, mean) in means.iter_mut().enumerate() {
                *mean = row.get::<_, Option<f64>>(1 + offset)?;
            }
            Ok((
                row.get::<_, i64>(0)?,
                means,
                row.get::<_, Option<i64>>(1 + Criterion::COUNT)?,
            ))
        })
        .context("Failed to compute review statistics")?;

    let recommend_percentage = match (total_reviews, recommending) {
        (0, _) | (_, None) => None,
        (total, Some(count)) => Some(count as f64 * 100.0 / total as f64),
    };

    Ok(DashboardStats {
        total_reviews,
        ranked_courses: super::aggregates::count_all(conn)?,
        catalog_courses: super::courses::count_all(conn)?,
        criterion_means: Criterion::ALL
            .into_iter()
            .zip(means)
            .map(|(criterion, mean)| CriterionMean { criterion, mean })
            .collect(),
        recommend_percentage,
    })
}

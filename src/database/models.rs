use chrono::NaiveDateTime;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

use crate::domain::{CatalogCourse, CourseIdentity, Degree, Review};
use crate::errors::ReviewResult;
use crate::rating::{Criterion, RatingVector};

impl ToSql for Degree {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Degree {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        Degree::parse(text).ok_or_else(|| FromSqlError::Other(format!("unknown degree '{}'", text).into()))
    }
}

#[derive(Debug, Clone)]
pub struct ReviewRow {
    pub id: i64,
    pub university: String,
    pub course: String,
    pub degree: Option<Degree>,
    pub submitter_id: String,
    pub scores: [i64; Criterion::COUNT],
    pub comment: Option<String>,
    pub composite_score: f64,
    pub created_at: NaiveDateTime,
}

impl ReviewRow {
    pub fn into_review(self) -> ReviewResult<Review> {
        Ok(Review {
            id: self.id,
            course: CourseIdentity::new(&self.university, &self.course, self.degree)?,
            submitter_id: self.submitter_id,
            ratings: RatingVector::from_scores(self.scores)?,
            comment: self.comment,
            composite_score: self.composite_score,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct CourseRow {
    pub university: String,
    pub course: String,
    pub degree: Option<Degree>,
    pub region: Option<String>,
    pub area: Option<String>,
    pub campus: Option<String>,
    pub is_free: bool,
    pub external_code: Option<String>,
}

impl CourseRow {
    pub fn into_catalog_course(self) -> ReviewResult<CatalogCourse> {
        Ok(CatalogCourse {
            identity: CourseIdentity::new(&self.university, &self.course, self.degree)?,
            region: self.region,
            area: self.area,
            campus: self.campus,
            is_free: self.is_free,
            external_code: self.external_code,
        })
    }
}

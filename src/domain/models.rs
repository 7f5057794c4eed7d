use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{ReviewError, ReviewResult};
use crate::rating::{RatingVector, RawRatings};

pub type ReviewId = i64;

pub const MAX_COMMENT_CHARS: usize = 2000;

/// ASCII unit separator between the parts of a course key
pub const KEY_SEPARATOR: char = '\u{1f}';

/// Academic degree of a course offering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Degree {
    Bachelor,
    Licentiate,
    Technologist,
}

impl Degree {
    /// Accepts census codes (`1`, `2`, `3`) as well as English and Portuguese names
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "1" | "bachelor" | "bacharelado" => Some(Degree::Bachelor),
            "2" | "licentiate" | "licenciatura" => Some(Degree::Licentiate),
            "3" | "technologist" | "tecnologico" | "tecnológico" => Some(Degree::Technologist),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Degree::Bachelor => "bachelor",
            Degree::Licentiate => "licentiate",
            Degree::Technologist => "technologist",
        }
    }
}

impl fmt::Display for Degree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key distinguishing one ranked course offering from another.
///
/// Degree is part of the identity when present: the same course name at the
/// same university is a different offering for each degree. Names compare
/// case-insensitively through [`CourseIdentity::key`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CourseIdentity {
    university: String,
    course: String,
    degree: Option<Degree>,
}

impl CourseIdentity {
    pub fn new(university: &str, course: &str, degree: Option<Degree>) -> ReviewResult<Self> {
        let university = normalize_name(university);
        let course = normalize_name(course);
        if university.is_empty() {
            return Err(ReviewError::InvalidIdentity("university is required".to_string()));
        }
        if course.is_empty() {
            return Err(ReviewError::InvalidIdentity("course is required".to_string()));
        }
        if university.chars().chain(course.chars()).any(char::is_control) {
            return Err(ReviewError::InvalidIdentity(
                "names must not contain control characters".to_string(),
            ));
        }
        Ok(Self {
            university,
            course,
            degree,
        })
    }

    pub fn university(&self) -> &str {
        &self.university
    }

    pub fn course(&self) -> &str {
        &self.course
    }

    pub fn degree(&self) -> Option<Degree> {
        self.degree
    }

    /// Storage key: lowercase university, course and degree joined by
    /// `KEY_SEPARATOR`. Names never contain control characters, so distinct
    /// identities never share a key.
    pub fn key(&self) -> String {
        format!(
            "{}{sep}{}{sep}{}",
            self.university.to_lowercase(),
            self.course.to_lowercase(),
            self.degree.map(|d| d.as_str()).unwrap_or(""),
            sep = KEY_SEPARATOR
        )
    }
}

impl fmt::Display for CourseIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.degree {
            Some(degree) => write!(f, "{} - {} ({})", self.university, self.course, degree),
            None => write!(f, "{} - {}", self.university, self.course),
        }
    }
}

fn normalize_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Course identity as it arrives from the presentation layer
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CourseIdentityPayload {
    pub university: String,
    pub course: String,
    #[serde(default)]
    pub degree: Option<String>,
}

impl TryFrom<&CourseIdentityPayload> for CourseIdentity {
    type Error = ReviewError;

    fn try_from(payload: &CourseIdentityPayload) -> ReviewResult<Self> {
        let degree = match payload.degree.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(
                Degree::parse(raw)
                    .ok_or_else(|| ReviewError::InvalidIdentity(format!("unknown degree '{}'", raw)))?,
            ),
        };
        CourseIdentity::new(&payload.university, &payload.course, degree)
    }
}

/// Raw rating submission
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub course_identity: CourseIdentityPayload,
    pub ratings: RawRatings,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub submitter_id: Option<String>,
}

/// Replacement ratings and comment for an existing review
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewEdit {
    pub ratings: RawRatings,
    #[serde(default)]
    pub comment: Option<String>,
}

/// A validated, scored review waiting to be appended
#[derive(Debug, Clone, PartialEq)]
pub struct NewReview {
    pub course: CourseIdentity,
    pub submitter_id: String,
    pub ratings: RatingVector,
    pub comment: Option<String>,
    pub composite_score: f64,
    pub created_at: NaiveDateTime,
}

/// A stored review. Immutable once appended.
#[derive(Debug, Clone, PartialEq)]
pub struct Review {
    pub id: ReviewId,
    pub course: CourseIdentity,
    pub submitter_id: String,
    pub ratings: RatingVector,
    pub comment: Option<String>,
    pub composite_score: f64,
    pub created_at: NaiveDateTime,
}

/// Who is asking for a privileged operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    User(String),
    Admin,
}

impl Actor {
    pub fn may_modify(&self, review: &Review) -> bool {
        match self {
            Actor::Admin => true,
            Actor::User(id) => *id == review.submitter_id,
        }
    }
}

/// Descriptive metadata for a course offering, imported from the course census
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogCourse {
    pub identity: CourseIdentity,
    pub region: Option<String>,
    pub area: Option<String>,
    pub campus: Option<String>,
    pub is_free: bool,
    pub external_code: Option<String>,
}

pub fn normalize_comment(comment: Option<&str>) -> ReviewResult<Option<String>> {
    let Some(text) = comment.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(None);
    };
    if text.chars().count() > MAX_COMMENT_CHARS {
        return Err(ReviewError::InvalidComment(format!(
            "must be at most {} characters",
            MAX_COMMENT_CHARS
        )));
    }
    Ok(Some(text.to_string()))
}

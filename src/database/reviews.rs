use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use super::aggregates;
use super::models::ReviewRow;
use crate::domain::{CourseIdentity, NewReview, Review, ReviewId};
use crate::errors::{ReviewError, ReviewResult};
use crate::rating::{Criterion, RatingVector};

const REVIEW_COLUMNS: &str = "id, university, course, degree, submitter_id, content, professors, support, infrastructure, material, experience, comment, composite_score, created_at";

/// Append a validated review. Only reachable from a write transaction so the
/// matching aggregate fold commits together with it.
pub fn append(tx: &Transaction<'_>, review: &NewReview) -> Result<ReviewId> {
    let sql = "INSERT INTO reviews (course_key, university, course, degree, submitter_id, content, professors, support, infrastructure, material, experience, comment, composite_score, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14) RETURNING id";
    let [content, professors, support, infrastructure, material, experience] =
        review.ratings.to_scores();

    tx.query_row(
        sql,
        params![
            review.course.key(),
            review.course.university(),
            review.course.course(),
            review.course.degree(),
            review.submitter_id,
            content,
            professors,
            support,
            infrastructure,
            material,
            experience,
            review.comment,
            review.composite_score,
            review.created_at,
        ],
        |row| row.get(0),
    )
    .context("Failed to insert review")
}

fn parse_review_row(row: &rusqlite::Row) -> rusqlite::Result<ReviewRow> {
    let mut scores = [0; Criterion::COUNT];
    for (offset, score) in scores.iter_mut().enumerate() {
        *score = row.get(5 + offset)?;
    }

    Ok(ReviewRow {
        id: row.get(0)?,
        university: row.get(1)?,
        course: row.get(2)?,
        degree: row.get(3)?,
        submitter_id: row.get(4)?,
        scores,
        comment: row.get(11)?,
        composite_score: row.get(12)?,
        created_at: row.get(13)?,
    })
}

fn into_reviews(rows: Vec<ReviewRow>) -> ReviewResult<Vec<Review>> {
    rows.into_iter().map(ReviewRow::into_review).collect()
}

pub fn find_by_id(conn: &Connection, id: ReviewId) -> ReviewResult<Option<Review>> {
    let sql = format!("SELECT {} FROM reviews WHERE id = ?1", REVIEW_COLUMNS);

    let row = conn
        .query_row(&sql, params![id], parse_review_row)
        .optional()
        .context("Failed to query review by id")?;

    row.map(ReviewRow::into_review).transpose()
}

pub fn get(conn: &Connection, id: ReviewId) -> ReviewResult<Review> {
    find_by_id(conn, id)?.ok_or_else(|| ReviewError::NotFound(format!("review {}", id)))
}

/// Reviews of one course, most recent first
pub fn list_by_course(conn: &Connection, identity: &CourseIdentity) -> ReviewResult<Vec<Review>> {
    let sql = format!(
        "SELECT {} FROM reviews WHERE course_key = ?1 ORDER BY created_at DESC, id DESC",
        REVIEW_COLUMNS
    );

    let mut stmt = conn.prepare(&sql).context("Failed to prepare course review query")?;
    let rows = stmt
        .query_map(params![identity.key()], parse_review_row)
        .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
        .with_context(|| format!("Failed to list reviews for {}", identity))?;

    into_reviews(rows)
}

/// Reviews written by one submitter, most recent first
pub fn list_by_submitter(conn: &Connection, submitter_id: &str) -> ReviewResult<Vec<Review>> {
    let sql = format!(
        "SELECT {} FROM reviews WHERE submitter_id = ?1 ORDER BY created_at DESC, id DESC",
        REVIEW_COLUMNS
    );

    let mut stmt = conn.prepare(&sql).context("Failed to prepare submitter review query")?;
    let rows = stmt
        .query_map(params![submitter_id], parse_review_row)
        .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
        .context("Failed to list reviews for submitter")?;

    into_reviews(rows)
}

/// Composite scores and criterion scores of one course, for recompute
pub(super) fn scores_for_course(
    conn: &Connection,
    course_key: &str,
) -> Result<Vec<(f64, [i64; Criterion::COUNT])>> {
    let sql = "SELECT composite_score, content, professors, support, infrastructure, material, experience FROM reviews WHERE course_key = ?1";

    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params![course_key], |row| {
            let mut scores = [0; Criterion::COUNT];
            for (offset, score) in scores.iter_mut().enumerate() {
                *score = row.get(1 + offset)?;
            }
            Ok((row.get(0)?, scores))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(rows)
}

/// Delete a review and recompute its course aggregate from the remaining
/// reviews in the same transaction. Returns the deleted review.
pub fn delete(tx: &Transaction<'_>, id: ReviewId) -> ReviewResult<Review> {
    let review = get(tx, id)?;

    tx.execute("DELETE FROM reviews WHERE id = ?1", params![id])
        .with_context(|| format!("Failed to delete review {}", id))?;

    aggregates::recompute(tx, &review.course)?;
    Ok(review)
}

/// Replace the ratings, comment and composite of a stored review. Id,
/// course, author and `created_at` stay as they were. The course aggregate is
/// rebuilt from the rescanned reviews in the same transaction.
pub fn update(
    tx: &Transaction<'_>,
    id: ReviewId,
    ratings: &RatingVector,
    comment: Option<&str>,
    composite_score: f64,
) -> ReviewResult<Review> {
    let sql = "UPDATE reviews SET content = ?1, professors = ?2, support = ?3, infrastructure = ?4, material = ?5, experience = ?6, comment = ?7, composite_score = ?8 WHERE id = ?9";
    let [content, professors, support, infrastructure, material, experience] = ratings.to_scores();

    let changed = tx
        .execute(
            sql,
            params![
                content,
                professors,
                support,
                infrastructure,
                material,
                experience,
                comment,
                composite_score,
                id,
            ],
        )
        .with_context(|| format!("Failed to update review {}", id))?;
    if changed == 0 {
        return Err(ReviewError::NotFound(format!("review {}", id)));
    }

    let review = get(tx, id)?;
    aggregates::recompute(tx, &review.course)?;
    Ok(review)
}

/// Latest reviews across all courses, for moderation
pub fn list_recent(conn: &Connection, limit: usize) -> ReviewResult<Vec<Review>> {
    let sql = format!(
        "SELECT {} FROM reviews ORDER BY created_at DESC, id DESC LIMIT ?1",
        REVIEW_COLUMNS
    );
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);

    let mut stmt = conn.prepare(&sql).context("Failed to prepare recent review query")?;
    let rows = stmt
        .query_map(params![limit], parse_review_row)
        .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
        .context("Failed to list recent reviews")?;

    into_reviews(rows)
}

pub fn count_all(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM reviews", [], |row| row.get(0))
        .context("Failed to count reviews")
}

//! Course aggregate store.
//!
//! This module is the only writer of `course_aggregates`. A
//! [`CourseAggregate`] cannot be built or changed anywhere else: it is
//! created by the first [`fold_review`] for a course, advanced by later folds
//! and rebuilt by [`recompute`] when a review goes away.

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, Utc};
use log::debug;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, ToSql, Transaction};

use super::reviews;
use crate::domain::{CourseIdentity, Degree};
use crate::errors::{storage_context, ReviewError, ReviewResult};
use crate::ranking::CourseRankingEntry;
use crate::rating::{fold_mean, Criterion, RatingVector};

const AGGREGATE_COLUMNS: &str = "university, course, degree, review_count, running_mean, mean_content, mean_professors, mean_support, mean_infrastructure, mean_material, mean_experience, version, updated_at";

/// Running statistics of one course offering
#[derive(Debug, Clone, PartialEq)]
pub struct CourseAggregate {
    identity: CourseIdentity,
    review_count: i64,
    running_mean: f64,
    criterion_means: [f64; Criterion::COUNT],
    version: i64,
    updated_at: NaiveDateTime,
}

impl CourseAggregate {
    pub fn identity(&self) -> &CourseIdentity {
        &self.identity
    }

    pub fn review_count(&self) -> i64 {
        self.review_count
    }

    pub fn running_mean(&self) -> f64 {
        self.running_mean
    }

    pub fn criterion_mean(&self, criterion: Criterion) -> f64 {
        self.criterion_means[criterion.index()]
    }

    pub fn criterion_means(&self) -> impl Iterator<Item = (Criterion, f64)> + '_ {
        Criterion::ALL.into_iter().map(|c| (c, self.criterion_mean(c)))
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn updated_at(&self) -> NaiveDateTime {
        self.updated_at
    }

    fn first(identity: &CourseIdentity, composite: f64, ratings: &RatingVector) -> Self {
        Self {
            identity: identity.clone(),
            review_count: 1,
            running_mean: composite,
            criterion_means: ratings.to_scores().map(|s| s as f64),
            version: 1,
            updated_at: Utc::now().naive_utc(),
        }
    }

    fn folded(&self, composite: f64, ratings: &RatingVector) -> Self {
        let mut criterion_means = self.criterion_means;
        for (criterion, value) in ratings.iter() {
            let mean = &mut criterion_means[criterion.index()];
            *mean = fold_mean(*mean, self.review_count, f64::from(value));
        }

        Self {
            identity: self.identity.clone(),
            review_count: self.review_count + 1,
            running_mean: fold_mean(self.running_mean, self.review_count, composite),
            criterion_means,
            version: self.version + 1,
            updated_at: Utc::now().naive_utc(),
        }
    }
}

struct AggregateRow {
    university: String,
    course: String,
    degree: Option<Degree>,
    review_count: i64,
    running_mean: f64,
    criterion_means: [f64; Criterion::COUNT],
    version: i64,
    updated_at: NaiveDateTime,
}

fn parse_aggregate_row(row: &rusqlite::Row) -> rusqlite::Result<AggregateRow> {
    let mut criterion_means = [0.0; Criterion::COUNT];
    for (offset, mean) in criterion_means.iter_mut().enumerate() {
        *mean = row.get(5 + offset)?;
    }

    Ok(AggregateRow {
        university: row.get(0)?,
        course: row.get(1)?,
        degree: row.get(2)?,
        review_count: row.get(3)?,
        running_mean: row.get(4)?,
        criterion_means,
        version: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

impl AggregateRow {
    fn into_aggregate(self) -> ReviewResult<CourseAggregate> {
        Ok(CourseAggregate {
            identity: CourseIdentity::new(&self.university, &self.course, self.degree)?,
            review_count: self.review_count,
            running_mean: self.running_mean,
            criterion_means: self.criterion_means,
            version: self.version,
            updated_at: self.updated_at,
        })
    }
}

pub fn find_aggregate(conn: &Connection, identity: &CourseIdentity) -> ReviewResult<Option<CourseAggregate>> {
    let sql = format!(
        "SELECT {} FROM course_aggregates WHERE course_key = ?1",
        AGGREGATE_COLUMNS
    );
    let key = identity.key();

    let row = conn
        .query_row(&sql, params![key], parse_aggregate_row)
        .optional()
        .with_context(|| storage_context("read aggregate", &key))?;

    row.map(AggregateRow::into_aggregate).transpose()
}

/// Snapshot of a course aggregate; a single row read, so count and mean are
/// always from the same fold.
pub fn get_aggregate(conn: &Connection, identity: &CourseIdentity) -> ReviewResult<CourseAggregate> {
    find_aggregate(conn, identity)?
        .ok_or_else(|| ReviewError::NotFound(format!("aggregate for {}", identity)))
}

/// Fold one composite score (and its criterion scores) into the course
/// aggregate, creating it on the first review.
///
/// Must run inside a write transaction. The update is additionally guarded
/// by the version read in the same transaction; a mismatch is reported as
/// `ConcurrentUpdateConflict` so the caller's retry loop starts over.
pub fn fold_review(
    tx: &Transaction<'_>,
    identity: &CourseIdentity,
    composite: f64,
    ratings: &RatingVector,
) -> ReviewResult<CourseAggregate> {
    let next = match find_aggregate(tx, identity)? {
        Some(current) => {
            let next = current.folded(composite, ratings);
            if !update_if_version(tx, &next, current.version)? {
                return Err(ReviewError::ConcurrentUpdateConflict { attempts: 1 });
            }
            next
        }
        None => {
            let first = CourseAggregate::first(identity, composite, ratings);
            if !insert_if_absent(tx, &first)? {
                return Err(ReviewError::ConcurrentUpdateConflict { attempts: 1 });
            }
            first
        }
    };

    debug!(
        "Folded {:.3} into {}: count={} mean={:.3}",
        composite, identity, next.review_count, next.running_mean
    );
    Ok(next)
}

/// Rebuild a course aggregate from its stored reviews. Removes the aggregate
/// and returns `None` when the course has no reviews left.
pub fn recompute(tx: &Transaction<'_>, identity: &CourseIdentity) -> ReviewResult<Option<CourseAggregate>> {
    let key = identity.key();
    let scores = reviews::scores_for_course(tx, &key)
        .with_context(|| storage_context("scan reviews", &key))?;

    if scores.is_empty() {
        tx.execute("DELETE FROM course_aggregates WHERE course_key = ?1", params![key])
            .with_context(|| storage_context("remove aggregate", &key))?;
        debug!("Removed aggregate for {}: no reviews left", identity);
        return Ok(None);
    }

    let count = scores.len() as f64;
    let mut composite_sum = 0.0;
    let mut criterion_sums = [0.0; Criterion::COUNT];
    for (composite, criteria) in &scores {
        composite_sum += composite;
        for (sum, value) in criterion_sums.iter_mut().zip(criteria) {
            *sum += *value as f64;
        }
    }

    // Keep the display names of the existing aggregate; `identity` may differ in case
    let (identity, previous_version) = match find_aggregate(tx, identity)? {
        Some(existing) => (existing.identity, existing.version),
        None => (identity.clone(), 0),
    };
    let aggregate = CourseAggregate {
        identity,
        review_count: scores.len() as i64,
        running_mean: composite_sum / count,
        criterion_means: criterion_sums.map(|sum| sum / count),
        version: previous_version + 1,
        updated_at: Utc::now().naive_utc(),
    };

    upsert(tx, &aggregate).with_context(|| storage_context("rewrite aggregate", &key))?;
    debug!(
        "Recomputed {}: count={} mean={:.3}",
        aggregate.identity, aggregate.review_count, aggregate.running_mean
    );
    Ok(Some(aggregate))
}

/// Recompute every course that has reviews or a stale aggregate
pub fn recompute_all(tx: &Transaction<'_>) -> ReviewResult<usize> {
    let sql = "SELECT university, course, degree FROM reviews GROUP BY course_key UNION SELECT university, course, degree FROM course_aggregates";

    let mut stmt = tx.prepare(sql).context("Failed to prepare course key scan")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<Degree>>(2)?,
            ))
        })
        .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
        .context("Failed to scan course keys")?;
    drop(stmt);

    let mut seen = std::collections::HashSet::new();
    for (university, course, degree) in rows {
        let identity = CourseIdentity::new(&university, &course, degree)?;
        if seen.insert(identity.key()) {
            recompute(tx, &identity)?;
        }
    }
    Ok(seen.len())
}

/// Aggregates joined with catalog metadata, for the ranking engine
pub fn list_ranking_entries(conn: &Connection) -> Result<Vec<CourseRankingEntry>> {
    let sql = "SELECT a.university, a.course, a.degree, a.running_mean, a.review_count, c.region, c.area, c.campus, c.is_free FROM course_aggregates a LEFT JOIN courses c ON c.course_key = a.course_key";

    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(CourseRankingEntry {
                university: row.get(0)?,
                course: row.get(1)?,
                degree: row.get(2)?,
                score: row.get(3)?,
                review_count: row.get(4)?,
                region: row.get(5)?,
                area: row.get(6)?,
                campus: row.get(7)?,
                is_free: row.get(8)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(rows)
}

pub fn count_all(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM course_aggregates", [], |row| row.get(0))
        .context("Failed to count course aggregates")
}

fn update_if_version(tx: &Transaction<'_>, next: &CourseAggregate, expected_version: i64) -> Result<bool> {
    let m = &next.criterion_means;
    let changed = tx.execute(
        "UPDATE course_aggregates SET review_count = ?1, running_mean = ?2, mean_content = ?3, mean_professors = ?4, mean_support = ?5, mean_infrastructure = ?6, mean_material = ?7, mean_experience = ?8, version = ?9, updated_at = ?10 WHERE course_key = ?11 AND version = ?12",
        params![
            next.review_count,
            next.running_mean,
            m[0],
            m[1],
            m[2],
            m[3],
            m[4],
            m[5],
            next.version,
            next.updated_at,
            next.identity.key(),
            expected_version,
        ],
    )
    .context("Failed to update course aggregate")?;
    Ok(changed == 1)
}

fn insert_if_absent(tx: &Transaction<'_>, aggregate: &CourseAggregate) -> Result<bool> {
    let sql = format!(
        "INSERT INTO course_aggregates (course_key, {}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14) ON CONFLICT(course_key) DO NOTHING",
        AGGREGATE_COLUMNS
    );
    let inserted = tx
        .execute(&sql, params_from_iter(aggregate_params(aggregate)))
        .context("Failed to insert course aggregate")?;
    Ok(inserted == 1)
}

fn upsert(tx: &Transaction<'_>, aggregate: &CourseAggregate) -> Result<()> {
    let sql = format!(
        "INSERT OR REPLACE INTO course_aggregates (course_key, {}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        AGGREGATE_COLUMNS
    );
    tx.execute(&sql, params_from_iter(aggregate_params(aggregate)))
        .context("Failed to write course aggregate")?;
    Ok(())
}

fn aggregate_params(aggregate: &CourseAggregate) -> Vec<Box<dyn ToSql + '_>> {
    let identity = &aggregate.identity;
    let mut values: Vec<Box<dyn ToSql + '_>> = vec![
        Box::new(identity.key()),
        Box::new(identity.university()),
        Box::new(identity.course()),
        Box::new(identity.degree()),
        Box::new(aggregate.review_count),
        Box::new(aggregate.running_mean),
    ];
    for mean in aggregate.criterion_means {
        values.push(Box::new(mean));
    }
    values.push(Box::new(aggregate.version));
    values.push(Box::new(aggregate.updated_at));
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::setup::initialize_database;

    fn setup() -> (Connection, CourseIdentity) {
        let conn = Connection::open_in_memory().unwrap();
        initialize_database(&conn).unwrap();
        let course = CourseIdentity::new("UNIVESP", "Pedagogia", Some(Degree::Licentiate)).unwrap();
        (conn, course)
    }

    fn uniform(value: i64) -> RatingVector {
        RatingVector::from_scores([value; Criterion::COUNT]).unwrap()
    }

    fn fold(conn: &mut Connection, course: &CourseIdentity, composite: f64, ratings: &RatingVector) -> CourseAggregate {
        let tx = conn.transaction().unwrap();
        let aggregate = fold_review(&tx, course, composite, ratings).unwrap();
        tx.commit().unwrap();
        aggregate
    }

    #[test]
    fn test_unknown_course_is_not_found() {
        let (conn, course) = setup();
        assert!(matches!(get_aggregate(&conn, &course), Err(ReviewError::NotFound(_))));
    }

    #[test]
    fn test_first_fold_creates_aggregate() {
        let (mut conn, course) = setup();
        let aggregate = fold(&mut conn, &course, 4.5, &uniform(4));
        assert_eq!(aggregate.review_count(), 1);
        assert_eq!(aggregate.running_mean(), 4.5);
        assert_eq!(aggregate.version(), 1);
        assert_eq!(aggregate.criterion_mean(Criterion::Support), 4.0);
    }

    #[test]
    fn test_sequential_folds_keep_running_mean() {
        let (mut conn, course) = setup();
        for score in [5, 3, 4] {
            fold(&mut conn, &course, score as f64, &uniform(score));
        }

        let aggregate = get_aggregate(&conn, &course).unwrap();
        assert_eq!(aggregate.review_count(), 3);
        assert_eq!(aggregate.running_mean(), 4.0);
        assert_eq!(aggregate.criterion_mean(Criterion::Experience), 4.0);
        assert_eq!(aggregate.version(), 3);
    }

    #[test]
    fn test_read_is_idempotent() {
        let (mut conn, course) = setup();
        fold(&mut conn, &course, 2.0, &uniform(2));
        let first = get_aggregate(&conn, &course).unwrap();
        let second = get_aggregate(&conn, &course).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_stale_version_is_a_conflict() {
        let (mut conn, course) = setup();
        let current = fold(&mut conn, &course, 3.0, &uniform(3));
        fold(&mut conn, &course, 5.0, &uniform(5));

        let tx = conn.transaction().unwrap();
        let stale_next = current.folded(1.0, &uniform(1));
        assert!(!update_if_version(&tx, &stale_next, current.version()).unwrap());
    }

    #[test]
    fn test_recompute_without_reviews_removes_aggregate() {
        let (mut conn, course) = setup();
        fold(&mut conn, &course, 3.0, &uniform(3));

        let tx = conn.transaction().unwrap();
        assert!(recompute(&tx, &course).unwrap().is_none());
        tx.commit().unwrap();
        assert!(find_aggregate(&conn, &course).unwrap().is_none());
    }

    fn append_review(conn: &mut Connection, course: &CourseIdentity, score: i64) {
        let tx = conn.transaction().unwrap();
        let review = crate::domain::NewReview {
            course: course.clone(),
            submitter_id: "alice".to_string(),
            ratings: uniform(score),
            comment: None,
            composite_score: score as f64,
            created_at: Utc::now().naive_utc(),
        };
        reviews::append(&tx, &review).unwrap();
        fold_review(&tx, course, score as f64, &review.ratings).unwrap();
        tx.commit().unwrap();
    }

    #[test]
    fn test_recompute_keeps_stored_names() {
        let (mut conn, course) = setup();
        append_review(&mut conn, &course, 4);
        append_review(&mut conn, &course, 2);

        let lowercase = CourseIdentity::new("univesp", "pedagogia", Some(Degree::Licentiate)).unwrap();
        let tx = conn.transaction().unwrap();
        let rebuilt = recompute(&tx, &lowercase).unwrap().unwrap();
        tx.commit().unwrap();

        assert_eq!(rebuilt.identity().university(), "UNIVESP");
        assert_eq!(rebuilt.identity().course(), "Pedagogia");
        assert_eq!(rebuilt.review_count(), 2);
        assert_eq!(rebuilt.running_mean(), 3.0);
        assert_eq!(rebuilt.version(), 3);
    }

    #[test]
    fn test_separator_in_names_keeps_aggregates_apart() {
        let (mut conn, _) = setup();
        let first = CourseIdentity::new("A|B", "C", None).unwrap();
        let second = CourseIdentity::new("A", "B|C", None).unwrap();
        fold(&mut conn, &first, 5.0, &uniform(5));
        fold(&mut conn, &second, 1.0, &uniform(1));

        assert_eq!(get_aggregate(&conn, &first).unwrap().running_mean(), 5.0);
        assert_eq!(get_aggregate(&conn, &second).unwrap().running_mean(), 1.0);
    }

    #[test]
    fn test_course_identity_lookup_ignores_case() {
        let (mut conn, course) = setup();
        fold(&mut conn, &course, 3.0, &uniform(3));
        let shouting = CourseIdentity::new("univesp", "PEDAGOGIA", Some(Degree::Licentiate)).unwrap();
        assert_eq!(get_aggregate(&conn, &shouting).unwrap().review_count(), 1);
    }
}

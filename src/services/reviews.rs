use anyhow::{Context, Result};
use chrono::Utc;
use log::{info, warn};
use std::sync::Arc;

use crate::config::AppConfig;
use crate::database::{
    self, aggregates, courses, reviews, setup, stats, with_write_transaction, CourseAggregate,
    DashboardStats, DbConn, DbPool,
};
use crate::domain::{
    normalize_comment, Actor, CatalogCourse, CourseIdentity, NewReview, Review, ReviewEdit, ReviewId,
    Submission,
};
use crate::errors::{ReviewError, ReviewResult};
use crate::pagination::Pagination;
use crate::ranking::{self, CourseRankingEntry, FilterOptions, RankingFilter, RankingPage, SortKey};
use crate::rating::{compute_composite, CriterionWeights, RatingVector};

/// A stored review together with the aggregate it was folded into
#[derive(Debug, Clone)]
pub struct SubmissionReceipt {
    pub review: Review,
    pub aggregate: CourseAggregate,
}

/// Entry point for everything the presentation layer does with reviews,
/// aggregates and rankings. Cheap to clone.
///
/// SQLite work is blocking, so each operation borrows a pooled connection on
/// the blocking thread pool.
#[derive(Clone)]
pub struct ReviewService {
    pool: DbPool,
    config: Arc<AppConfig>,
}

impl ReviewService {
    pub fn new(pool: DbPool, config: Arc<AppConfig>) -> Self {
        Self { pool, config }
    }

    /// Open the configured database and make sure the schema exists
    pub fn open(config: AppConfig) -> Result<Self> {
        let pool = database::create_pool(&config.store)?;
        let conn = database::get_connection(&pool)?;
        setup::initialize_database(&conn)?;
        info!("Review store ready at {}", config.store.database_path);
        Ok(Self::new(pool, Arc::new(config)))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    async fn with_conn<T, F>(&self, work: F) -> ReviewResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut DbConn) -> ReviewResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = database::get_connection(&pool)?;
            work(&mut conn)
        })
        .await
        .context("Store task failed")?
    }

    /// Validate, score, append and fold one submission.
    ///
    /// Nothing is written unless validation passes, and the review and the
    /// aggregate update commit together or not at all.
    pub async fn submit(&self, submission: Submission, current_user: Option<String>) -> ReviewResult<SubmissionReceipt> {
        let new_review = prepare_submission(&submission, current_user.as_deref(), self.config.scoring.weights.as_ref())?;
        let store = self.config.store.clone();

        let receipt = self
            .with_conn(move |conn| {
                with_write_transaction(conn, &store, |tx| {
                    let id = reviews::append(tx, &new_review)?;
                    let aggregate = aggregates::fold_review(
                        tx,
                        &new_review.course,
                        new_review.composite_score,
                        &new_review.ratings,
                    )?;
                    Ok(SubmissionReceipt {
                        review: stored(&new_review, id),
                        aggregate,
                    })
                })
            })
            .await?;

        info!(
            "Review {} for {} scored {:.2}; course now {:.3} over {} reviews",
            receipt.review.id,
            receipt.review.course,
            receipt.review.composite_score,
            receipt.aggregate.running_mean(),
            receipt.aggregate.review_count()
        );
        Ok(receipt)
    }

    pub async fn get_aggregate(&self, identity: CourseIdentity) -> ReviewResult<CourseAggregate> {
        self.with_conn(move |conn| aggregates::get_aggregate(conn, &identity)).await
    }

    pub async fn get_review(&self, id: ReviewId) -> ReviewResult<Review> {
        self.with_conn(move |conn| reviews::get(conn, id)).await
    }

    pub async fn list_course_reviews(&self, identity: CourseIdentity) -> ReviewResult<Vec<Review>> {
        self.with_conn(move |conn| reviews::list_by_course(conn, &identity)).await
    }

    pub async fn list_my_reviews(&self, current_user: Option<String>) -> ReviewResult<Vec<Review>> {
        let submitter = require_user(current_user.as_deref())?;
        self.with_conn(move |conn| reviews::list_by_submitter(conn, &submitter)).await
    }

    /// Delete a review if `actor` wrote it or is an admin, then rebuild the
    /// course aggregate from what is left.
    pub async fn delete_review(&self, id: ReviewId, actor: Actor) -> ReviewResult<Review> {
        let store = self.config.store.clone();

        let deleted = self
            .with_conn(move |conn| {
                with_write_transaction(conn, &store, |tx| {
                    let review = reviews::get(tx, id)?;
                    if !actor.may_modify(&review) {
                        return Err(ReviewError::Forbidden);
                    }
                    reviews::delete(tx, id)
                })
            })
            .await?;

        info!("Deleted review {} for {}", deleted.id, deleted.course);
        Ok(deleted)
    }

    /// Replace the ratings and comment of a review written by `actor` (or any
    /// review, for an admin). The edit is validated and scored before the
    /// write transaction opens; the course aggregate is then rebuilt from a
    /// rescan of its reviews.
    pub async fn edit_review(&self, id: ReviewId, edit: ReviewEdit, actor: Actor) -> ReviewResult<SubmissionReceipt> {
        let ratings = RatingVector::from_raw(&edit.ratings)?;
        let comment = normalize_comment(edit.comment.as_deref())?;
        let composite = compute_composite(&ratings, self.config.scoring.weights.as_ref());
        let store = self.config.store.clone();

        let receipt = self
            .with_conn(move |conn| {
                with_write_transaction(conn, &store, |tx| {
                    let current = reviews::get(tx, id)?;
                    if !actor.may_modify(&current) {
                        return Err(ReviewError::Forbidden);
                    }
                    let review = reviews::update(tx, id, &ratings, comment.as_deref(), composite)?;
                    let aggregate = aggregates::get_aggregate(tx, &review.course)?;
                    Ok(SubmissionReceipt { review, aggregate })
                })
            })
            .await?;

        info!(
            "Edited review {} for {}: now {:.2}; course {:.3} over {} reviews",
            receipt.review.id,
            receipt.review.course,
            receipt.review.composite_score,
            receipt.aggregate.running_mean(),
            receipt.aggregate.review_count()
        );
        Ok(receipt)
    }

    /// Latest reviews across every course
    pub async fn list_recent_reviews(&self, limit: usize) -> ReviewResult<Vec<Review>> {
        self.with_conn(move |conn| reviews::list_recent(conn, limit)).await
    }

    /// Ranked page over a fresh snapshot of all aggregates
    pub async fn rank(&self, filter: RankingFilter, sort: SortKey, page: usize) -> ReviewResult<RankingPage> {
        let pagination = Pagination::new(page, self.config.ranking.page_size);
        let entries = self.ranking_entries().await?;
        Ok(ranking::rank(entries, &filter, sort, pagination))
    }

    pub async fn featured(&self) -> ReviewResult<Vec<CourseRankingEntry>> {
        let limit = self.config.ranking.featured_count;
        let entries = self.ranking_entries().await?;
        Ok(ranking::featured(entries, limit))
    }

    async fn ranking_entries(&self) -> ReviewResult<Vec<CourseRankingEntry>> {
        self.with_conn(|conn| Ok(aggregates::list_ranking_entries(conn)?)).await
    }

    pub async fn filter_options(&self) -> ReviewResult<FilterOptions> {
        self.with_conn(|conn| Ok(courses::list_filter_options(conn)?)).await
    }

    pub async fn find_course(&self, identity: CourseIdentity) -> ReviewResult<Option<CatalogCourse>> {
        self.with_conn(move |conn| courses::find_course(conn, &identity)).await
    }

    pub async fn stats(&self) -> ReviewResult<DashboardStats> {
        self.with_conn(|conn| Ok(stats::dashboard_stats(conn)?)).await
    }

    /// Rebuild every aggregate from the stored reviews
    pub async fn recompute_all(&self) -> ReviewResult<usize> {
        let store = self.config.store.clone();
        let count = self
            .with_conn(move |conn| with_write_transaction(conn, &store, aggregates::recompute_all))
            .await?;
        info!("Recomputed {} course aggregates", count);
        Ok(count)
    }

    /// Upsert catalog rows in one transaction
    pub async fn import_courses(&self, catalog: Vec<CatalogCourse>) -> ReviewResult<usize> {
        let store = self.config.store.clone();
        self.with_conn(move |conn| {
            with_write_transaction(conn, &store, |tx| {
                for course in &catalog {
                    courses::upsert_course(tx, course)?;
                }
                Ok(catalog.len())
            })
        })
        .await
    }
}

/// Turn a raw submission into a scored review. Pure: touches no storage.
pub fn prepare_submission(
    submission: &Submission,
    current_user: Option<&str>,
    weights: Option<&CriterionWeights>,
) -> ReviewResult<NewReview> {
    let submitter = match current_user {
        Some(user) => require_user(Some(user))?,
        None => require_user(submission.submitter_id.as_deref())?,
    };
    let course = CourseIdentity::try_from(&submission.course_identity)?;
    let ratings = RatingVector::from_raw(&submission.ratings)?;
    let comment = normalize_comment(submission.comment.as_deref())?;

    Ok(NewReview {
        course,
        submitter_id: submitter,
        composite_score: compute_composite(&ratings, weights),
        ratings,
        comment,
        created_at: Utc::now().naive_utc(),
    })
}

fn require_user(user: Option<&str>) -> ReviewResult<String> {
    match user.map(str::trim).filter(|u| !u.is_empty()) {
        Some(user) => Ok(user.to_string()),
        None => {
            warn!("Rejected anonymous review operation");
            Err(ReviewError::Unauthorized)
        }
    }
}

fn stored(review: &NewReview, id: ReviewId) -> Review {
    Review {
        id,
        course: review.course.clone(),
        submitter_id: review.submitter_id.clone(),
        ratings: review.ratings,
        comment: review.comment.clone(),
        composite_score: review.composite_score,
        created_at: review.created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CourseIdentityPayload;
    use crate::rating::{Criterion, RawRatings};
    use tempfile::TempDir;

    fn service() -> (ReviewService, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reviews.db");
        let mut config = AppConfig::new().with_database_path(path.to_string_lossy());
        config.store.retry_backoff_ms = 1;
        (ReviewService::open(config).unwrap(), dir)
    }

    fn uniform(value: f64) -> RawRatings {
        Criterion::ALL.iter().map(|c| (c.as_str().to_string(), value)).collect()
    }

    fn submission(course: &str, ratings: RawRatings) -> Submission {
        Submission {
            course_identity: CourseIdentityPayload {
                university: "UNIVESP".to_string(),
                course: course.to_string(),
                degree: None,
            },
            ratings,
            comment: Some("  boa  ".to_string()),
            submitter_id: None,
        }
    }

    fn identity(course: &str) -> CourseIdentity {
        CourseIdentity::new("UNIVESP", course, None).unwrap()
    }

    fn user(id: &str) -> Option<String> {
        Some(id.to_string())
    }

    #[tokio::test]
    async fn test_three_submissions_fold_to_mean() {
        let (service, _dir) = service();
        for score in [5.0, 3.0, 4.0] {
            service.submit(submission("Pedagogia", uniform(score)), user("alice")).await.unwrap();
        }

        let aggregate = service.get_aggregate(identity("Pedagogia")).await.unwrap();
        assert_eq!(aggregate.review_count(), 3);
        assert!((aggregate.running_mean() - 4.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_incomplete_submission_leaves_no_trace() {
        let (service, _dir) = service();
        let mut ratings = uniform(4.0);
        ratings.remove("experience");

        let err = service.submit(submission("Letras", ratings), user("alice")).await.unwrap_err();
        assert!(matches!(err, ReviewError::IncompleteRating { criterion: Criterion::Experience }));
        assert!(matches!(
            service.get_aggregate(identity("Letras")).await,
            Err(ReviewError::NotFound(_))
        ));
        assert!(service.list_course_reviews(identity("Letras")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_anonymous_submission_is_unauthorized() {
        let (service, _dir) = service();
        let err = service.submit(submission("Letras", uniform(4.0)), None).await.unwrap_err();
        assert!(matches!(err, ReviewError::Unauthorized));
    }

    #[tokio::test]
    async fn test_header_identity_overrides_payload() {
        let (service, _dir) = service();
        let mut payload = submission("Letras", uniform(4.0));
        payload.submitter_id = Some("mallory".to_string());

        let receipt = service.submit(payload, user("alice")).await.unwrap();
        assert_eq!(receipt.review.submitter_id, "alice");
        assert_eq!(receipt.review.comment.as_deref(), Some("boa"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_submissions_lose_no_update() {
        let (service, _dir) = service();
        let mut handles = Vec::new();
        for i in 0..100 {
            let service = service.clone();
            let score = if i % 2 == 0 { 5.0 } else { 3.0 };
            handles.push(tokio::spawn(async move {
                service.submit(submission("Matemática", uniform(score)), user(&format!("user-{}", i))).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let aggregate = service.get_aggregate(identity("Matemática")).await.unwrap();
        assert_eq!(aggregate.review_count(), 100);
        assert!((aggregate.running_mean() - 4.0).abs() < 1e-9);
        assert_eq!(aggregate.version(), 100);
    }

    #[tokio::test]
    async fn test_delete_recomputes_aggregate() {
        let (service, _dir) = service();
        let first = service.submit(submission("Física", uniform(5.0)), user("alice")).await.unwrap();
        let second = service.submit(submission("Física", uniform(3.0)), user("bob")).await.unwrap();

        service.delete_review(first.review.id, Actor::User("alice".to_string())).await.unwrap();
        let aggregate = service.get_aggregate(identity("Física")).await.unwrap();
        assert_eq!(aggregate.review_count(), 1);
        assert_eq!(aggregate.running_mean(), 3.0);

        service.delete_review(second.review.id, Actor::Admin).await.unwrap();
        assert!(matches!(
            service.get_aggregate(identity("Física")).await,
            Err(ReviewError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_only_owner_or_admin_may_delete() {
        let (service, _dir) = service();
        let receipt = service.submit(submission("Química", uniform(4.0)), user("alice")).await.unwrap();

        let err = service
            .delete_review(receipt.review.id, Actor::User("bob".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::Forbidden));
        assert_eq!(service.get_aggregate(identity("Química")).await.unwrap().review_count(), 1);
    }

    #[tokio::test]
    async fn test_rank_reflects_latest_fold() {
        let (service, _dir) = service();
        service.submit(submission("Química", uniform(3.0)), user("alice")).await.unwrap();
        service.submit(submission("Biologia", uniform(4.0)), user("alice")).await.unwrap();

        let page = service.rank(RankingFilter::default(), SortKey::ByScoreDesc, 1).await.unwrap();
        assert_eq!(page.items[0].entry.course, "Biologia");

        service.submit(submission("Química", uniform(5.0)), user("bob")).await.unwrap();
        service.submit(submission("Química", uniform(5.0)), user("carol")).await.unwrap();
        let page = service.rank(RankingFilter::default(), SortKey::ByScoreDesc, 1).await.unwrap();
        assert_eq!(page.items[0].entry.course, "Química");
        assert_eq!(page.total, 2);
    }

    #[tokio::test]
    async fn test_recompute_all_matches_folds() {
        let (service, _dir) = service();
        service.submit(submission("Química", uniform(2.0)), user("alice")).await.unwrap();
        service.submit(submission("Química", uniform(5.0)), user("bob")).await.unwrap();
        let before = service.get_aggregate(identity("Química")).await.unwrap();

        assert_eq!(service.recompute_all().await.unwrap(), 1);
        let after = service.get_aggregate(identity("Química")).await.unwrap();
        assert_eq!(after.review_count(), before.review_count());
        assert!((after.running_mean() - before.running_mean()).abs() < 1e-9);
        assert!(after.version() > before.version());
    }

    fn edit(score: f64) -> ReviewEdit {
        ReviewEdit { ratings: uniform(score), comment: Some("corrigido".to_string()) }
    }

    #[tokio::test]
    async fn test_edit_matches_fresh_recompute() {
        let (service, _dir) = service();
        let first = service.submit(submission("Física", uniform(2.0)), user("alice")).await.unwrap();
        service.submit(submission("Física", uniform(4.0)), user("bob")).await.unwrap();

        let receipt = service
            .edit_review(first.review.id, edit(5.0), Actor::User("alice".to_string()))
            .await
            .unwrap();
        assert_eq!(receipt.review.id, first.review.id);
        assert_eq!(receipt.review.created_at, first.review.created_at);
        assert_eq!(receipt.review.composite_score, 5.0);
        assert_eq!(receipt.aggregate.review_count(), 2);
        assert!((receipt.aggregate.running_mean() - 4.5).abs() < 1e-9);

        service.recompute_all().await.unwrap();
        let rebuilt = service.get_aggregate(identity("Física")).await.unwrap();
        assert_eq!(rebuilt.review_count(), receipt.aggregate.review_count());
        assert!((rebuilt.running_mean() - receipt.aggregate.running_mean()).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_edit_requires_owner_and_valid_ratings() {
        let (service, _dir) = service();
        let receipt = service.submit(submission("Física", uniform(3.0)), user("alice")).await.unwrap();
        let id = receipt.review.id;

        let err = service.edit_review(id, edit(5.0), Actor::User("bob".to_string())).await.unwrap_err();
        assert!(matches!(err, ReviewError::Forbidden));

        let err = service.edit_review(id, edit(9.0), Actor::Admin).await.unwrap_err();
        assert!(matches!(err, ReviewError::InvalidRating { .. }));

        let unchanged = service.get_aggregate(identity("Física")).await.unwrap();
        assert_eq!(unchanged.running_mean(), 3.0);

        service.edit_review(id, edit(1.0), Actor::Admin).await.unwrap();
        assert_eq!(service.get_aggregate(identity("Física")).await.unwrap().running_mean(), 1.0);
    }

    #[tokio::test]
    async fn test_edit_unknown_review_is_not_found() {
        let (service, _dir) = service();
        let err = service.edit_review(77, edit(4.0), Actor::Admin).await.unwrap_err();
        assert!(matches!(err, ReviewError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_weighted_submissions_fold_weighted_composites() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::new().with_database_path(dir.path().join("weighted.db").to_string_lossy());
        config.scoring.weights = Some(CriterionWeights::parse("content=0.5,professors=0.5").unwrap());
        let service = ReviewService::open(config).unwrap();

        let mut first = uniform(1.0);
        first.insert("content".to_string(), 5.0);
        first.insert("professors".to_string(), 3.0);
        let receipt = service.submit(submission("Letras", first), user("alice")).await.unwrap();
        assert!((receipt.review.composite_score - 4.0).abs() < 1e-9);

        let mut second = uniform(5.0);
        second.insert("content".to_string(), 2.0);
        second.insert("professors".to_string(), 2.0);
        let receipt = service.submit(submission("Letras", second), user("bob")).await.unwrap();
        assert!((receipt.review.composite_score - 2.0).abs() < 1e-9);

        let aggregate = service.get_aggregate(identity("Letras")).await.unwrap();
        assert!((aggregate.running_mean() - 3.0).abs() < 1e-9);
        assert!((aggregate.criterion_mean(Criterion::Experience) - 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_recent_reviews_are_newest_first() {
        let (service, _dir) = service();
        let first = service.submit(submission("Letras", uniform(4.0)), user("alice")).await.unwrap();
        let second = service.submit(submission("Direito", uniform(2.0)), user("bob")).await.unwrap();

        let recent = service.list_recent_reviews(10).await.unwrap();
        let ids: Vec<_> = recent.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![second.review.id, first.review.id]);
        assert_eq!(service.list_recent_reviews(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_my_reviews_require_user() {
        let (service, _dir) = service();
        service.submit(submission("Química", uniform(4.0)), user("alice")).await.unwrap();
        assert_eq!(service.list_my_reviews(user("alice")).await.unwrap().len(), 1);
        assert!(matches!(service.list_my_reviews(None).await, Err(ReviewError::Unauthorized)));
    }
}

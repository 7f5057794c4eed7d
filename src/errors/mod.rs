use thiserror::Error;

use crate::rating::Criterion;

pub type ReviewResult<T> = Result<T, ReviewError>;

/// Errors surfaced by the review, aggregate and ranking core.
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("rating for '{criterion}' must be an integer between 1 and 5, got {value}")]
    InvalidRating { criterion: Criterion, value: f64 },

    #[error("rating for '{criterion}' is missing")]
    IncompleteRating { criterion: Criterion },

    #[error("unknown rating criterion '{0}'")]
    UnknownCriterion(String),

    #[error("rating for '{0}' was given more than once")]
    DuplicateCriterion(Criterion),

    #[error("invalid criterion weights: {0}")]
    InvalidWeights(String),

    #[error("invalid course identity: {0}")]
    InvalidIdentity(String),

    #[error("invalid comment: {0}")]
    InvalidComment(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("a signed-in user is required")]
    Unauthorized,

    #[error("only the author of the review or an admin may do this")]
    Forbidden,

    #[error("course aggregate is busy, gave up after {attempts} attempts")]
    ConcurrentUpdateConflict { attempts: u32 },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl ReviewError {
    /// Validation failures are the caller's fault and never touch the store.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ReviewError::InvalidRating { .. }
                | ReviewError::IncompleteRating { .. }
                | ReviewError::UnknownCriterion(_)
                | ReviewError::DuplicateCriterion(_)
                | ReviewError::InvalidWeights(_)
                | ReviewError::InvalidIdentity(_)
                | ReviewError::InvalidComment(_)
        )
    }

    /// Busy database or a lost optimistic version check; safe to retry.
    pub fn is_transient(&self) -> bool {
        match self {
            ReviewError::ConcurrentUpdateConflict { .. } => true,
            ReviewError::Storage(err) => is_busy(err),
            _ => false,
        }
    }
}

/// Check whether any error in the chain is SQLite reporting a held lock
pub fn is_busy(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<rusqlite::Error>(),
            Some(rusqlite::Error::SqliteFailure(failure, _))
                if failure.code == rusqlite::ErrorCode::DatabaseBusy
                    || failure.code == rusqlite::ErrorCode::DatabaseLocked
        )
    })
}

/// Context message for storage operations on a keyed record
pub fn storage_context(operation: &str, key: &str) -> String {
    format!("Failed to {} for key: {}", operation, key)
}

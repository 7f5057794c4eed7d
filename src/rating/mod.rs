pub mod types;
pub mod weighting;

pub use types::{Criterion, CriterionWeights, RatingVector, RawRatings};
pub use weighting::{compute_composite, compute_score, fold_mean};

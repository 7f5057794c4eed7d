use super::types::{CriterionWeights, MAX_RATING, MIN_RATING, RatingVector, RawRatings};
use crate::errors::ReviewResult;

/// Validate raw ratings and reduce them to a composite score in [1, 5].
pub fn compute_score(raw: &RawRatings, weights: Option<&CriterionWeights>) -> ReviewResult<f64> {
    let vector = RatingVector::from_raw(raw)?;
    Ok(compute_composite(&vector, weights))
}

/// Composite of an already validated vector: plain mean, or the weighted sum
/// when weights are configured.
pub fn compute_composite(vector: &RatingVector, weights: Option<&CriterionWeights>) -> f64 {
    let score = match weights {
        Some(weights) => weighted_sum(vector, weights),
        None => arithmetic_mean(vector),
    };
    // Convex combination of 1..=5, so clamping only absorbs float rounding
    score.clamp(f64::from(MIN_RATING), f64::from(MAX_RATING))
}

fn arithmetic_mean(vector: &RatingVector) -> f64 {
    let (sum, count) = vector
        .iter()
        .fold((0.0, 0usize), |(sum, count), (_, value)| (sum + f64::from(value), count + 1));
    sum / count as f64
}

fn weighted_sum(vector: &RatingVector, weights: &CriterionWeights) -> f64 {
    weights
        .iter()
        .map(|(criterion, weight)| f64::from(vector.get(criterion)) * weight)
        .sum()
}

/// Incremental mean: fold one more sample into a mean over `count` samples.
pub fn fold_mean(mean: f64, count: i64, sample: f64) -> f64 {
    (mean * count as f64 + sample) / (count + 1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ReviewError;
    use crate::rating::Criterion;

    fn ratings(values: [f64; Criterion::COUNT]) -> RawRatings {
        Criterion::ALL
            .iter()
            .map(|c| (c.as_str().to_string(), values[c.index()]))
            .collect()
    }

    #[test]
    fn test_unweighted_score_is_mean() {
        let values = [5.0, 4.0, 3.0, 4.0, 2.0, 3.0];
        let expected = values.iter().sum::<f64>() / values.len() as f64;
        let score = compute_score(&ratings(values), None).unwrap();
        assert!((score - expected).abs() < 1e-12);
    }

    #[test]
    fn test_unweighted_mean_over_every_uniform_vector() {
        for v in 1..=5 {
            let score = compute_score(&ratings([f64::from(v); Criterion::COUNT]), None).unwrap();
            assert_eq!(score, f64::from(v));
        }
    }

    #[test]
    fn test_weighted_score() {
        let weights = CriterionWeights::new([
            (Criterion::Content, 0.5),
            (Criterion::Professors, 0.25),
            (Criterion::Experience, 0.25),
        ])
        .unwrap();
        let score = compute_score(&ratings([5.0, 1.0, 3.0, 3.0, 3.0, 3.0]), Some(&weights)).unwrap();
        assert!((score - 3.5).abs() < 1e-12);
    }

    #[test]
    fn test_weighted_score_stays_within_bounds() {
        let weights = CriterionWeights::parse(
            "content=0.1,professors=0.2,support=0.3,infrastructure=0.2,material=0.1,experience=0.1",
        )
        .unwrap();
        for low in 1..=5 {
            for high in low..=5 {
                let values = [
                    f64::from(low),
                    f64::from(high),
                    f64::from(low),
                    f64::from(high),
                    f64::from(low),
                    f64::from(high),
                ];
                let score = compute_score(&ratings(values), Some(&weights)).unwrap();
                assert!((1.0..=5.0).contains(&score));
                assert!(score >= f64::from(low) - 1e-9 && score <= f64::from(high) + 1e-9);
            }
        }
    }

    #[test]
    fn test_out_of_range_value_fails() {
        let err = compute_score(&ratings([5.0, 4.0, 9.0, 4.0, 2.0, 3.0]), None).unwrap_err();
        assert!(matches!(
            err,
            ReviewError::InvalidRating { criterion: Criterion::Support, .. }
        ));
    }

    #[test]
    fn test_fold_mean_matches_batch_mean() {
        let samples = [5.0, 3.0, 4.0, 2.5, 4.75];
        let mut mean = 0.0;
        for (count, sample) in samples.iter().enumerate() {
            mean = fold_mean(mean, count as i64, *sample);
        }
        let expected = samples.iter().sum::<f64>() / samples.len() as f64;
        assert!((mean - expected).abs() < 1e-12);
    }

    #[test]
    fn test_fold_mean_scenario() {
        let mean = fold_mean(fold_mean(fold_mean(0.0, 0, 5.0), 1, 3.0), 2, 4.0);
        assert_eq!(mean, 4.0);
    }
}

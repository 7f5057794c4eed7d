use std::collections::BTreeMap;
use std::fmt;

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde::Deserialize;

use crate::errors::{ReviewError, ReviewResult};

pub type RatingValue = u8;
pub type RawRatings = BTreeMap<String, f64>;

pub const MIN_RATING: RatingValue = 1;
pub const MAX_RATING: RatingValue = 5;
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criterion {
    Content,
    Professors,
    Support,
    Infrastructure,
    Material,
    Experience,
}

impl Criterion {
    pub const COUNT: usize = 6;

    pub const ALL: [Criterion; Criterion::COUNT] = [
        Criterion::Content,
        Criterion::Professors,
        Criterion::Support,
        Criterion::Infrastructure,
        Criterion::Material,
        Criterion::Experience,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Criterion::Content => "content",
            Criterion::Professors => "professors",
            Criterion::Support => "support",
            Criterion::Infrastructure => "infrastructure",
            Criterion::Material => "material",
            Criterion::Experience => "experience",
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Resolve a payload field name, including the legacy form field names.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "content" | "conteudo" | "coursequality" => Some(Criterion::Content),
            "professors" | "professores" | "professorquality" => Some(Criterion::Professors),
            "support" | "apoio" | "studysupport" => Some(Criterion::Support),
            "infrastructure" | "estrutura" | "onsitesupport" => Some(Criterion::Infrastructure),
            "material" | "didacticmaterial" => Some(Criterion::Material),
            "experience" | "experiencia" => Some(Criterion::Experience),
            _ => None,
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Criterion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Complete set of 1-5 scores, one per criterion.
///
/// Only built through validation, so a value of this type is never partial
/// and never out of range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatingVector([RatingValue; Criterion::COUNT]);

impl RatingVector {
    pub fn from_raw(raw: &RawRatings) -> ReviewResult<Self> {
        let mut scores: [Option<RatingValue>; Criterion::COUNT] = [None; Criterion::COUNT];

        for (name, value) in raw {
            let criterion =
                Criterion::parse(name).ok_or_else(|| ReviewError::UnknownCriterion(name.clone()))?;
            let slot = &mut scores[criterion.index()];
            if slot.is_some() {
                return Err(ReviewError::DuplicateCriterion(criterion));
            }
            *slot = Some(validate_value(criterion, *value)?);
        }

        let mut complete = [0; Criterion::COUNT];
        for criterion in Criterion::ALL {
            complete[criterion.index()] = scores[criterion.index()]
                .ok_or(ReviewError::IncompleteRating { criterion })?;
        }
        Ok(Self(complete))
    }

    /// Build from stored columns, in `Criterion::ALL` order.
    pub fn from_scores(scores: [i64; Criterion::COUNT]) -> ReviewResult<Self> {
        let mut values = [0; Criterion::COUNT];
        for criterion in Criterion::ALL {
            let raw = scores[criterion.index()];
            values[criterion.index()] = validate_value(criterion, raw as f64)?;
        }
        Ok(Self(values))
    }

    pub fn get(&self, criterion: Criterion) -> RatingValue {
        self.0[criterion.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Criterion, RatingValue)> + '_ {
        Criterion::ALL.into_iter().map(|c| (c, self.get(c)))
    }

    pub fn to_scores(&self) -> [i64; Criterion::COUNT] {
        self.0.map(i64::from)
    }
}

impl Serialize for RatingVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Criterion::COUNT))?;
        for (criterion, value) in self.iter() {
            map.serialize_entry(criterion.as_str(), &value)?;
        }
        map.end()
    }
}

fn validate_value(criterion: Criterion, value: f64) -> ReviewResult<RatingValue> {
    let in_range = value >= f64::from(MIN_RATING) && value <= f64::from(MAX_RATING);
    if !value.is_finite() || value.fract() != 0.0 || !in_range {
        return Err(ReviewError::InvalidRating { criterion, value });
    }
    Ok(value as RatingValue)
}

/// Criterion weights summing to 1.0. Criteria without a weight contribute nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct CriterionWeights(BTreeMap<Criterion, f64>);

impl CriterionWeights {
    pub fn new<I>(weights: I) -> ReviewResult<Self>
    where
        I: IntoIterator<Item = (Criterion, f64)>,
    {
        let mut map = BTreeMap::new();
        for (criterion, weight) in weights {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ReviewError::InvalidWeights(format!(
                    "weight for '{}' must be a non-negative number, got {}",
                    criterion, weight
                )));
            }
            if map.insert(criterion, weight).is_some() {
                return Err(ReviewError::InvalidWeights(format!(
                    "weight for '{}' given more than once",
                    criterion
                )));
            }
        }

        let sum: f64 = map.values().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ReviewError::InvalidWeights(format!(
                "weights must sum to 1.0, got {}",
                sum
            )));
        }
        Ok(Self(map))
    }

    /// Parse `content=0.3,professors=0.2,...`
    pub fn parse(spec: &str) -> ReviewResult<Self> {
        let mut pairs = Vec::new();
        for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (name, weight) = part.split_once('=').ok_or_else(|| {
                ReviewError::InvalidWeights(format!("expected 'criterion=weight', got '{}'", part))
            })?;
            let criterion = Criterion::parse(name)
                .ok_or_else(|| ReviewError::UnknownCriterion(name.trim().to_string()))?;
            let weight: f64 = weight.trim().parse().map_err(|_| {
                ReviewError::InvalidWeights(format!("'{}' is not a number", weight.trim()))
            })?;
            pairs.push((criterion, weight));
        }
        Self::new(pairs)
    }

    pub fn get(&self, criterion: Criterion) -> Option<f64> {
        self.0.get(&criterion).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Criterion, f64)> + '_ {
        self.0.iter().map(|(c, w)| (*c, *w))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pairs: &[(&str, f64)]) -> RawRatings {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn full(value: f64) -> RawRatings {
        Criterion::ALL.iter().map(|c| (c.as_str().to_string(), value)).collect()
    }

    #[test]
    fn test_complete_vector_is_accepted() {
        let vector = RatingVector::from_raw(&full(4.0)).unwrap();
        assert!(vector.iter().all(|(_, v)| v == 4));
    }

    #[test]
    fn test_legacy_field_names_map_to_criteria() {
        let ratings = raw(&[
            ("conteudo", 5.0),
            ("professores", 4.0),
            ("apoio", 3.0),
            ("estrutura", 2.0),
            ("material", 1.0),
            ("experiencia", 5.0),
        ]);
        let vector = RatingVector::from_raw(&ratings).unwrap();
        assert_eq!(vector.get(Criterion::Content), 5);
        assert_eq!(vector.get(Criterion::Infrastructure), 2);
    }

    #[test]
    fn test_missing_criterion_is_incomplete() {
        let mut ratings = full(3.0);
        ratings.remove("material");
        let err = RatingVector::from_raw(&ratings).unwrap_err();
        assert!(matches!(
            err,
            ReviewError::IncompleteRating { criterion: Criterion::Material }
        ));
    }

    #[test]
    fn test_out_of_range_and_fractional_values_are_invalid() {
        for bad in [0.0, 6.0, -1.0, 2.5, f64::NAN] {
            let mut ratings = full(3.0);
            ratings.insert("support".to_string(), bad);
            let err = RatingVector::from_raw(&ratings).unwrap_err();
            assert!(
                matches!(err, ReviewError::InvalidRating { criterion: Criterion::Support, .. }),
                "value {} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_unknown_and_duplicate_criteria_are_rejected() {
        let mut ratings = full(3.0);
        ratings.insert("parking".to_string(), 3.0);
        assert!(matches!(
            RatingVector::from_raw(&ratings),
            Err(ReviewError::UnknownCriterion(name)) if name == "parking"
        ));

        let mut ratings = full(3.0);
        ratings.insert("conteudo".to_string(), 3.0);
        assert!(matches!(
            RatingVector::from_raw(&ratings),
            Err(ReviewError::DuplicateCriterion(Criterion::Content))
        ));
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        assert!(CriterionWeights::new([(Criterion::Content, 0.5), (Criterion::Support, 0.5)]).is_ok());
        assert!(CriterionWeights::new([(Criterion::Content, 0.5), (Criterion::Support, 0.4)]).is_err());
        assert!(CriterionWeights::new([(Criterion::Content, 1.5), (Criterion::Support, -0.5)]).is_err());
    }

    #[test]
    fn test_weights_parse() {
        let weights = CriterionWeights::parse("content=0.4, professors=0.4,experiencia=0.2").unwrap();
        assert_eq!(weights.get(Criterion::Experience), Some(0.2));
        assert_eq!(weights.get(Criterion::Material), None);
        assert!(CriterionWeights::parse("content").is_err());
        assert!(CriterionWeights::parse("content=abc").is_err());
    }

    #[test]
    fn test_vector_serializes_as_named_map() {
        let vector = RatingVector::from_raw(&full(2.0)).unwrap();
        let json = serde_json::to_value(vector).unwrap();
        assert_eq!(json["infrastructure"], 2);
        assert_eq!(json.as_object().unwrap().len(), Criterion::COUNT);
    }
}

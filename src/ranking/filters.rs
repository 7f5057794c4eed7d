use super::CourseRankingEntry;
use crate::domain::Degree;

/// Conjunctive ranking filter. Unset fields let every entry through; a set
/// metadata field never matches an entry without catalog metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankingFilter {
    pub region: Option<String>,
    pub area: Option<String>,
    pub degree: Option<Degree>,
    pub is_free: Option<bool>,
    pub min_score: Option<f64>,
    pub text_search: Option<String>,
}

impl RankingFilter {
    pub fn matches(&self, entry: &CourseRankingEntry) -> bool {
        matches_text(self.region.as_deref(), entry.region.as_deref())
            && matches_text(self.area.as_deref(), entry.area.as_deref())
            && self.degree.is_none_or(|degree| entry.degree == Some(degree))
            && self.is_free.is_none_or(|free| entry.is_free == Some(free))
            && self.min_score.is_none_or(|min| entry.score >= min)
            && self.matches_search(entry)
    }

    fn matches_search(&self, entry: &CourseRankingEntry) -> bool {
        let Some(needle) = self.text_search.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
            return true;
        };
        let needle = needle.to_lowercase();

        [Some(entry.university.as_str()), Some(entry.course.as_str()), entry.campus.as_deref()]
            .into_iter()
            .flatten()
            .any(|haystack| haystack.to_lowercase().contains(&needle))
    }
}

fn matches_text(wanted: Option<&str>, actual: Option<&str>) -> bool {
    match (wanted.map(str::trim).filter(|w| !w.is_empty()), actual) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(wanted), Some(actual)) => wanted.to_lowercase() == actual.trim().to_lowercase(),
    }
}

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::LinkError;
use crate::model::StreetRecord;
use crate::normalize::{normalize, NormalizationRules};

/// Relative weights of the three similarity measures.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub ratio: f64,
    pub token_sort: f64,
    pub token_set: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            ratio: 0.2,
            token_sort: 0.3,
            token_set: 0.5,
        }
    }
}

impl ScoreWeights {
    pub fn validate(&self) -> Result<(), LinkError> {
        for (name, w) in [
            ("ratio", self.ratio),
            ("token_sort", self.token_sort),
            ("token_set", self.token_set),
        ] {
            if !w.is_finite() || w < 0.0 {
                return Err(LinkError::ConfigValidation(format!(
                    "weight '{name}' must be a non-negative number, got {w}"
                )));
            }
        }
        if self.total() <= 0.0 {
            return Err(LinkError::ConfigValidation(
                "at least one score weight must be positive".into(),
            ));
        }
        Ok(())
    }

    fn total(&self) -> f64 {
        self.ratio + self.token_sort + self.token_set
    }
}

/// A registry record prepared for scoring: every name variant normalized
/// once up front.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub official_id: String,
    pub canonical_name: String,
    /// Distinct non-empty normalized variants, canonical first.
    pub names: Vec<String>,
}

impl Candidate {
    pub fn prepare(record: &StreetRecord, rules: &NormalizationRules) -> Self {
        let mut names: Vec<String> = Vec::new();
        for variant in record.names() {
            let normalized = normalize(variant, rules);
            if !normalized.is_empty() && !names.contains(&normalized) {
                names.push(normalized);
            }
        }
        Self {
            official_id: record.official_id().to_string(),
            canonical_name: record.canonical_name().to_string(),
            names,
        }
    }
}

/// Normalized Levenshtein similarity, 0..=100. Empty on either side is 0.
pub fn ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    strsim::normalized_levenshtein(a, b) * 100.0
}

/// `ratio` over the whitespace tokens of each side, sorted.
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    ratio(&sorted_tokens(a), &sorted_tokens(b))
}

/// Set-based ratio: the shared tokens compared against shared + each side's
/// remainder. Best of the three pairings.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let left: BTreeSet<&str> = a.split_whitespace().collect();
    let right: BTreeSet<&str> = b.split_whitespace().collect();
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }

    let shared = join(left.intersection(&right));
    let with_left = join_nonempty(&shared, &join(left.difference(&right)));
    let with_right = join_nonempty(&shared, &join(right.difference(&left)));

    ratio(&shared, &with_left)
        .max(ratio(&shared, &with_right))
        .max(ratio(&with_left, &with_right))
}

/// Weighted combination of the three measures, clamped to 0..=100.
pub fn similarity(a: &str, b: &str, weights: &ScoreWeights) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 100.0;
    }
    let total = weights.total();
    if total <= 0.0 {
        return 0.0;
    }
    let weighted = weights.ratio * ratio(a, b)
        + weights.token_sort * token_sort_ratio(a, b)
        + weights.token_set * token_set_ratio(a, b);
    (weighted / total).clamp(0.0, 100.0)
}

/// Best similarity between a normalized name and any variant of the candidate.
pub fn score(normalized_name: &str, candidate: &Candidate, weights: &ScoreWeights) -> f64 {
    candidate
        .names
        .iter()
        .map(|variant| similarity(normalized_name, variant, weights))
        .fold(0.0, f64::max)
}

fn sorted_tokens(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

fn join<'a, 'b: 'a>(tokens: impl Iterator<Item = &'a &'b str>) -> String {
    tokens.copied().collect::<Vec<_>>().join(" ")
}

fn join_nonempty(a: &str, b: &str) -> String {
    match (a.is_empty(), b.is_empty()) {
        (true, _) => b.to_string(),
        (_, true) => a.to_string(),
        _ => format!("{a} {b}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 0.01
    }

    #[test]
    fn ratio_basics() {
        assert_eq!(ratio("הרצל", "הרצל"), 100.0);
        assert_eq!(ratio("", "הרצל"), 0.0);
        assert_eq!(ratio("", ""), 0.0);
        assert!(close(ratio("שדרות רוטשילד", "רוטשילד"), 53.85));
    }

    #[test]
    fn token_sort_ignores_order() {
        assert_eq!(token_sort_ratio("בן יהודה", "יהודה בן"), 100.0);
        assert!(token_sort_ratio("בן יהודה", "יהודה הלוי") < 100.0);
    }

    #[test]
    fn token_set_contains_subset() {
        assert_eq!(token_set_ratio("שדרות רוטשילד", "רוטשילד"), 100.0);
        assert_eq!(token_set_ratio("a b", "c d"), ratio("a b", "c d"));
        assert_eq!(token_set_ratio(" ", "x"), 0.0);
    }

    #[test]
    fn weighted_subset_stays_below_review() {
        let s = similarity("שדרות רוטשילד", "רוטשילד", &ScoreWeights::default());
        assert!(close(s, 76.92), "got {s}");
    }

    #[test]
    fn identical_is_exactly_hundred() {
        let w = ScoreWeights::default();
        assert_eq!(similarity("שדרות רוטשילד", "שדרות רוטשילד", &w), 100.0);
        assert_eq!(similarity("", "", &w), 0.0);
    }

    #[test]
    fn candidate_score_is_max_over_variants() {
        let rules = NormalizationRules::default();
        let record = StreetRecord::new(
            "101",
            "שדרות רוטשילד",
            vec!["רוטשילד".to_string(), "שד' רוטשילד".to_string()],
            "תל אביב",
        )
        .unwrap();
        let candidate = Candidate::prepare(&record, &rules);
        // "שד' רוטשילד" normalizes onto the canonical name.
        assert_eq!(candidate.names, vec!["שדרות רוטשילד", "רוטשילד"]);

        let w = ScoreWeights::default();
        assert_eq!(score("רוטשילד", &candidate, &w), 100.0);
        assert_eq!(score("שדרות רוטשילד", &candidate, &w), 100.0);
        assert_eq!(score("", &candidate, &w), 0.0);
    }

    #[test]
    fn weights_validation() {
        assert!(ScoreWeights::default().validate().is_ok());
        let zero = ScoreWeights { ratio: 0.0, token_sort: 0.0, token_set: 0.0 };
        assert!(zero.validate().is_err());
        let negative = ScoreWeights { ratio: -0.1, ..ScoreWeights::default() };
        assert!(negative.validate().is_err());
        let only_ratio = ScoreWeights { ratio: 1.0, token_sort: 0.0, token_set: 0.0 };
        assert!(only_ratio.validate().is_ok());
        assert_eq!(similarity("ab", "ac", &only_ratio), ratio("ab", "ac"));
    }

    proptest! {
        #[test]
        fn scores_are_bounded(a in "[a-c ]{0,12}", b in "[a-c ]{0,12}") {
            let w = ScoreWeights::default();
            let s = similarity(&a, &b, &w);
            prop_assert!((0.0..=100.0).contains(&s));
            prop_assert!((0.0..=100.0).contains(&token_set_ratio(&a, &b)));
            prop_assert!((0.0..=100.0).contains(&token_sort_ratio(&a, &b)));
        }

        #[test]
        fn self_similarity_is_hundred(a in "[א-ת]{1,8}( [א-ת]{1,8}){0,3}") {
            prop_assert_eq!(similarity(&a, &a, &ScoreWeights::default()), 100.0);
        }
    }
}

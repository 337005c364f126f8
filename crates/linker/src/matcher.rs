use std::collections::{BTreeMap, HashSet};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::LinkError;
use crate::model::{CandidateScore, ClassifiedSegment, MapSegment, MatchOutcome, StreetRecord};
use crate::normalize::{normalize, normalize_locality, NormalizationRules};
use crate::scorer::{score, Candidate, ScoreWeights};

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

/// Confidence tiers. `confident` and `review` are inclusive lower bounds.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Thresholds {
    pub confident: f64,
    pub review: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            confident: 98.0,
            review: 80.0,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<(), LinkError> {
        let ok = self.review.is_finite()
            && self.confident.is_finite()
            && self.review > 0.0
            && self.review <= self.confident
            && self.confident <= 100.0;
        if !ok {
            return Err(LinkError::ConfigValidation(format!(
                "thresholds must satisfy 0 < review <= confident <= 100, got review={} confident={}",
                self.review, self.confident
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Candidate index
// ---------------------------------------------------------------------------

/// Registry candidates grouped by normalized locality.
#[derive(Debug, Default)]
pub struct CandidateIndex {
    by_locality: BTreeMap<String, Vec<Candidate>>,
}

impl CandidateIndex {
    /// Prepare every record. A repeated official id within a locality keeps
    /// the first record.
    pub fn build(records: &[StreetRecord], rules: &NormalizationRules) -> Self {
        let mut by_locality: BTreeMap<String, Vec<Candidate>> = BTreeMap::new();
        let mut seen: HashSet<(String, &str)> = HashSet::new();

        for record in records {
            let key = normalize_locality(record.locality());
            if !seen.insert((key.clone(), record.official_id())) {
                log::warn!(
                    "registry: duplicate official_id '{}' in '{}', keeping first",
                    record.official_id(),
                    record.locality()
                );
                continue;
            }
            by_locality
                .entry(key)
                .or_default()
                .push(Candidate::prepare(record, rules));
        }
        Self { by_locality }
    }

    /// Candidates for a locality label (normalized before lookup).
    pub fn get(&self, locality: &str) -> &[Candidate] {
        self.by_locality
            .get(&normalize_locality(locality))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn localities(&self) -> impl Iterator<Item = &str> {
        self.by_locality.keys().map(String::as_str)
    }

    /// Every candidate paired with its normalized locality key.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Candidate)> {
        self.by_locality
            .iter()
            .flat_map(|(locality, candidates)| candidates.iter().map(move |c| (locality.as_str(), c)))
    }

    pub fn len(&self) -> usize {
        self.by_locality.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Score every candidate; highest first, ties by official id.
pub fn rank(normalized_name: &str, candidates: &[Candidate], weights: &ScoreWeights) -> Vec<CandidateScore> {
    let mut ranked: Vec<CandidateScore> = candidates
        .iter()
        .map(|c| CandidateScore {
            official_id: c.official_id.clone(),
            name: c.canonical_name.clone(),
            score: score(normalized_name, c, weights),
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.official_id.cmp(&b.official_id))
    });
    ranked
}

/// Tier an already-ranked list.
pub fn classify_ranked(ranked: Vec<CandidateScore>, thresholds: &Thresholds) -> MatchOutcome {
    let Some(top) = ranked.first() else {
        return MatchOutcome::Missing;
    };
    if top.score >= thresholds.confident {
        return MatchOutcome::Confident {
            official_id: top.official_id.clone(),
            score: top.score,
        };
    }
    if top.score >= thresholds.review {
        let candidates = ranked
            .into_iter()
            .take_while(|c| c.score >= thresholds.review)
            .collect();
        return MatchOutcome::NeedsResolution { candidates };
    }
    MatchOutcome::Missing
}

/// Classify one normalized name against a locality's candidates.
pub fn classify(
    normalized_name: &str,
    candidates: &[Candidate],
    weights: &ScoreWeights,
    thresholds: &Thresholds,
) -> MatchOutcome {
    if normalized_name.is_empty() {
        return MatchOutcome::Missing;
    }
    classify_ranked(rank(normalized_name, candidates, weights), thresholds)
}

/// Shared, read-only inputs for classifying a batch of segments.
#[derive(Debug, Clone, Copy)]
pub struct MatchContext<'a> {
    pub rules: &'a NormalizationRules,
    pub weights: &'a ScoreWeights,
    pub thresholds: &'a Thresholds,
}

/// Normalize and classify every segment in parallel. Output order matches
/// input order.
pub fn classify_all(
    segments: &[MapSegment],
    index: &CandidateIndex,
    ctx: MatchContext<'_>,
) -> Vec<ClassifiedSegment> {
    segments
        .par_iter()
        .map(|segment| {
            let normalized_name = normalize(segment.raw_name(), ctx.rules);
            let outcome = classify(
                &normalized_name,
                index.get(segment.locality()),
                ctx.weights,
                ctx.thresholds,
            );
            ClassifiedSegment {
                segment_id: segment.segment_id().to_string(),
                raw_name: segment.raw_name().to_string(),
                normalized_name,
                locality: segment.locality().to_string(),
                outcome,
            }
        })
        .collect()
}

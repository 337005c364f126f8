use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::model::{
    ClassifiedSegment, Diagnostics, FinalMapping, LinkSummary, MatchOutcome, ResolutionResult,
    SegmentReport, UnmatchedRecord,
};
use crate::normalize::normalize_locality;
use crate::scorer::Candidate;

/// Compute summary counts from classified segments and their resolutions.
pub fn compute_summary(
    classified: &[ClassifiedSegment],
    resolutions: &HashMap<String, ResolutionResult>,
    mapping: &FinalMapping,
    rejected_records: usize,
) -> LinkSummary {
    let mut summary = LinkSummary {
        segments: classified.len(),
        mapped: mapping.len(),
        rejected_records,
        ..LinkSummary::default()
    };

    for segment in classified {
        match &segment.outcome {
            MatchOutcome::Confident { .. } => summary.confident += 1,
            MatchOutcome::Missing => summary.missing += 1,
            MatchOutcome::NeedsResolution { .. } => {
                summary.needs_resolution += 1;
                match resolutions.get(&segment.segment_id) {
                    Some(ResolutionResult::Resolved { .. }) => summary.resolved += 1,
                    Some(ResolutionResult::Unresolved { reason }) => {
                        summary.unresolved += 1;
                        *summary.unresolved_reasons.entry(reason.to_string()).or_insert(0) += 1;
                    }
                    None => {
                        summary.unresolved += 1;
                        *summary.unresolved_reasons.entry("no_arbiter".into()).or_insert(0) += 1;
                    }
                }
            }
        }
    }

    summary
}

/// What was left over on either side of the mapping.
///
/// Registry streets are keyed by (normalized locality, official id), so the
/// same id in two localities counts twice and is matched per locality.
pub fn compute_diagnostics<'a>(
    classified: &[ClassifiedSegment],
    mapping: &FinalMapping,
    registry: impl IntoIterator<Item = (&'a str, &'a Candidate)>,
) -> Diagnostics {
    let mapped_segments: HashSet<&str> = mapping.rows.iter().map(|r| r.segment_id.as_str()).collect();

    let segment_localities: HashMap<&str, String> = classified
        .iter()
        .map(|s| (s.segment_id.as_str(), normalize_locality(&s.locality)))
        .collect();
    let mapped_ids: HashSet<(&str, &str)> = mapping
        .rows
        .iter()
        .filter_map(|r| {
            segment_localities
                .get(r.segment_id.as_str())
                .map(|locality| (locality.as_str(), r.official_id.as_str()))
        })
        .collect();

    let unmatched_segment_names: BTreeSet<&str> = classified
        .iter()
        .filter(|s| !s.normalized_name.is_empty() && !mapped_segments.contains(s.segment_id.as_str()))
        .map(|s| s.normalized_name.as_str())
        .collect();

    let mut registry_ids: BTreeMap<(&str, &str), &str> = BTreeMap::new();
    for (locality, candidate) in registry {
        registry_ids
            .entry((locality, candidate.official_id.as_str()))
            .or_insert(candidate.canonical_name.as_str());
    }

    let unmatched_registry = registry_ids
        .iter()
        .filter(|(key, _)| !mapped_ids.contains(*key))
        .map(|((locality, id), name)| UnmatchedRecord {
            official_id: (*id).to_string(),
            name: (*name).to_string(),
            locality: (*locality).to_string(),
        })
        .collect();

    Diagnostics {
        registry_streets: registry_ids.len(),
        unmatched_segment_names: unmatched_segment_names.into_iter().map(String::from).collect(),
        unmatched_registry,
    }
}

/// One diagnostic row per segment, in input order.
pub fn segment_reports(
    classified: &[ClassifiedSegment],
    resolutions: &HashMap<String, ResolutionResult>,
    mapping: &FinalMapping,
) -> Vec<SegmentReport> {
    let final_ids: HashMap<&str, &str> = mapping
        .rows
        .iter()
        .map(|r| (r.segment_id.as_str(), r.official_id.as_str()))
        .collect();

    classified
        .iter()
        .map(|s| {
            let candidates = match &s.outcome {
                MatchOutcome::NeedsResolution { candidates } => candidates.clone(),
                _ => Vec::new(),
            };
            SegmentReport {
                segment_id: s.segment_id.clone(),
                raw_name: s.raw_name.clone(),
                normalized_name: s.normalized_name.clone(),
                locality: s.locality.clone(),
                status: s.outcome.to_string(),
                best_score: s.outcome.best_score(),
                candidates,
                resolution: resolutions.get(&s.segment_id).cloned(),
                final_official_id: final_ids.get(s.segment_id.as_str()).map(|id| (*id).to_string()),
            }
        })
        .collect()
}

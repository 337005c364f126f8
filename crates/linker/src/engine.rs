use std::collections::{HashMap, HashSet};

use crate::adjacency::build_adjacency;
use crate::config::LinkConfig;
use crate::error::LinkError;
use crate::evidence::{compute_diagnostics, compute_summary, segment_reports};
use crate::matcher::{classify_all, CandidateIndex, MatchContext};
use crate::merge::merge;
use crate::model::{LinkInput, LinkMeta, LinkResult, MapSegment, StreetRecord};
use crate::normalize::normalize_locality;
use crate::resolver::{resolve_all, Arbiter, ResolveContext};

/// Run linkage per config. Returns the mapping, summary and diagnostics.
///
/// `arbiter` is optional: without one, ambiguous segments stay unresolved.
pub fn run(
    config: &LinkConfig,
    input: &LinkInput,
    arbiter: Option<&dyn Arbiter>,
) -> Result<LinkResult, LinkError> {
    let rules = config.normalize.rules()?;
    let target = config.locality.as_deref().map(normalize_locality);
    let in_scope = |locality: &str| match &target {
        Some(key) => normalize_locality(locality) == *key,
        None => true,
    };

    let segments = unique_segments(input.segments.iter().filter(|s| in_scope(s.locality())));
    if segments.is_empty() {
        return Err(LinkError::NoData {
            locality: config.locality.clone().unwrap_or_else(|| "(all)".into()),
        });
    }

    let registry: Vec<StreetRecord> = input
        .registry
        .iter()
        .filter(|r| in_scope(r.locality()))
        .cloned()
        .collect();
    let index = CandidateIndex::build(&registry, &rules);
    if index.is_empty() {
        log::warn!(
            "no registry streets for {}, every segment will be missing",
            config.locality.as_deref().unwrap_or("any locality")
        );
    }
    log::info!(
        "linking {} segments against {} registry streets",
        segments.len(),
        index.len()
    );

    let adjacency = build_adjacency(&segments, config.adjacency.tolerance);

    let classified = classify_all(
        &segments,
        &index,
        MatchContext {
            rules: &rules,
            weights: &config.weights,
            thresholds: &config.thresholds,
        },
    );

    let names: HashMap<String, String> = classified
        .iter()
        .map(|c| (c.segment_id.clone(), c.normalized_name.clone()))
        .collect();
    let resolutions = resolve_all(
        &classified,
        ResolveContext {
            adjacency: &adjacency,
            names: &names,
            max_candidates: config.arbitration.max_candidates,
        },
        arbiter,
        config.arbitration.concurrency,
    );

    let mapping = merge(&classified, &resolutions);
    let summary = compute_summary(&classified, &resolutions, &mapping, input.rejected_records);
    let diagnostics = compute_diagnostics(&classified, &mapping, index.entries());
    let reports = segment_reports(&classified, &resolutions, &mapping);

    log::info!(
        "linked {}/{} segments ({} confident, {} resolved, {} unresolved, {} missing)",
        summary.mapped,
        summary.segments,
        summary.confident,
        summary.resolved,
        summary.unresolved,
        summary.missing
    );

    Ok(LinkResult {
        meta: LinkMeta {
            config_name: config.name.clone(),
            locality: config.locality.clone(),
            arbiter: arbiter.map(|a| a.name().to_string()),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
        },
        summary,
        mapping,
        segments: reports,
        diagnostics,
    })
}

/// Keep the first segment for each id.
fn unique_segments<'a>(segments: impl Iterator<Item = &'a MapSegment>) -> Vec<MapSegment> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut unique = Vec::new();
    for segment in segments {
        if !seen.insert(segment.segment_id()) {
            log::warn!("segments: duplicate segment_id '{}', keeping first", segment.segment_id());
            continue;
        }
        unique.push(segment.clone());
    }
    unique
}

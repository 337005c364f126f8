use std::collections::HashMap;

use crate::model::{ClassifiedSegment, FinalMapping, MappingRow, MatchOutcome, ResolutionResult};

/// Confident matches plus resolved ambiguities, in segment order.
///
/// Missing and unresolved segments are left out entirely.
pub fn merge(
    classified: &[ClassifiedSegment],
    resolutions: &HashMap<String, ResolutionResult>,
) -> FinalMapping {
    let rows = classified
        .iter()
        .filter_map(|segment| {
            let official_id = match &segment.outcome {
                MatchOutcome::Confident { official_id, .. } => Some(official_id.as_str()),
                MatchOutcome::NeedsResolution { .. } => resolutions
                    .get(&segment.segment_id)
                    .and_then(ResolutionResult::official_id),
                MatchOutcome::Missing => None,
            }?;
            Some(MappingRow {
                segment_id: segment.segment_id.clone(),
                segment_name: segment.raw_name.clone(),
                official_id: official_id.to_string(),
            })
        })
        .collect();
    FinalMapping { rows }
}

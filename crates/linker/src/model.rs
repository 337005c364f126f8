use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::LinkError;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// An authoritative street from the registry. One record per official id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreetRecord {
    official_id: String,
    canonical_name: String,
    synonyms: Vec<String>,
    locality: String,
}

impl StreetRecord {
    /// Build a record, rejecting it if a required field is missing.
    ///
    /// Synonyms are trimmed, emptied entries and repeats of the canonical
    /// name dropped, first occurrence kept.
    pub fn new(
        official_id: impl Into<String>,
        canonical_name: impl Into<String>,
        synonyms: impl IntoIterator<Item = String>,
        locality: impl Into<String>,
    ) -> Result<Self, LinkError> {
        let official_id = official_id.into().trim().to_string();
        let canonical_name = canonical_name.into().trim().to_string();
        let locality = locality.into().trim().to_string();

        let reject = |reason: &str| LinkError::InvalidRecord {
            source: "registry".into(),
            record_id: official_id.clone(),
            reason: reason.into(),
        };
        if official_id.is_empty() {
            return Err(reject("missing official_id"));
        }
        if canonical_name.is_empty() {
            return Err(reject("missing canonical name"));
        }
        if locality.is_empty() {
            return Err(reject("missing locality"));
        }

        let mut kept: Vec<String> = Vec::new();
        for synonym in synonyms {
            let synonym = synonym.trim();
            if synonym.is_empty() || synonym == canonical_name || kept.iter().any(|s| s == synonym) {
                continue;
            }
            kept.push(synonym.to_string());
        }

        Ok(Self {
            official_id,
            canonical_name,
            synonyms: kept,
            locality,
        })
    }

    pub fn official_id(&self) -> &str {
        &self.official_id
    }

    pub fn canonical_name(&self) -> &str {
        &self.canonical_name
    }

    pub fn synonyms(&self) -> &[String] {
        &self.synonyms
    }

    pub fn locality(&self) -> &str {
        &self.locality
    }

    /// Canonical name first, then synonyms.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.canonical_name.as_str()).chain(self.synonyms.iter().map(String::as_str))
    }
}

/// A planar coordinate. Units are whatever the map export uses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// A unit of street geometry from the map source.
#[derive(Debug, Clone, PartialEq)]
pub struct MapSegment {
    segment_id: String,
    raw_name: String,
    locality: String,
    geometry: Vec<Point>,
}

impl MapSegment {
    /// Build a segment. The raw name may be empty (it classifies as missing);
    /// id and locality are required.
    pub fn new(
        segment_id: impl Into<String>,
        raw_name: impl Into<String>,
        locality: impl Into<String>,
        geometry: Vec<Point>,
    ) -> Result<Self, LinkError> {
        let segment_id = segment_id.into().trim().to_string();
        let locality = locality.into().trim().to_string();

        let reject = |reason: &str| LinkError::InvalidRecord {
            source: "segments".into(),
            record_id: segment_id.clone(),
            reason: reason.into(),
        };
        if segment_id.is_empty() {
            return Err(reject("missing segment_id"));
        }
        if locality.is_empty() {
            return Err(reject("missing locality"));
        }

        Ok(Self {
            segment_id,
            raw_name: raw_name.into(),
            locality,
            geometry,
        })
    }

    pub fn segment_id(&self) -> &str {
        &self.segment_id
    }

    pub fn raw_name(&self) -> &str {
        &self.raw_name
    }

    pub fn locality(&self) -> &str {
        &self.locality
    }

    pub fn geometry(&self) -> &[Point] {
        &self.geometry
    }

    /// First and last vertex. A single-vertex geometry yields one point.
    pub fn endpoints(&self) -> Vec<Point> {
        match (self.geometry.first(), self.geometry.last()) {
            (Some(first), Some(last)) if self.geometry.len() > 1 => vec![*first, *last],
            (Some(first), _) => vec![*first],
            _ => Vec::new(),
        }
    }
}

/// Pre-loaded, already-validated records for one run.
#[derive(Debug, Default)]
pub struct LinkInput {
    pub registry: Vec<StreetRecord>,
    pub segments: Vec<MapSegment>,
    /// Rows dropped during loading because they failed record validation.
    pub rejected_records: usize,
}

// ---------------------------------------------------------------------------
// Scoring + classification
// ---------------------------------------------------------------------------

/// Score of one registry candidate against one segment name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateScore {
    pub official_id: String,
    pub name: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MatchOutcome {
    Confident { official_id: String, score: f64 },
    NeedsResolution { candidates: Vec<CandidateScore> },
    Missing,
}

impl MatchOutcome {
    pub fn best_score(&self) -> Option<f64> {
        match self {
            Self::Confident { score, .. } => Some(*score),
            Self::NeedsResolution { candidates } => candidates.first().map(|c| c.score),
            Self::Missing => None,
        }
    }
}

impl std::fmt::Display for MatchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Confident { .. } => write!(f, "confident"),
            Self::NeedsResolution { .. } => write!(f, "needs_resolution"),
            Self::Missing => write!(f, "missing"),
        }
    }
}

/// A segment together with its normalized name and classification.
#[derive(Debug, Clone, Serialize)]
pub struct ClassifiedSegment {
    pub segment_id: String,
    pub raw_name: String,
    pub normalized_name: String,
    pub locality: String,
    pub outcome: MatchOutcome,
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedReason {
    /// No arbitration collaborator configured.
    NoArbiter,
    /// The arbiter explicitly answered that no candidate is acceptable.
    Declined,
    /// The arbiter named an id outside the offered candidates.
    InvalidChoice,
    /// Transport failure, timeout or unparseable reply.
    Failed,
}

impl std::fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoArbiter => write!(f, "no_arbiter"),
            Self::Declined => write!(f, "declined"),
            Self::InvalidChoice => write!(f, "invalid_choice"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "resolution", rename_all = "snake_case")]
pub enum ResolutionResult {
    Resolved { official_id: String },
    Unresolved { reason: UnresolvedReason },
}

impl ResolutionResult {
    pub fn official_id(&self) -> Option<&str> {
        match self {
            Self::Resolved { official_id } => Some(official_id),
            Self::Unresolved { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Final mapping
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingRow {
    pub segment_id: String,
    pub segment_name: String,
    pub official_id: String,
}

/// Segment → official id, for confident and resolved segments only, in input
/// segment order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FinalMapping {
    pub rows: Vec<MappingRow>,
}

impl FinalMapping {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, segment_id: &str) -> Option<&str> {
        self.rows
            .iter()
            .find(|r| r.segment_id == segment_id)
            .map(|r| r.official_id.as_str())
    }

    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.rows
            .iter()
            .map(|r| (r.segment_id.clone(), r.official_id.clone()))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct LinkSummary {
    pub segments: usize,
    pub confident: usize,
    pub needs_resolution: usize,
    pub resolved: usize,
    pub unresolved: usize,
    pub missing: usize,
    pub mapped: usize,
    pub rejected_records: usize,
    pub unresolved_reasons: BTreeMap<String, usize>,
}

/// One registry street nothing mapped to. `locality` is the normalized
/// locality key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnmatchedRecord {
    pub official_id: String,
    pub name: String,
    pub locality: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    pub registry_streets: usize,
    pub unmatched_segment_names: Vec<String>,
    pub unmatched_registry: Vec<UnmatchedRecord>,
}

/// Per-segment diagnostic row.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentReport {
    pub segment_id: String,
    pub raw_name: String,
    pub normalized_name: String,
    pub locality: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_score: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<CandidateScore>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<ResolutionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_official_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkMeta {
    pub config_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arbiter: Option<String>,
    pub engine_version: String,
    pub run_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkResult {
    pub meta: LinkMeta,
    pub summary: LinkSummary,
    pub mapping: FinalMapping,
    pub segments: Vec<SegmentReport>,
    pub diagnostics: Diagnostics,
}

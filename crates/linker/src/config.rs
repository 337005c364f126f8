use serde::Deserialize;

use crate::adjacency::DEFAULT_TOLERANCE;
use crate::error::LinkError;
use crate::matcher::Thresholds;
use crate::normalize::{Abbreviation, NormalizationRules};
use crate::scorer::ScoreWeights;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct LinkConfig {
    #[serde(default = "default_name")]
    pub name: String,
    /// Restrict the run to one locality. `None` links every locality present.
    #[serde(default)]
    pub locality: Option<String>,
    #[serde(default)]
    pub registry: RegistrySource,
    #[serde(default)]
    pub segments: SegmentSource,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub weights: ScoreWeights,
    #[serde(default)]
    pub normalize: NormalizeConfig,
    #[serde(default)]
    pub adjacency: AdjacencyConfig,
    #[serde(default)]
    pub arbitration: ArbitrationConfig,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            locality: None,
            registry: RegistrySource::default(),
            segments: SegmentSource::default(),
            thresholds: Thresholds::default(),
            weights: ScoreWeights::default(),
            normalize: NormalizeConfig::default(),
            adjacency: AdjacencyConfig::default(),
            arbitration: ArbitrationConfig::default(),
        }
    }
}

fn default_name() -> String {
    "streetlink".into()
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RegistrySource {
    #[serde(default = "default_registry_file")]
    pub file: String,
    #[serde(default)]
    pub columns: RegistryColumns,
}

impl Default for RegistrySource {
    fn default() -> Self {
        Self {
            file: default_registry_file(),
            columns: RegistryColumns::default(),
        }
    }
}

fn default_registry_file() -> String {
    "registry.csv".into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryColumns {
    pub official_id: String,
    pub name: String,
    pub locality: String,
    /// Optional column of `|`-separated alternative names.
    pub synonyms: Option<String>,
}

impl Default for RegistryColumns {
    fn default() -> Self {
        Self {
            official_id: "official_id".into(),
            name: "name".into(),
            locality: "locality".into(),
            synonyms: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SegmentSource {
    #[serde(default = "default_segments_file")]
    pub file: String,
    #[serde(default)]
    pub columns: SegmentColumns,
}

impl Default for SegmentSource {
    fn default() -> Self {
        Self {
            file: default_segments_file(),
            columns: SegmentColumns::default(),
        }
    }
}

fn default_segments_file() -> String {
    "segments.csv".into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SegmentColumns {
    pub segment_id: String,
    pub name: String,
    pub locality: String,
    pub geometry: String,
}

impl Default for SegmentColumns {
    fn default() -> Self {
        Self {
            segment_id: "segment_id".into(),
            name: "name".into(),
            locality: "locality".into(),
            geometry: "geometry".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Normalize + Adjacency + Arbitration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    /// Start from the built-in Hebrew/English table.
    pub use_default_abbreviations: bool,
    /// Extra (or overriding) abbreviation rules.
    pub abbreviations: Vec<Abbreviation>,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            use_default_abbreviations: true,
            abbreviations: Vec::new(),
        }
    }
}

impl NormalizeConfig {
    pub fn rules(&self) -> Result<NormalizationRules, LinkError> {
        if self.use_default_abbreviations {
            NormalizationRules::with_defaults(self.abbreviations.iter().cloned())
        } else {
            NormalizationRules::new(self.abbreviations.iter().cloned())
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdjacencyConfig {
    /// Maximum endpoint distance, in coordinate units.
    pub tolerance: f64,
}

impl Default for AdjacencyConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

/// Engine-side arbitration settings. Provider details are read from the
/// same section by the arbiter crate.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArbitrationConfig {
    /// Maximum requests in flight.
    pub concurrency: usize,
    /// Offer at most this many candidates per request.
    pub max_candidates: Option<usize>,
}

impl Default for ArbitrationConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_candidates: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl LinkConfig {
    pub fn from_toml(input: &str) -> Result<Self, LinkError> {
        let config: LinkConfig =
            toml::from_str(input).map_err(|e| LinkError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), LinkError> {
        self.thresholds.validate()?;
        self.weights.validate()?;
        self.normalize.rules()?;

        if !(self.adjacency.tolerance.is_finite() && self.adjacency.tolerance > 0.0) {
            return Err(LinkError::ConfigValidation(format!(
                "adjacency tolerance must be a positive number, got {}",
                self.adjacency.tolerance
            )));
        }

        if self.arbitration.concurrency == 0 {
            return Err(LinkError::ConfigValidation(
                "arbitration concurrency must be at least 1".into(),
            ));
        }

        if self.arbitration.max_candidates == Some(0) {
            return Err(LinkError::ConfigValidation(
                "arbitration max_candidates must be at least 1".into(),
            ));
        }

        if let Some(locality) = &self.locality {
            if locality.trim().is_empty() {
                return Err(LinkError::ConfigValidation(
                    "locality must not be empty (omit it to link every locality)".into(),
                ));
            }
        }

        for (what, value) in [
            ("registry.columns.official_id", &self.registry.columns.official_id),
            ("registry.columns.name", &self.registry.columns.name),
            ("registry.columns.locality", &self.registry.columns.locality),
            ("segments.columns.segment_id", &self.segments.columns.segment_id),
            ("segments.columns.name", &self.segments.columns.name),
            ("segments.columns.locality", &self.segments.columns.locality),
            ("segments.columns.geometry", &self.segments.columns.geometry),
        ] {
            if value.trim().is_empty() {
                return Err(LinkError::ConfigValidation(format!("{what} must not be empty")));
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

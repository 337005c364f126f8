use std::path::PathBuf;
use std::sync::Mutex;

use streetlink_linker::load::load_input;
use streetlink_linker::model::{ResolutionResult, UnresolvedReason};
use streetlink_linker::normalize::{normalize, NormalizationRules};
use streetlink_linker::resolver::{ArbiterResult, ArbitrationDecision, ArbitrationRequest};
use streetlink_linker::{run, Arbiter, LinkConfig, LinkError, LinkInput, LinkResult};

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn fixture_config() -> LinkConfig {
    let toml = std::fs::read_to_string(fixtures_dir().join("tel-aviv.toml")).unwrap();
    LinkConfig::from_toml(&toml).unwrap()
}

fn load(config: &LinkConfig) -> LinkInput {
    let dir = fixtures_dir();
    let registry = std::fs::read_to_string(dir.join(&config.registry.file)).unwrap();
    let segments = std::fs::read_to_string(dir.join(&config.segments.file)).unwrap();
    load_input(&registry, &config.registry, &segments, &config.segments).unwrap()
}

fn load_and_run(config: &LinkConfig, arbiter: Option<&dyn Arbiter>) -> LinkResult {
    run(config, &load(config), arbiter).unwrap()
}

fn status_of<'a>(result: &'a LinkResult, segment_id: &str) -> &'a str {
    result
        .segments
        .iter()
        .find(|s| s.segment_id == segment_id)
        .map(|s| s.status.as_str())
        .unwrap_or_else(|| panic!("no report for {segment_id}"))
}

/// Answers with a fixed id and keeps every request it was sent.
struct Scripted {
    answer: Option<&'static str>,
    requests: Mutex<Vec<ArbitrationRequest>>,
}

impl Scripted {
    fn new(answer: Option<&'static str>) -> Self {
        Self { answer, requests: Mutex::new(Vec::new()) }
    }
}

impl Arbiter for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    fn arbitrate(&self, request: &ArbitrationRequest) -> ArbiterResult {
        self.requests.lock().unwrap().push(request.clone());
        Ok(match self.answer {
            Some(id) => ArbitrationDecision::Chosen(id.to_string()),
            None => ArbitrationDecision::NoneAcceptable,
        })
    }
}

// -------------------------------------------------------------------------
// End-to-end scenarios
// -------------------------------------------------------------------------

#[test]
fn abbreviated_name_is_confident() {
    let result = load_and_run(&fixture_config(), None);

    assert_eq!(status_of(&result, "w1"), "confident");
    assert_eq!(result.mapping.get("w1"), Some("101"));
    assert_eq!(result.segments[0].normalized_name, "שדרות רוטשילד");
    assert_eq!(result.segments[0].best_score, Some(100.0));
}

#[test]
fn locality_without_registry_streets_is_missing() {
    let config = LinkConfig {
        locality: None,
        ..fixture_config()
    };
    let result = load_and_run(&config, None);

    assert_eq!(status_of(&result, "w8"), "missing");
    assert_eq!(result.mapping.get("w8"), None);
    assert_eq!(result.mapping.get("w6"), Some("201"));
}

#[test]
fn ambiguous_without_arbiter_is_unresolved() {
    let result = load_and_run(&fixture_config(), None);

    assert_eq!(status_of(&result, "w4"), "needs_resolution");
    let report = result.segments.iter().find(|s| s.segment_id == "w4").unwrap();
    assert_eq!(
        report.resolution,
        Some(ResolutionResult::Unresolved { reason: UnresolvedReason::NoArbiter })
    );
    assert_eq!(report.candidates.len(), 1);
    assert_eq!(report.candidates[0].official_id, "104");
    assert_eq!(result.mapping.get("w4"), None);
}

#[test]
fn summary_and_diagnostics_for_one_locality() {
    let result = load_and_run(&fixture_config(), None);
    let s = &result.summary;

    assert_eq!(s.segments, 5);
    assert_eq!(s.confident, 2);
    assert_eq!(s.needs_resolution, 1);
    assert_eq!(s.unresolved, 1);
    assert_eq!(s.missing, 2);
    assert_eq!(s.rejected_records, 2);
    assert_eq!(s.mapped, s.confident + s.resolved);
    assert_eq!(result.mapping.len(), s.mapped);

    let d = &result.diagnostics;
    assert_eq!(d.registry_streets, 6);
    assert_eq!(d.unmatched_segment_names, vec!["בן יהודא".to_string(), "קינג גורג".to_string()]);
    let ids: Vec<_> = d.unmatched_registry.iter().map(|r| r.official_id.as_str()).collect();
    assert_eq!(ids, vec!["103", "104", "105", "106"]);
}

// -------------------------------------------------------------------------
// Arbitration
// -------------------------------------------------------------------------

#[test]
fn arbiter_sees_context_and_resolves() {
    let arbiter = Scripted::new(Some("104"));
    let result = load_and_run(&fixture_config(), Some(&arbiter));

    assert_eq!(result.mapping.get("w4"), Some("104"));
    assert_eq!(result.summary.resolved, 1);
    assert_eq!(result.mapping.len(), result.summary.confident + result.summary.resolved);
    assert_eq!(result.meta.arbiter.as_deref(), Some("scripted"));

    let requests = arbiter.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let req = &requests[0];
    assert_eq!(req.segment_id, "w4");
    assert_eq!(req.segment_name, "בן יהודא");
    assert_eq!(req.adjacent_names, vec!["שדרות רוטשילד".to_string(), "הרצל".to_string()]);
    assert_eq!(req.candidates.len(), 1);
}

#[test]
fn arbiter_choice_outside_offer_is_rejected() {
    // 105 exists in the registry but scored below review, so it was not offered.
    let arbiter = Scripted::new(Some("105"));
    let result = load_and_run(&fixture_config(), Some(&arbiter));

    assert_eq!(result.mapping.get("w4"), None);
    assert_eq!(result.summary.unresolved_reasons.get("invalid_choice"), Some(&1));
    assert!(result.mapping.rows.iter().all(|r| r.official_id != "105"));
}

#[test]
fn arbiter_refusal_is_unresolved() {
    let arbiter = Scripted::new(None);
    let result = load_and_run(&fixture_config(), Some(&arbiter));
    assert_eq!(result.summary.unresolved_reasons.get("declined"), Some(&1));
    assert_eq!(result.mapping.len(), 2);
}

// -------------------------------------------------------------------------
// Errors + properties
// -------------------------------------------------------------------------

#[test]
fn unknown_locality_is_fatal() {
    let config = LinkConfig {
        locality: Some("אילת".into()),
        ..fixture_config()
    };
    let err = run(&config, &load(&config), None).unwrap_err();
    assert!(matches!(err, LinkError::NoData { .. }));
}

#[test]
fn rerun_is_deterministic() {
    let config = fixture_config();
    let a = load_and_run(&config, None);
    let b = load_and_run(&config, None);
    assert_eq!(a.mapping, b.mapping);
    assert_eq!(
        serde_json::to_value(&a.segments).unwrap(),
        serde_json::to_value(&b.segments).unwrap()
    );
}

#[test]
fn outcomes_partition_segments() {
    let config = LinkConfig {
        locality: None,
        ..fixture_config()
    };
    let result = load_and_run(&config, None);
    let s = &result.summary;
    assert_eq!(s.confident + s.needs_resolution + s.missing, s.segments);
    assert_eq!(s.resolved + s.unresolved, s.needs_resolution);
}

#[test]
fn abbreviation_styles_normalize_identically() {
    let rules = NormalizationRules::default();
    let forms = ["שד' רוטשילד", "שד. רוטשילד", "שד׳ רוטשילד", "שדרות  רוטשילד", "שדרות-רוטשילד"];
    let normalized: Vec<String> = forms.iter().map(|f| normalize(f, &rules)).collect();
    assert!(normalized.iter().all(|n| n == "שדרות רוטשילד"), "{normalized:?}");
}

#[test]
fn confident_outcome_carries_score() {
    let result = load_and_run(&fixture_config(), None);
    let w2 = result.segments.iter().find(|s| s.segment_id == "w2").unwrap();
    assert_eq!(w2.final_official_id.as_deref(), Some("102"));
    assert_eq!(w2.best_score, Some(100.0));
    assert!(w2.candidates.is_empty());
}

#[test]
fn canonical_beats_bare_surname_street() {
    use streetlink_linker::scorer::{score, Candidate, ScoreWeights};
    use streetlink_linker::{MapSegment, Point, StreetRecord};

    let locality = "תל אביב-יפו";
    let registry = vec![
        StreetRecord::new("101", "שדרות רוטשילד", Vec::new(), locality).unwrap(),
        StreetRecord::new("102", "רוטשילד", Vec::new(), locality).unwrap(),
    ];
    let segment = MapSegment::new(
        "w1",
        "שד' רוטשילד",
        locality,
        vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0)],
    )
    .unwrap();

    let rules = NormalizationRules::default();
    let name = normalize(segment.raw_name(), &rules);
    let weights = ScoreWeights::default();
    assert_eq!(score(&name, &Candidate::prepare(&registry[0], &rules), &weights), 100.0);
    assert!(score(&name, &Candidate::prepare(&registry[1], &rules), &weights) < 80.0);

    let input = LinkInput { registry, segments: vec![segment], rejected_records: 0 };
    let result = run(&LinkConfig::default(), &input, None).unwrap();
    assert_eq!(result.segments[0].status, "confident");
    assert_eq!(result.mapping.get("w1"), Some("101"));
}

fn segment_at(id: &str, name: &str, locality: &str, x: f64) -> streetlink_linker::MapSegment {
    use streetlink_linker::{MapSegment, Point};
    MapSegment::new(id, name, locality, vec![Point::new(x, 0.0), Point::new(x + 1.0, 0.0)]).unwrap()
}

#[test]
fn detached_niqqud_still_matches_confidently() {
    use streetlink_linker::StreetRecord;

    let locality = "תל אביב-יפו";
    let input = LinkInput {
        registry: vec![StreetRecord::new("102", "הרצל", Vec::new(), locality).unwrap()],
        segments: vec![
            segment_at("w1", "הרצל \u{05BC}", locality, 0.0),
            segment_at("w2", "\u{05B7} הרצל", locality, 5.0),
        ],
        rejected_records: 0,
    };

    let result = run(&LinkConfig::default(), &input, None).unwrap();
    for segment in &result.segments {
        assert_eq!(segment.normalized_name, "הרצל");
        assert_eq!(segment.status, "confident");
        assert_eq!(segment.best_score, Some(100.0));
    }
    assert_eq!(result.mapping.len(), 2);
}

#[test]
fn shared_official_id_is_diagnosed_per_locality() {
    use streetlink_linker::StreetRecord;

    let input = LinkInput {
        registry: vec![
            StreetRecord::new("101", "הרצל", Vec::new(), "תל אביב-יפו").unwrap(),
            StreetRecord::new("101", "ויצמן", Vec::new(), "חיפה").unwrap(),
        ],
        segments: vec![segment_at("w1", "הרצל", "תל אביב-יפו", 0.0)],
        rejected_records: 0,
    };

    let result = run(&LinkConfig::default(), &input, None).unwrap();
    assert_eq!(result.mapping.get("w1"), Some("101"));

    let d = &result.diagnostics;
    assert_eq!(d.registry_streets, 2);
    assert_eq!(d.unmatched_registry.len(), 1);
    assert_eq!(d.unmatched_registry[0].official_id, "101");
    assert_eq!(d.unmatched_registry[0].name, "ויצמן");
    assert_eq!(d.unmatched_registry[0].locality, "חיפה");
}

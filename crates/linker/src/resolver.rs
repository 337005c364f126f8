//! Resolution of ambiguous segments through an external arbiter.
//!
//! The engine never trusts the arbiter: a reply only becomes a match when it
//! names one of the candidates that were actually offered.

use std::collections::HashMap;

use rayon::prelude::*;
use serde::Serialize;

use crate::adjacency::AdjacencyMap;
use crate::model::{
    CandidateScore, ClassifiedSegment, MatchOutcome, ResolutionResult, UnresolvedReason,
};

/// One candidate as offered to the arbiter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OfferedCandidate {
    pub official_id: String,
    pub name: String,
    pub score: f64,
}

/// Everything the arbiter sees for one ambiguous segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArbitrationRequest {
    pub segment_id: String,
    pub locality: String,
    pub segment_name: String,
    pub adjacent_names: Vec<String>,
    pub candidates: Vec<OfferedCandidate>,
}

impl ArbitrationRequest {
    pub fn offers(&self, official_id: &str) -> bool {
        self.candidates.iter().any(|c| c.official_id == official_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArbitrationDecision {
    /// The arbiter picked this id. Not yet checked against the offer.
    Chosen(String),
    NoneAcceptable,
}

pub type ArbiterResult = Result<ArbitrationDecision, Box<dyn std::error::Error + Send + Sync>>;

/// An external collaborator that picks among ranked candidates.
///
/// Implementations must be safe to call from several threads at once; each
/// call is one independent request/response exchange.
pub trait Arbiter: Send + Sync {
    /// Short label for logs and run metadata.
    fn name(&self) -> &str;

    fn arbitrate(&self, request: &ArbitrationRequest) -> ArbiterResult;
}

/// Read-only context shared by every resolution in a run.
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    pub adjacency: &'a AdjacencyMap,
    /// segment_id → normalized name, for every segment in the run.
    pub names: &'a HashMap<String, String>,
    /// Offer at most this many candidates. `None` offers all of them.
    pub max_candidates: Option<usize>,
}

/// Build the request for one segment.
pub fn build_request(
    segment: &ClassifiedSegment,
    candidates: &[CandidateScore],
    ctx: ResolveContext<'_>,
) -> ArbitrationRequest {
    let mut adjacent_names: Vec<String> = Vec::new();
    for neighbour in ctx.adjacency.neighbours(&segment.segment_id) {
        let Some(name) = ctx.names.get(neighbour) else {
            continue;
        };
        if name.is_empty() || *name == segment.normalized_name || adjacent_names.contains(name) {
            continue;
        }
        adjacent_names.push(name.clone());
    }

    let limit = ctx.max_candidates.unwrap_or(candidates.len());
    let candidates = candidates
        .iter()
        .take(limit)
        .map(|c| OfferedCandidate {
            official_id: c.official_id.clone(),
            name: c.name.clone(),
            score: c.score,
        })
        .collect();

    ArbitrationRequest {
        segment_id: segment.segment_id.clone(),
        locality: segment.locality.clone(),
        segment_name: segment.normalized_name.clone(),
        adjacent_names,
        candidates,
    }
}

/// Issue one request and validate the reply against what was offered.
pub fn decide(request: &ArbitrationRequest, arbiter: Option<&dyn Arbiter>) -> ResolutionResult {
    let Some(arbiter) = arbiter else {
        return ResolutionResult::Unresolved {
            reason: UnresolvedReason::NoArbiter,
        };
    };
    if request.candidates.is_empty() {
        return ResolutionResult::Unresolved {
            reason: UnresolvedReason::Declined,
        };
    }

    match arbiter.arbitrate(request) {
        Ok(ArbitrationDecision::Chosen(id)) => {
            let id = id.trim();
            if request.offers(id) {
                log::debug!("{}: {} resolved to {id}", arbiter.name(), request.segment_id);
                ResolutionResult::Resolved {
                    official_id: id.to_string(),
                }
            } else {
                log::warn!(
                    "{}: segment '{}' got id '{id}' outside the offered candidates",
                    arbiter.name(),
                    request.segment_id
                );
                ResolutionResult::Unresolved {
                    reason: UnresolvedReason::InvalidChoice,
                }
            }
        }
        Ok(ArbitrationDecision::NoneAcceptable) => ResolutionResult::Unresolved {
            reason: UnresolvedReason::Declined,
        },
        Err(e) => {
            log::warn!(
                "{}: segment '{}' left unresolved: {e}",
                arbiter.name(),
                request.segment_id
            );
            ResolutionResult::Unresolved {
                reason: UnresolvedReason::Failed,
            }
        }
    }
}

/// Resolve a single ambiguous segment.
pub fn resolve(
    segment: &ClassifiedSegment,
    candidates: &[CandidateScore],
    ctx: ResolveContext<'_>,
    arbiter: Option<&dyn Arbiter>,
) -> ResolutionResult {
    decide(&build_request(segment, candidates, ctx), arbiter)
}

/// Resolve every `NeedsResolution` segment, at most `concurrency` requests in
/// flight. Keyed by segment id.
pub fn resolve_all(
    classified: &[ClassifiedSegment],
    ctx: ResolveContext<'_>,
    arbiter: Option<&dyn Arbiter>,
    concurrency: usize,
) -> HashMap<String, ResolutionResult> {
    let pending: Vec<(&ClassifiedSegment, &[CandidateScore])> = classified
        .iter()
        .filter_map(|segment| match &segment.outcome {
            MatchOutcome::NeedsResolution { candidates } => Some((segment, candidates.as_slice())),
            _ => None,
        })
        .collect();

    if pending.is_empty() {
        return HashMap::new();
    }

    let Some(arbiter) = arbiter else {
        return pending
            .into_iter()
            .map(|(segment, candidates)| {
                (segment.segment_id.clone(), resolve(segment, candidates, ctx, None))
            })
            .collect();
    };

    log::info!(
        "arbitrating {} segments via {} (concurrency {})",
        pending.len(),
        arbiter.name(),
        concurrency.max(1)
    );

    let run = || -> HashMap<String, ResolutionResult> {
        pending
            .par_iter()
            .map(|(segment, candidates)| {
                (
                    segment.segment_id.clone(),
                    resolve(segment, candidates, ctx, Some(arbiter)),
                )
            })
            .collect()
    };

    match rayon::ThreadPoolBuilder::new()
        .num_threads(concurrency.max(1))
        .thread_name(|i| format!("arbiter-{i}"))
        .build()
    {
        Ok(pool) => pool.install(run),
        Err(e) => {
            log::warn!("arbiter pool unavailable ({e}), resolving sequentially");
            pending
                .iter()
                .map(|(segment, candidates)| {
                    (
                        segment.segment_id.clone(),
                        resolve(segment, candidates, ctx, Some(arbiter)),
                    )
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adjacency::build_adjacency;
    use crate::model::{MapSegment, Point};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Fixed(ArbitrationDecision);

    impl Arbiter for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
        fn arbitrate(&self, _: &ArbitrationRequest) -> ArbiterResult {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    impl Arbiter for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        fn arbitrate(&self, _: &ArbitrationRequest) -> ArbiterResult {
            Err("connection reset".into())
        }
    }

    /// Picks the last offered candidate and records what it saw.
    #[derive(Default)]
    struct Recording {
        calls: AtomicUsize,
        seen: Mutex<Vec<ArbitrationRequest>>,
    }

    impl Arbiter for Recording {
        fn name(&self) -> &str {
            "recording"
        }
        fn arbitrate(&self, request: &ArbitrationRequest) -> ArbiterResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(request.clone());
            }
            Ok(request
                .candidates
                .last()
                .map(|c| ArbitrationDecision::Chosen(c.official_id.clone()))
                .unwrap_or(ArbitrationDecision::NoneAcceptable))
        }
    }

    fn cs(id: &str, score: f64) -> CandidateScore {
        CandidateScore {
            official_id: id.into(),
            name: format!("רחוב {id}"),
            score,
        }
    }

    fn ambiguous(id: &str, name: &str) -> ClassifiedSegment {
        ClassifiedSegment {
            segment_id: id.into(),
            raw_name: name.into(),
            normalized_name: name.into(),
            locality: "תל אביב".into(),
            outcome: MatchOutcome::NeedsResolution {
                candidates: vec![cs("201", 92.0), cs("202", 88.0), cs("203", 81.0)],
            },
        }
    }

    fn request() -> ArbitrationRequest {
        ArbitrationRequest {
            segment_id: "w1".into(),
            locality: "תל אביב".into(),
            segment_name: "הרצל".into(),
            adjacent_names: Vec::new(),
            candidates: vec![
                OfferedCandidate { official_id: "201".into(), name: "הרצל".into(), score: 90.0 },
                OfferedCandidate { official_id: "202".into(), name: "הרצליה".into(), score: 85.0 },
            ],
        }
    }

    #[test]
    fn no_arbiter_is_unresolved() {
        assert_eq!(
            decide(&request(), None),
            ResolutionResult::Unresolved { reason: UnresolvedReason::NoArbiter }
        );
    }

    #[test]
    fn offered_choice_resolves() {
        let arbiter = Fixed(ArbitrationDecision::Chosen(" 202 ".into()));
        assert_eq!(
            decide(&request(), Some(&arbiter)),
            ResolutionResult::Resolved { official_id: "202".into() }
        );
    }

    #[test]
    fn never_accepts_an_id_outside_the_offer() {
        let arbiter = Fixed(ArbitrationDecision::Chosen("999".into()));
        assert_eq!(
            decide(&request(), Some(&arbiter)),
            ResolutionResult::Unresolved { reason: UnresolvedReason::InvalidChoice }
        );
    }

    #[test]
    fn refusal_and_failure_are_unresolved() {
        let declined = Fixed(ArbitrationDecision::NoneAcceptable);
        assert_eq!(
            decide(&request(), Some(&declined)),
            ResolutionResult::Unresolved { reason: UnresolvedReason::Declined }
        );
        assert_eq!(
            decide(&request(), Some(&Broken)),
            ResolutionResult::Unresolved { reason: UnresolvedReason::Failed }
        );
    }

    #[test]
    fn cap_limits_what_can_be_accepted() {
        let segment = ambiguous("w1", "הרצל");
        let adjacency = AdjacencyMap::default();
        let names = HashMap::new();
        let ctx = ResolveContext { adjacency: &adjacency, names: &names, max_candidates: Some(2) };
        let MatchOutcome::NeedsResolution { candidates } = &segment.outcome else {
            unreachable!()
        };

        let req = build_request(&segment, candidates, ctx);
        assert_eq!(req.candidates.len(), 2);
        assert!(!req.offers("203"));

        let picks_third = Fixed(ArbitrationDecision::Chosen("203".into()));
        assert_eq!(
            resolve(&segment, candidates, ctx, Some(&picks_third)),
            ResolutionResult::Unresolved { reason: UnresolvedReason::InvalidChoice }
        );
    }

    #[test]
    fn request_carries_adjacent_names() {
        let seg = |id: &str, pts: &[(f64, f64)]| {
            MapSegment::new(
                id,
                "",
                "תל אביב",
                pts.iter().map(|(x, y)| Point::new(*x, *y)).collect(),
            )
            .unwrap()
        };
        let segments = vec![
            seg("w1", &[(0.0, 0.0), (1.0, 0.0)]),
            seg("w2", &[(1.0, 0.0), (2.0, 0.0)]),
            seg("w3", &[(0.0, 0.0), (0.0, 1.0)]),
            seg("w4", &[(2.0, 0.0), (3.0, 0.0)]),
            seg("w5", &[(1.0, 0.0), (1.0, 1.0)]),
            seg("w6", &[(0.0, 0.0), (-1.0, 0.0)]),
        ];
        let adjacency = build_adjacency(&segments, 1e-7);
        let names: HashMap<String, String> = [
            ("w1", "הרצל"),
            ("w2", "אחד העם"),
            ("w3", "הרצל"),
            ("w4", "לילינבלום"),
            ("w5", ""),
            ("w6", "אחד העם"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let ctx = ResolveContext { adjacency: &adjacency, names: &names, max_candidates: None };

        let req = build_request(&ambiguous("w1", "הרצל"), &[cs("201", 90.0)], ctx);
        // w3 repeats the segment's own name, w5 is unnamed, w6 duplicates w2, w4 is not adjacent.
        assert_eq!(req.adjacent_names, vec!["אחד העם".to_string()]);
        assert_eq!(req.segment_name, "הרצל");
    }

    #[test]
    fn resolve_all_sends_one_request_per_ambiguous_segment() {
        let mut classified: Vec<ClassifiedSegment> =
            (0..12).map(|i| ambiguous(&format!("w{i}"), "הרצל")).collect();
        classified.push(ClassifiedSegment {
            segment_id: "c1".into(),
            raw_name: "דיזנגוף".into(),
            normalized_name: "דיזנגוף".into(),
            locality: "תל אביב".into(),
            outcome: MatchOutcome::Confident { official_id: "300".into(), score: 100.0 },
        });
        let adjacency = AdjacencyMap::default();
        let names = HashMap::new();
        let ctx = ResolveContext { adjacency: &adjacency, names: &names, max_candidates: None };

        let arbiter = Recording::default();
        let results = resolve_all(&classified, ctx, Some(&arbiter), 3);

        assert_eq!(arbiter.calls.load(Ordering::SeqCst), 12);
        assert_eq!(results.len(), 12);
        assert!(!results.contains_key("c1"));
        assert!(results
            .values()
            .all(|r| r.official_id() == Some("203")));
        let seen = arbiter.seen.lock().unwrap();
        assert!(seen.iter().all(|r| r.candidates.len() == 3));
    }

    #[test]
    fn resolve_all_without_arbiter() {
        let classified = vec![ambiguous("w1", "הרצל")];
        let adjacency = AdjacencyMap::default();
        let names = HashMap::new();
        let ctx = ResolveContext { adjacency: &adjacency, names: &names, max_candidates: None };
        let results = resolve_all(&classified, ctx, None, 4);
        assert_eq!(
            results["w1"],
            ResolutionResult::Unresolved { reason: UnresolvedReason::NoArbiter }
        );
    }
}

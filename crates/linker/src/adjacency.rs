use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::model::{MapSegment, Point};

/// Endpoint tolerance used when none (or an unusable one) is configured.
pub const DEFAULT_TOLERANCE: f64 = 1e-7;

/// segment_id → neighbouring segment_ids sharing an endpoint.
///
/// Symmetric, no self-loops, every input segment present as a key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdjacencyMap {
    neighbours: BTreeMap<String, BTreeSet<String>>,
}

impl AdjacencyMap {
    /// Neighbours of `segment_id`, in id order. Unknown ids have none.
    pub fn neighbours(&self, segment_id: &str) -> impl Iterator<Item = &str> {
        self.neighbours
            .get(segment_id)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    pub fn are_adjacent(&self, a: &str, b: &str) -> bool {
        self.neighbours.get(a).is_some_and(|set| set.contains(b))
    }

    pub fn len(&self) -> usize {
        self.neighbours.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbours.is_empty()
    }

    /// Number of undirected adjacency edges.
    pub fn edge_count(&self) -> usize {
        self.neighbours.values().map(BTreeSet::len).sum::<usize>() / 2
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.neighbours.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn link(&mut self, a: &str, b: &str) {
        if a == b {
            return;
        }
        if let Some(set) = self.neighbours.get_mut(a) {
            set.insert(b.to_string());
        }
        if let Some(set) = self.neighbours.get_mut(b) {
            set.insert(a.to_string());
        }
    }
}

type Cell = (i64, i64);

fn cell_of(p: &Point, tolerance: f64) -> Cell {
    ((p.x / tolerance).floor() as i64, (p.y / tolerance).floor() as i64)
}

/// Connect segments whose first/last vertices lie within `tolerance` of each
/// other.
///
/// Endpoints are bucketed on a grid of cell size `tolerance`; each endpoint
/// only compares against the 3×3 block of cells around its own.
pub fn build_adjacency(segments: &[MapSegment], tolerance: f64) -> AdjacencyMap {
    let tolerance = if tolerance.is_finite() && tolerance > 0.0 {
        tolerance
    } else {
        log::warn!("invalid adjacency tolerance {tolerance}, using {DEFAULT_TOLERANCE}");
        DEFAULT_TOLERANCE
    };

    let mut map = AdjacencyMap {
        neighbours: segments
            .iter()
            .map(|s| (s.segment_id().to_string(), BTreeSet::new()))
            .collect(),
    };

    let mut grid: HashMap<Cell, Vec<(usize, Point)>> = HashMap::new();
    for (idx, segment) in segments.iter().enumerate() {
        for point in segment.endpoints() {
            if !(point.x.is_finite() && point.y.is_finite()) {
                continue;
            }
            let (cx, cy) = cell_of(&point, tolerance);

            for dx in -1..=1i64 {
                for dy in -1..=1i64 {
                    let probe = (cx.saturating_add(dx), cy.saturating_add(dy));
                    let Some(bucket) = grid.get(&probe) else {
                        continue;
                    };
                    for (other, other_point) in bucket {
                        if *other != idx && point.distance(other_point) <= tolerance {
                            map.link(segment.segment_id(), segments[*other].segment_id());
                        }
                    }
                }
            }

            grid.entry((cx, cy)).or_default().push((idx, point));
        }
    }

    log::debug!(
        "adjacency: {} segments, {} edges",
        map.len(),
        map.edge_count()
    );
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn seg(id: &str, pts: &[(f64, f64)]) -> MapSegment {
        MapSegment::new(
            id,
            "",
            "תל אביב",
            pts.iter().map(|(x, y)| Point::new(*x, *y)).collect(),
        )
        .unwrap()
    }

    #[test]
    fn shared_endpoint_links_both_ways() {
        let segments = vec![
            seg("a", &[(0.0, 0.0), (1.0, 0.0)]),
            seg("b", &[(1.0, 0.0), (2.0, 0.0)]),
            seg("c", &[(5.0, 5.0), (6.0, 5.0)]),
        ];
        let adj = build_adjacency(&segments, DEFAULT_TOLERANCE);
        assert!(adj.are_adjacent("a", "b"));
        assert!(adj.are_adjacent("b", "a"));
        assert_eq!(adj.neighbours("c").count(), 0);
        assert_eq!(adj.len(), 3);
        assert_eq!(adj.edge_count(), 1);
    }

    #[test]
    fn interior_vertices_do_not_count() {
        let segments = vec![
            seg("a", &[(0.0, 0.0), (1.0, 1.0), (2.0, 0.0)]),
            seg("b", &[(1.0, 1.0), (1.0, 2.0)]),
        ];
        let adj = build_adjacency(&segments, DEFAULT_TOLERANCE);
        assert!(!adj.are_adjacent("a", "b"));
    }

    #[test]
    fn tolerance_applies_across_cell_borders() {
        // 0.95 and 1.05 fall in different cells of size 0.1 but are 0.1 apart.
        let segments = vec![
            seg("a", &[(0.0, 0.0), (0.95, 0.0)]),
            seg("b", &[(1.05, 0.0), (2.0, 0.0)]),
            seg("c", &[(1.3, 0.0), (3.0, 0.0)]),
        ];
        let adj = build_adjacency(&segments, 0.1 + 1e-12);
        assert!(adj.are_adjacent("a", "b"));
        assert!(!adj.are_adjacent("b", "c"));
    }

    #[test]
    fn closed_ring_is_not_its_own_neighbour() {
        let segments = vec![seg("ring", &[(0.0, 0.0), (1.0, 0.0), (0.0, 0.0)])];
        let adj = build_adjacency(&segments, DEFAULT_TOLERANCE);
        assert_eq!(adj.neighbours("ring").count(), 0);
    }

    #[test]
    fn empty_geometry_and_bad_tolerance() {
        let segments = vec![seg("a", &[]), seg("b", &[(0.0, 0.0), (1.0, 0.0)])];
        let adj = build_adjacency(&segments, -1.0);
        assert_eq!(adj.len(), 2);
        assert_eq!(adj.edge_count(), 0);
    }

    #[test]
    fn junction_of_three() {
        let segments = vec![
            seg("a", &[(0.0, 0.0), (1.0, 1.0)]),
            seg("b", &[(1.0, 1.0), (2.0, 0.0)]),
            seg("c", &[(1.0, 1.0), (1.0, 3.0)]),
        ];
        let adj = build_adjacency(&segments, DEFAULT_TOLERANCE);
        assert_eq!(adj.neighbours("a").collect::<Vec<_>>(), vec!["b", "c"]);
        assert_eq!(adj.edge_count(), 3);
    }

    proptest! {
        #[test]
        fn adjacency_is_symmetric(
            coords in prop::collection::vec(
                prop::collection::vec((0i32..6, 0i32..6), 1..4),
                1..20,
            )
        ) {
            let segments: Vec<MapSegment> = coords
                .iter()
                .enumerate()
                .map(|(i, pts)| {
                    MapSegment::new(
                        format!("s{i}"),
                        "",
                        "x",
                        pts.iter().map(|(x, y)| Point::new(*x as f64, *y as f64)).collect(),
                    )
                    .unwrap()
                })
                .collect();
            let adj = build_adjacency(&segments, 0.5);

            prop_assert_eq!(adj.len(), segments.len());
            for (id, set) in adj.iter() {
                prop_assert!(!set.contains(id));
                for other in set {
                    prop_assert!(adj.are_adjacent(other, id));
                }
            }
        }
    }
}

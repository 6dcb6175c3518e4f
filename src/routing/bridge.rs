//! Bridge solver: connects disconnected tower clusters along minimum
//! path-loss corridors.
//!
//! One step call attempts at most one cluster merge. Cluster-center pairs
//! are ranked by distance; the closest unresolved pair gets a shortest-path
//! search over the routing graph, and every intermediate non-tower cell on
//! the cheapest corridor is promoted to a tower with provenance `route`.
//! Pairs with no corridor are remembered so repeated runs skip them.

use h3o::CellIndex;
use std::collections::{HashMap, HashSet};

use super::graph::RoutingGraph;
use crate::analysis::cluster::{analyze_clusters, ClusterMap};
use crate::clearance::ClearanceStore;
use crate::error::PlanError;
use crate::params::ModelParams;
use crate::surface::{cell_distance_m, Provenance, Surface};

/// Normalized identity of a cluster pair: the smallest member cell of each
/// side, ordered. Stable across re-analysis as long as the clusters keep
/// their members.
fn pair_fingerprint(clusters: &ClusterMap, cluster_a: usize, cluster_b: usize) -> (CellIndex, CellIndex) {
    let min_a = *clusters.members[cluster_a].iter().min().expect("clusters are never empty");
    let min_b = *clusters.members[cluster_b].iter().min().expect("clusters are never empty");
    if min_b < min_a { (min_b, min_a) } else { (min_a, min_b) }
}

/// Exclusion set for a bridge search: towers outside the two endpoint
/// clusters are blocked, and so is any non-tower node within minimum
/// spacing of an existing tower.
fn blocked_nodes(surface: &Surface, clusters: &ClusterMap, graph: &RoutingGraph, cluster_a: usize, cluster_b: usize, params: &ModelParams) -> HashSet<CellIndex> {
    let mut blocked = HashSet::new();
    for node in graph.nodes() {
        if surface.tower_at(*node).is_some() {
            let id = clusters.cluster_of(*node);
            if id != Some(cluster_a) && id != Some(cluster_b) {
                blocked.insert(*node);
            }
        } else if surface.towers().iter().any(|t| cell_distance_m(*node, t.cell) < params.min_spacing_m) {
            blocked.insert(*node);
        }
    }
    blocked
}

/// Iterative cluster-bridging solver with per-pair failure memory.
#[derive(Debug, Default)]
pub struct BridgeSolver {
    failures: HashMap<(CellIndex, CellIndex), String>,
}

impl BridgeSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget recorded failures so every cluster pair is retried.
    pub fn reset(&mut self) {
        self.failures.clear();
    }

    /// Recorded per-pair failures with their reasons.
    pub fn failures(&self) -> &HashMap<(CellIndex, CellIndex), String> {
        &self.failures
    }

    /// Attempt one cluster merge. Returns the number of route towers
    /// installed; zero means either a single cluster remains or every
    /// remaining pair is marked as failed.
    pub fn step(&mut self, store: &mut ClearanceStore, surface: &mut Surface, params: &ModelParams) -> Result<usize, PlanError> {
        let clusters = analyze_clusters(store, surface, params)?;
        if clusters.count() <= 1 {
            return Ok(0);
        }

        let mut pairs: Vec<(usize, usize, f64)> = Vec::new();
        for i in 0..clusters.count() {
            for j in (i + 1)..clusters.count() {
                pairs.push((i, j, clusters.centroids[i].distance_m(clusters.centroids[j])));
            }
        }
        pairs.sort_by(|a, b| a.2.total_cmp(&b.2));

        let graph = RoutingGraph::build(store, surface, params)?;

        for (cluster_a, cluster_b, center_distance) in pairs {
            let fingerprint = pair_fingerprint(&clusters, cluster_a, cluster_b);
            if self.failures.contains_key(&fingerprint) {
                continue;
            }

            let blocked = blocked_nodes(surface, &clusters, &graph, cluster_a, cluster_b, params);
            let Some(path) = graph.shortest_path(&clusters.members[cluster_a], &clusters.members[cluster_b], &blocked) else {
                log::warn!(
                    "No corridor between clusters {} and {} ({:.1} km apart)",
                    cluster_a,
                    cluster_b,
                    center_distance / 1_000.0
                );
                self.failures.insert(fingerprint, "no corridor".to_string());
                continue;
            };

            let new_cells: Vec<CellIndex> = path.iter().copied().filter(|cell| surface.tower_at(*cell).is_none()).collect();
            if new_cells.is_empty() {
                self.failures.insert(fingerprint, "corridor adds no towers".to_string());
                continue;
            }

            for cell in &new_cells {
                surface.install_tower(*cell, Provenance::Route, params);
            }
            log::info!(
                "Bridged clusters {} and {} with {} route towers over a {}-cell corridor",
                cluster_a,
                cluster_b,
                new_cells.len(),
                path.len()
            );
            return Ok(new_cells.len());
        }

        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::CellData;
    use h3o::{LatLng, Resolution};

    fn cell_at(lat: f64, lng: f64) -> CellIndex {
        LatLng::new(lat, lng).unwrap().to_cell(Resolution::Eight)
    }

    fn flat_surface(cells_of_interest: &[CellIndex]) -> Surface {
        let params = ModelParams::default();
        let mut cells = std::collections::HashMap::new();
        for a in cells_of_interest {
            for b in cells_of_interest {
                if a <= b {
                    for cell in crate::clearance::path_cells(*a, *b) {
                        cells.entry(cell).or_insert_with(|| CellData::with_elevation(0.0, &params));
                    }
                }
            }
        }
        Surface::from_cells(cells)
    }

    fn restrict_road_access(surface: &mut Surface, open: &[CellIndex]) {
        for cell in surface.cell_indexes() {
            surface.cell_mut(cell).unwrap().road_access = false;
        }
        for cell in open {
            surface.cell_mut(*cell).unwrap().road_access = true;
        }
    }

    #[test]
    fn bridges_two_clusters_through_an_eligible_stop() {
        let params = ModelParams::default();
        // Towers 25 km apart cannot see each other over flat terrain; the
        // midway stop is in range of both.
        let a = cell_at(41.70, 44.40);
        let m = cell_at(41.70, 44.55);
        let b = cell_at(41.70, 44.70);
        let mut surface = flat_surface(&[a, m, b]);
        restrict_road_access(&mut surface, &[a, m, b]);
        surface.add_tower(a, Provenance::Seed);
        surface.add_tower(b, Provenance::Seed);
        surface.rebuild_nearest_tower_metrics();

        let mut store = ClearanceStore::new();
        let before = analyze_clusters(&mut store, &surface, &params).unwrap().count();
        assert_eq!(before, 2);

        let mut solver = BridgeSolver::new();
        let installed = solver.step(&mut store, &mut surface, &params).unwrap();
        assert_eq!(installed, 1);
        let promoted = surface.tower_at(m).unwrap();
        assert_eq!(promoted.provenance, Provenance::Route);

        let after = analyze_clusters(&mut store, &surface, &params).unwrap().count();
        assert_eq!(after, 1);
        // One cluster left: further steps are no-ops.
        assert_eq!(solver.step(&mut store, &mut surface, &params).unwrap(), 0);
    }

    #[test]
    fn records_failure_and_skips_the_pair_on_rerun() {
        let params = ModelParams::default();
        let a = cell_at(41.70, 44.40);
        let b = cell_at(41.70, 44.70);
        let mut surface = flat_surface(&[a, b]);
        // No eligible intermediate cells at all.
        restrict_road_access(&mut surface, &[]);
        surface.add_tower(a, Provenance::Seed);
        surface.add_tower(b, Provenance::Seed);
        surface.rebuild_nearest_tower_metrics();

        let mut store = ClearanceStore::new();
        let mut solver = BridgeSolver::new();
        assert_eq!(solver.step(&mut store, &mut surface, &params).unwrap(), 0);
        assert_eq!(solver.failures().len(), 1);

        // The failed pair is skipped without another search; resetting
        // clears the memory.
        assert_eq!(solver.step(&mut store, &mut surface, &params).unwrap(), 0);
        solver.reset();
        assert!(solver.failures().is_empty());
    }
}

//! Diagnostic outputs over the tower set.
//!
//! The visibility-edge set, hop waves, and coverage summary are rebuilt
//! wholesale whenever requested. They are read-only views for external
//! rendering and audit tooling, never authoritative for placement decisions.

use h3o::CellIndex;
use std::collections::{HashMap, HashSet, VecDeque};

use super::cluster::{analyze_clusters, tower_adjacency};
use crate::clearance::ClearanceStore;
use crate::error::PlanError;
use crate::los::line_of_sight;
use crate::params::ModelParams;
use crate::surface::{cell_distance_m, Provenance, Surface};

/// Diagnostic record for one tower pair.
#[derive(Debug, Clone)]
pub struct VisibilityEdge {
    pub tower_a: CellIndex,
    pub tower_b: CellIndex,
    /// Geodesic distance between the two tower cells (m).
    pub distance_m: f64,
    /// Whether the pair has line of sight.
    pub visible: bool,
    /// Canonical label of the two provenance tags, e.g. `seed-route`.
    pub link_type: String,
    /// Whether the towers belong to different clusters.
    pub cross_cluster: bool,
    /// Minimum LOS hop count between the towers, for intra-cluster pairs.
    pub hop_count: Option<u32>,
}

/// Minimum hop count between two towers over the LOS adjacency, if connected.
pub fn bfs_hops(adjacency: &HashMap<CellIndex, Vec<CellIndex>>, from: CellIndex, to: CellIndex) -> Option<u32> {
    if from == to {
        return Some(0);
    }
    let mut visited = HashSet::from([from]);
    let mut queue = VecDeque::from([(from, 0u32)]);
    while let Some((cell, hops)) = queue.pop_front() {
        if let Some(neighbors) = adjacency.get(&cell) {
            for neighbor in neighbors {
                if *neighbor == to {
                    return Some(hops + 1);
                }
                if visited.insert(*neighbor) {
                    queue.push_back((*neighbor, hops + 1));
                }
            }
        }
    }
    None
}

fn link_type(a: Provenance, b: Provenance) -> String {
    let (first, second) = if b < a { (b, a) } else { (a, b) };
    format!("{}-{}", first.label(), second.label())
}

/// Rebuild the full visibility-edge set over the current towers.
pub fn build_visibility_edges(store: &mut ClearanceStore, surface: &Surface, params: &ModelParams) -> Result<Vec<VisibilityEdge>, PlanError> {
    let clusters = analyze_clusters(store, surface, params)?;
    let adjacency = tower_adjacency(store, surface, params)?;
    let towers = surface.towers();

    let mut edges = Vec::with_capacity(towers.len().saturating_sub(1) * towers.len() / 2);
    for (i, a) in towers.iter().enumerate() {
        for b in towers.iter().skip(i + 1) {
            let visible = line_of_sight(store, surface, a.cell, b.cell, params)?;
            let cross_cluster = clusters.cluster_of(a.cell) != clusters.cluster_of(b.cell);
            let hop_count = if cross_cluster { None } else { bfs_hops(&adjacency, a.cell, b.cell) };
            edges.push(VisibilityEdge {
                tower_a: a.cell,
                tower_b: b.cell,
                distance_m: cell_distance_m(a.cell, b.cell),
                visible,
                link_type: link_type(a.provenance, b.provenance),
                cross_cluster,
                hop_count,
            });
        }
    }

    Ok(edges)
}

/// Breadth-first hop waves from a seed tower over the LOS adjacency, up to
/// and including `hop_limit` (wave 0 is the seed itself).
pub fn hop_waves(
    store: &mut ClearanceStore,
    surface: &Surface,
    params: &ModelParams,
    seed: CellIndex,
    hop_limit: u32,
) -> Result<Vec<Vec<CellIndex>>, PlanError> {
    if surface.tower_at(seed).is_none() {
        return Err(PlanError::UnknownCell(seed));
    }
    let adjacency = tower_adjacency(store, surface, params)?;

    let mut waves = Vec::new();
    let mut visited = HashSet::from([seed]);
    let mut current = vec![seed];
    for _ in 0..=hop_limit {
        waves.push(current.clone());
        let mut next = Vec::new();
        for cell in &current {
            if let Some(neighbors) = adjacency.get(cell) {
                for neighbor in neighbors {
                    if visited.insert(*neighbor) {
                        next.push(*neighbor);
                    }
                }
            }
        }
        if next.is_empty() {
            break;
        }
        current = next;
    }

    Ok(waves)
}

/// Read-only coverage report for operator progress visibility.
#[derive(Debug, Clone)]
pub struct CoverageSummary {
    /// Tower counts per provenance, in canonical provenance order.
    pub towers_by_provenance: Vec<(Provenance, usize)>,
    /// Total population of cells with LOS to at least one tower.
    pub covered_population: f64,
    /// Total population of cells with no LOS to any tower.
    pub blind_population: f64,
    /// Number of surface cells.
    pub cells: usize,
}

/// Compute the coverage summary over the full surface.
pub fn coverage_summary(store: &mut ClearanceStore, surface: &Surface, params: &ModelParams) -> Result<CoverageSummary, PlanError> {
    let mut counts: HashMap<Provenance, usize> = HashMap::new();
    for tower in surface.towers() {
        *counts.entry(tower.provenance).or_insert(0) += 1;
    }
    let mut towers_by_provenance: Vec<(Provenance, usize)> = counts.into_iter().collect();
    towers_by_provenance.sort_by_key(|(provenance, _)| *provenance);

    let tower_cells: Vec<CellIndex> = surface.towers().iter().map(|t| t.cell).collect();
    let mut covered_population = 0.0;
    let mut blind_population = 0.0;
    for cell in surface.cell_indexes() {
        let population = surface.cell(cell).map(|data| data.population).unwrap_or(0.0);
        if population <= 0.0 {
            continue;
        }
        let mut covered = false;
        for tower in &tower_cells {
            if line_of_sight(store, surface, cell, *tower, params)? {
                covered = true;
                break;
            }
        }
        if covered {
            covered_population += population;
        } else {
            blind_population += population;
        }
    }

    Ok(CoverageSummary {
        towers_by_provenance,
        covered_population,
        blind_population,
        cells: surface.len(),
    })
}

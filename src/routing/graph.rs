//! Weighted routing graph over tower and eligible cells.
//!
//! Nodes are every cell that is either a tower or currently eligible for
//! placement. Edges connect pairs within the spacing-to-link-range band that
//! have line of sight, weighted by path loss in dB. Shortest-path searches
//! run Dijkstra over a binary heap with per-call exclusion sets.

use h3o::CellIndex;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::clearance::{ClearanceStore, LinkKey};
use crate::error::PlanError;
use crate::params::ModelParams;
use crate::surface::{cell_distance_m, Surface};

/// Routing graph snapshot for one solver pass.
pub struct RoutingGraph {
    nodes: Vec<CellIndex>,
    index: HashMap<CellIndex, usize>,
    /// Adjacency list: (neighbor node id, path loss dB).
    adjacency: Vec<Vec<(usize, f64)>>,
}

/// Heap entry for the Dijkstra open set. Ordered so the binary max-heap
/// pops the lowest accumulated cost first.
struct OpenEntry {
    cost: f64,
    node: usize,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost && self.node == other.node
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed on cost for min-heap behavior; node id breaks ties so
        // the search order is deterministic.
        other.cost.total_cmp(&self.cost).then_with(|| other.node.cmp(&self.node))
    }
}

impl RoutingGraph {
    /// Node cells for the current tower set and eligibility state.
    fn node_cells(surface: &Surface) -> Vec<CellIndex> {
        let mut nodes: Vec<CellIndex> = surface.towers().iter().map(|t| t.cell).collect();
        let mut candidates: Vec<CellIndex> = surface
            .cell_indexes()
            .into_iter()
            .filter(|cell| surface.is_eligible(*cell))
            .collect();
        candidates.sort();
        nodes.extend(candidates);
        nodes
    }

    /// Build the graph over the current towers and eligible cells.
    pub fn build(store: &mut ClearanceStore, surface: &Surface, params: &ModelParams) -> Result<Self, PlanError> {
        let nodes = Self::node_cells(surface);
        let index: HashMap<CellIndex, usize> = nodes.iter().enumerate().map(|(i, cell)| (*cell, i)).collect();
        let mut adjacency = vec![Vec::new(); nodes.len()];

        for i in 0..nodes.len() {
            for j in (i + 1)..nodes.len() {
                let distance = cell_distance_m(nodes[i], nodes[j]);
                if distance < params.min_spacing_m || distance > params.max_link_distance_m {
                    continue;
                }
                let profile = store.profile(surface, nodes[i], nodes[j], params)?;
                if profile.clearance_m > 0.0 {
                    adjacency[i].push((j, profile.path_loss_db));
                    adjacency[j].push((i, profile.path_loss_db));
                }
            }
        }

        Ok(Self { nodes, index, adjacency })
    }

    pub fn nodes(&self) -> &[CellIndex] {
        &self.nodes
    }

    pub fn node_id(&self, cell: CellIndex) -> Option<usize> {
        self.index.get(&cell).copied()
    }

    /// Multi-source, multi-target Dijkstra with an exclusion set.
    ///
    /// Returns the cheapest path (inclusive of endpoints) from any source to
    /// any target, or `None` when no corridor exists. Blocked cells are
    /// skipped entirely; callers exempt endpoints by leaving them out of the
    /// exclusion set.
    pub fn shortest_path(&self, sources: &[CellIndex], targets: &[CellIndex], blocked: &HashSet<CellIndex>) -> Option<Vec<CellIndex>> {
        let target_ids: HashSet<usize> = targets
            .iter()
            .filter(|cell| !blocked.contains(*cell))
            .filter_map(|cell| self.node_id(*cell))
            .collect();
        if target_ids.is_empty() {
            return None;
        }

        let mut open_set = BinaryHeap::new();
        let mut costs: HashMap<usize, f64> = HashMap::new();
        let mut parents: HashMap<usize, usize> = HashMap::new();

        for cell in sources {
            if blocked.contains(cell) {
                continue;
            }
            if let Some(id) = self.node_id(*cell) {
                costs.insert(id, 0.0);
                open_set.push(OpenEntry { cost: 0.0, node: id });
            }
        }

        while let Some(OpenEntry { cost, node }) = open_set.pop() {
            if cost > costs.get(&node).copied().unwrap_or(f64::INFINITY) {
                continue;
            }
            if target_ids.contains(&node) {
                let mut path = vec![self.nodes[node]];
                let mut current = node;
                while let Some(parent) = parents.get(&current) {
                    path.push(self.nodes[*parent]);
                    current = *parent;
                }
                path.reverse();
                return Some(path);
            }
            for (neighbor, weight) in &self.adjacency[node] {
                if blocked.contains(&self.nodes[*neighbor]) {
                    continue;
                }
                let next_cost = cost + weight;
                if next_cost < costs.get(neighbor).copied().unwrap_or(f64::INFINITY) {
                    costs.insert(*neighbor, next_cost);
                    parents.insert(*neighbor, node);
                    open_set.push(OpenEntry {
                        cost: next_cost,
                        node: *neighbor,
                    });
                }
            }
        }

        None
    }
}

/// Fill missing link-store entries for all current routing-graph pairs,
/// prioritized by proximity to the worst diagnosed blind spots so repeated
/// runs close the most urgent gaps first. Already-cached pairs are skipped,
/// making the fill resumable by re-invocation.
///
/// Returns the number of profiles computed.
pub fn refresh_link_cache(store: &mut ClearanceStore, surface: &Surface, params: &ModelParams) -> Result<usize, PlanError> {
    // Blind spots: populated cells that currently see no tower, worst first.
    let mut blind_spots: Vec<(CellIndex, f64)> = surface
        .cells()
        .filter(|(_, data)| data.population > 0.0 && data.metrics.visible_towers == Some(0))
        .map(|(cell, data)| (cell, data.population))
        .collect();
    blind_spots.sort_by(|a, b| b.1.total_cmp(&a.1));

    let nodes = RoutingGraph::node_cells(surface);
    let mut missing: Vec<(CellIndex, CellIndex, f64)> = Vec::new();
    for i in 0..nodes.len() {
        for j in (i + 1)..nodes.len() {
            let distance = cell_distance_m(nodes[i], nodes[j]);
            if distance < params.min_spacing_m || distance > params.max_link_distance_m {
                continue;
            }
            let key = LinkKey::normalized(nodes[i], nodes[j], params.mast_height_m, params.mast_height_m, params.frequency_hz);
            if store.contains(&key) {
                continue;
            }
            let priority = blind_spots
                .iter()
                .map(|(spot, _)| cell_distance_m(nodes[i], *spot).min(cell_distance_m(nodes[j], *spot)))
                .min_by(|a, b| a.total_cmp(b))
                .unwrap_or(distance);
            missing.push((nodes[i], nodes[j], priority));
        }
    }
    missing.sort_by(|a, b| a.2.total_cmp(&b.2));

    let total = missing.len();
    let mut computed = 0usize;
    for (cell_a, cell_b, _) in missing {
        store.profile(surface, cell_a, cell_b, params)?;
        computed += 1;
        if computed % 500 == 0 {
            log::info!("Link cache fill: {}/{} pairs ({:.0}%)", computed, total, 100.0 * computed as f64 / total as f64);
        }
    }
    if total > 0 {
        log::info!("Link cache fill complete: {} pairs computed", computed);
    }

    Ok(computed)
}

//! Hop-limit slimmer: shortens over-limit intra-cluster hop chains.
//!
//! Tower pairs whose minimum LOS hop count exceeds the limit are candidates
//! for a shortcut corridor. One step call routes a batch of candidates,
//! validates each corridor by actual pairwise LOS continuity (graph
//! reachability alone is not trusted), and promotes at most one corridor:
//! the one whose new cells serve the most other still-viable candidates.
//! Per-pair outcomes are durable so repeated runs skip resolved or
//! permanently blocked pairs.

use h3o::CellIndex;
use std::collections::{HashMap, HashSet};

use super::graph::RoutingGraph;
use crate::analysis::edges::build_visibility_edges;
use crate::clearance::ClearanceStore;
use crate::error::PlanError;
use crate::los::line_of_sight;
use crate::params::ModelParams;
use crate::surface::{cell_distance_m, Provenance, Surface};

/// How many over-limit pairs one step call routes before picking a winner.
pub const SLIM_BATCH_SIZE: usize = 10;

/// Durable outcome for one tower pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorridorStatus {
    /// A shortcut corridor was promoted for this pair.
    Resolved,
    /// No usable corridor; the reason is kept for audit.
    Failed(String),
}

#[derive(Debug, Clone)]
struct SlimCandidate {
    pair: (CellIndex, CellIndex),
    /// Whether either endpoint is a seed tower.
    has_seed: bool,
    /// Current minimum LOS hop count between the endpoints.
    hops: u32,
    /// Mean hop length (m) of the current chain.
    avg_hop_m: f64,
}

struct RoutedCandidate {
    candidate: SlimCandidate,
    path: Vec<CellIndex>,
    new_cells: Vec<CellIndex>,
}

fn normalized_pair(a: CellIndex, b: CellIndex) -> (CellIndex, CellIndex) {
    if b < a { (b, a) } else { (a, b) }
}

/// Exclusion set for a slim search: non-tower nodes within minimum spacing
/// of an existing tower are blocked. Towers stay routable so corridors can
/// reuse existing infrastructure; the endpoints are exempt regardless.
fn blocked_nodes(surface: &Surface, graph: &RoutingGraph, endpoints: (CellIndex, CellIndex), params: &ModelParams) -> HashSet<CellIndex> {
    let mut blocked = HashSet::new();
    for node in graph.nodes() {
        if *node == endpoints.0 || *node == endpoints.1 || surface.tower_at(*node).is_some() {
            continue;
        }
        if surface.towers().iter().any(|t| cell_distance_m(*node, t.cell) < params.min_spacing_m) {
            blocked.insert(*node);
        }
    }
    blocked
}

/// Number of other still-viable candidates at least as long as this one
/// whose corridor reuses any of this corridor's new cells.
fn sharing_score(routed: &[RoutedCandidate], index: usize) -> usize {
    let own_new: HashSet<&CellIndex> = routed[index].new_cells.iter().collect();
    routed
        .iter()
        .enumerate()
        .filter(|(other_index, other)| {
            *other_index != index && other.candidate.hops >= routed[index].candidate.hops && other.path.iter().any(|cell| own_new.contains(cell))
        })
        .count()
}

/// Iterative hop-chain slimmer with durable per-pair status.
#[derive(Debug, Default)]
pub struct HopSlimmer {
    status: HashMap<(CellIndex, CellIndex), CorridorStatus>,
}

impl HopSlimmer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget per-pair outcomes so every over-limit pair is retried.
    pub fn reset(&mut self) {
        self.status.clear();
    }

    /// Durable per-pair outcomes.
    pub fn status(&self) -> &HashMap<(CellIndex, CellIndex), CorridorStatus> {
        &self.status
    }

    /// Attempt to promote one shortcut corridor. Returns the number of
    /// corridors promoted (0 or 1); callers loop until zero.
    pub fn step(&mut self, store: &mut ClearanceStore, surface: &mut Surface, params: &ModelParams) -> Result<usize, PlanError> {
        let edges = build_visibility_edges(store, surface, params)?;

        let mut candidates: Vec<SlimCandidate> = Vec::new();
        for edge in &edges {
            if edge.cross_cluster {
                continue;
            }
            let Some(hops) = edge.hop_count else {
                continue;
            };
            if hops <= params.hop_limit {
                continue;
            }
            let pair = normalized_pair(edge.tower_a, edge.tower_b);
            if self.status.contains_key(&pair) {
                continue;
            }
            let has_seed = [edge.tower_a, edge.tower_b].iter().any(|cell| {
                surface
                    .tower_at(*cell)
                    .map(|t| matches!(t.provenance, Provenance::Seed | Provenance::PopulationSeed))
                    .unwrap_or(false)
            });
            candidates.push(SlimCandidate {
                pair,
                has_seed,
                hops,
                avg_hop_m: edge.distance_m / hops as f64,
            });
        }
        if candidates.is_empty() {
            return Ok(0);
        }

        candidates.sort_by(|a, b| {
            b.has_seed
                .cmp(&a.has_seed)
                .then(a.avg_hop_m.total_cmp(&b.avg_hop_m))
                .then(b.hops.cmp(&a.hops))
        });
        candidates.truncate(SLIM_BATCH_SIZE);

        let graph = RoutingGraph::build(store, surface, params)?;
        let mut routed: Vec<RoutedCandidate> = Vec::new();
        for candidate in candidates {
            let (from, to) = candidate.pair;
            let blocked = blocked_nodes(surface, &graph, candidate.pair, params);
            let Some(path) = graph.shortest_path(&[from], &[to], &blocked) else {
                log::warn!("Slim pair {} - {}: no corridor", from, to);
                self.status.insert(candidate.pair, CorridorStatus::Failed("no corridor".to_string()));
                continue;
            };

            // The graph edge set can lag behind tower mutations; require
            // true pairwise LOS from the source outward before trusting
            // the corridor.
            let mut continuous = true;
            for window in path.windows(2) {
                if !line_of_sight(store, surface, window[0], window[1], params)? {
                    continuous = false;
                    break;
                }
            }
            if !continuous {
                log::warn!("Slim pair {} - {}: corridor lacks LOS continuity, discarded", from, to);
                self.status.insert(candidate.pair, CorridorStatus::Failed("no LOS continuity".to_string()));
                continue;
            }

            let new_cells: Vec<CellIndex> = path.iter().copied().filter(|cell| surface.tower_at(*cell).is_none()).collect();
            if new_cells.is_empty() {
                self.status.insert(candidate.pair, CorridorStatus::Failed("corridor adds no towers".to_string()));
                continue;
            }
            routed.push(RoutedCandidate { candidate, path, new_cells });
        }

        if routed.is_empty() {
            return Ok(0);
        }

        let winner_index = (0..routed.len())
            .max_by(|&x, &y| {
                sharing_score(&routed, x)
                    .cmp(&sharing_score(&routed, y))
                    .then({
                        let reduction_x = routed[x].candidate.hops.saturating_sub(routed[x].path.len() as u32 - 1);
                        let reduction_y = routed[y].candidate.hops.saturating_sub(routed[y].path.len() as u32 - 1);
                        reduction_x.cmp(&reduction_y)
                    })
                    .then(routed[y].candidate.avg_hop_m.total_cmp(&routed[x].candidate.avg_hop_m))
            })
            .expect("routed is non-empty");
        let winner = &routed[winner_index];

        for cell in &winner.new_cells {
            surface.install_tower(*cell, Provenance::ClusterSlim, params);
        }
        self.status.insert(winner.candidate.pair, CorridorStatus::Resolved);
        log::info!(
            "Slimmed pair {} - {}: {} hops down to {}, {} new towers",
            winner.candidate.pair.0,
            winner.candidate.pair.1,
            winner.candidate.hops,
            winner.path.len() - 1,
            winner.new_cells.len()
        );

        Ok(1)
    }
}

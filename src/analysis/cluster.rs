//! Connected-component analysis over the tower set.
//!
//! Towers are adjacent when the LOS predicate holds within the maximum link
//! distance. Components are computed by breadth-first search; isolated
//! towers form singleton clusters.

use h3o::{CellIndex, LatLng};
use std::collections::{HashMap, VecDeque};

use crate::clearance::ClearanceStore;
use crate::error::PlanError;
use crate::los::line_of_sight;
use crate::params::ModelParams;
use crate::surface::Surface;

/// Tower clusters for one analysis pass.
#[derive(Debug, Clone)]
pub struct ClusterMap {
    /// Tower cell to cluster id.
    pub assignments: HashMap<CellIndex, usize>,
    /// Member tower cells per cluster id.
    pub members: Vec<Vec<CellIndex>>,
    /// Mean member position per cluster id, used to rank cluster pairs.
    pub centroids: Vec<LatLng>,
}

impl ClusterMap {
    pub fn count(&self) -> usize {
        self.members.len()
    }

    pub fn cluster_of(&self, cell: CellIndex) -> Option<usize> {
        self.assignments.get(&cell).copied()
    }
}

/// Undirected LOS adjacency over the current towers.
pub fn tower_adjacency(store: &mut ClearanceStore, surface: &Surface, params: &ModelParams) -> Result<HashMap<CellIndex, Vec<CellIndex>>, PlanError> {
    let tower_cells: Vec<CellIndex> = surface.towers().iter().map(|t| t.cell).collect();
    let mut adjacency: HashMap<CellIndex, Vec<CellIndex>> = tower_cells.iter().map(|cell| (*cell, Vec::new())).collect();

    for (i, a) in tower_cells.iter().enumerate() {
        for b in tower_cells.iter().skip(i + 1) {
            if line_of_sight(store, surface, *a, *b, params)? {
                if let Some(list) = adjacency.get_mut(a) {
                    list.push(*b);
                }
                if let Some(list) = adjacency.get_mut(b) {
                    list.push(*a);
                }
            }
        }
    }

    Ok(adjacency)
}

/// Compute connected components over the tower set.
pub fn analyze_clusters(store: &mut ClearanceStore, surface: &Surface, params: &ModelParams) -> Result<ClusterMap, PlanError> {
    let adjacency = tower_adjacency(store, surface, params)?;
    // Iterate in creation order so cluster ids are stable for a given tower set.
    let ordered: Vec<CellIndex> = surface.towers().iter().map(|t| t.cell).collect();

    let mut assignments: HashMap<CellIndex, usize> = HashMap::with_capacity(ordered.len());
    let mut members: Vec<Vec<CellIndex>> = Vec::new();

    for start in &ordered {
        if assignments.contains_key(start) {
            continue;
        }
        let id = members.len();
        let mut component = Vec::new();
        let mut queue = VecDeque::from([*start]);
        assignments.insert(*start, id);
        while let Some(cell) = queue.pop_front() {
            component.push(cell);
            if let Some(neighbors) = adjacency.get(&cell) {
                for neighbor in neighbors {
                    if !assignments.contains_key(neighbor) {
                        assignments.insert(*neighbor, id);
                        queue.push_back(*neighbor);
                    }
                }
            }
        }
        members.push(component);
    }

    let mut centroids = Vec::with_capacity(members.len());
    for component in &members {
        let mut lat = 0.0;
        let mut lng = 0.0;
        for cell in component {
            let position = LatLng::from(*cell);
            lat += position.lat();
            lng += position.lng();
        }
        let n = component.len() as f64;
        let centroid = LatLng::new(lat / n, lng / n).map_err(|e| PlanError::InvalidParameter(format!("cluster centroid out of range: {}", e)))?;
        centroids.push(centroid);
    }

    Ok(ClusterMap {
        assignments,
        members,
        centroids,
    })
}

//! Tower placement stages.
//!
//! - `wiggle`: Local hill-climbing relocation of non-seed towers
//! - `greedy`: Per-iteration bridge-or-coverage tower selection
//!
//! Both stages share the population-visibility helpers below. All scoring
//! goes through the LOS predicate so the distance cutoff and clearance model
//! stay uniform across stages.

pub mod greedy;
pub mod wiggle;

pub use greedy::{greedy_step, refresh_cell_metrics, GreedyPlacement};
pub use wiggle::WiggleQueue;

use h3o::CellIndex;
use std::collections::HashSet;

use crate::clearance::ClearanceStore;
use crate::error::PlanError;
use crate::los::line_of_sight;
use crate::params::ModelParams;
use crate::surface::Surface;

/// Total population visible from `from` within link range, including the
/// cell's own population.
pub(crate) fn visible_population(store: &mut ClearanceStore, surface: &Surface, from: CellIndex, params: &ModelParams) -> Result<f64, PlanError> {
    let mut total = 0.0;
    for cell in surface.cells_within(from, params.max_link_distance_m) {
        let population = surface.cell(cell).map(|data| data.population).unwrap_or(0.0);
        if population <= 0.0 {
            continue;
        }
        if line_of_sight(store, surface, from, cell, params)? {
            total += population;
        }
    }
    Ok(total)
}

/// Populated cells with LOS to at least one current tower.
pub(crate) fn covered_cells(store: &mut ClearanceStore, surface: &Surface, params: &ModelParams) -> Result<HashSet<CellIndex>, PlanError> {
    let tower_cells: Vec<CellIndex> = surface.towers().iter().map(|t| t.cell).collect();
    let mut covered = HashSet::new();
    for cell in surface.cell_indexes() {
        let population = surface.cell(cell).map(|data| data.population).unwrap_or(0.0);
        if population <= 0.0 {
            continue;
        }
        for tower in &tower_cells {
            if line_of_sight(store, surface, cell, *tower, params)? {
                covered.insert(cell);
                break;
            }
        }
    }
    Ok(covered)
}

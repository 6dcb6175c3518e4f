//! Local refinement ("wiggle"): single-tower hill-climbing relocation.
//!
//! A persistent dirty queue holds non-seed towers awaiting refinement. One
//! step call processes one tower: it searches eligible cells in range that
//! keep LOS to every current LOS neighbor and sit outside minimum spacing
//! of every other tower, then relocates the tower to the cell with the
//! highest visible population (the current cell wins ties). Relocation
//! invalidates metrics in the union of the old and new neighborhoods and
//! re-dirties towers that gained a direct LOS link to the moved tower.

use h3o::CellIndex;
use std::collections::HashSet;

use super::visible_population;
use crate::clearance::ClearanceStore;
use crate::error::PlanError;
use crate::los::line_of_sight;
use crate::params::ModelParams;
use crate::surface::{cell_distance_m, Surface};

/// Persistent dirty queue for the refinement stage.
#[derive(Debug, Default)]
pub struct WiggleQueue {
    dirty: HashSet<CellIndex>,
}

impl WiggleQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark one tower cell as needing refinement.
    pub fn mark(&mut self, cell: CellIndex) {
        self.dirty.insert(cell);
    }

    /// Mark every relocatable (non-seed) tower as dirty.
    pub fn mark_all_relocatable(&mut self, surface: &Surface) {
        for tower in surface.towers() {
            if tower.provenance.relocatable() {
                self.dirty.insert(tower.cell);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.dirty.is_empty()
    }

    /// Process one dirty tower. Returns the number of towers processed
    /// (0 or 1); callers loop until it returns 0 with the queue empty.
    pub fn step(&mut self, store: &mut ClearanceStore, surface: &mut Surface, params: &ModelParams) -> Result<usize, PlanError> {
        // Entries may refer to towers that were reset or already moved.
        self.dirty.retain(|cell| surface.tower_at(*cell).map(|t| t.provenance.relocatable()).unwrap_or(false));
        if self.dirty.is_empty() {
            return Ok(0);
        }

        // Fewest recalculations first; ties go to the highest visible
        // population, then creation order.
        let mut anchor: Option<(u32, f64, u32, CellIndex)> = None;
        let mut dirty: Vec<CellIndex> = self.dirty.iter().copied().collect();
        dirty.sort();
        for cell in dirty {
            let tower = surface.tower_at(cell).expect("dirty entries are towers");
            let population = visible_population(store, surface, cell, params)?;
            let better = match &anchor {
                None => true,
                Some((recalculations, best_population, order, _)) => {
                    (tower.recalculations, -population, tower.order) < (*recalculations, -*best_population, *order)
                }
            };
            if better {
                anchor = Some((tower.recalculations, population, tower.order, cell));
            }
        }
        let (_, anchor_population, _, anchor_cell) = anchor.expect("dirty queue is non-empty");
        self.dirty.remove(&anchor_cell);
        if let Some(tower) = surface.tower_mut_at(anchor_cell) {
            tower.recalculations += 1;
        }

        // Every tower currently LOS-visible to the anchor must stay visible
        // from wherever it ends up.
        let mut neighbors: Vec<CellIndex> = Vec::new();
        let tower_cells: Vec<CellIndex> = surface.towers().iter().map(|t| t.cell).collect();
        for tower_cell in &tower_cells {
            if *tower_cell != anchor_cell && line_of_sight(store, surface, anchor_cell, *tower_cell, params)? {
                neighbors.push(*tower_cell);
            }
        }

        let mut best_cell = anchor_cell;
        let mut best_population = anchor_population;
        'candidates: for candidate in surface.cells_within(anchor_cell, params.max_link_distance_m) {
            if candidate == anchor_cell {
                continue;
            }
            let Some(data) = surface.cell(candidate) else {
                continue;
            };
            if !data.road_access || !data.in_boundary || data.forbidden || data.has_tower {
                continue;
            }
            // Spacing against every tower except the anchor itself, which
            // vacates its cell on relocation.
            let spacing = data.min_spacing_m;
            for tower_cell in &tower_cells {
                if *tower_cell != anchor_cell && cell_distance_m(candidate, *tower_cell) < spacing {
                    continue 'candidates;
                }
            }
            for neighbor in &neighbors {
                if !line_of_sight(store, surface, candidate, *neighbor, params)? {
                    continue 'candidates;
                }
            }
            let population = visible_population(store, surface, candidate, params)?;
            if population > best_population {
                best_population = population;
                best_cell = candidate;
            }
        }

        if best_cell == anchor_cell {
            log::debug!("Wiggle: tower at {} already optimal", anchor_cell);
            return Ok(1);
        }

        surface.relocate_tower(anchor_cell, best_cell, params);
        log::info!(
            "Wiggle: relocated tower {} -> {} (visible population {:.0} -> {:.0})",
            anchor_cell,
            best_cell,
            anchor_population,
            best_population
        );

        // Towers that gained a direct LOS link to the moved tower get
        // another refinement pass.
        let old_neighbors: HashSet<CellIndex> = neighbors.into_iter().collect();
        for tower_cell in &tower_cells {
            if *tower_cell == anchor_cell || old_neighbors.contains(tower_cell) {
                continue;
            }
            let relocatable = surface.tower_at(*tower_cell).map(|t| t.provenance.relocatable()).unwrap_or(false);
            if relocatable && line_of_sight(store, surface, best_cell, *tower_cell, params)? {
                self.dirty.insert(*tower_cell);
            }
        }

        Ok(1)
    }
}

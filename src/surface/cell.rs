//! Cell data, towers, and the mutable planning surface.
//!
//! Derived metrics are modeled as `Option` where `None` means "needs
//! recomputation". A reader must never treat a missing metric as a valid
//! zero; stages that consume a metric either refresh it first or compute the
//! value directly.

use h3o::{CellIndex, LatLng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::params::ModelParams;

/// Geodesic distance between two cell centers (m).
pub fn cell_distance_m(a: CellIndex, b: CellIndex) -> f64 {
    LatLng::from(a).distance_m(LatLng::from(b))
}

/// Origin of a tower placement. The order of the variants is the canonical
/// order used when labeling tower-pair diagnostic edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    /// Manually placed initial tower.
    Seed,
    /// Initial tower derived from a population center.
    PopulationSeed,
    /// Promoted on a corridor found by the bridge solver.
    Route,
    /// Installed by the greedy selector to reach a blocked cluster.
    Bridge,
    /// Promoted while shortening an over-limit hop chain.
    ClusterSlim,
    /// Installed by the greedy selector for coverage gain.
    Greedy,
}

impl Provenance {
    /// Stable label used in diagnostic edge types and reports.
    pub fn label(&self) -> &'static str {
        match self {
            Provenance::Seed => "seed",
            Provenance::PopulationSeed => "population-seed",
            Provenance::Route => "route",
            Provenance::Bridge => "bridge",
            Provenance::ClusterSlim => "cluster-slim",
            Provenance::Greedy => "greedy",
        }
    }

    /// Whether towers of this provenance survive a derived-tower reset.
    pub fn survives_reset(&self) -> bool {
        !matches!(self, Provenance::Bridge | Provenance::Greedy)
    }

    /// Whether the refinement stage may relocate towers of this provenance.
    /// Seed towers (manual or population-derived) are fixed infrastructure.
    pub fn relocatable(&self) -> bool {
        !matches!(self, Provenance::Seed | Provenance::PopulationSeed)
    }
}

/// A placed relay tower.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tower {
    /// Cell hosting the tower.
    pub cell: CellIndex,
    /// Which stage created this tower.
    pub provenance: Provenance,
    /// Creation order across the whole run; stable under relocation.
    pub order: u32,
    /// How many times the refinement stage has processed this tower.
    pub recalculations: u32,
}

/// Derived per-cell placement metrics. `None` always means "unknown, needs
/// recomputation", never zero.
#[derive(Debug, Clone, Default)]
pub struct DerivedMetrics {
    /// Fresnel clearance (m) of the best link to a nearby tower.
    pub clearance_m: Option<f64>,
    /// Path loss (dB) of the best link to a nearby tower.
    pub path_loss_db: Option<f64>,
    /// Number of towers with LOS to this cell within link range.
    pub visible_towers: Option<u32>,
    /// Total population visible from this cell within link range.
    pub visible_population: Option<f64>,
    /// Visible population not yet covered by any tower.
    pub visible_uncovered_population: Option<f64>,
    /// Geodesic distance (m) to the nearest tower.
    pub nearest_tower_m: Option<f64>,
}

impl DerivedMetrics {
    /// Clear every link-dependent metric, leaving nearest-tower distance
    /// untouched (nearest is maintained by its own update pass).
    pub fn clear_link_metrics(&mut self) {
        self.clearance_m = None;
        self.path_loss_db = None;
        self.visible_towers = None;
        self.visible_population = None;
        self.visible_uncovered_population = None;
    }
}

/// Static per-cell indicators plus derived metrics.
#[derive(Debug, Clone)]
pub struct CellData {
    /// Terrain elevation (m). Absence is fatal only for clearance
    /// computations touching this cell.
    pub elevation_m: Option<f64>,
    /// Whether the cell is reachable by road.
    pub road_access: bool,
    /// Resident population assigned to this cell.
    pub population: f64,
    /// Whether the cell lies inside the administrative boundary.
    pub in_boundary: bool,
    /// Whether tower placement is forbidden here.
    pub forbidden: bool,
    /// Whether a tower currently stands on this cell.
    pub has_tower: bool,
    /// Minimum required spacing (m) to the nearest other tower.
    pub min_spacing_m: f64,
    /// Derived placement metrics.
    pub metrics: DerivedMetrics,
}

impl CellData {
    /// A cell with the given elevation and default indicators, mainly for
    /// building synthetic surfaces.
    pub fn with_elevation(elevation_m: f64, params: &ModelParams) -> Self {
        Self {
            elevation_m: Some(elevation_m),
            road_access: true,
            population: 0.0,
            in_boundary: true,
            forbidden: false,
            has_tower: false,
            min_spacing_m: params.min_spacing_m,
            metrics: DerivedMetrics::default(),
        }
    }
}

/// The planning surface: all cells of the region at one fixed resolution,
/// plus the current tower set.
#[derive(Debug, Default)]
pub struct Surface {
    cells: HashMap<CellIndex, CellData>,
    towers: Vec<Tower>,
    next_order: u32,
}

impl Surface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_cells(cells: HashMap<CellIndex, CellData>) -> Self {
        Self {
            cells,
            towers: Vec::new(),
            next_order: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cell(&self, index: CellIndex) -> Option<&CellData> {
        self.cells.get(&index)
    }

    pub fn cell_mut(&mut self, index: CellIndex) -> Option<&mut CellData> {
        self.cells.get_mut(&index)
    }

    pub fn cells(&self) -> impl Iterator<Item = (CellIndex, &CellData)> {
        self.cells.iter().map(|(index, data)| (*index, data))
    }

    pub fn cell_indexes(&self) -> Vec<CellIndex> {
        self.cells.keys().copied().collect()
    }

    pub fn towers(&self) -> &[Tower] {
        &self.towers
    }

    pub fn tower_at(&self, cell: CellIndex) -> Option<&Tower> {
        self.towers.iter().find(|t| t.cell == cell)
    }

    pub fn tower_mut_at(&mut self, cell: CellIndex) -> Option<&mut Tower> {
        self.towers.iter_mut().find(|t| t.cell == cell)
    }

    /// Whether a cell currently passes every static and spacing gate for
    /// tower placement. An unknown nearest-tower distance counts as open
    /// only while the surface holds no towers at all.
    pub fn is_eligible(&self, index: CellIndex) -> bool {
        let Some(cell) = self.cells.get(&index) else {
            return false;
        };
        if !cell.road_access || !cell.in_boundary || cell.forbidden || cell.has_tower {
            return false;
        }
        match cell.metrics.nearest_tower_m {
            Some(distance) => distance >= cell.min_spacing_m,
            None => self.towers.is_empty(),
        }
    }

    /// All surface cells within `radius_m` of `center`, including `center`
    /// itself when it is part of the surface. Sorted by index so callers
    /// iterating for tie-sensitive scoring stay deterministic.
    pub fn cells_within(&self, center: CellIndex, radius_m: f64) -> Vec<CellIndex> {
        let origin = LatLng::from(center);
        let mut cells: Vec<CellIndex> = self
            .cells
            .keys()
            .copied()
            .filter(|index| origin.distance_m(LatLng::from(*index)) <= radius_m)
            .collect();
        cells.sort();
        cells
    }

    /// Distance (m) from `cell` to the nearest tower, over the full tower set.
    pub fn nearest_tower_distance(&self, cell: CellIndex) -> Option<f64> {
        self.towers
            .iter()
            .map(|t| cell_distance_m(cell, t.cell))
            .min_by(|a, b| a.total_cmp(b))
    }

    /// Insert a tower without any metric maintenance. Duplicates by cell are
    /// ignored. Import and tests use this; placement stages go through
    /// [`Surface::install_tower`].
    pub fn add_tower(&mut self, cell: CellIndex, provenance: Provenance) -> bool {
        if self.tower_at(cell).is_some() {
            return false;
        }
        if let Some(data) = self.cells.get_mut(&cell) {
            data.has_tower = true;
        }
        self.towers.push(Tower {
            cell,
            provenance,
            order: self.next_order,
            recalculations: 0,
        });
        self.next_order += 1;
        true
    }

    /// Install a tower and restore metric consistency in its neighborhood:
    /// the new tower's own metrics are zeroed out, link metrics of every
    /// cell within link range are invalidated, and nearest-tower distances
    /// within that radius are updated.
    pub fn install_tower(&mut self, cell: CellIndex, provenance: Provenance, params: &ModelParams) -> bool {
        if !self.add_tower(cell, provenance) {
            return false;
        }
        if let Some(data) = self.cells.get_mut(&cell) {
            data.metrics = DerivedMetrics::default();
        }
        self.invalidate_link_metrics_within(cell, params.max_link_distance_m);
        self.update_nearest_tower_within(cell, params.max_link_distance_m);
        true
    }

    /// Move a tower to a new cell, keeping its provenance, order, and
    /// recalculation count. Metrics are cleared and nearest-tower distances
    /// recomputed in the union of the old and new neighborhoods.
    pub fn relocate_tower(&mut self, from: CellIndex, to: CellIndex, params: &ModelParams) -> bool {
        if from == to || self.tower_at(to).is_some() {
            return false;
        }
        let Some(tower) = self.towers.iter_mut().find(|t| t.cell == from) else {
            return false;
        };
        tower.cell = to;
        if let Some(data) = self.cells.get_mut(&from) {
            data.has_tower = false;
        }
        if let Some(data) = self.cells.get_mut(&to) {
            data.has_tower = true;
            data.metrics = DerivedMetrics::default();
        }
        self.invalidate_link_metrics_within(from, params.max_link_distance_m);
        self.invalidate_link_metrics_within(to, params.max_link_distance_m);
        self.update_nearest_tower_within(from, params.max_link_distance_m);
        self.update_nearest_tower_within(to, params.max_link_distance_m);
        true
    }

    /// Remove every greedy- and bridge-sourced tower, keeping seed, route,
    /// and cluster-slim towers, so the greedy stage can re-run from a stable
    /// base. Returns the number of removed towers.
    pub fn reset_derived_towers(&mut self, params: &ModelParams) -> usize {
        let removed: Vec<CellIndex> = self
            .towers
            .iter()
            .filter(|t| !t.provenance.survives_reset())
            .map(|t| t.cell)
            .collect();
        if removed.is_empty() {
            return 0;
        }
        self.towers.retain(|t| t.provenance.survives_reset());
        for cell in &removed {
            if let Some(data) = self.cells.get_mut(cell) {
                data.has_tower = false;
            }
            self.invalidate_link_metrics_within(*cell, params.max_link_distance_m);
        }
        self.rebuild_nearest_tower_metrics();
        removed.len()
    }

    /// Clear link-dependent metrics for every cell within `radius_m` of `center`.
    pub fn invalidate_link_metrics_within(&mut self, center: CellIndex, radius_m: f64) {
        let origin = LatLng::from(center);
        for (index, data) in self.cells.iter_mut() {
            if origin.distance_m(LatLng::from(*index)) <= radius_m {
                data.metrics.clear_link_metrics();
            }
        }
    }

    /// Recompute nearest-tower distances for every cell within `radius_m`
    /// of `center`, against the full tower set.
    pub fn update_nearest_tower_within(&mut self, center: CellIndex, radius_m: f64) {
        let origin = LatLng::from(center);
        let tower_cells: Vec<CellIndex> = self.towers.iter().map(|t| t.cell).collect();
        for (index, data) in self.cells.iter_mut() {
            if origin.distance_m(LatLng::from(*index)) > radius_m {
                continue;
            }
            data.metrics.nearest_tower_m = tower_cells
                .iter()
                .map(|t| cell_distance_m(*index, *t))
                .min_by(|a, b| a.total_cmp(b));
        }
    }

    /// Recompute nearest-tower distances for the whole surface. Used after
    /// seed import and derived-tower resets, where the change is not local.
    pub fn rebuild_nearest_tower_metrics(&mut self) {
        let tower_cells: Vec<CellIndex> = self.towers.iter().map(|t| t.cell).collect();
        for (index, data) in self.cells.iter_mut() {
            data.metrics.nearest_tower_m = tower_cells
                .iter()
                .map(|t| cell_distance_m(*index, *t))
                .min_by(|a, b| a.total_cmp(b));
        }
    }
}

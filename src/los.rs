//! Line-of-sight predicate.
//!
//! This is the single adjacency test used everywhere else: cluster analysis,
//! routing-graph edges, eligibility refreshes, and greedy scoring all call
//! through here so the distance cutoff is applied uniformly.

use h3o::CellIndex;

use crate::clearance::ClearanceStore;
use crate::error::PlanError;
use crate::params::ModelParams;
use crate::surface::{cell_distance_m, Surface};

/// Whether two cells see each other.
///
/// Identical cells are trivially visible. Cells missing from the surface are
/// never visible. Any pair farther apart than the maximum link distance is
/// unconditionally not visible, skipping clearance computation; otherwise
/// visibility is a positive worst-case Fresnel clearance, served from the
/// link store.
pub fn line_of_sight(
    store: &mut ClearanceStore,
    surface: &Surface,
    cell_a: CellIndex,
    cell_b: CellIndex,
    params: &ModelParams,
) -> Result<bool, PlanError> {
    if cell_a == cell_b {
        return Ok(true);
    }
    if surface.cell(cell_a).is_none() || surface.cell(cell_b).is_none() {
        return Ok(false);
    }
    if cell_distance_m(cell_a, cell_b) > params.max_link_distance_m {
        return Ok(false);
    }
    let profile = store.profile(surface, cell_a, cell_b, params)?;
    Ok(profile.clearance_m > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::CellData;
    use h3o::{LatLng, Resolution};
    use std::collections::HashMap;

    fn cell_at(lat: f64, lng: f64) -> CellIndex {
        LatLng::new(lat, lng).unwrap().to_cell(Resolution::Eight)
    }

    fn flat_surface(pairs: &[(CellIndex, CellIndex)]) -> Surface {
        let params = ModelParams::default();
        let mut cells = HashMap::new();
        for (a, b) in pairs {
            for cell in crate::clearance::path_cells(*a, *b) {
                cells.entry(cell).or_insert_with(|| CellData::with_elevation(0.0, &params));
            }
        }
        Surface::from_cells(cells)
    }

    #[test]
    fn identical_cells_are_visible() {
        let params = ModelParams::default();
        let a = cell_at(41.70, 44.80);
        let surface = flat_surface(&[(a, a)]);
        let mut store = ClearanceStore::new();
        assert!(line_of_sight(&mut store, &surface, a, a, &params).unwrap());
    }

    #[test]
    fn distance_cutoff_wins_over_clear_terrain() {
        let params = ModelParams::default();
        // Roughly 90 km apart: flat terrain, but beyond the hard cutoff.
        let a = cell_at(41.70, 44.00);
        let b = cell_at(41.70, 45.08);
        assert!(cell_distance_m(a, b) > params.max_link_distance_m);
        let surface = flat_surface(&[(a, b)]);
        let mut store = ClearanceStore::new();
        assert!(!line_of_sight(&mut store, &surface, a, b, &params).unwrap());
        // The cutoff short-circuits before any clearance computation.
        assert!(store.is_empty());
    }

    #[test]
    fn symmetric_for_flat_terrain_pair() {
        let params = ModelParams::default();
        let a = cell_at(41.70, 44.80);
        let b = cell_at(41.72, 44.95);
        let surface = flat_surface(&[(a, b)]);
        let mut store = ClearanceStore::new();
        let forward = line_of_sight(&mut store, &surface, a, b, &params).unwrap();
        let reverse = line_of_sight(&mut store, &surface, b, a, &params).unwrap();
        assert!(forward);
        assert_eq!(forward, reverse);
    }

    #[test]
    fn unknown_cells_are_not_visible() {
        let params = ModelParams::default();
        let a = cell_at(41.70, 44.80);
        let b = cell_at(41.72, 44.95);
        let surface = flat_surface(&[(a, a)]);
        let mut store = ClearanceStore::new();
        assert!(!line_of_sight(&mut store, &surface, a, b, &params).unwrap());
    }
}

//! Greedy selector: per-iteration bridge-or-coverage tower installation.
//!
//! Each iteration first refreshes missing metrics for eligible cells. While
//! more than one cluster exists it prefers a bridging candidate: the
//! eligible cell minimizing the average path loss toward clusters it cannot
//! yet see, provided it has at least one real LOS link. Otherwise it falls
//! back to the cell with the highest visible uncovered population among
//! cells that see at least two towers. Installation is followed by
//! localized invalidation so later iterations score against fresh state.

use h3o::CellIndex;
use std::collections::HashSet;

use super::covered_cells;
use crate::analysis::cluster::analyze_clusters;
use crate::clearance::ClearanceStore;
use crate::error::PlanError;
use crate::los::line_of_sight;
use crate::params::ModelParams;
use crate::surface::{cell_distance_m, Provenance, Surface};

/// Outcome of one greedy iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GreedyPlacement {
    pub cell: CellIndex,
    pub provenance: Provenance,
}

/// Refresh missing clearance, path-loss, visibility, and population metrics
/// for eligible cells. Already-known metrics are left untouched, so the
/// pass after a localized invalidation only recomputes the affected
/// neighborhood. Returns the number of cells refreshed.
pub fn refresh_cell_metrics(store: &mut ClearanceStore, surface: &mut Surface, params: &ModelParams) -> Result<usize, PlanError> {
    let covered = covered_cells(store, surface, params)?;
    let tower_cells: Vec<CellIndex> = surface.towers().iter().map(|t| t.cell).collect();

    let mut eligible: Vec<CellIndex> = surface.cell_indexes().into_iter().filter(|cell| surface.is_eligible(*cell)).collect();
    eligible.sort();

    let mut refreshed = 0usize;
    let total = eligible.len();
    for cell in eligible {
        let needs_refresh = {
            let metrics = &surface.cell(cell).expect("eligible cells exist").metrics;
            metrics.visible_towers.is_none()
                || metrics.path_loss_db.is_none()
                || metrics.visible_population.is_none()
                || metrics.visible_uncovered_population.is_none()
        };
        if !needs_refresh {
            continue;
        }

        let mut visible_towers = 0u32;
        let mut best_loss: Option<f64> = None;
        let mut best_clearance: Option<f64> = None;
        for tower in &tower_cells {
            if cell_distance_m(cell, *tower) > params.max_link_distance_m {
                continue;
            }
            let profile = store.profile(surface, cell, *tower, params)?;
            if profile.clearance_m > 0.0 {
                visible_towers += 1;
            }
            if best_loss.map(|loss| profile.path_loss_db < loss).unwrap_or(true) {
                best_loss = Some(profile.path_loss_db);
                best_clearance = Some(profile.clearance_m);
            }
        }

        let mut population = 0.0;
        let mut uncovered = 0.0;
        for other in surface.cells_within(cell, params.max_link_distance_m) {
            let other_population = surface.cell(other).map(|data| data.population).unwrap_or(0.0);
            if other_population <= 0.0 {
                continue;
            }
            if line_of_sight(store, surface, cell, other, params)? {
                population += other_population;
                if !covered.contains(&other) {
                    uncovered += other_population;
                }
            }
        }

        let metrics = &mut surface.cell_mut(cell).expect("eligible cells exist").metrics;
        metrics.visible_towers = Some(visible_towers);
        metrics.path_loss_db = best_loss;
        metrics.clearance_m = best_clearance;
        metrics.visible_population = Some(population);
        metrics.visible_uncovered_population = Some(uncovered);
        refreshed += 1;

        if refreshed % 200 == 0 {
            log::info!("Metric refresh: {}/{} eligible cells", refreshed, total);
        }
    }

    Ok(refreshed)
}

/// Candidate cells that currently see exactly one tower and would see the
/// prospective tower at `candidate` too, reaching the two-visible-towers
/// gate the fallback selection requires.
fn opened_candidates(store: &mut ClearanceStore, surface: &Surface, candidate: CellIndex, params: &ModelParams) -> Result<usize, PlanError> {
    let mut opened = 0usize;
    for cell in surface.cells_within(candidate, params.max_link_distance_m) {
        if cell == candidate || !surface.is_eligible(cell) {
            continue;
        }
        let Some(data) = surface.cell(cell) else {
            continue;
        };
        if data.metrics.visible_towers != Some(1) {
            continue;
        }
        if line_of_sight(store, surface, cell, candidate, params)? {
            opened += 1;
        }
    }
    Ok(opened)
}

/// Run one greedy iteration: pick and install one tower.
///
/// Fails with [`PlanError::CandidatesExhausted`] when no eligible candidate
/// with positive gain remains; callers treat that as the expected end of
/// the loop.
pub fn greedy_step(store: &mut ClearanceStore, surface: &mut Surface, params: &ModelParams) -> Result<GreedyPlacement, PlanError> {
    refresh_cell_metrics(store, surface, params)?;

    let mut eligible: Vec<CellIndex> = surface.cell_indexes().into_iter().filter(|cell| surface.is_eligible(*cell)).collect();
    eligible.sort();
    if eligible.is_empty() {
        return Err(PlanError::CandidatesExhausted);
    }

    let clusters = analyze_clusters(store, surface, params)?;
    if clusters.count() > 1 {
        // Score candidates against every cluster: clusters already visible
        // cost nothing, blocked-but-reachable clusters contribute their
        // best path loss.
        let mut scored: Vec<(f64, f64, CellIndex)> = Vec::new();
        for cell in &eligible {
            let mut any_los = false;
            let mut blocked_losses: Vec<f64> = Vec::new();
            let mut min_blocked_distance = f64::INFINITY;
            for members in &clusters.members {
                let mut cluster_los = false;
                let mut best_loss: Option<f64> = None;
                let mut best_distance = f64::INFINITY;
                for tower in members {
                    let distance = cell_distance_m(*cell, *tower);
                    if distance > params.max_link_distance_m {
                        continue;
                    }
                    let profile = store.profile(surface, *cell, *tower, params)?;
                    if profile.clearance_m > 0.0 {
                        cluster_los = true;
                    }
                    if best_loss.map(|loss| profile.path_loss_db < loss).unwrap_or(true) {
                        best_loss = Some(profile.path_loss_db);
                    }
                    best_distance = best_distance.min(distance);
                }
                if cluster_los {
                    any_los = true;
                } else if let Some(loss) = best_loss {
                    blocked_losses.push(loss);
                    min_blocked_distance = min_blocked_distance.min(best_distance);
                }
            }
            if any_los && !blocked_losses.is_empty() {
                let average = blocked_losses.iter().sum::<f64>() / blocked_losses.len() as f64;
                scored.push((average, min_blocked_distance, *cell));
            }
        }

        if !scored.is_empty() {
            scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
            let (best_loss, best_distance, _) = scored[0];
            let mut winner = scored[0].2;
            let mut winner_openings = None;
            for (loss, distance, cell) in &scored {
                if *loss != best_loss || *distance != best_distance {
                    break;
                }
                let openings = opened_candidates(store, surface, *cell, params)?;
                if winner_openings.map(|best| openings > best).unwrap_or(true) {
                    winner_openings = Some(openings);
                    winner = *cell;
                }
            }
            surface.install_tower(winner, Provenance::Bridge, params);
            log::info!("Greedy: installed bridge tower at {} (blocked-cluster loss {:.1} dB)", winner, best_loss);
            return Ok(GreedyPlacement {
                cell: winner,
                provenance: Provenance::Bridge,
            });
        }
    }

    // Coverage fallback: highest visible uncovered population among cells
    // seeing at least two towers.
    let mut best: Option<(f64, CellIndex)> = None;
    for cell in &eligible {
        let metrics = &surface.cell(*cell).expect("eligible cells exist").metrics;
        if metrics.visible_towers.map(|count| count < 2).unwrap_or(true) {
            continue;
        }
        let gain = metrics.visible_uncovered_population.unwrap_or(0.0);
        if gain <= 0.0 {
            continue;
        }
        match best {
            None => best = Some((gain, *cell)),
            Some((best_gain, best_cell)) => {
                if gain > best_gain {
                    best = Some((gain, *cell));
                } else if gain == best_gain {
                    let openings = opened_candidates(store, surface, *cell, params)?;
                    let best_openings = opened_candidates(store, surface, best_cell, params)?;
                    if openings > best_openings {
                        best = Some((gain, *cell));
                    }
                }
            }
        }
    }

    let Some((gain, winner)) = best else {
        return Err(PlanError::CandidatesExhausted);
    };
    surface.install_tower(winner, Provenance::Greedy, params);
    log::info!("Greedy: installed coverage tower at {} (uncovered population {:.0})", winner, gain);
    Ok(GreedyPlacement {
        cell: winner,
        provenance: Provenance::Greedy,
    })
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
    fn installs_coverage_tower_with_greedy_provenance() {
        let params = ModelParams::default();
        // Two towers 12.5 km apart; the candidate between them sees both
        // and a populated town the towers cannot cover.
        let a = cell_at(41.70, 44.40);
        let b = cell_at(41.70, 44.55);
        let candidate = cell_at(41.76, 44.47);
        let town = cell_at(41.82, 44.47);
        let mut surface = flat_surface(&[a, b, candidate, town]);
        restrict_road_access(&mut surface, &[candidate]);
        surface.cell_mut(town).unwrap().population = 300.0;
        surface.add_tower(a, Provenance::Seed);
        surface.add_tower(b, Provenance::Seed);
        surface.rebuild_nearest_tower_metrics();

        let mut store = ClearanceStore::new();
        // One cluster, so the bridging branch is skipped.
        assert_eq!(analyze_clusters(&mut store, &surface, &params).unwrap().count(), 1);
        assert!(!line_of_sight(&mut store, &surface, a, town, &params).unwrap());
        assert!(!line_of_sight(&mut store, &surface, b, town, &params).unwrap());
        assert!(line_of_sight(&mut store, &surface, candidate, town, &params).unwrap());

        let placement = greedy_step(&mut store, &mut surface, &params).unwrap();
        assert_eq!(placement.cell, candidate);
        assert_eq!(placement.provenance, Provenance::Greedy);
        let tower = surface.tower_at(candidate).unwrap();
        assert_eq!(tower.provenance, Provenance::Greedy);

        // The installation invalidated metrics around the new tower.
        assert!(surface.cell(town).unwrap().metrics.visible_towers.is_none());

        // The town is covered now, so no positive gain remains.
        assert!(matches!(greedy_step(&mut store, &mut surface, &params), Err(PlanError::CandidatesExhausted)));
    }

    #[test]
    fn installs_bridge_tower_toward_blocked_cluster() {
        let params = ModelParams::default();
        // Cluster A at a, cluster B at b, 41 km apart: the candidate sees A
        // and is in range of B without LOS to it.
        let a = cell_at(41.70, 44.40);
        let b = cell_at(41.70, 44.90);
        let candidate = cell_at(41.70, 44.55);
        let mut surface = flat_surface(&[a, b, candidate]);
        restrict_road_access(&mut surface, &[candidate]);
        surface.add_tower(a, Provenance::Seed);
        surface.add_tower(b, Provenance::Seed);
        surface.rebuild_nearest_tower_metrics();

        let mut store = ClearanceStore::new();
        assert_eq!(analyze_clusters(&mut store, &surface, &params).unwrap().count(), 2);
        assert!(line_of_sight(&mut store, &surface, candidate, a, &params).unwrap());
        assert!(!line_of_sight(&mut store, &surface, candidate, b, &params).unwrap());

        let placement = greedy_step(&mut store, &mut surface, &params).unwrap();
        assert_eq!(placement.cell, candidate);
        assert_eq!(placement.provenance, Provenance::Bridge);
    }

    #[test]
    fn exhaustion_is_an_error_not_a_panic() {
        let params = ModelParams::default();
        let a = cell_at(41.70, 44.40);
        let mut surface = flat_surface(&[a]);
        restrict_road_access(&mut surface, &[]);
        surface.add_tower(a, Provenance::Seed);
        surface.rebuild_nearest_tower_metrics();

        let mut store = ClearanceStore::new();
        assert!(matches!(greedy_step(&mut store, &mut surface, &params), Err(PlanError::CandidatesExhausted)));
    }

    #[test]
    fn refresh_skips_cells_with_known_metrics() {
        let params = ModelParams::default();
        let a = cell_at(41.70, 44.40);
        let candidate = cell_at(41.70, 44.55);
        let mut surface = flat_surface(&[a, candidate]);
        restrict_road_access(&mut surface, &[candidate]);
        surface.add_tower(a, Provenance::Seed);
        surface.rebuild_nearest_tower_metrics();

        let mut store = ClearanceStore::new();
        let first = refresh_cell_metrics(&mut store, &mut surface, &params).unwrap();
        assert_eq!(first, 1);
        let metrics = &surface.cell(candidate).unwrap().metrics;
        assert_eq!(metrics.visible_towers, Some(1));
        assert!(metrics.visible_population.is_some());

        // Nothing is missing anymore, so the second pass is a no-op.
        let second = refresh_cell_metrics(&mut store, &mut surface, &params).unwrap();
        assert_eq!(second, 0);
    }
}

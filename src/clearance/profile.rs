//! Fresnel clearance and path-loss computation for one cell pair.
//!
//! Contains helpers for:
//! - Free-space path loss and single knife-edge diffraction in dB
//! - First Fresnel-zone radius along a path
//! - The full link profile: worst-case clearance over the terrain samples
//!   between two mast tops, with Earth-curvature (4/3 model) and
//!   Fresnel-zone depression applied
//!
//! Units:
//! - Distance and clearance: meters (f64)
//! - Frequency: Hz (u64); mast heights: meters (u32)
//! - Loss: dB

use h3o::{CellIndex, LatLng};
use serde::{Deserialize, Serialize};

use crate::error::PlanError;
use crate::params::{EFFECTIVE_EARTH_RADIUS_M, FRESNEL_CLEARANCE_FRACTION, SPEED_OF_LIGHT_M_S};
use crate::surface::Surface;

/// Computed link profile between two cells.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinkProfile {
    /// Geodesic distance between the two cell centers (m).
    pub distance_m: f64,
    /// Worst-case Fresnel clearance along the path (m); positive means unobstructed.
    pub clearance_m: f64,
    /// Distance from the first endpoint to the worst sample (m).
    pub worst_near_m: f64,
    /// Distance from the worst sample to the second endpoint (m).
    pub worst_far_m: f64,
    /// Modeled path loss (dB): free-space plus knife-edge diffraction when obstructed.
    pub path_loss_db: f64,
}

/// Free-space path loss in dB for a link of `distance_m` meters at `frequency_hz`.
///
/// # Formula
///
/// ```text
/// FSPL(dB) = 20·log₁₀(d_km) + 20·log₁₀(f_MHz) + 32.44
/// ```
pub fn free_space_loss_db(distance_m: f64, frequency_hz: u64) -> f64 {
    let distance_km = distance_m / 1_000.0;
    let frequency_mhz = frequency_hz as f64 / 1_000_000.0;
    20.0 * distance_km.log10() + 20.0 * frequency_mhz.log10() + 32.44
}

/// Radius (m) of the first Fresnel zone at a point splitting the path into
/// `near_m` and `far_m` sub-distances.
pub fn first_fresnel_radius_m(wavelength_m: f64, near_m: f64, far_m: f64) -> f64 {
    (wavelength_m * near_m * far_m / (near_m + far_m)).sqrt()
}

/// Single knife-edge diffraction loss (dB) for a link obstructed by
/// `clearance_m` (negative) at a point with first Fresnel radius `r1_m`.
///
/// Uses the standard approximation with ν = √2·|clearance| / r1:
///
/// ```text
/// L(ν) = 6.9 + 20·log₁₀(√((ν−0.1)² + 1) + ν − 0.1)   for ν > 0
/// ```
pub fn knife_edge_loss_db(clearance_m: f64, r1_m: f64) -> f64 {
    if r1_m <= 0.0 {
        return 0.0;
    }
    let v = std::f64::consts::SQRT_2 * clearance_m.abs() / r1_m;
    if v <= 0.0 {
        return 0.0;
    }
    6.9 + 20.0 * (((v - 0.1) * (v - 0.1) + 1.0).sqrt() + v - 0.1).log10()
}

fn elevation(surface: &Surface, cell: CellIndex) -> Result<f64, PlanError> {
    surface
        .cell(cell)
        .ok_or(PlanError::UnknownCell(cell))?
        .elevation_m
        .ok_or(PlanError::MissingElevation(cell))
}

/// Sampling interval along a path (m): half a resolution-8 hexagon edge,
/// fine enough to visit every cell the segment crosses.
const PATH_SAMPLE_INTERVAL_M: f64 = 400.0;

/// The sequence of grid cells along the straight path between two cell
/// centers, inclusive of both endpoints.
pub fn path_cells(cell_a: CellIndex, cell_b: CellIndex) -> Vec<CellIndex> {
    if cell_a == cell_b {
        return vec![cell_a];
    }
    let resolution = cell_a.resolution();
    let from = LatLng::from(cell_a);
    let to = LatLng::from(cell_b);
    let steps = (from.distance_m(to) / PATH_SAMPLE_INTERVAL_M).ceil().max(1.0) as usize;

    let mut cells = vec![cell_a];
    for i in 1..steps {
        let t = i as f64 / steps as f64;
        let lat = from.lat() + (to.lat() - from.lat()) * t;
        let lng = from.lng() + (to.lng() - from.lng()) * t;
        let Ok(point) = LatLng::new(lat, lng) else {
            continue;
        };
        let cell = point.to_cell(resolution);
        if cells.last() != Some(&cell) && cell != cell_b {
            cells.push(cell);
        }
    }
    cells.push(cell_b);
    cells
}

/// Compute the full link profile between two cells.
///
/// The pair is normalized to a canonical order (smaller index first, mast
/// heights swapped with their cells) so the result is direction-independent.
/// The straight grid path between the two centers is walked; at each
/// intermediate sample the sight line between the mast tops is depressed by
/// the 4/3-Earth-radius curvature drop and 60 % of the first Fresnel zone,
/// then compared against terrain. The worst sample defines the link
/// clearance and the sub-distances used for the diffraction term.
///
/// # Errors
///
/// * `InvalidParameter` for non-positive mast heights or frequency
/// * `UnknownCell` / `MissingElevation` when a sampled cell has no data
pub fn compute_link_profile(
    surface: &Surface,
    cell_a: CellIndex,
    cell_b: CellIndex,
    mast_a_m: u32,
    mast_b_m: u32,
    frequency_hz: u64,
) -> Result<LinkProfile, PlanError> {
    if mast_a_m == 0 {
        return Err(PlanError::InvalidParameter(format!("mast height must be positive, got {}", mast_a_m)));
    }
    if mast_b_m == 0 {
        return Err(PlanError::InvalidParameter(format!("mast height must be positive, got {}", mast_b_m)));
    }
    if frequency_hz == 0 {
        return Err(PlanError::InvalidParameter("frequency must be positive".to_string()));
    }

    // Trivial clearance for identical cells: the sight line clears its own
    // terrain by at least the smaller mast.
    let trivial_clearance = mast_a_m.min(mast_b_m) as f64;
    let distance_m = crate::surface::cell_distance_m(cell_a, cell_b);
    if cell_a == cell_b || distance_m == 0.0 {
        return Ok(LinkProfile {
            distance_m: 0.0,
            clearance_m: trivial_clearance,
            worst_near_m: 0.0,
            worst_far_m: 0.0,
            path_loss_db: 0.0,
        });
    }

    // Canonical order: smaller index first, mast heights follow their cells.
    let (cell_a, cell_b, mast_a_m, mast_b_m) = if cell_b < cell_a {
        (cell_b, cell_a, mast_b_m, mast_a_m)
    } else {
        (cell_a, cell_b, mast_a_m, mast_b_m)
    };

    let sight_a = elevation(surface, cell_a)? + mast_a_m as f64;
    let sight_b = elevation(surface, cell_b)? + mast_b_m as f64;
    let origin = LatLng::from(cell_a);
    let wavelength_m = SPEED_OF_LIGHT_M_S / frequency_hz as f64;

    let mut clearance_m = trivial_clearance;
    let mut worst_near_m = distance_m / 2.0;
    let mut worst_far_m = distance_m / 2.0;

    for sample in path_cells(cell_a, cell_b) {
        if sample == cell_a || sample == cell_b {
            continue;
        }
        let near_m = origin.distance_m(LatLng::from(sample));
        if near_m <= 0.0 || near_m >= distance_m {
            continue;
        }
        let far_m = distance_m - near_m;
        let fraction = near_m / distance_m;
        let sight_line = sight_a + (sight_b - sight_a) * fraction;
        let curvature_drop = near_m * far_m / (2.0 * EFFECTIVE_EARTH_RADIUS_M);
        let fresnel_drop = FRESNEL_CLEARANCE_FRACTION * first_fresnel_radius_m(wavelength_m, near_m, far_m);
        let terrain = elevation(surface, sample)?;

        let sample_clearance = sight_line - curvature_drop - fresnel_drop - terrain;
        if sample_clearance < clearance_m {
            clearance_m = sample_clearance;
            worst_near_m = near_m;
            worst_far_m = far_m;
        }
    }

    let mut path_loss_db = free_space_loss_db(distance_m, frequency_hz);
    if clearance_m < 0.0 {
        let r1_m = first_fresnel_radius_m(wavelength_m, worst_near_m, worst_far_m);
        path_loss_db += knife_edge_loss_db(clearance_m, r1_m);
    }

    Ok(LinkProfile {
        distance_m,
        clearance_m,
        worst_near_m,
        worst_far_m,
        path_loss_db,
    })
}

//! Surface and seed-tower import.
//!
//! A producer supplies, per hexagonal cell: elevation, road access,
//! population, boundary and forbidden-zone flags, plus an optional spacing
//! override; seed towers reference cells by index. The loader validates the
//! contract and builds a consistent [`Surface`] with nearest-tower metrics
//! already in place.

use anyhow::Context;
use h3o::CellIndex;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::str::FromStr;

use super::cell::{CellData, DerivedMetrics, Provenance, Surface};
use crate::params::ModelParams;

/// Error type for surface loading failures.
#[derive(Debug)]
pub enum SurfaceLoadError {
    FileReadError(String),
    ParseError(String),
    ValidationError(String),
}

impl std::fmt::Display for SurfaceLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SurfaceLoadError::FileReadError(msg) => write!(f, "Failed to read file: {}", msg),
            SurfaceLoadError::ParseError(msg) => write!(f, "Failed to parse JSON: {}", msg),
            SurfaceLoadError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for SurfaceLoadError {}

/// One cell of the import contract.
#[derive(Debug, Clone, Deserialize)]
pub struct CellRecord {
    /// Hexadecimal H3 index string.
    pub h3: String,
    /// Terrain elevation (m); may be absent for cells no link will touch.
    #[serde(default)]
    pub elevation_m: Option<f64>,
    pub road_access: bool,
    pub population: f64,
    pub in_boundary: bool,
    #[serde(default)]
    pub forbidden: bool,
    /// Per-cell minimum tower spacing override (m).
    #[serde(default)]
    pub min_spacing_m: Option<f64>,
}

/// One seed tower of the import contract.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedRecord {
    /// Hexadecimal H3 index string; must reference an imported cell.
    pub h3: String,
    /// Either `seed` or `population-seed`; defaults to `seed`.
    #[serde(default)]
    pub provenance: Option<Provenance>,
}

/// Root structure of the import file.
#[derive(Debug, Deserialize)]
pub struct SurfaceFile {
    /// All cells of the planning region at one fixed resolution.
    pub cells: Vec<CellRecord>,
    /// Initial towers; duplicates by cell are ignored.
    #[serde(default)]
    pub seed_towers: Vec<SeedRecord>,
}

/// Load, validate, and materialize a planning surface from a JSON file.
///
/// # Parameters
///
/// * `path` - Path to the surface JSON file
/// * `params` - Model parameters supplying the default minimum spacing
///
/// # Returns
///
/// A validated [`Surface`] with seed towers placed and nearest-tower
/// metrics computed, or an error.
pub fn load_surface(path: &str, params: &ModelParams) -> Result<Surface, SurfaceLoadError> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path))
        .map_err(|e| SurfaceLoadError::FileReadError(e.to_string()))?;

    let file: SurfaceFile = serde_json::from_str(&data)
        .context("Invalid JSON format")
        .map_err(|e| SurfaceLoadError::ParseError(e.to_string()))?;

    build_surface(&file, params).map_err(SurfaceLoadError::ValidationError)
}

/// Validate the import contract and build the surface.
pub fn build_surface(file: &SurfaceFile, params: &ModelParams) -> Result<Surface, String> {
    if file.cells.is_empty() {
        return Err("Surface must contain at least one cell".to_string());
    }

    let mut cells: HashMap<CellIndex, CellData> = HashMap::with_capacity(file.cells.len());
    let mut resolution = None;
    for record in &file.cells {
        let index = CellIndex::from_str(&record.h3).map_err(|e| format!("Invalid H3 index '{}': {}", record.h3, e))?;

        match resolution {
            None => resolution = Some(index.resolution()),
            Some(expected) if index.resolution() != expected => {
                return Err(format!(
                    "Cell {} has resolution {} but the surface uses {}",
                    record.h3,
                    index.resolution(),
                    expected
                ));
            }
            Some(_) => {}
        }

        if record.population < 0.0 || !record.population.is_finite() {
            return Err(format!("Cell {} has invalid population {}", record.h3, record.population));
        }
        if let Some(spacing) = record.min_spacing_m {
            if spacing <= 0.0 || !spacing.is_finite() {
                return Err(format!("Cell {} has invalid min_spacing_m {}", record.h3, spacing));
            }
        }

        let previous = cells.insert(
            index,
            CellData {
                elevation_m: record.elevation_m,
                road_access: record.road_access,
                population: record.population,
                in_boundary: record.in_boundary,
                forbidden: record.forbidden,
                has_tower: false,
                min_spacing_m: record.min_spacing_m.unwrap_or(params.min_spacing_m),
                metrics: DerivedMetrics::default(),
            },
        );
        if previous.is_some() {
            return Err(format!("Duplicate cell index: {}", record.h3));
        }
    }

    let mut surface = Surface::from_cells(cells);

    let mut placed = 0usize;
    for seed in &file.seed_towers {
        let index = CellIndex::from_str(&seed.h3).map_err(|e| format!("Invalid seed H3 index '{}': {}", seed.h3, e))?;
        if surface.cell(index).is_none() {
            return Err(format!("Seed tower {} references a cell outside the surface", seed.h3));
        }
        let provenance = seed.provenance.unwrap_or(Provenance::Seed);
        if !matches!(provenance, Provenance::Seed | Provenance::PopulationSeed) {
            return Err(format!("Seed tower {} has non-seed provenance '{}'", seed.h3, provenance.label()));
        }
        // Duplicates by cell are ignored per the import contract.
        if surface.add_tower(index, provenance) {
            placed += 1;
        }
    }

    surface.rebuild_nearest_tower_metrics();
    log::info!("Imported surface: {} cells, {} seed towers", surface.len(), placed);

    Ok(surface)
}

//! Persistent store of computed link profiles.
//!
//! Entries are keyed by the normalized cell pair plus mast heights and
//! frequency, so a profile is computed once per physical link regardless of
//! direction. The store is append-mostly: recomputation under the same key
//! upserts (last writer wins, values are deterministic for the same inputs),
//! and entries are never invalidated by content change. Clearing the backing
//! file forces full recomputation and must never happen implicitly.

use anyhow::Context;
use chrono::{DateTime, Utc};
use h3o::CellIndex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use super::profile::{compute_link_profile, LinkProfile};
use crate::error::PlanError;
use crate::params::ModelParams;
use crate::surface::Surface;

/// Cache key: unordered cell pair (normalized, smaller index first) plus
/// mast heights (m) and frequency (Hz).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkKey {
    pub cell_a: CellIndex,
    pub cell_b: CellIndex,
    pub mast_a_m: u32,
    pub mast_b_m: u32,
    pub frequency_hz: u64,
}

impl LinkKey {
    /// Build the canonical key for a pair: the smaller cell index comes
    /// first and the mast heights travel with their cells.
    pub fn normalized(cell_a: CellIndex, cell_b: CellIndex, mast_a_m: u32, mast_b_m: u32, frequency_hz: u64) -> Self {
        if cell_b < cell_a {
            Self {
                cell_a: cell_b,
                cell_b: cell_a,
                mast_a_m: mast_b_m,
                mast_b_m: mast_a_m,
                frequency_hz,
            }
        } else {
            Self {
                cell_a,
                cell_b,
                mast_a_m,
                mast_b_m,
                frequency_hz,
            }
        }
    }
}

/// A stored profile with its computation timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedProfile {
    pub profile: LinkProfile,
    pub computed_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct StoredEntry {
    key: LinkKey,
    profile: LinkProfile,
    computed_at: DateTime<Utc>,
}

/// In-memory view of the persistent link-profile store.
#[derive(Debug, Default)]
pub struct ClearanceStore {
    entries: HashMap<LinkKey, CachedProfile>,
}

impl ClearanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a store from a JSON file. A missing file yields an empty store.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let data = fs::read_to_string(path).with_context(|| format!("Failed to read link store {}", path.display()))?;
        let stored: Vec<StoredEntry> = serde_json::from_str(&data).with_context(|| format!("Invalid link store {}", path.display()))?;
        let mut entries = HashMap::with_capacity(stored.len());
        for entry in stored {
            entries.insert(
                entry.key,
                CachedProfile {
                    profile: entry.profile,
                    computed_at: entry.computed_at,
                },
            );
        }
        log::info!("Loaded {} link profiles from {}", entries.len(), path.display());
        Ok(Self { entries })
    }

    /// Persist the store to a JSON file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let stored: Vec<StoredEntry> = self
            .entries
            .iter()
            .map(|(key, cached)| StoredEntry {
                key: *key,
                profile: cached.profile,
                computed_at: cached.computed_at,
            })
            .collect();
        let data = serde_json::to_string(&stored).context("Failed to serialize link store")?;
        fs::write(path, data).with_context(|| format!("Failed to write link store {}", path.display()))?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &LinkKey) -> Option<&CachedProfile> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &LinkKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Upsert a profile under its key, stamping the current time.
    pub fn upsert(&mut self, key: LinkKey, profile: LinkProfile) {
        self.entries.insert(
            key,
            CachedProfile {
                profile,
                computed_at: Utc::now(),
            },
        );
    }

    /// Fetch the link profile for a pair with explicit mast heights and
    /// frequency, computing and caching it on a miss. Identical cells return
    /// the trivial profile without touching the cache.
    pub fn profile_with(
        &mut self,
        surface: &Surface,
        cell_a: CellIndex,
        cell_b: CellIndex,
        mast_a_m: u32,
        mast_b_m: u32,
        frequency_hz: u64,
    ) -> Result<LinkProfile, PlanError> {
        let key = LinkKey::normalized(cell_a, cell_b, mast_a_m, mast_b_m, frequency_hz);
        if cell_a != cell_b {
            if let Some(cached) = self.entries.get(&key) {
                return Ok(cached.profile);
            }
        }
        let profile = compute_link_profile(surface, cell_a, cell_b, mast_a_m, mast_b_m, frequency_hz)?;
        if profile.distance_m > 0.0 {
            self.upsert(key, profile);
        }
        Ok(profile)
    }

    /// Fetch the link profile for a pair under the model's default mast
    /// height and frequency.
    pub fn profile(&mut self, surface: &Surface, cell_a: CellIndex, cell_b: CellIndex, params: &ModelParams) -> Result<LinkProfile, PlanError> {
        self.profile_with(surface, cell_a, cell_b, params.mast_height_m, params.mast_height_m, params.frequency_hz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ModelParams;
    use crate::surface::CellData;
    use h3o::{LatLng, Resolution};
    use std::collections::HashMap;

    fn cell_at(lat: f64, lng: f64) -> CellIndex {
        LatLng::new(lat, lng).unwrap().to_cell(Resolution::Eight)
    }

    fn flat_surface(a: CellIndex, b: CellIndex) -> Surface {
        let params = ModelParams::default();
        let mut cells = HashMap::new();
        for cell in crate::clearance::path_cells(a, b) {
            cells.insert(cell, CellData::with_elevation(0.0, &params));
        }
        Surface::from_cells(cells)
    }

    #[test]
    fn normalization_is_direction_independent() {
        let a = cell_at(41.70, 44.80);
        let b = cell_at(41.72, 44.95);
        let forward = LinkKey::normalized(a, b, 28, 40, 868_000_000);
        let reverse = LinkKey::normalized(b, a, 40, 28, 868_000_000);
        assert_eq!(forward, reverse);
    }

    #[test]
    fn repeated_queries_hit_one_entry_with_identical_values() {
        let params = ModelParams::default();
        let a = cell_at(41.70, 44.80);
        let b = cell_at(41.72, 44.95);
        let surface = flat_surface(a, b);
        let mut store = ClearanceStore::new();

        let first = store.profile(&surface, a, b, &params).unwrap();
        assert_eq!(store.len(), 1);
        let second = store.profile(&surface, b, a, &params).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(first, second);
    }

    #[test]
    fn identical_cells_are_never_cached() {
        let params = ModelParams::default();
        let a = cell_at(41.70, 44.80);
        let surface = flat_surface(a, a);
        let mut store = ClearanceStore::new();
        let profile = store.profile(&surface, a, a, &params).unwrap();
        assert_eq!(profile.distance_m, 0.0);
        assert!(store.is_empty());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let params = ModelParams::default();
        let a = cell_at(41.70, 44.80);
        let b = cell_at(41.72, 44.95);
        let surface = flat_surface(a, b);
        let mut store = ClearanceStore::new();
        let profile = store.profile(&surface, a, b, &params).unwrap();

        let path = std::env::temp_dir().join("mesh-relay-planner-store-roundtrip.json");
        store.save(&path).unwrap();
        let reloaded = ClearanceStore::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(reloaded.len(), 1);
        let key = LinkKey::normalized(a, b, params.mast_height_m, params.mast_height_m, params.frequency_hz);
        assert_eq!(reloaded.get(&key).unwrap().profile, profile);
    }

    #[test]
    fn missing_file_loads_as_empty_store() {
        let path = std::env::temp_dir().join("mesh-relay-planner-store-missing.json");
        std::fs::remove_file(&path).ok();
        let store = ClearanceStore::load(&path).unwrap();
        assert!(store.is_empty());
    }
}

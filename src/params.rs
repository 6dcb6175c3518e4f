//! Model parameters for the placement pipeline.
//!
//! All stages share one [`ModelParams`] instance. The defaults match the
//! deployed network profile; individual runs may override them from a TOML
//! file or per call where an operation accepts explicit mast heights and
//! frequency.

use serde::Deserialize;
use std::path::Path;

/// Speed of light in vacuum (m/s), used to derive the link wavelength.
pub const SPEED_OF_LIGHT_M_S: f64 = 299_792_458.0;

/// Effective Earth radius accounting for standard atmospheric refraction (4/3 model), meters.
pub const EFFECTIVE_EARTH_RADIUS_M: f64 = 6_371_000.0 * 4.0 / 3.0;

/// Fraction of the first Fresnel zone that must stay clear of terrain.
pub const FRESNEL_CLEARANCE_FRACTION: f64 = 0.6;

/// Shared model parameters for clearance, visibility, and placement stages.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ModelParams {
    /// Mast height above terrain at both link ends (m).
    pub mast_height_m: u32,
    /// Carrier frequency (Hz).
    pub frequency_hz: u64,
    /// Hard visibility cutoff: pairs farther apart are never visible (m).
    pub max_link_distance_m: f64,
    /// Default minimum spacing between towers (m); cells may override upward or downward.
    pub min_spacing_m: f64,
    /// Maximum tolerated intra-cluster LOS hop count before slimming kicks in.
    pub hop_limit: u32,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            mast_height_m: 28,
            frequency_hz: 868_000_000,
            max_link_distance_m: 70_000.0,
            min_spacing_m: 5_000.0,
            hop_limit: 7,
        }
    }
}

impl ModelParams {
    /// Load parameters from a TOML file. Absent keys fall back to defaults.
    ///
    /// # Arguments
    /// * `config_path` - Path to the planner.toml file
    ///
    /// # Returns
    /// * `Ok(ModelParams)` if the file was successfully loaded and parsed
    /// * `Err(String)` with a descriptive error message otherwise
    pub fn load(config_path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(config_path).map_err(|e| format!("Failed to read config file: {}", e))?;

        toml::from_str(&content).map_err(|e| format!("Failed to parse config file: {}", e))
    }

    /// Carrier wavelength (m) derived from the configured frequency.
    pub fn wavelength_m(&self) -> f64 {
        SPEED_OF_LIGHT_M_S / self.frequency_hz as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployed_profile() {
        let params = ModelParams::default();
        assert_eq!(params.mast_height_m, 28);
        assert_eq!(params.frequency_hz, 868_000_000);
        assert_eq!(params.max_link_distance_m, 70_000.0);
        assert_eq!(params.min_spacing_m, 5_000.0);
        assert_eq!(params.hop_limit, 7);
    }

    #[test]
    fn wavelength_for_868mhz_is_about_35cm() {
        let params = ModelParams::default();
        assert!((params.wavelength_m() - 0.3453).abs() < 0.001);
    }

    #[test]
    fn toml_overrides_apply_over_defaults() {
        let params: ModelParams = toml::from_str("mast-height-m = 15\nhop-limit = 5\n").unwrap();
        assert_eq!(params.mast_height_m, 15);
        assert_eq!(params.hop_limit, 5);
        // Untouched keys keep their defaults
        assert_eq!(params.frequency_hz, 868_000_000);
    }
}

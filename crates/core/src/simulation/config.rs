//! Run configuration
//!
//! Everything that is not field, geometry or source input: dispersion time,
//! particle budget, seed, mass sinks, switches and the safety caps that bound
//! every trajectory. Stored as JSON.

use crate::accumulation::TransientLayout;
use crate::error::ConfigError;
use crate::grid::FlowGrid;
use crate::physics::tunnel_jet::JET_DT_MIN;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Limits that guarantee termination of pathological trajectories
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyCaps {
    /// Lower bound of the per-particle step cap
    pub min_steps: u64,
    /// Additional steps allowed per cell of domain extent (nx + ny + nz)
    pub steps_per_cell: u64,
    /// Lower bound of the per-particle reflection cap
    pub min_reflections: u64,
    /// Reflections allowed per cell of horizontal extent (nx + ny)
    pub reflections_per_cell: u64,
    /// Reflection sub-iterations within one step
    pub reflections_per_step: u32,
    /// Wind speeds above this are clamped and reported (m/s)
    pub max_wind_speed: f64,
}

impl Default for SafetyCaps {
    fn default() -> Self {
        Self {
            min_steps: 10_000,
            steps_per_cell: 10,
            min_reflections: 500,
            reflections_per_cell: 10,
            reflections_per_step: 8,
            max_wind_speed: 55.0,
        }
    }
}

impl SafetyCaps {
    /// Step cap of one particle
    ///
    /// Enough for the whole dispersion time at the smallest time step, plus a
    /// margin growing with the domain extent.
    pub fn step_cap(&self, dispersion_time: f64, grid: &FlowGrid) -> u64 {
        let by_time = (dispersion_time / JET_DT_MIN).ceil().max(0.0) as u64;
        let extent = (grid.nx + grid.ny + grid.nz()) as u64;
        self.min_steps.max(by_time + self.steps_per_cell * extent)
    }

    /// Reflection cap of one particle
    pub fn reflection_cap(&self, grid: &FlowGrid) -> u64 {
        self.min_reflections
            .max(self.reflections_per_cell * (grid.nx + grid.ny) as u64)
    }
}

/// Settings of the transient (non-steady-state) mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransientSettings {
    pub layout: TransientLayout,
    /// Particles each populated cell is split into on re-injection
    #[serde(default = "default_sub_particles")]
    pub sub_particles: usize,
    /// Cells holding less mass are dropped instead of re-injected
    #[serde(default)]
    pub min_cell_mass: f64,
}

fn default_sub_particles() -> usize {
    4
}

/// Configuration of a dispersion run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispersionConfig {
    /// Averaging period and lifetime of emitted particles (s)
    pub dispersion_time: f64,
    /// Particles released per period over all sources
    pub particle_count: usize,
    /// Run seed; combined with the particle index for every trajectory
    pub seed: u64,
    /// Ambient air temperature (K)
    pub ambient_temperature: f64,
    /// Exponential decay rate per source group (1/s); missing groups do not decay
    pub decay_rates: Vec<f64>,
    /// Washout coefficient Λ (1/s)
    pub washout_coefficient: f64,
    /// Reflect particles at the top of the boundary layer
    pub reflect_at_boundary_layer_top: bool,
    /// Evaluate odour bands
    pub odour: bool,
    pub transient: Option<TransientSettings>,
    pub caps: SafetyCaps,
    /// Private accumulators the particle set is split into
    pub partial_grids: usize,
}

impl Default for DispersionConfig {
    fn default() -> Self {
        Self {
            dispersion_time: 600.0,
            particle_count: 10_000,
            seed: 1,
            ambient_temperature: 283.15,
            decay_rates: Vec::new(),
            washout_coefficient: 0.0,
            reflect_at_boundary_layer_top: true,
            odour: false,
            transient: None,
            caps: SafetyCaps::default(),
            partial_grids: 32,
        }
    }
}

impl DispersionConfig {
    /// Load configuration from a JSON file
    ///
    /// # Errors
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Parse`] if it is not valid configuration JSON, and the
    /// errors of [`DispersionConfig::validate`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let config: Self =
            serde_json::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration as pretty JSON
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] if serialization fails and
    /// [`ConfigError::Io`] if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        fs::write(path, contents).map_err(|e| ConfigError::Io(e.to_string()))
    }

    /// Check parameter ranges
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] naming the first offending parameter.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.dispersion_time > 0.0 && self.dispersion_time.is_finite()) {
            return Err(ConfigError::invalid(
                "dispersion_time",
                format!("must be positive, got {}", self.dispersion_time),
            ));
        }
        if self.particle_count == 0 {
            return Err(ConfigError::invalid("particle_count", "must be at least 1"));
        }
        if self.ambient_temperature <= 0.0 {
            return Err(ConfigError::invalid(
                "ambient_temperature",
                format!("must be positive Kelvin, got {}", self.ambient_temperature),
            ));
        }
        if self.decay_rates.iter().any(|r| !r.is_finite() || *r < 0.0) {
            return Err(ConfigError::invalid("decay_rates", "must be finite and non-negative"));
        }
        if !(self.washout_coefficient >= 0.0 && self.washout_coefficient.is_finite()) {
            return Err(ConfigError::invalid(
                "washout_coefficient",
                "must be finite and non-negative",
            ));
        }
        if self.partial_grids == 0 {
            return Err(ConfigError::invalid("partial_grids", "must be at least 1"));
        }
        if self.caps.reflections_per_step == 0 {
            return Err(ConfigError::invalid("caps.reflections_per_step", "must be at least 1"));
        }
        if let Some(t) = &self.transient {
            t.layout.validate()?;
            if t.sub_particles == 0 {
                return Err(ConfigError::invalid("transient.sub_particles", "must be at least 1"));
            }
        }
        Ok(())
    }

    /// Decay rate of a source group (1/s)
    pub fn decay_rate(&self, group: usize) -> f64 {
        self.decay_rates.get(group).copied().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(DispersionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: DispersionConfig =
            serde_json::from_str(r#"{"dispersion_time": 3600.0, "decay_rates": [0.0, 1e-4]}"#).unwrap();
        assert_eq!(config.dispersion_time, 3600.0);
        assert_eq!(config.particle_count, 10_000);
        assert_eq!(config.decay_rate(1), 1e-4);
        assert_eq!(config.decay_rate(7), 0.0);
        assert!(config.reflect_at_boundary_layer_top);
    }

    #[test]
    fn test_validation_names_field() {
        let config = DispersionConfig {
            dispersion_time: -1.0,
            ..DispersionConfig::default()
        };
        match config.validate() {
            Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, "dispersion_time"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_caps_scale_with_domain() {
        let caps = SafetyCaps::default();
        let small = FlowGrid::uniform(0.0, 0.0, 10.0, 10.0, 10, 10, 0.0, 2.0, 10);
        let large = FlowGrid::uniform(0.0, 0.0, 10.0, 10.0, 400, 400, 0.0, 2.0, 10);
        assert_eq!(caps.reflection_cap(&small), 500);
        assert_eq!(caps.reflection_cap(&large), 8000);
        assert!(caps.step_cap(600.0, &small) >= 12_000);
        assert!(caps.step_cap(600.0, &large) > caps.step_cap(600.0, &small));
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("gral-config-{}.json", std::process::id()));
        let config = DispersionConfig {
            seed: 99,
            odour: true,
            ..DispersionConfig::default()
        };
        config.save(&path).unwrap();
        let loaded = DispersionConfig::load(&path).unwrap();
        let _ = fs::remove_file(&path);
        assert_eq!(loaded.seed, 99);
        assert!(loaded.odour);
        assert_eq!(loaded.particle_count, config.particle_count);
        assert_eq!(loaded.caps, config.caps);
        assert!((loaded.ambient_temperature - config.ambient_temperature).abs() < 1e-9);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            DispersionConfig::load("/nonexistent/gral.json"),
            Err(ConfigError::Io(_))
        ));
    }
}

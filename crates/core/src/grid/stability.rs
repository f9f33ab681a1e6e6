//! Boundary-layer stability scalars
//!
//! Friction velocity, Obukhov length, roughness length and boundary-layer height
//! drive every turbulence profile in [`crate::physics::turbulence`]. Depending on
//! the meteorological input they are available once for the whole domain, per
//! coarse meteorological cell, or per fine flow-grid cell; [`StabilityField`]
//! hides that difference behind a single lookup.
//!
//! # Sign convention
//!
//! - `obukhov_length < 0`: unstable (convective)
//! - `obukhov_length > 0`: stable; values beyond a few thousand meters are neutral

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Gravitational acceleration (m/s²)
pub const GRAVITY: f64 = 9.81;

/// von Kármán constant
pub const KARMAN: f64 = 0.4;

/// Floor for the friction velocity (m/s)
const MIN_FRICTION_VELOCITY: f64 = 0.01;
/// Floor for |L| (m); smaller magnitudes are numerically meaningless
const MIN_OBUKHOV_MAGNITUDE: f64 = 1.0;
/// Floor for the roughness length (m)
const MIN_ROUGHNESS: f64 = 0.0001;
/// Floor for the boundary-layer height (m)
const MIN_BOUNDARY_LAYER_HEIGHT: f64 = 10.0;

/// Stability scalars at one location
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StabilityParams {
    /// Friction velocity u* (m/s)
    pub friction_velocity: f64,
    /// Obukhov length L (m)
    pub obukhov_length: f64,
    /// Aerodynamic roughness length z0 (m)
    pub roughness_length: f64,
    /// Boundary-layer (mixing) height above ground (m)
    pub boundary_layer_height: f64,
}

impl Default for StabilityParams {
    fn default() -> Self {
        Self::neutral(0.3, 0.2, 800.0)
    }
}

impl StabilityParams {
    pub fn new(
        friction_velocity: f64,
        obukhov_length: f64,
        roughness_length: f64,
        boundary_layer_height: f64,
    ) -> Self {
        Self {
            friction_velocity,
            obukhov_length,
            roughness_length,
            boundary_layer_height,
        }
    }

    /// Neutral stratification (very large positive Obukhov length)
    pub fn neutral(friction_velocity: f64, roughness_length: f64, boundary_layer_height: f64) -> Self {
        Self::new(friction_velocity, 10_000.0, roughness_length, boundary_layer_height)
    }

    /// Copy with every scalar clamped into its physically meaningful range
    ///
    /// Zero friction velocity or zero Obukhov length would make the profiles
    /// divide by zero; the flow-field solver may still deliver them in calm
    /// conditions.
    #[must_use]
    pub fn sanitized(&self) -> Self {
        let l = if self.obukhov_length.abs() < MIN_OBUKHOV_MAGNITUDE {
            if self.obukhov_length < 0.0 {
                -MIN_OBUKHOV_MAGNITUDE
            } else {
                MIN_OBUKHOV_MAGNITUDE
            }
        } else {
            self.obukhov_length
        };
        Self {
            friction_velocity: self.friction_velocity.max(MIN_FRICTION_VELOCITY),
            obukhov_length: l,
            roughness_length: self.roughness_length.max(MIN_ROUGHNESS),
            boundary_layer_height: self.boundary_layer_height.max(MIN_BOUNDARY_LAYER_HEIGHT),
        }
    }

    /// Unstable (convective) stratification
    #[inline]
    pub fn is_convective(&self) -> bool {
        self.obukhov_length < 0.0
    }

    /// Stable stratification that measurably suppresses mixing
    #[inline]
    pub fn is_stable(&self) -> bool {
        self.obukhov_length > 0.0 && self.obukhov_length < 2000.0
    }

    /// Convective velocity scale w* (m/s), zero unless convective
    ///
    /// ```text
    /// w* = (h × u*³ / (κ × |L|))^(1/3)
    /// ```
    pub fn convective_velocity(&self) -> f64 {
        if !self.is_convective() {
            return 0.0;
        }
        let p = self.sanitized();
        (p.boundary_layer_height * p.friction_velocity.powi(3) / (KARMAN * p.obukhov_length.abs()))
            .cbrt()
    }

    /// Potential temperature gradient dθ/dz (K/m) implied by the stability
    ///
    /// Zero for neutral and unstable conditions; Pasquill class E (≈0.02 K/m) to
    /// class F (≈0.035 K/m) as L shrinks.
    pub fn potential_temperature_gradient(&self) -> f64 {
        if !self.is_stable() {
            return 0.0;
        }
        let p = self.sanitized();
        (1.0 / p.obukhov_length).min(0.035)
    }

    /// Squared Brunt-Väisälä frequency N² (1/s²)
    pub fn brunt_vaisala_squared(&self, ambient_temperature: f64) -> f64 {
        GRAVITY / ambient_temperature.max(200.0) * self.potential_temperature_gradient()
    }
}

/// Stability scalars over the domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StabilityField {
    /// One set of scalars for the whole domain
    Global(StabilityParams),
    /// Scalars on a regular raster (coarse meteorological cells or fine flow cells)
    Gridded {
        origin_x: f64,
        origin_y: f64,
        cell_size: f64,
        nx: usize,
        ny: usize,
        /// Row-major values `[iy * nx + ix]`
        values: Vec<StabilityParams>,
    },
}

impl StabilityField {
    /// Gridded field
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] if the raster is empty, the cell size is
    /// not positive, or `values` does not hold `nx * ny` entries.
    pub fn gridded(
        origin_x: f64,
        origin_y: f64,
        cell_size: f64,
        nx: usize,
        ny: usize,
        values: Vec<StabilityParams>,
    ) -> Result<Self, ConfigError> {
        if nx == 0 || ny == 0 || cell_size <= 0.0 {
            return Err(ConfigError::invalid(
                "stability",
                "raster needs cells and a positive cell size",
            ));
        }
        if values.len() != nx * ny {
            return Err(ConfigError::invalid(
                "stability",
                format!("expected {} values, got {}", nx * ny, values.len()),
            ));
        }
        Ok(StabilityField::Gridded {
            origin_x,
            origin_y,
            cell_size,
            nx,
            ny,
            values,
        })
    }

    /// Scalars at a horizontal position (edge cells are extended outward)
    pub fn at(&self, x: f64, y: f64) -> StabilityParams {
        match self {
            StabilityField::Global(params) => *params,
            StabilityField::Gridded {
                origin_x,
                origin_y,
                cell_size,
                nx,
                ny,
                values,
            } => {
                let ix = (((x - origin_x) / cell_size).max(0.0) as usize).min(nx - 1);
                let iy = (((y - origin_y) / cell_size).max(0.0) as usize).min(ny - 1);
                values[iy * nx + ix]
            }
        }
    }
}

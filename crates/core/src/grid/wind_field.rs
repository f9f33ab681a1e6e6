//! Precomputed 3D wind field
//!
//! The flow-field solver (outside this crate) delivers cell-centred mean wind
//! vectors on the [`FlowGrid`]. Particles read them through [`WindProvider`]:
//!
//! - mean wind at a position: the column's values interpolated linearly between
//!   level centres, with a logarithmic profile below the first free level centre
//! - horizontal turbulence standard deviations
//! - stability scalars (global, coarse or fine raster)
//!
//! # Near-ground profile
//!
//! Below the centre of the lowest free level the wind follows the surface layer
//! log law, scaled to match the level value at its centre:
//!
//! ```text
//! U(z) = U(h₁) × ln(z / z₀) / ln(h₁ / z₀)
//! ```

use crate::core_types::Vec3;
use crate::error::ConfigError;
use crate::grid::{Cell, FlowGrid, GeometryProvider, StabilityField, StabilityParams};
use crate::physics::turbulence;
use crate::sources::SourceKind;
use serde::{Deserialize, Serialize};

/// Reference height of measured wind speeds (m)
pub const REFERENCE_HEIGHT: f64 = 10.0;

/// Interpolated wind at a particle position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindSample {
    /// Mean wind vector (m/s)
    pub velocity: Vec3,
    /// Vertical level index containing the position
    pub level: usize,
}

/// Read access to the mean wind and the turbulence scalars
pub trait WindProvider: Send + Sync {
    /// Mean wind at `position` inside column `cell` whose terrain height is
    /// `terrain_height`
    fn interpolate_wind(&self, cell: Cell, terrain_height: f64, position: &Vec3) -> WindSample;

    /// Stability scalars at a horizontal position
    fn stability_at(&self, x: f64, y: f64) -> StabilityParams;

    /// Horizontal velocity standard deviations `(σu, σv)` in m/s
    ///
    /// # Arguments
    ///
    /// * `kind` - Emitting source type; road and portal sources keep a higher
    ///   turbulence floor
    /// * `stability` - Stability scalars (the roughness length is taken from here)
    /// * `height_above_surface` - Particle height above terrain (m)
    /// * `wind_speed` - Horizontal mean wind speed (m/s)
    /// * `extra_variance` - Additional variance (m²/s²), e.g. traffic-induced
    fn standard_deviations(
        &self,
        kind: SourceKind,
        stability: &StabilityParams,
        height_above_surface: f64,
        wind_speed: f64,
        extra_variance: f64,
    ) -> (f64, f64) {
        turbulence::horizontal_sigmas(
            stability,
            height_above_surface,
            wind_speed,
            extra_variance,
            turbulence::horizontal_sigma_floor(kind),
        )
    }
}

/// Cell-centred wind vectors on a flow grid
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GriddedWindField {
    grid: FlowGrid,
    /// Stored as flattened 3D array: index = k * (ny * nx) + iy * nx + ix
    wind: Vec<Vec3>,
    stability: StabilityField,
}

impl GriddedWindField {
    /// The same wind vector in every cell
    pub fn uniform(grid: &FlowGrid, wind: Vec3, stability: StabilityField) -> Self {
        Self {
            grid: grid.clone(),
            wind: vec![wind; grid.cell_count()],
            stability,
        }
    }

    /// Wind field from solver output
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] if `wind` does not hold one vector per cell
    /// or contains non-finite components.
    pub fn from_components(
        grid: &FlowGrid,
        wind: Vec<Vec3>,
        stability: StabilityField,
    ) -> Result<Self, ConfigError> {
        grid.validate()?;
        if wind.len() != grid.cell_count() {
            return Err(ConfigError::invalid(
                "wind",
                format!("expected {} vectors, got {}", grid.cell_count(), wind.len()),
            ));
        }
        if wind.iter().any(|v| !v.iter().all(|c| c.is_finite())) {
            return Err(ConfigError::invalid("wind", "contains non-finite components"));
        }
        Ok(Self {
            grid: grid.clone(),
            wind,
            stability,
        })
    }

    /// Logarithmic wind profile over the given geometry
    ///
    /// `speed_ref` is the speed at [`REFERENCE_HEIGHT`] above terrain, and
    /// `direction_deg` the meteorological direction the wind blows *from*
    /// (270° = westerly, blowing towards +x). Cells inside buildings or terrain
    /// get zero wind.
    pub fn log_profile(
        grid: &FlowGrid,
        geometry: &dyn GeometryProvider,
        speed_ref: f64,
        direction_deg: f64,
        stability: StabilityField,
    ) -> Self {
        let direction = direction_deg.to_radians();
        let (sin_d, cos_d) = direction.sin_cos();
        let mut wind = vec![Vec3::zeros(); grid.cell_count()];

        for iy in 0..grid.ny {
            for ix in 0..grid.nx {
                let cell = Cell::new(ix, iy);
                let (cx, cy) = grid.cell_center(cell);
                let z0 = stability.at(cx, cy).sanitized().roughness_length;
                let surface = geometry.surface_height(cell);
                let solid_top = geometry.building_height(cell);
                let reference = (REFERENCE_HEIGHT / z0).ln();

                for k in 0..grid.nz() {
                    let center = grid.level_center(k);
                    if center <= solid_top {
                        continue;
                    }
                    let z_rel = (center - surface).max(z0 * 1.5);
                    let speed = speed_ref * (z_rel / z0).ln() / reference;
                    wind[grid.index_3d(ix, iy, k)] = Vec3::new(-speed * sin_d, -speed * cos_d, 0.0);
                }
            }
        }

        Self {
            grid: grid.clone(),
            wind,
            stability,
        }
    }

    /// Grid the field is defined on
    pub fn grid(&self) -> &FlowGrid {
        &self.grid
    }

    /// Wind vector of one cell
    #[inline]
    pub fn at(&self, ix: usize, iy: usize, k: usize) -> Vec3 {
        self.wind[self.grid.index_3d(ix, iy, k)]
    }

    /// Overwrite the wind vector of one cell
    pub fn set(&mut self, ix: usize, iy: usize, k: usize, wind: Vec3) {
        let idx = self.grid.index_3d(ix, iy, k);
        self.wind[idx] = wind;
    }

    /// Replace the stability field (e.g. for a new meteorological period)
    pub fn set_stability(&mut self, stability: StabilityField) {
        self.stability = stability;
    }
}

impl WindProvider for GriddedWindField {
    fn interpolate_wind(&self, cell: Cell, terrain_height: f64, position: &Vec3) -> WindSample {
        let g = &self.grid;
        let cell = Cell::new(cell.ix.min(g.nx - 1), cell.iy.min(g.ny - 1));
        let level = g.level_of_clamped(position.z);
        let first_free = g.level_of_clamped(terrain_height);
        let first_center = g.level_center(first_free);

        // Vertical interpolation between level centres, never reaching into the ground
        let velocity = if position.z <= first_center {
            self.at(cell.ix, cell.iy, first_free)
        } else {
            let mut k0 = level.max(first_free);
            if position.z < g.level_center(k0) {
                k0 = k0.saturating_sub(1).max(first_free);
            }
            let k1 = (k0 + 1).min(g.nz() - 1);
            if k1 == k0 {
                self.at(cell.ix, cell.iy, k0)
            } else {
                let c0 = g.level_center(k0);
                let c1 = g.level_center(k1);
                let t = ((position.z - c0) / (c1 - c0)).clamp(0.0, 1.0);
                self.at(cell.ix, cell.iy, k0) * (1.0 - t) + self.at(cell.ix, cell.iy, k1) * t
            }
        };

        // Surface-layer log law below the first free level centre
        let z_rel = position.z - terrain_height;
        let h1 = first_center - terrain_height;
        let velocity = if z_rel < h1 && h1 > 0.0 {
            let z0 = self.stability_at(position.x, position.y).sanitized().roughness_length;
            let numerator = (z_rel.max(z0 * 1.01) / z0).ln();
            let denominator = (h1.max(z0 * 1.01) / z0).ln();
            let factor = (numerator / denominator).clamp(0.0, 1.0);
            Vec3::new(velocity.x * factor, velocity.y * factor, velocity.z * factor)
        } else {
            velocity
        };

        WindSample { velocity, level }
    }

    fn stability_at(&self, x: f64, y: f64) -> StabilityParams {
        self.stability.at(x, y)
    }
}

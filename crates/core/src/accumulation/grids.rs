//! Output grid layouts
//!
//! Concentrations are sampled on a horizontal raster in one or more slices at
//! fixed heights above the terrain. A particle contributes to a slice while its
//! height lies inside the slice band `[h - Δ/2, h + Δ/2)`; bands never overlap,
//! so each evaluation touches at most one slice.
//!
//! The optional transient grid is three-dimensional with vertical faces measured
//! above the terrain. It stores the mass still present in the domain at the end
//! of a period for re-injection in the next one.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Horizontal concentration raster with its height slices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcentrationRaster {
    pub origin_x: f64,
    pub origin_y: f64,
    pub dx: f64,
    pub dy: f64,
    pub nx: usize,
    pub ny: usize,
    /// Slice centre heights above terrain (m)
    pub slice_heights: Vec<f64>,
    /// Vertical thickness of every slice band (m)
    pub slice_thickness: f64,
}

impl ConcentrationRaster {
    /// Check raster dimensions and that slice bands do not overlap
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] for empty rasters, non-positive spacing or
    /// thickness, or slices closer together than their thickness.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nx == 0 || self.ny == 0 || !(self.dx > 0.0 && self.dy > 0.0) {
            return Err(ConfigError::invalid(
                "concentration_raster",
                "needs cells with positive spacing",
            ));
        }
        if self.slice_heights.is_empty() || self.slice_thickness <= 0.0 {
            return Err(ConfigError::invalid(
                "concentration_raster",
                "needs at least one slice with positive thickness",
            ));
        }
        let mut sorted = self.slice_heights.clone();
        sorted.sort_by(f64::total_cmp);
        if sorted.windows(2).any(|w| w[1] - w[0] < self.slice_thickness) {
            return Err(ConfigError::invalid(
                "concentration_raster",
                format!("slices overlap (thickness {} m)", self.slice_thickness),
            ));
        }
        Ok(())
    }

    /// Number of cells per slice
    pub fn cells(&self) -> usize {
        self.nx * self.ny
    }

    pub fn slice_count(&self) -> usize {
        self.slice_heights.len()
    }

    /// Raster cell `(ix, iy)` containing a horizontal position
    #[inline]
    pub fn cell_of(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let fx = (x - self.origin_x) / self.dx;
        let fy = (y - self.origin_y) / self.dy;
        if fx < 0.0 || fy < 0.0 || fx >= self.nx as f64 || fy >= self.ny as f64 {
            return None;
        }
        Some((fx as usize, fy as usize))
    }

    /// Slice whose band contains `height_above_surface`
    #[inline]
    pub fn slice_of(&self, height_above_surface: f64) -> Option<usize> {
        let half = 0.5 * self.slice_thickness;
        self.slice_heights
            .iter()
            .position(|&h| height_above_surface >= h - half && height_above_surface < h + half)
    }

    /// Slice whose band, shifted by `offset`, contains the height
    ///
    /// Odour mode evaluates bands one thickness above and below each slice.
    #[inline]
    pub fn shifted_slice_of(&self, height_above_surface: f64, offset: f64) -> Option<usize> {
        self.slice_of(height_above_surface - offset)
    }

    /// Horizontal centre of a raster cell
    pub fn cell_center(&self, ix: usize, iy: usize) -> (f64, f64) {
        (
            self.origin_x + (ix as f64 + 0.5) * self.dx,
            self.origin_y + (iy as f64 + 0.5) * self.dy,
        )
    }

    /// Volume of one slice cell (m³)
    pub fn cell_volume(&self) -> f64 {
        self.dx * self.dy * self.slice_thickness
    }

    /// Horizontal area of one cell (m²)
    pub fn cell_area(&self) -> f64 {
        self.dx * self.dy
    }
}

/// Three-dimensional grid of the transient mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransientLayout {
    pub origin_x: f64,
    pub origin_y: f64,
    pub dx: f64,
    pub dy: f64,
    pub nx: usize,
    pub ny: usize,
    /// Cell faces above terrain (m), ascending, starting at 0
    pub level_faces: Vec<f64>,
}

impl TransientLayout {
    /// # Errors
    /// Returns [`ConfigError::Invalid`] for empty grids, non-positive spacing or
    /// faces that are not strictly ascending from zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nx == 0 || self.ny == 0 || !(self.dx > 0.0 && self.dy > 0.0) {
            return Err(ConfigError::invalid("transient_layout", "needs cells with positive spacing"));
        }
        if self.level_faces.len() < 2
            || self.level_faces[0] != 0.0
            || self.level_faces.windows(2).any(|w| w[1] <= w[0])
        {
            return Err(ConfigError::invalid(
                "transient_layout",
                "vertical faces must ascend strictly from 0",
            ));
        }
        Ok(())
    }

    pub fn nz(&self) -> usize {
        self.level_faces.len() - 1
    }

    /// Total number of 3D cells
    pub fn cell_count(&self) -> usize {
        self.nx * self.ny * self.nz()
    }

    /// Flattened index (`k * ny * nx + iy * nx + ix`) of the cell containing a position
    #[inline]
    pub fn index_of(&self, x: f64, y: f64, height_above_surface: f64) -> Option<usize> {
        let fx = (x - self.origin_x) / self.dx;
        let fy = (y - self.origin_y) / self.dy;
        if fx < 0.0 || fy < 0.0 || fx >= self.nx as f64 || fy >= self.ny as f64 {
            return None;
        }
        if height_above_surface < 0.0 || height_above_surface >= self.level_faces[self.nz()] {
            return None;
        }
        let k = self.level_faces.partition_point(|&f| f <= height_above_surface) - 1;
        Some(k * self.ny * self.nx + fy as usize * self.nx + fx as usize)
    }

    /// `(ix, iy, k)` of a flattened index
    pub fn unflatten(&self, index: usize) -> (usize, usize, usize) {
        let layer = self.ny * self.nx;
        (index % self.nx, (index % layer) / self.nx, index / layer)
    }

    /// Volume of a cell in level `k` (m³)
    pub fn cell_volume(&self, k: usize) -> f64 {
        self.dx * self.dy * (self.level_faces[k + 1] - self.level_faces[k])
    }

    /// Horizontal extent of a cell and its vertical band above terrain
    pub fn cell_bounds(&self, index: usize) -> CellBounds {
        let (ix, iy, k) = self.unflatten(index);
        CellBounds {
            x: self.origin_x + ix as f64 * self.dx,
            y: self.origin_y + iy as f64 * self.dy,
            dx: self.dx,
            dy: self.dy,
            bottom: self.level_faces[k],
            top: self.level_faces[k + 1],
        }
    }
}

/// Box of one transient cell: lower-left corner, size and band above terrain
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellBounds {
    pub x: f64,
    pub y: f64,
    pub dx: f64,
    pub dy: f64,
    pub bottom: f64,
    pub top: f64,
}

/// Everything needed to size an [`crate::Accumulator`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridLayout {
    pub raster: ConcentrationRaster,
    /// Number of source groups
    pub groups: usize,
    /// Number of receptors
    #[serde(default)]
    pub receptors: usize,
    #[serde(default)]
    pub transient: Option<TransientLayout>,
    /// Evaluate the shifted odour bands
    #[serde(default)]
    pub odour: bool,
}

impl GridLayout {
    /// # Errors
    /// Returns the first validation error of the raster or transient layout, or
    /// [`ConfigError::Invalid`] when there are no source groups.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.raster.validate()?;
        if self.groups == 0 {
            return Err(ConfigError::invalid("groups", "needs at least one source group"));
        }
        if let Some(t) = &self.transient {
            t.validate()?;
        }
        Ok(())
    }
}

//! Terrain, buildings and surface masks
//!
//! Geometry is column based: every flow-grid column has a terrain height and a
//! solid top (terrain plus any building, cut up to the next vertical cell face so
//! that buildings occupy whole cells). Particles below the solid top of their
//! column are inside an obstacle and must be reflected.
//!
//! Besides heights the provider carries three per-column masks:
//!
//! - vegetation cover fraction (0-1), which enhances dry deposition
//! - tunnel entrances, which portal jets may pass through
//! - opposite-lane cells, which force a tunnel jet to extinguish

use crate::error::ConfigError;
use crate::grid::{Cell, FlowGrid};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Read access to terrain and building geometry
pub trait GeometryProvider: Send + Sync {
    /// Terrain height of a column (m)
    fn surface_height(&self, cell: Cell) -> f64;

    /// Absolute height of the solid top of a column: terrain plus building cut (m)
    fn building_height(&self, cell: Cell) -> f64;

    /// Index of the lowest vertical level above the solid top
    fn lowest_free_index(&self, cell: Cell) -> usize;

    /// Vegetation cover fraction (0-1)
    fn vegetation(&self, cell: Cell) -> f64;

    /// Column is a tunnel entrance that jets may pass through
    fn is_tunnel_entrance(&self, cell: Cell) -> bool;

    /// Column lies on the opposite carriageway of a tunnel portal
    fn is_opposite_lane(&self, cell: Cell) -> bool;

    /// Height below which a particle counts as inside solid geometry
    ///
    /// A particle still carried by a tunnel jet passes through tunnel-entrance
    /// columns down to the terrain.
    fn solid_top(&self, cell: Cell, jet_passage: bool) -> f64 {
        if jet_passage && self.is_tunnel_entrance(cell) {
            self.surface_height(cell)
        } else {
            self.building_height(cell)
        }
    }
}

/// In-memory column geometry on a flow grid
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topography {
    nx: usize,
    ny: usize,
    /// Row-major `[iy * nx + ix]`
    surface: Vec<f64>,
    solid_top: Vec<f64>,
    lowest_free: Vec<usize>,
    vegetation: Vec<f64>,
    tunnel_entrance: Vec<bool>,
    opposite_lane: Vec<bool>,
}

impl Topography {
    /// Flat terrain at `elevation`
    pub fn flat(grid: &FlowGrid, elevation: f64) -> Self {
        Self::from_surface(grid, vec![elevation; grid.nx * grid.ny])
    }

    /// Gaussian hill in the middle of the domain
    pub fn single_hill(grid: &FlowGrid, base_elevation: f64, hill_height: f64, hill_radius: f64) -> Self {
        let center_x = grid.origin_x + 0.5 * grid.width();
        let center_y = grid.origin_y + 0.5 * grid.depth();
        let mut surface = Vec::with_capacity(grid.nx * grid.ny);
        for iy in 0..grid.ny {
            for ix in 0..grid.nx {
                let (x, y) = grid.cell_center(Cell::new(ix, iy));
                let dist_sq = (x - center_x).powi(2) + (y - center_y).powi(2);
                surface.push(base_elevation + hill_height * (-dist_sq / (hill_radius * hill_radius)).exp());
            }
        }
        Self::from_surface(grid, surface)
    }

    /// Terrain from a row-major height raster on the grid's columns
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] if the raster size does not match the grid
    /// or a height lies outside the vertical extent of the grid.
    pub fn from_heightmap(grid: &FlowGrid, heights: Vec<f64>) -> Result<Self, ConfigError> {
        grid.validate()?;
        if heights.len() != grid.nx * grid.ny {
            return Err(ConfigError::invalid(
                "heightmap",
                format!("expected {} heights, got {}", grid.nx * grid.ny, heights.len()),
            ));
        }
        if let Some(h) = heights
            .iter()
            .find(|h| !h.is_finite() || **h < grid.base() || **h >= grid.model_top())
        {
            return Err(ConfigError::invalid(
                "heightmap",
                format!(
                    "height {h} outside grid column [{}, {})",
                    grid.base(),
                    grid.model_top()
                ),
            ));
        }
        Ok(Self::from_surface(grid, heights))
    }

    fn from_surface(grid: &FlowGrid, surface: Vec<f64>) -> Self {
        let n = grid.nx * grid.ny;
        let lowest_free = surface.iter().map(|&h| grid.level_of_clamped(h)).collect();
        Self {
            nx: grid.nx,
            ny: grid.ny,
            solid_top: surface.clone(),
            surface,
            lowest_free,
            vegetation: vec![0.0; n],
            tunnel_entrance: vec![false; n],
            opposite_lane: vec![false; n],
        }
    }

    /// Add a building block of `height` above terrain over the given columns
    ///
    /// The roof is raised to the next vertical cell face.
    #[must_use]
    pub fn with_building(mut self, grid: &FlowGrid, ix: Range<usize>, iy: Range<usize>, height: f64) -> Self {
        for cell in self.cells(ix, iy) {
            let idx = cell.iy * self.nx + cell.ix;
            let roof = self.surface[idx] + height;
            let k = grid.level_faces.partition_point(|&face| face < roof);
            let cut = grid.level_faces[k.min(grid.nz())];
            if cut > self.solid_top[idx] {
                self.solid_top[idx] = cut;
                self.lowest_free[idx] = k.min(grid.nz() - 1);
            }
        }
        self
    }

    /// Set the vegetation cover fraction over the given columns
    #[must_use]
    pub fn with_vegetation(mut self, ix: Range<usize>, iy: Range<usize>, cover: f64) -> Self {
        for cell in self.cells(ix, iy) {
            self.vegetation[cell.iy * self.nx + cell.ix] = cover.clamp(0.0, 1.0);
        }
        self
    }

    /// Mark a column as tunnel entrance
    #[must_use]
    pub fn with_tunnel_entrance(mut self, cell: Cell) -> Self {
        let idx = self.index(cell);
        self.tunnel_entrance[idx] = true;
        self
    }

    /// Mark a column as opposite lane
    #[must_use]
    pub fn with_opposite_lane(mut self, cell: Cell) -> Self {
        let idx = self.index(cell);
        self.opposite_lane[idx] = true;
        self
    }

    fn cells(&self, ix: Range<usize>, iy: Range<usize>) -> Vec<Cell> {
        let ix = ix.start.min(self.nx)..ix.end.min(self.nx);
        let iy = iy.start.min(self.ny)..iy.end.min(self.ny);
        iy.flat_map(|y| ix.clone().map(move |x| Cell::new(x, y)))
            .collect()
    }

    #[inline]
    fn index(&self, cell: Cell) -> usize {
        cell.iy.min(self.ny - 1) * self.nx + cell.ix.min(self.nx - 1)
    }
}

impl GeometryProvider for Topography {
    fn surface_height(&self, cell: Cell) -> f64 {
        self.surface[self.index(cell)]
    }

    fn building_height(&self, cell: Cell) -> f64 {
        self.solid_top[self.index(cell)]
    }

    fn lowest_free_index(&self, cell: Cell) -> usize {
        self.lowest_free[self.index(cell)]
    }

    fn vegetation(&self, cell: Cell) -> f64 {
        self.vegetation[self.index(cell)]
    }

    fn is_tunnel_entrance(&self, cell: Cell) -> bool {
        self.tunnel_entrance[self.index(cell)]
    }

    fn is_opposite_lane(&self, cell: Cell) -> bool {
        self.opposite_lane[self.index(cell)]
    }
}

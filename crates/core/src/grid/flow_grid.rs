//! Flow-grid geometry
//!
//! Horizontal cells are uniform; vertical cell faces are absolute heights and may
//! be stretched. All 3D arrays built on this grid use the same flattened layout
//! as the rest of the crate: `index = k * (ny * nx) + iy * nx + ix`.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Horizontal index of a flow-grid column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub ix: usize,
    pub iy: usize,
}

impl Cell {
    pub const fn new(ix: usize, iy: usize) -> Self {
        Self { ix, iy }
    }
}

/// Geometry of the flow field the particles move through
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowGrid {
    /// Western edge of the domain (m)
    pub origin_x: f64,
    /// Southern edge of the domain (m)
    pub origin_y: f64,
    /// Cell size in x (m)
    pub dx: f64,
    /// Cell size in y (m)
    pub dy: f64,
    /// Number of cells in x
    pub nx: usize,
    /// Number of cells in y
    pub ny: usize,
    /// Absolute heights of the horizontal cell faces, ascending, `nz + 1` entries
    pub level_faces: Vec<f64>,
}

impl FlowGrid {
    /// Grid with constant vertical spacing `dz` starting at `base_height`
    pub fn uniform(
        origin_x: f64,
        origin_y: f64,
        dx: f64,
        dy: f64,
        nx: usize,
        ny: usize,
        base_height: f64,
        dz: f64,
        nz: usize,
    ) -> Self {
        let level_faces = (0..=nz).map(|k| base_height + dz * k as f64).collect();
        Self {
            origin_x,
            origin_y,
            dx,
            dy,
            nx,
            ny,
            level_faces,
        }
    }

    /// Grid whose vertical cells grow geometrically by `stretch` from `first_dz`
    pub fn stretched(
        origin_x: f64,
        origin_y: f64,
        dx: f64,
        dy: f64,
        nx: usize,
        ny: usize,
        base_height: f64,
        first_dz: f64,
        stretch: f64,
        nz: usize,
    ) -> Self {
        let mut level_faces = Vec::with_capacity(nz + 1);
        let mut z = base_height;
        let mut dz = first_dz;
        level_faces.push(z);
        for _ in 0..nz {
            z += dz;
            dz *= stretch;
            level_faces.push(z);
        }
        Self {
            origin_x,
            origin_y,
            dx,
            dy,
            nx,
            ny,
            level_faces,
        }
    }

    /// Check that the grid is usable
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] for empty grids, non-positive spacing or
    /// vertical faces that are not strictly ascending.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nx == 0 || self.ny == 0 {
            return Err(ConfigError::invalid("flow_grid", "needs at least one cell"));
        }
        if !(self.dx > 0.0 && self.dy > 0.0) {
            return Err(ConfigError::invalid(
                "flow_grid",
                format!("cell size must be positive, got {}x{}", self.dx, self.dy),
            ));
        }
        if self.level_faces.len() < 2 {
            return Err(ConfigError::invalid("flow_grid", "needs at least one vertical level"));
        }
        if self.level_faces.windows(2).any(|w| w[1] <= w[0]) {
            return Err(ConfigError::invalid(
                "flow_grid",
                "vertical faces must be strictly ascending",
            ));
        }
        Ok(())
    }

    /// Number of vertical levels
    #[inline]
    pub fn nz(&self) -> usize {
        self.level_faces.len() - 1
    }

    /// Total number of 3D cells
    pub fn cell_count(&self) -> usize {
        self.nx * self.ny * self.nz()
    }

    /// Domain extent in x (m)
    pub fn width(&self) -> f64 {
        self.dx * self.nx as f64
    }

    /// Domain extent in y (m)
    pub fn depth(&self) -> f64 {
        self.dy * self.ny as f64
    }

    /// Lowest face of the grid (m)
    pub fn base(&self) -> f64 {
        self.level_faces[0]
    }

    /// Upper model boundary (m)
    pub fn model_top(&self) -> f64 {
        self.level_faces[self.level_faces.len() - 1]
    }

    /// Column containing `(x, y)`, or `None` outside the domain
    #[inline]
    pub fn cell_of(&self, x: f64, y: f64) -> Option<Cell> {
        let fx = (x - self.origin_x) / self.dx;
        let fy = (y - self.origin_y) / self.dy;
        if fx < 0.0 || fy < 0.0 || fx >= self.nx as f64 || fy >= self.ny as f64 {
            return None;
        }
        Some(Cell::new(fx as usize, fy as usize))
    }

    /// Column containing `(x, y)`, clamped to the nearest edge column
    #[inline]
    pub fn cell_of_clamped(&self, x: f64, y: f64) -> Cell {
        let fx = ((x - self.origin_x) / self.dx).max(0.0);
        let fy = ((y - self.origin_y) / self.dy).max(0.0);
        Cell::new(
            (fx as usize).min(self.nx - 1),
            (fy as usize).min(self.ny - 1),
        )
    }

    /// Whether a horizontal position lies inside the domain
    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.cell_of(x, y).is_some()
    }

    /// Vertical level containing absolute height `z`, or `None` outside the column
    #[inline]
    pub fn level_of(&self, z: f64) -> Option<usize> {
        if z < self.base() || z >= self.model_top() {
            return None;
        }
        let k = self.level_faces.partition_point(|&face| face <= z);
        Some(k - 1)
    }

    /// Vertical level containing `z`, clamped to the bottom or top level
    #[inline]
    pub fn level_of_clamped(&self, z: f64) -> usize {
        let k = self.level_faces.partition_point(|&face| face <= z);
        k.saturating_sub(1).min(self.nz() - 1)
    }

    /// Thickness of level `k` (m)
    #[inline]
    pub fn level_thickness(&self, k: usize) -> f64 {
        let k = k.min(self.nz() - 1);
        self.level_faces[k + 1] - self.level_faces[k]
    }

    /// Height of the centre of level `k` (m)
    #[inline]
    pub fn level_center(&self, k: usize) -> f64 {
        let k = k.min(self.nz() - 1);
        0.5 * (self.level_faces[k] + self.level_faces[k + 1])
    }

    /// x coordinate of the western face of column `ix`
    #[inline]
    pub fn face_x(&self, ix: usize) -> f64 {
        self.origin_x + self.dx * ix as f64
    }

    /// y coordinate of the southern face of row `iy`
    #[inline]
    pub fn face_y(&self, iy: usize) -> f64 {
        self.origin_y + self.dy * iy as f64
    }

    /// Horizontal centre of a column
    pub fn cell_center(&self, cell: Cell) -> (f64, f64) {
        (
            self.face_x(cell.ix) + 0.5 * self.dx,
            self.face_y(cell.iy) + 0.5 * self.dy,
        )
    }

    /// Flattened 2D index of a column
    #[inline]
    pub fn index_2d(&self, cell: Cell) -> usize {
        cell.iy * self.nx + cell.ix
    }

    /// Flattened 3D index
    #[inline]
    pub fn index_3d(&self, ix: usize, iy: usize, k: usize) -> usize {
        k * (self.ny * self.nx) + iy * self.nx + ix
    }
}

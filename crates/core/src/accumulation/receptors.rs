//! Receptor points
//!
//! Receptors report concentrations at individual locations. Each receptor is
//! sampled through a window:
//!
//! - receptors next to buildings share the concentration raster cell and slice
//!   they lie in, since a free window would reach into the building
//! - free-standing receptors use a box of ± half a raster cell horizontally and
//!   ± half a slice thickness vertically around the receptor

use crate::accumulation::ConcentrationRaster;
use crate::error::ConfigError;
use crate::grid::{Cell, FieldSnapshot};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Receptor location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receptor {
    #[serde(default)]
    pub name: String,
    pub x: f64,
    pub y: f64,
    /// Height above terrain (m)
    pub height: f64,
}

/// Sampling window of one receptor
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReceptorWindow {
    /// Shares raster cell `(ix, iy)` of `slice`
    Raster { ix: usize, iy: usize, slice: usize },
    /// Box around the receptor; heights above terrain
    Free {
        x_min: f64,
        x_max: f64,
        y_min: f64,
        y_max: f64,
        z_min: f64,
        z_max: f64,
    },
}

/// Receptors with precomputed windows
#[derive(Debug, Clone, Default)]
pub struct ReceptorSet {
    receptors: Vec<Receptor>,
    windows: Vec<ReceptorWindow>,
    /// Raster-window receptors keyed by `(ix, iy, slice)`
    raster_lookup: FxHashMap<(usize, usize, usize), Vec<usize>>,
    free: Vec<usize>,
    volume: f64,
}

impl ReceptorSet {
    /// Empty set
    pub fn none() -> Self {
        Self::default()
    }

    /// Assign sampling windows
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] for receptors outside the flow grid or
    /// with a negative height.
    pub fn build(
        receptors: Vec<Receptor>,
        raster: &ConcentrationRaster,
        field: &FieldSnapshot<'_>,
    ) -> Result<Self, ConfigError> {
        let mut windows = Vec::with_capacity(receptors.len());
        let mut raster_lookup: FxHashMap<(usize, usize, usize), Vec<usize>> = FxHashMap::default();
        let mut free = Vec::new();

        for (index, r) in receptors.iter().enumerate() {
            let Some(cell) = field.grid.cell_of(r.x, r.y) else {
                return Err(ConfigError::invalid(
                    "receptors",
                    format!("receptor {index} ({}) lies outside the flow grid", r.name),
                ));
            };
            if r.height < 0.0 {
                return Err(ConfigError::invalid(
                    "receptors",
                    format!("receptor {index} ({}) has negative height", r.name),
                ));
            }

            let shared = if near_building(field, cell) {
                raster
                    .cell_of(r.x, r.y)
                    .zip(raster.slice_of(r.height))
                    .map(|((ix, iy), slice)| ReceptorWindow::Raster { ix, iy, slice })
            } else {
                None
            };
            let window = shared.unwrap_or_else(|| {
                let (hx, hy, hz) = (0.5 * raster.dx, 0.5 * raster.dy, 0.5 * raster.slice_thickness);
                ReceptorWindow::Free {
                    x_min: r.x - hx,
                    x_max: r.x + hx,
                    y_min: r.y - hy,
                    y_max: r.y + hy,
                    z_min: r.height - hz,
                    z_max: r.height + hz,
                }
            });

            match window {
                ReceptorWindow::Raster { ix, iy, slice } => {
                    raster_lookup.entry((ix, iy, slice)).or_default().push(index);
                }
                ReceptorWindow::Free { .. } => free.push(index),
            }
            windows.push(window);
        }

        Ok(Self {
            receptors,
            windows,
            raster_lookup,
            free,
            volume: raster.cell_volume(),
        })
    }

    pub fn len(&self) -> usize {
        self.receptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receptors.is_empty()
    }

    pub fn receptors(&self) -> &[Receptor] {
        &self.receptors
    }

    pub fn window(&self, index: usize) -> Option<&ReceptorWindow> {
        self.windows.get(index)
    }

    /// Sampling volume of every receptor window (m³)
    pub fn window_volume(&self) -> f64 {
        self.volume
    }

    /// Call `hit` for every receptor whose window contains the particle
    ///
    /// `raster_hit` is the particle's raster cell and slice, if any.
    pub fn for_each_containing(
        &self,
        raster_hit: Option<(usize, usize, usize)>,
        x: f64,
        y: f64,
        height_above_surface: f64,
        mut hit: impl FnMut(usize),
    ) {
        if let Some(key) = raster_hit {
            if let Some(indices) = self.raster_lookup.get(&key) {
                indices.iter().for_each(|&i| hit(i));
            }
        }
        for &i in &self.free {
            if let ReceptorWindow::Free {
                x_min,
                x_max,
                y_min,
                y_max,
                z_min,
                z_max,
            } = self.windows[i]
            {
                if x >= x_min
                    && x < x_max
                    && y >= y_min
                    && y < y_max
                    && height_above_surface >= z_min
                    && height_above_surface < z_max
                {
                    hit(i);
                }
            }
        }
    }
}

/// A building occupies the column or one of its eight neighbours
fn near_building(field: &FieldSnapshot<'_>, cell: Cell) -> bool {
    let g = field.grid;
    let x_range = cell.ix.saturating_sub(1)..=(cell.ix + 1).min(g.nx - 1);
    x_range.into_iter().any(|ix| {
        let y_range = cell.iy.saturating_sub(1)..=(cell.iy + 1).min(g.ny - 1);
        y_range.into_iter().any(|iy| {
            let c = Cell::new(ix, iy);
            field.geometry.building_height(c) > field.geometry.surface_height(c)
        })
    })
}

/// Contributions of one trajectory to each receptor
///
/// Summed into the accumulator when the trajectory ends, so that the largest
/// single-particle contribution per receptor can be tracked.
#[derive(Debug, Clone, Default)]
pub struct ReceptorTally {
    values: Vec<f64>,
    touched: Vec<usize>,
}

impl ReceptorTally {
    pub fn new(receptors: usize) -> Self {
        Self {
            values: vec![0.0; receptors],
            touched: Vec::new(),
        }
    }

    #[inline]
    pub fn add(&mut self, receptor: usize, value: f64) {
        if self.values[receptor] == 0.0 {
            self.touched.push(receptor);
        }
        self.values[receptor] += value;
    }

    /// Receptors hit by the trajectory with their summed contribution
    pub fn contributions(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.touched.iter().map(|&r| (r, self.values[r]))
    }

    /// Clear for the next trajectory
    pub fn reset(&mut self) {
        for &r in &self.touched {
            self.values[r] = 0.0;
        }
        self.touched.clear();
    }
}

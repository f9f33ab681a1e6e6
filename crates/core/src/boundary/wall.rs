//! Drift away from nearby walls
//!
//! Near a taller neighbouring column the random walk sees a velocity variance
//! that drops to zero at the wall. Without a correction particles collect in
//! the half cell next to it. A bias on the turbulent velocity, pointing away
//! from the wall and growing linearly from the middle of the cell to the face,
//! offsets that:
//!
//! ```text
//! proximity = 1 - d / (Δ/2)          d: distance to the wall face
//! Δu_h     = 0.5  σh proximity       away from the wall
//! Δw       = 0.25 σw proximity       upward
//! ```
//!
//! The bias enters the Langevin memory, so it decays with the turbulent
//! velocity instead of vanishing after one step. It never exceeds half a
//! standard deviation per wall.

use crate::core_types::Vec3;
use crate::grid::{Cell, FieldSnapshot};

const HORIZONTAL_BIAS: f64 = 0.5;
const VERTICAL_BIAS: f64 = 0.25;

/// Turbulent velocity bias away from adjacent walls (m/s)
///
/// # Arguments
/// * `field` - Flow field snapshot
/// * `position` - Current absolute position
/// * `cell` - Column containing `position`
/// * `sigma_h` - Horizontal velocity standard deviation (m/s)
/// * `sigma_w` - Vertical velocity standard deviation (m/s)
pub fn wall_velocity_bias(
    field: &FieldSnapshot<'_>,
    position: &Vec3,
    cell: Cell,
    sigma_h: f64,
    sigma_w: f64,
) -> Vec3 {
    let grid = field.grid;
    let (x0, y0) = (grid.face_x(cell.ix), grid.face_y(cell.iy));

    // (neighbour, distance to the shared face, unit direction away from it, half width)
    let mut neighbours: [Option<(Cell, f64, Vec3, f64)>; 4] = [None; 4];
    if cell.ix > 0 {
        neighbours[0] = Some((
            Cell::new(cell.ix - 1, cell.iy),
            position.x - x0,
            Vec3::new(1.0, 0.0, 0.0),
            0.5 * grid.dx,
        ));
    }
    if cell.ix + 1 < grid.nx {
        neighbours[1] = Some((
            Cell::new(cell.ix + 1, cell.iy),
            x0 + grid.dx - position.x,
            Vec3::new(-1.0, 0.0, 0.0),
            0.5 * grid.dx,
        ));
    }
    if cell.iy > 0 {
        neighbours[2] = Some((
            Cell::new(cell.ix, cell.iy - 1),
            position.y - y0,
            Vec3::new(0.0, 1.0, 0.0),
            0.5 * grid.dy,
        ));
    }
    if cell.iy + 1 < grid.ny {
        neighbours[3] = Some((
            Cell::new(cell.ix, cell.iy + 1),
            y0 + grid.dy - position.y,
            Vec3::new(0.0, -1.0, 0.0),
            0.5 * grid.dy,
        ));
    }

    let mut bias = Vec3::zeros();
    let mut vertical_proximity: f64 = 0.0;
    for (neighbour, distance, away, half_width) in neighbours.into_iter().flatten() {
        if field.geometry.building_height(neighbour) <= position.z {
            continue;
        }
        let proximity = (1.0 - distance / half_width).clamp(0.0, 1.0);
        bias += away * (HORIZONTAL_BIAS * sigma_h * proximity);
        vertical_proximity = vertical_proximity.max(proximity);
    }
    bias.z = VERTICAL_BIAS * sigma_w * vertical_proximity;
    bias
}

//! Release positions of new particles
//!
//! Positions are drawn uniformly over the source geometry. Heights in the source
//! definitions are relative to the terrain below the drawn horizontal position.

use crate::core_types::rng::uniform;
use crate::core_types::Vec3;
use crate::grid::FieldSnapshot;
use crate::sources::Source;
use rand::RngCore;

/// Draw the release position of one particle (absolute coordinates)
pub fn sample_start<R: RngCore + ?Sized>(source: &Source, field: &FieldSnapshot<'_>, rng: &mut R) -> Vec3 {
    match source {
        Source::Point(s) => Vec3::new(s.x, s.y, field.surface_height_at(s.x, s.y) + s.height),
        Source::Portal(s) => {
            let t = uniform(rng);
            let x = s.x1 + t * (s.x2 - s.x1);
            let y = s.y1 + t * (s.y2 - s.y1);
            let z = s.base_height + uniform(rng) * s.height;
            Vec3::new(x, y, field.surface_height_at(x, y) + z)
        }
        Source::Line(s) => {
            let t = uniform(rng);
            let lateral = (uniform(rng) - 0.5) * s.width;
            let (dx, dy) = (s.x2 - s.x1, s.y2 - s.y1);
            let length = dx.hypot(dy).max(f64::EPSILON);
            // Unit normal to the road axis
            let (nx, ny) = (-dy / length, dx / length);
            let x = s.x1 + t * dx + lateral * nx;
            let y = s.y1 + t * dy + lateral * ny;
            let z = s.z1 + t * (s.z2 - s.z1) + uniform(rng) * s.vertical_extension;
            Vec3::new(x, y, field.surface_height_at(x, y) + z)
        }
        Source::Area(s) => {
            let x = s.x + (uniform(rng) - 0.5) * s.extent_x;
            let y = s.y + (uniform(rng) - 0.5) * s.extent_y;
            let z = s.z + uniform(rng) * s.extent_z;
            Vec3::new(x, y, field.surface_height_at(x, y) + z)
        }
    }
}

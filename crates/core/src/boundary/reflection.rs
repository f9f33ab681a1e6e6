//! Reflection at solid surfaces and the boundary-layer top
//!
//! A proposed position is checked against the column it lands in. Three kinds
//! of crossing are resolved:
//!
//! ```text
//! from above (same column or roof/ground approach):  z' = max(2 z_top - z, z_top + δ)
//! lateral (into a taller column):                    x' = 2 x_face - x   (per crossed face)
//! boundary-layer top (optional):                     z' = 2 h_mix - z
//! ```
//!
//! Lateral mirroring always lands back in the previous column, so one call
//! moves a particle across at most one cell face per axis.

use crate::core_types::rng::{clamped_gaussian, gaussian, STANDARD_CLAMP};
use crate::core_types::Vec3;
use crate::grid::{Cell, FieldSnapshot};
use crate::physics::{deposition_probability, vegetation_scaled_velocity};
use crate::simulation::RemovalReason;
use crate::sources::DepositionParams;
use rand::RngCore;

/// Distance kept between a reflected particle and the surface (m)
pub const SURFACE_OFFSET: f64 = 0.01;

/// Kind of surface a particle was reflected at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    /// Terrain
    Ground,
    /// Building top
    Roof,
    /// Side of a taller column (building wall or terrain step)
    Wall,
    /// Top of the mixed layer
    BoundaryLayerTop,
}

impl Surface {
    /// Contact with this surface can deposit mass
    pub fn is_solid(self) -> bool {
        !matches!(self, Surface::BoundaryLayerTop)
    }
}

/// One boundary check
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryQuery {
    /// Last accepted position
    pub previous: Vec3,
    /// Position proposed by the motion step
    pub proposed: Vec3,
    /// Particle is carried by a tunnel jet and may pass tunnel entrances
    pub jet_passage: bool,
    /// Absolute reflection height of the mixed layer, if reflection applies
    pub mixing_height: Option<f64>,
}

/// A resolved reflection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReflectionEvent {
    /// Corrected position, outside solid geometry
    pub position: Vec3,
    pub cell: Cell,
    pub surface: Surface,
    /// Unit normal pointing away from the surface
    pub normal: Vec3,
}

/// Result of a boundary check
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoundaryCheck {
    /// Proposed position is free
    Clear { position: Vec3, cell: Cell },
    Reflected(ReflectionEvent),
    /// Particle left the model domain
    Exited(RemovalReason),
}

/// Check a proposed position and resolve any boundary crossing
pub fn resolve(field: &FieldSnapshot<'_>, query: &BoundaryQuery) -> BoundaryCheck {
    let grid = field.grid;
    let geometry = field.geometry;
    let p = query.proposed;

    let Some(cell) = grid.cell_of(p.x, p.y) else {
        return BoundaryCheck::Exited(RemovalReason::LeftDomain);
    };
    if p.z >= grid.model_top() {
        return BoundaryCheck::Exited(RemovalReason::AboveModelTop);
    }

    let top = geometry.solid_top(cell, query.jet_passage);
    if p.z >= top {
        if let Some(h_mix) = query.mixing_height {
            if p.z > h_mix && query.previous.z <= h_mix {
                let z = (2.0 * h_mix - p.z).max(top + SURFACE_OFFSET);
                return BoundaryCheck::Reflected(ReflectionEvent {
                    position: Vec3::new(p.x, p.y, z),
                    cell,
                    surface: Surface::BoundaryLayerTop,
                    normal: Vec3::new(0.0, 0.0, -1.0),
                });
            }
        }
        return BoundaryCheck::Clear { position: p, cell };
    }

    let previous_cell = grid.cell_of_clamped(query.previous.x, query.previous.y);
    let from_above = previous_cell == cell || query.previous.z >= top;
    if from_above {
        let z = (2.0 * top - p.z)
            .max(top + SURFACE_OFFSET)
            .min(grid.model_top() - SURFACE_OFFSET);
        let surface = if top > geometry.surface_height(cell) {
            Surface::Roof
        } else {
            Surface::Ground
        };
        return BoundaryCheck::Reflected(ReflectionEvent {
            position: Vec3::new(p.x, p.y, z),
            cell,
            surface,
            normal: Vec3::new(0.0, 0.0, 1.0),
        });
    }

    // Lateral entry into a taller column: mirror back across the crossed faces
    let mut position = p;
    let mut normal = Vec3::zeros();
    if cell.ix != previous_cell.ix {
        let (face, sign) = if cell.ix > previous_cell.ix {
            (grid.face_x(previous_cell.ix + 1), -1.0)
        } else {
            (grid.face_x(previous_cell.ix), 1.0)
        };
        position.x = mirror_into(p.x, face, sign, grid.dx);
        normal.x = sign;
    }
    if cell.iy != previous_cell.iy {
        let (face, sign) = if cell.iy > previous_cell.iy {
            (grid.face_y(previous_cell.iy + 1), -1.0)
        } else {
            (grid.face_y(previous_cell.iy), 1.0)
        };
        position.y = mirror_into(p.y, face, sign, grid.dy);
        normal.y = sign;
    }

    let previous_top = geometry.solid_top(previous_cell, query.jet_passage);
    if position.z < previous_top + SURFACE_OFFSET {
        position.z = previous_top + SURFACE_OFFSET;
    }
    let normal = if normal.norm() > 0.0 {
        normal.normalize()
    } else {
        Vec3::new(0.0, 0.0, 1.0)
    };

    BoundaryCheck::Reflected(ReflectionEvent {
        position,
        cell: previous_cell,
        surface: Surface::Wall,
        normal,
    })
}

/// Mirror a coordinate across `face` into the cell on the `sign` side
///
/// The result stays within one cell width of the face and at least
/// [`SURFACE_OFFSET`] away from it.
#[inline]
fn mirror_into(value: f64, face: f64, sign: f64, spacing: f64) -> f64 {
    let depth = ((value - face) * -sign).clamp(0.0, spacing - SURFACE_OFFSET);
    face + sign * depth.max(SURFACE_OFFSET)
}

/// Position no boundary check can reject: the previous column, above its solid top
pub fn safe_position(field: &FieldSnapshot<'_>, previous: &Vec3, jet_passage: bool) -> Vec3 {
    let cell = field.grid.cell_of_clamped(previous.x, previous.y);
    let top = field.geometry.solid_top(cell, jet_passage);
    let z = previous
        .z
        .max(top + SURFACE_OFFSET)
        .min(field.grid.model_top() - SURFACE_OFFSET);
    Vec3::new(previous.x, previous.y, z)
}

/// Redraw the turbulent velocity after a reflection
///
/// The component along the surface normal always points away from the
/// surface; the others are drawn afresh. Draws are clamped to ±2σ.
pub fn redraw_velocity<R: RngCore + ?Sized>(normal: &Vec3, sigma: &Vec3, rng: &mut R) -> Vec3 {
    let mut velocity = Vec3::new(
        sigma.x * clamped_gaussian(rng, STANDARD_CLAMP),
        sigma.y * clamped_gaussian(rng, STANDARD_CLAMP),
        sigma.z * clamped_gaussian(rng, STANDARD_CLAMP),
    );
    let along = velocity.dot(normal);
    if along < 0.0 {
        velocity -= normal * (2.0 * along);
    }
    // Guarantee a non-zero departure speed along the normal
    let scale = normal.abs().dot(sigma);
    if velocity.dot(normal) < 1e-3 * scale {
        velocity += normal * (scale * gaussian(rng).abs().min(STANDARD_CLAMP));
    }
    velocity
}

/// Mass deposited at one surface contact
///
/// # Arguments
/// * `mass` - Particle mass before the contact
/// * `params` - Deposition parameters of the particle
/// * `vegetation` - Vegetation cover of the contact column (0-1)
/// * `sigma_w` - Local vertical velocity standard deviation (m/s)
pub fn contact_deposit(mass: f64, params: &DepositionParams, vegetation: f64, sigma_w: f64) -> f64 {
    if !params.mode.deposits() || mass <= 0.0 {
        return 0.0;
    }
    let vd = vegetation_scaled_velocity(params.deposition_velocity, params.mode, vegetation);
    let probability = deposition_probability(params.settling_velocity, vd, sigma_w);
    (mass * probability).min(mass)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::ParticleRng;
    use crate::grid::{FlowGrid, GriddedWindField, StabilityField, StabilityParams, Topography};
    use crate::sources::DepositionMode;
    use crate::grid::terrain::GeometryProvider;

    struct Scene {
        grid: FlowGrid,
        topo: Topography,
        wind: GriddedWindField,
    }

    impl Scene {
        fn new() -> Self {
            let grid = FlowGrid::uniform(0.0, 0.0, 10.0, 10.0, 10, 10, 0.0, 2.0, 50);
            // Building of 10 m over columns 4..6 x 4..6
            let topo = Topography::flat(&grid, 0.0).with_building(&grid, 4..6, 4..6, 10.0);
            let wind = GriddedWindField::uniform(
                &grid,
                Vec3::zeros(),
                StabilityField::Global(StabilityParams::default()),
            );
            Self { grid, topo, wind }
        }

        fn field(&self) -> FieldSnapshot<'_> {
            FieldSnapshot::new(&self.grid, &self.wind, &self.topo)
        }
    }

    fn query(previous: Vec3, proposed: Vec3) -> BoundaryQuery {
        BoundaryQuery {
            previous,
            proposed,
            jet_passage: false,
            mixing_height: None,
        }
    }

    #[test]
    fn test_free_position_is_clear() {
        let scene = Scene::new();
        let check = resolve(&scene.field(), &query(Vec3::new(5.0, 5.0, 3.0), Vec3::new(6.0, 5.0, 4.0)));
        assert!(matches!(check, BoundaryCheck::Clear { .. }));
    }

    #[test]
    fn test_ground_reflection_mirrors() {
        let scene = Scene::new();
        let check = resolve(&scene.field(), &query(Vec3::new(5.0, 5.0, 1.0), Vec3::new(5.0, 5.0, -0.5)));
        match check {
            BoundaryCheck::Reflected(event) => {
                assert_eq!(event.surface, Surface::Ground);
                assert!((event.position.z - 0.5).abs() < 1e-12);
                assert_eq!(event.normal, Vec3::new(0.0, 0.0, 1.0));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_below_roof_moves_above_with_offset() {
        let scene = Scene::new();
        let top = scene.topo.building_height(Cell::new(4, 4));
        let start = Vec3::new(45.0, 45.0, top - 0.01);
        match resolve(&scene.field(), &query(start, start)) {
            BoundaryCheck::Reflected(event) => {
                assert_eq!(event.surface, Surface::Roof);
                assert!(event.position.z >= top + SURFACE_OFFSET - 1e-12);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_wall_reflection_returns_to_previous_column() {
        let scene = Scene::new();
        let previous = Vec3::new(38.0, 45.0, 3.0);
        let proposed = Vec3::new(42.0, 45.0, 3.0);
        match resolve(&scene.field(), &query(previous, proposed)) {
            BoundaryCheck::Reflected(event) => {
                assert_eq!(event.surface, Surface::Wall);
                assert_eq!(event.cell, Cell::new(3, 4));
                assert!((event.position.x - 38.0).abs() < 1e-12);
                assert_eq!(event.normal, Vec3::new(-1.0, 0.0, 0.0));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_reflection_crosses_at_most_one_face() {
        let scene = Scene::new();
        let field = scene.field();
        // Proposed positions deep inside the building, from every side
        let cases = [
            (Vec3::new(35.0, 45.0, 2.0), Vec3::new(58.0, 45.0, 2.0)),
            (Vec3::new(65.0, 45.0, 2.0), Vec3::new(41.0, 45.0, 2.0)),
            (Vec3::new(45.0, 35.0, 2.0), Vec3::new(45.0, 59.0, 2.0)),
            (Vec3::new(35.0, 35.0, 2.0), Vec3::new(52.0, 52.0, 2.0)),
        ];
        for (previous, proposed) in cases {
            let before = field.grid.cell_of(previous.x, previous.y).unwrap();
            match resolve(&field, &query(previous, proposed)) {
                BoundaryCheck::Reflected(event) => {
                    let after = field.grid.cell_of(event.position.x, event.position.y).unwrap();
                    assert!(before.ix.abs_diff(after.ix) <= 1);
                    assert!(before.iy.abs_diff(after.iy) <= 1);
                    assert_eq!(after, before);
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_mixing_height_reflection() {
        let scene = Scene::new();
        let q = BoundaryQuery {
            mixing_height: Some(80.0),
            ..query(Vec3::new(5.0, 5.0, 79.0), Vec3::new(5.0, 5.0, 81.0))
        };
        match resolve(&scene.field(), &q) {
            BoundaryCheck::Reflected(event) => {
                assert_eq!(event.surface, Surface::BoundaryLayerTop);
                assert!((event.position.z - 79.0).abs() < 1e-12);
                assert!(!event.surface.is_solid());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_exit_conditions() {
        let scene = Scene::new();
        let field = scene.field();
        assert_eq!(
            resolve(&field, &query(Vec3::new(95.0, 5.0, 3.0), Vec3::new(101.0, 5.0, 3.0))),
            BoundaryCheck::Exited(RemovalReason::LeftDomain)
        );
        assert_eq!(
            resolve(&field, &query(Vec3::new(5.0, 5.0, 99.0), Vec3::new(5.0, 5.0, 100.5))),
            BoundaryCheck::Exited(RemovalReason::AboveModelTop)
        );
    }

    #[test]
    fn test_redraw_points_away_from_surface() {
        let mut rng = ParticleRng::for_particle(3, 3);
        let sigma = Vec3::new(0.5, 0.5, 0.3);
        for _ in 0..1000 {
            let up = redraw_velocity(&Vec3::new(0.0, 0.0, 1.0), &sigma, &mut rng);
            assert!(up.z > 0.0);
            let west = redraw_velocity(&Vec3::new(-1.0, 0.0, 0.0), &sigma, &mut rng);
            assert!(west.x < 0.0);
        }
    }

    #[test]
    fn test_contact_deposit_respects_mode() {
        let params = DepositionParams {
            settling_velocity: 0.001,
            deposition_velocity: 0.01,
            mode: DepositionMode::None,
        };
        assert_eq!(contact_deposit(1.0, &params, 0.0, 0.3), 0.0);
        let params = DepositionParams {
            mode: DepositionMode::ConcentrationAndDeposition,
            ..params
        };
        let deposited = contact_deposit(2.0, &params, 0.0, 0.3);
        assert!(deposited > 0.0 && deposited < 2.0);
    }
}

//! Boundary interaction
//!
//! Resolves crossings of terrain, building and boundary-layer surfaces and
//! supplies the near-wall displacement correction. Deposition at a contact is
//! computed here; moving the mass into the grids is left to the integrator.

pub mod reflection;
pub mod wall;

pub use reflection::{
    contact_deposit, redraw_velocity, resolve, safe_position, BoundaryCheck, BoundaryQuery,
    ReflectionEvent, Surface, SURFACE_OFFSET,
};
pub use wall::wall_velocity_bias;

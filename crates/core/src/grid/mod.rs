//! Flow-grid geometry and the read-only field providers
//!
//! The particle engine consumes a precomputed flow field. Access goes through two
//! traits so that the integrator never depends on how the field was produced:
//!
//! - [`WindProvider`]: mean wind, horizontal turbulence and stability scalars
//! - [`GeometryProvider`]: terrain, building cut heights, vegetation and tunnel masks
//!
//! [`GriddedWindField`] and [`Topography`] are the in-memory implementations.

pub mod flow_grid;
pub mod stability;
pub mod terrain;
pub mod wind_field;

// Re-export main types
pub use flow_grid::{Cell, FlowGrid};
pub use stability::{StabilityField, StabilityParams};
pub use terrain::{GeometryProvider, Topography};
pub use wind_field::{GriddedWindField, WindProvider, WindSample};

/// Immutable view of the flow field handed to the integrator
///
/// Bundles the grid geometry with the two providers. It holds no mutable state,
/// so one snapshot can be shared by every worker in a parallel run.
#[derive(Clone, Copy)]
pub struct FieldSnapshot<'a> {
    /// Flow-grid geometry
    pub grid: &'a FlowGrid,
    /// Wind, turbulence and stability lookups
    pub wind: &'a dyn WindProvider,
    /// Terrain and building geometry
    pub geometry: &'a dyn GeometryProvider,
}

impl<'a> FieldSnapshot<'a> {
    /// Bundle a grid with its providers
    pub fn new(
        grid: &'a FlowGrid,
        wind: &'a dyn WindProvider,
        geometry: &'a dyn GeometryProvider,
    ) -> Self {
        Self {
            grid,
            wind,
            geometry,
        }
    }

    /// Terrain height below a horizontal position, clamped to the domain edge
    pub fn surface_height_at(&self, x: f64, y: f64) -> f64 {
        self.geometry
            .surface_height(self.grid.cell_of_clamped(x, y))
    }
}

//! GRAL Lagrangian Particle Engine
//!
//! Computes ground-level concentrations and surface deposition by tracking marker
//! particles that carry emitted pollutant mass through a precomputed 3D wind and
//! turbulence field. Each particle follows a discretised Langevin process and adds
//! its mass into shared accumulator grids as it moves, reflects and deposits.
//!
//! ## Layout
//!
//! - [`grid`]: flow-grid geometry, wind/stability providers and topography
//! - [`physics`]: turbulence profiles and Langevin kernels, plume rise, tunnel jets,
//!   VDI 3945 deposition
//! - [`boundary`]: reflection at terrain, buildings and the boundary-layer top
//! - [`sources`]: point, portal, line and area sources with start-position sampling
//! - [`accumulation`]: concentration, deposition, receptor and transient grids
//! - [`simulation`]: the trajectory integrator and the steady-state and transient drivers

// Core types and utilities
pub mod core_types;
pub mod error;

// Field providers and geometry
pub mod grid;

// Physics kernels and boundary handling
pub mod boundary;
pub mod physics;

// Sources, accumulation and drivers
pub mod accumulation;
pub mod simulation;
pub mod sources;

// Re-export core types
pub use core_types::{ParticleRng, Vec3};
pub use error::ConfigError;

// Re-export field providers
pub use grid::{
    Cell, FieldSnapshot, FlowGrid, GeometryProvider, GriddedWindField, StabilityField,
    StabilityParams, Topography, WindProvider,
};

// Re-export sources and accumulation
pub use accumulation::{Accumulator, ConcentrationRaster, Diagnostics, GridLayout, Receptor, ReceptorSet};
pub use sources::{DepositionMode, DepositionParams, Source, SourceCatalogue, SourceKind};

// Re-export drivers
pub use simulation::{
    DispersionConfig, ParticleModel, RemovalReason, SteadyStateDriver, TrajectoryIntegrator,
    TrajectoryOutcome, TransientDriver, TransientField,
};

//! Particle trajectories and the drivers that run them
//!
//! - [`TrajectoryIntegrator`]: advances one particle from release to removal
//! - [`SteadyStateDriver`]: releases fresh particles each dispersion period
//! - [`TransientDriver`]: additionally re-injects mass carried in the transient grid
//!
//! Drivers share a [`ParticleModel`] (field snapshot, sources, configuration,
//! grid layout, receptors). Work is split into contiguous chunks, each chunk
//! runs on one rayon worker into a private [`crate::Accumulator`], and the
//! partials are merged in chunk order.

pub mod config;
pub mod integrator;
pub mod model;
pub mod motion;
pub mod outcome;
pub mod particle;
pub mod steady_state;
pub mod transient;

pub use config::{DispersionConfig, SafetyCaps, TransientSettings};
pub use integrator::TrajectoryIntegrator;
pub use model::ParticleModel;
pub use motion::{AmbientMotion, JetMotion, LocalTurbulence, Motion, MotionStep, StepContext};
pub use outcome::{RemovalReason, TrajectoryOutcome};
pub use particle::Particle;
pub use steady_state::SteadyStateDriver;
pub use transient::{TransientDriver, TransientField};

//! Core types and utilities

pub mod rng;
pub mod vec3;

pub use rng::{clamped_gaussian, gaussian, uniform, ParticleRng, JET_ABANDON_CLAMP, STANDARD_CLAMP};
pub use vec3::Vec3;

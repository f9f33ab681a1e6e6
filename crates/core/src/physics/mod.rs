//! Physical models of the particle engine
//!
//! - [`turbulence`]: boundary-layer profiles and the Langevin velocity updates
//! - [`plume_rise`]: buoyant rise of point-source exhaust
//! - [`tunnel_jet`]: momentum jets leaving tunnel portals
//! - [`deposition`]: dry deposition probability at surfaces

pub mod deposition;
pub mod plume_rise;
pub mod tunnel_jet;
pub mod turbulence;

pub use deposition::{deposition_probability, erf, vegetation_scaled_velocity};
pub use plume_rise::{PlumeRise, StackExit};
pub use tunnel_jet::{JetExtinction, PortalExit, TunnelJet};
pub use turbulence::{DriftCoefficients, VerticalProfile};

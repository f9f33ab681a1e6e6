//! Accumulation of particle contributions
//!
//! Concentration slices, deposition grids, receptor sums and maxima, the
//! optional transient 3D grid and the run diagnostics. All contributions are
//! plain sums (receptor peaks are maxima), so merging per-worker accumulators in
//! any fixed order reproduces the same result.

pub mod accumulator;
pub mod diagnostics;
pub mod grids;
pub mod odour;
pub mod receptors;

pub use accumulator::{Accumulator, Presence};
pub use diagnostics::Diagnostics;
pub use grids::{CellBounds, ConcentrationRaster, GridLayout, TransientLayout};
pub use receptors::{Receptor, ReceptorSet, ReceptorTally, ReceptorWindow};

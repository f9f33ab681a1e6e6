//! Vector type alias for 3D positions and velocities.

use nalgebra::Vector3;

/// 3D vector type for positions, velocities, and displacements.
///
/// This is a simple alias for `nalgebra::Vector3<f64>`. Positions are absolute
/// model coordinates in meters (z is the absolute height, not height above
/// ground); velocities are in m/s.
pub type Vec3 = Vector3<f64>;

//! Odour concentration variance
//!
//! Odour hour frequencies need the concentration variance besides the mean. Its
//! production term is estimated from the vertical mean-concentration gradient,
//! taken from two bands shifted one slice thickness above and below the
//! evaluation slice:
//!
//! ```text
//! P = 2 σw² T_L (∂C/∂z)²
//! ∂C/∂z ≈ (C_upper - C_lower) / (2 Δz)
//! ```
//!
//! The production term is a known-uncertain estimate; results derived from it
//! should be treated as indicative.
//!
//! # References
//!
//! - Oettl, D., Ferrero, E. (2017). "A simple model to assess odour hours for
//!   regulatory purposes." Atmospheric Environment, 155, 162-173.

/// Variance production term for one cell
///
/// # Arguments
/// * `upper` - Mean concentration of the upper shifted band
/// * `lower` - Mean concentration of the lower shifted band
/// * `spacing` - Offset of each shifted band from the slice (m)
/// * `sigma_w` - Vertical velocity standard deviation (m/s)
/// * `time_scale` - Lagrangian time scale (s)
pub fn concentration_variance_source(upper: f64, lower: f64, spacing: f64, sigma_w: f64, time_scale: f64) -> f64 {
    if spacing <= 0.0 {
        return 0.0;
    }
    let gradient = (upper - lower) / (2.0 * spacing);
    2.0 * sigma_w * sigma_w * time_scale * gradient * gradient
}

/// Variance production term for whole grids
pub fn variance_source_field(upper: &[f64], lower: &[f64], spacing: f64, sigma_w: f64, time_scale: f64) -> Vec<f64> {
    upper
        .iter()
        .zip(lower)
        .map(|(&u, &l)| concentration_variance_source(u, l, spacing, sigma_w, time_scale))
        .collect()
}

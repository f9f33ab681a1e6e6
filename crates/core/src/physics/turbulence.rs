//! Boundary-layer turbulence profiles and Langevin velocity updates
//!
//! Vertical motion follows a one-dimensional Langevin equation whose drift is
//! quadratic in the velocity, so that a skewed velocity PDF can be reproduced in
//! convective conditions. Horizontal motion follows a two-component Langevin
//! model with a rotational coupling term describing low-wind meandering.
//!
//! # Vertical model
//!
//! ```text
//! dw = (α w² + β w + γ) dt + √(C₀ ε) dW
//! ```
//!
//! The coefficients follow from the stationary moment equations of the
//! Fokker-Planck equation up to fourth order, closed with
//! `M₄ = 3 M₂² + M₃² / M₂`. Without skewness (stable and neutral conditions) the
//! scheme reduces to an Ornstein-Uhlenbeck process with a small drift correction
//! for the vertical gradient of σw².
//!
//! # Horizontal model
//!
//! ```text
//! du = -p u dt + q v dt + σ √(2p) dW₁
//! dv = -p v dt - q u dt + σ √(2p) dW₂
//! ```
//!
//! with `p = 1/T_L` and `q = m p`, where the meandering parameter `m` falls off
//! with the mean wind speed.
//!
//! # References
//!
//! - Franzese, P., Luhar, A.K., Borgas, M.S. (1999). "An efficient Lagrangian
//!   stochastic model of vertical dispersion in the convective boundary layer."
//!   Atmospheric Environment, 33, 2337-2345.
//! - Anfossi, D., et al. (2005). "An analysis of sonic anemometer observations in
//!   low wind speed conditions." Boundary-Layer Meteorology, 114, 179-203.
//! - Hanna, S.R. (1982). "Applications in air pollution modeling." Atmospheric
//!   Turbulence and Air Pollution Modelling, Reidel, 275-310.
//! - Oettl, D. (2015). "Quality assurance of the prognostic, microscale wind-field
//!   model GRAL 14.8 using wind-tunnel data." Atmospheric Environment.

use crate::core_types::rng::{clamped_gaussian, STANDARD_CLAMP};
use crate::grid::stability::KARMAN;
use crate::grid::StabilityParams;
use crate::sources::SourceKind;
use rand::RngCore;

/// Kolmogorov constant of the vertical model
pub const C0_VERTICAL: f64 = 4.0;

/// Kolmogorov constant of the horizontal model
pub const C0_HORIZONTAL: f64 = 3.0;

/// Profiles are evaluated no closer to the surface than this (m)
pub const MIN_PROFILE_HEIGHT: f64 = 1.0;

/// Lower bound of σw (m/s)
pub const SIGMA_W_MIN: f64 = 0.05;

/// Lower bound of σu and σv (m/s)
pub const SIGMA_H_MIN: f64 = 0.2;

/// Lower bound of σu and σv for road and portal emissions (m/s)
pub const SIGMA_H_MIN_TRAFFIC: f64 = 0.3;

/// Lower bound of the dissipation rate (m²/s³)
pub const DISSIPATION_MIN: f64 = 1e-6;

/// Vertical step of the finite-difference moment gradients (m)
const DERIVATIVE_STEP: f64 = 0.5;

/// Turbulent velocities are bounded by this multiple of their standard deviation
pub const VELOCITY_LIMIT_SIGMAS: f64 = 5.0;

/// Variance of traffic-produced turbulence at road level (m²/s²)
pub const TRAFFIC_VARIANCE: f64 = 0.36;

/// Horizontal Lagrangian time-scale bounds (s)
const TL_HORIZONTAL_MIN: f64 = 0.1;
const TL_HORIZONTAL_MAX: f64 = 2000.0;

/// Vertical turbulence quantities at one height
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerticalProfile {
    /// Standard deviation of w (m/s)
    pub sigma_w: f64,
    /// Dissipation rate of turbulent kinetic energy (m²/s³)
    pub dissipation: f64,
    /// Third moment of w (m³/s³)
    pub third_moment: f64,
    /// Vertical Lagrangian time scale (s)
    pub time_scale: f64,
}

/// Coefficients of the quadratic drift `a(w) = α w² + β w + γ`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriftCoefficients {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}

#[inline]
fn relative_height(p: &StabilityParams, z: f64) -> f64 {
    (z / p.boundary_layer_height).min(1.0)
}

/// Standard deviation of the vertical velocity (m/s)
///
/// ```text
/// σw² = (1.25 u* (1 - 0.8 z/h))² + 1.8 w*² (z/h)^(2/3) (1 - 0.8 z/h)²
/// ```
///
/// The convective term only contributes for L < 0.
pub fn sigma_w(stability: &StabilityParams, height_above_surface: f64) -> f64 {
    let p = stability.sanitized();
    let z = height_above_surface.max(MIN_PROFILE_HEIGHT);
    let zz = relative_height(&p, z);
    let mechanical = 1.25 * p.friction_velocity * (1.0 - 0.8 * zz);
    let w_star = p.convective_velocity();
    let convective_sq = 1.8 * w_star * w_star * zz.powf(2.0 / 3.0) * (1.0 - 0.8 * zz).powi(2);
    (mechanical * mechanical + convective_sq).sqrt().max(SIGMA_W_MIN)
}

/// Dissipation rate of turbulent kinetic energy (m²/s³)
///
/// Surface-layer scaling with a stability correction for L > 0, plus the
/// convective contribution `w*³/h (1.5 - 1.2 (z/h)^(1/3))` for L < 0.
pub fn dissipation(stability: &StabilityParams, height_above_surface: f64) -> f64 {
    let p = stability.sanitized();
    let z = height_above_surface.max(MIN_PROFILE_HEIGHT);
    let zz = relative_height(&p, z);
    let mut eps = p.friction_velocity.powi(3) / (KARMAN * z) * (1.0 - 0.85 * zz).powf(1.5);
    if p.obukhov_length > 0.0 {
        eps *= 1.0 + 3.7 * z / p.obukhov_length;
    }
    if p.is_convective() {
        let w_star = p.convective_velocity();
        eps += w_star.powi(3) / p.boundary_layer_height * (1.5 - 1.2 * zz.cbrt()).max(0.0);
    }
    eps.max(DISSIPATION_MIN)
}

/// Third moment of the vertical velocity (m³/s³), positive in convective conditions
pub fn third_moment(stability: &StabilityParams, height_above_surface: f64) -> f64 {
    let p = stability.sanitized();
    if !p.is_convective() {
        return 0.0;
    }
    let z = height_above_surface.max(MIN_PROFILE_HEIGHT);
    let zz = relative_height(&p, z);
    1.1 * p.convective_velocity().powi(3) * zz * (1.0 - zz).powi(2)
}

/// All vertical turbulence quantities at one height
pub fn vertical_profile(stability: &StabilityParams, height_above_surface: f64) -> VerticalProfile {
    let sigma_w = sigma_w(stability, height_above_surface);
    let dissipation = dissipation(stability, height_above_surface);
    VerticalProfile {
        sigma_w,
        dissipation,
        third_moment: third_moment(stability, height_above_surface),
        time_scale: 2.0 * sigma_w * sigma_w / (C0_VERTICAL * dissipation),
    }
}

/// Drift coefficients of the vertical Langevin equation
///
/// Vertical moment gradients are taken by finite differences over
/// `±0.5 m`, shifted upward near the surface so that both samples lie above
/// [`MIN_PROFILE_HEIGHT`].
pub fn vertical_drift(stability: &StabilityParams, height_above_surface: f64) -> DriftCoefficients {
    let z = height_above_surface.max(MIN_PROFILE_HEIGHT);
    let lower = (z - DERIVATIVE_STEP).max(MIN_PROFILE_HEIGHT);
    let upper = lower + 2.0 * DERIVATIVE_STEP;
    let span = upper - lower;

    let m2 = |h: f64| sigma_w(stability, h).powi(2);
    let m3 = |h: f64| third_moment(stability, h);
    let m4 = |h: f64| {
        let m2 = m2(h);
        let m3 = m3(h);
        3.0 * m2 * m2 + m3 * m3 / m2
    };

    let m2_z = m2(z);
    let m3_z = m3(z);
    let eps = dissipation(stability, z);
    let c0_eps = C0_VERTICAL * eps;

    let dm2 = (m2(upper) - m2(lower)) / span;
    let dm3 = (m3(upper) - m3(lower)) / span;
    let dm4 = (m4(upper) - m4(lower)) / span;

    let alpha = (dm4 - 1.5 * m3_z * (dm3 - c0_eps) / m2_z - 3.0 * m2_z * dm2) / (6.0 * m2_z * m2_z);
    let beta = (dm3 - c0_eps) / (2.0 * m2_z) - alpha * m3_z / m2_z;
    let gamma = dm2 - alpha * m2_z;

    DriftCoefficients { alpha, beta, gamma }
}

/// Advance the vertical turbulent velocity by one step
///
/// The linear part of the drift is integrated exactly, the quadratic and
/// constant parts are treated as forcing over the step. A non-negative `β`
/// (which would make the linear part unstable) is replaced by `-1/T_L`. The
/// random forcing is drawn within ±2 standard deviations and the result is
/// bounded by ±5 σw.
pub fn vertical_step<R: RngCore + ?Sized>(
    w: f64,
    drift: &DriftCoefficients,
    profile: &VerticalProfile,
    dt: f64,
    rng: &mut R,
) -> f64 {
    let beta = if drift.beta < 0.0 {
        drift.beta
    } else {
        -1.0 / profile.time_scale.max(TL_HORIZONTAL_MIN)
    };
    let decay = (beta * dt).exp();
    let forcing = drift.alpha * w * w + drift.gamma;
    let noise_variance = C0_VERTICAL * profile.dissipation * (1.0 - decay * decay) / (-2.0 * beta);

    let next = w * decay + forcing * (1.0 - decay) / (-beta) + noise_variance.max(0.0).sqrt() * clamped_gaussian(rng, STANDARD_CLAMP);
    let limit = VELOCITY_LIMIT_SIGMAS * profile.sigma_w;
    next.clamp(-limit, limit)
}

/// Minimum horizontal σ for a source type (m/s)
pub fn horizontal_sigma_floor(kind: SourceKind) -> f64 {
    match kind {
        SourceKind::Line | SourceKind::Portal => SIGMA_H_MIN_TRAFFIC,
        SourceKind::Point | SourceKind::Area => SIGMA_H_MIN,
    }
}

/// Horizontal velocity standard deviations `(σu, σv)` (m/s)
///
/// ```text
/// σ = u* (12 + 0.5 h/|L|)^(1/3)   (L < 0)
/// σ = 2 u*                        (otherwise)
/// ```
///
/// reduced linearly with height inside the boundary layer, combined with
/// `extra_variance`, and bounded below by `floor` and by 15 % of the mean wind
/// speed.
pub fn horizontal_sigmas(
    stability: &StabilityParams,
    height_above_surface: f64,
    wind_speed: f64,
    extra_variance: f64,
    floor: f64,
) -> (f64, f64) {
    let p = stability.sanitized();
    let z = height_above_surface.max(MIN_PROFILE_HEIGHT);
    let zz = relative_height(&p, z);
    let base = if p.is_convective() {
        p.friction_velocity * (12.0 + 0.5 * p.boundary_layer_height / p.obukhov_length.abs()).cbrt()
    } else {
        2.0 * p.friction_velocity
    };
    let sigma = base * (1.0 - 0.5 * zz);
    let sigma = (sigma * sigma + extra_variance.max(0.0))
        .sqrt()
        .max(floor)
        .max(0.15 * wind_speed.abs());
    (sigma, sigma)
}

/// Additional horizontal variance from vehicle-induced turbulence (m²/s²)
///
/// Full strength within the source's vertical extension above the road,
/// decaying exponentially above.
pub fn traffic_variance(height_above_surface: f64, vertical_extension: f64) -> f64 {
    let extension = vertical_extension.max(1.0);
    if height_above_surface <= extension {
        TRAFFIC_VARIANCE
    } else {
        TRAFFIC_VARIANCE * (-(height_above_surface - extension) / extension).exp()
    }
}

/// Horizontal Lagrangian time scale (s)
pub fn horizontal_time_scale(sigma_h: f64, dissipation: f64) -> f64 {
    (2.0 * sigma_h * sigma_h / (C0_HORIZONTAL * dissipation.max(DISSIPATION_MIN)))
        .clamp(TL_HORIZONTAL_MIN, TL_HORIZONTAL_MAX)
}

/// Meandering parameter `m = 8.5 / (U + 1)²`
#[inline]
pub fn meander_parameter(wind_speed: f64) -> f64 {
    8.5 / (wind_speed.abs() + 1.0).powi(2)
}

/// Advance the horizontal turbulent velocities `(u', v')` by one step
///
/// The coupled deterministic part (decay `e^{-p dt}` and rotation by `q dt`) is
/// integrated exactly; the stochastic part restores the stationary variance σ²,
/// with each draw clamped to ±2 standard deviations.
pub fn horizontal_step<R: RngCore + ?Sized>(
    u: f64,
    v: f64,
    sigma_u: f64,
    sigma_v: f64,
    time_scale: f64,
    wind_speed: f64,
    dt: f64,
    rng: &mut R,
) -> (f64, f64) {
    let p = 1.0 / time_scale.max(TL_HORIZONTAL_MIN);
    let q = meander_parameter(wind_speed) * p;
    let decay = (-p * dt).exp();
    let (sin_q, cos_q) = (q * dt).sin_cos();

    let u_det = decay * (u * cos_q + v * sin_q);
    let v_det = decay * (v * cos_q - u * sin_q);
    let noise = (1.0 - decay * decay).max(0.0).sqrt();

    let next_u = u_det + sigma_u * noise * clamped_gaussian(rng, STANDARD_CLAMP);
    let next_v = v_det + sigma_v * noise * clamped_gaussian(rng, STANDARD_CLAMP);
    let limit_u = VELOCITY_LIMIT_SIGMAS * sigma_u;
    let limit_v = VELOCITY_LIMIT_SIGMAS * sigma_v;
    (next_u.clamp(-limit_u, limit_u), next_v.clamp(-limit_v, limit_v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::ParticleRng;

    fn neutral() -> StabilityParams {
        StabilityParams::neutral(0.35, 0.1, 800.0)
    }

    fn convective() -> StabilityParams {
        StabilityParams::new(0.3, -30.0, 0.1, 1200.0)
    }

    /// Variance of a standard normal clamped to ±2
    const CLAMPED_VARIANCE: f64 = 0.9205;

    #[test]
    fn test_sigma_w_surface_layer() {
        let sw = sigma_w(&neutral(), 10.0);
        assert!((sw - 1.25 * 0.35 * (1.0 - 0.8 * 10.0 / 800.0)).abs() < 1e-12);
        assert!(sigma_w(&convective(), 300.0) > sigma_w(&neutral(), 300.0));
    }

    #[test]
    fn test_profiles_have_floors() {
        let calm = StabilityParams::new(0.0, 10.0, 0.01, 50.0);
        assert!(sigma_w(&calm, 100.0) >= SIGMA_W_MIN);
        assert!(dissipation(&calm, 100.0) >= DISSIPATION_MIN);
        let (su, sv) = horizontal_sigmas(&calm, 5.0, 0.0, 0.0, SIGMA_H_MIN);
        assert!(su >= SIGMA_H_MIN && sv >= SIGMA_H_MIN);
    }

    #[test]
    fn test_third_moment_only_convective() {
        assert_eq!(third_moment(&neutral(), 100.0), 0.0);
        assert!(third_moment(&convective(), 300.0) > 0.0);
    }

    #[test]
    fn test_gaussian_drift_reduces_to_ou() {
        let p = neutral();
        let z = 50.0;
        let drift = vertical_drift(&p, z);
        let profile = vertical_profile(&p, z);
        let expected_beta = -1.0 / profile.time_scale;
        assert!((drift.beta - expected_beta).abs() / expected_beta.abs() < 0.02);
        // σw decreases with height, so the gradient correction is negative
        assert!(drift.gamma < 0.0);
    }

    #[test]
    fn test_convective_drift_is_skewed() {
        let drift = vertical_drift(&convective(), 200.0);
        assert!(drift.alpha.is_finite() && drift.beta.is_finite() && drift.gamma.is_finite());
        assert!(drift.beta < 0.0);
    }

    #[test]
    fn test_vertical_velocity_variance_is_maintained() {
        let p = neutral();
        let z = 100.0;
        let drift = vertical_drift(&p, z);
        let profile = vertical_profile(&p, z);
        let mut rng = ParticleRng::for_particle(11, 0);
        let mut w = 0.0;
        let mut sum_sq = 0.0;
        let n = 200_000;
        for _ in 0..n {
            w = vertical_step(w, &drift, &profile, 10.0, &mut rng);
            sum_sq += w * w;
        }
        let var = sum_sq / f64::from(n);
        let expected = CLAMPED_VARIANCE * profile.sigma_w.powi(2);
        assert!((var - expected).abs() / expected < 0.1, "var {var} vs {expected}");
    }

    #[test]
    fn test_vertical_step_is_bounded() {
        let p = convective();
        let drift = vertical_drift(&p, 20.0);
        let profile = vertical_profile(&p, 20.0);
        let mut rng = ParticleRng::for_particle(2, 3);
        let mut w = 100.0;
        for _ in 0..1000 {
            w = vertical_step(w, &drift, &profile, 2.0, &mut rng);
            assert!(w.abs() <= VELOCITY_LIMIT_SIGMAS * profile.sigma_w + 1e-12);
        }
    }

    #[test]
    fn test_horizontal_step_keeps_variance() {
        let mut rng = ParticleRng::for_particle(4, 4);
        let (mut u, mut v) = (0.0, 0.0);
        let mut sum_sq = 0.0;
        let n = 100_000;
        for _ in 0..n {
            (u, v) = horizontal_step(u, v, 0.7, 0.7, 30.0, 1.0, 2.0, &mut rng);
            sum_sq += u * u;
        }
        let var = sum_sq / f64::from(n);
        assert!((var - CLAMPED_VARIANCE * 0.49).abs() < 0.05, "var {var}");
    }

    #[test]
    fn test_langevin_draws_stay_within_two_sigma() {
        let mut rng = ParticleRng::for_particle(6, 0);
        // A step much longer than T_L forgets the previous velocity, so each
        // result is a single scaled draw
        for _ in 0..100_000 {
            let (u, v) = horizontal_step(0.0, 0.0, 0.7, 0.7, 30.0, 1.0, 100.0, &mut rng);
            assert!(u.abs() <= STANDARD_CLAMP * 0.7 + 1e-12, "u {u}");
            assert!(v.abs() <= STANDARD_CLAMP * 0.7 + 1e-12, "v {v}");
        }

        let p = neutral();
        let drift = vertical_drift(&p, 100.0);
        let profile = vertical_profile(&p, 100.0);
        assert!(drift.beta < 0.0);
        let mean = drift.gamma / -drift.beta;
        let spread = (C0_VERTICAL * profile.dissipation / (-2.0 * drift.beta)).sqrt();
        for _ in 0..100_000 {
            let w = vertical_step(0.0, &drift, &profile, 1000.0, &mut rng);
            assert!((w - mean).abs() <= STANDARD_CLAMP * spread + 1e-6, "w {w}");
        }
    }

    #[test]
    fn test_meandering_fades_with_wind() {
        assert!(meander_parameter(0.0) > meander_parameter(5.0));
        assert!((meander_parameter(0.0) - 8.5).abs() < 1e-12);
    }

    #[test]
    fn test_traffic_variance_decays_above_extension() {
        assert_eq!(traffic_variance(1.0, 3.0), TRAFFIC_VARIANCE);
        assert!(traffic_variance(20.0, 3.0) < 0.01);
        let (with_traffic, _) = horizontal_sigmas(&neutral(), 2.0, 1.0, TRAFFIC_VARIANCE, SIGMA_H_MIN);
        let (without, _) = horizontal_sigmas(&neutral(), 2.0, 1.0, 0.0, SIGMA_H_MIN);
        assert!(with_traffic > without);
    }
}

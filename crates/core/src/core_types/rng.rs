//! Per-particle random numbers
//!
//! Trajectories draw from Marsaglia's multiply-with-carry generator: two 16-bit
//! lag-1 MWC streams combined into one 32-bit output. It is cheap, has a period of
//! roughly 2^60 and, more importantly here, its whole state is two words, so every
//! particle can own one seeded from `(run seed, particle index)`. A particle's draws
//! therefore do not depend on which worker executes it or in which order.
//!
//! The generator implements [`rand::RngCore`] and [`rand::SeedableRng`]; the
//! integrator is generic over `RngCore`, which lets tests inject fixed sequences.
//!
//! # References
//!
//! - Marsaglia, G. (2003). "Random number generators." Journal of Modern Applied
//!   Statistical Methods, 2(1), 2-13.
//! - Box, G.E.P., Muller, M.E. (1958). "A note on the generation of random normal
//!   deviates." Annals of Mathematical Statistics, 29(2), 610-611.

use rand::{RngCore, SeedableRng};
use std::f64::consts::PI;

/// Multiplier of the upper MWC stream
const MWC_Z_MULTIPLIER: u32 = 36969;
/// Multiplier of the lower MWC stream
const MWC_W_MULTIPLIER: u32 = 18000;

/// Replacement states for seeds that would lock a stream at a fixed point
const FALLBACK_Z: u32 = 362_436_069;
const FALLBACK_W: u32 = 521_288_629;

/// Fixed points of the two streams (state never changes once reached)
const FIXED_POINT_Z: u32 = 0x9068_ffff;
const FIXED_POINT_W: u32 = 0x464f_ffff;

/// 2^-32, maps a `u32` onto (0, 1]
const INV_U32_RANGE: f64 = 1.0 / 4_294_967_296.0;

/// Gaussian draws are clamped to this many standard deviations in ambient steps
pub const STANDARD_CLAMP: f64 = 2.0;

/// Wider clamp used when a tunnel jet is abandoned and velocities are re-drawn
pub const JET_ABANDON_CLAMP: f64 = 3.0;

/// Deterministic per-particle random number generator
///
/// # Example
///
/// ```
/// use gral_particles_core::ParticleRng;
/// use rand::RngCore;
///
/// let mut a = ParticleRng::for_particle(42, 7);
/// let mut b = ParticleRng::for_particle(42, 7);
/// assert_eq!(a.next_u32(), b.next_u32());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticleRng {
    z: u32,
    w: u32,
}

impl ParticleRng {
    /// Generator for the particle with global `index` in a run seeded with `run_seed`
    pub fn for_particle(run_seed: u64, index: u64) -> Self {
        let mixed = splitmix64(run_seed ^ splitmix64(index.wrapping_add(0x9e37_79b9)));
        Self::from_seed(mixed.to_le_bytes())
    }

    #[inline]
    fn step(&mut self) -> u32 {
        self.z = MWC_Z_MULTIPLIER
            .wrapping_mul(self.z & 0xffff)
            .wrapping_add(self.z >> 16);
        self.w = MWC_W_MULTIPLIER
            .wrapping_mul(self.w & 0xffff)
            .wrapping_add(self.w >> 16);
        (self.z << 16).wrapping_add(self.w)
    }
}

impl SeedableRng for ParticleRng {
    type Seed = [u8; 8];

    fn from_seed(seed: Self::Seed) -> Self {
        let mut z = u32::from_le_bytes([seed[0], seed[1], seed[2], seed[3]]);
        let mut w = u32::from_le_bytes([seed[4], seed[5], seed[6], seed[7]]);
        if z == 0 || z == FIXED_POINT_Z {
            z = FALLBACK_Z;
        }
        if w == 0 || w == FIXED_POINT_W {
            w = FALLBACK_W;
        }
        Self { z, w }
    }
}

impl RngCore for ParticleRng {
    fn next_u32(&mut self) -> u32 {
        self.step()
    }

    fn next_u64(&mut self) -> u64 {
        let hi = u64::from(self.step());
        let lo = u64::from(self.step());
        (hi << 32) | lo
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) {
        for chunk in dst.chunks_mut(4) {
            let bytes = self.step().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }
}

/// `SplitMix64` finaliser, spreads neighbouring indices across the seed space
#[inline]
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

/// Uniform draw in (0, 1]
///
/// Never returns zero, so `ln` of the result is always finite.
#[inline]
pub fn uniform<R: RngCore + ?Sized>(rng: &mut R) -> f64 {
    (f64::from(rng.next_u32()) + 1.0) * INV_U32_RANGE
}

/// Standard normal draw via the Box-Muller transform
#[inline]
pub fn gaussian<R: RngCore + ?Sized>(rng: &mut R) -> f64 {
    let u1 = uniform(rng);
    let u2 = uniform(rng);
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).sin()
}

/// Standard normal draw clamped to `±limit`
#[inline]
pub fn clamped_gaussian<R: RngCore + ?Sized>(rng: &mut R, limit: f64) -> f64 {
    gaussian(rng).clamp(-limit, limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_index_same_stream() {
        let mut a = ParticleRng::for_particle(1, 99);
        let mut b = ParticleRng::for_particle(1, 99);
        for _ in 0..100 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
    }

    #[test]
    fn test_neighbouring_indices_differ() {
        let mut a = ParticleRng::for_particle(1, 10);
        let mut b = ParticleRng::for_particle(1, 11);
        let same = (0..64).filter(|_| a.next_u32() == b.next_u32()).count();
        assert!(same < 2);
    }

    #[test]
    fn test_zero_seed_does_not_lock() {
        let mut rng = ParticleRng::from_seed([0; 8]);
        let first = rng.next_u32();
        let second = rng.next_u32();
        assert_ne!(first, second);
    }

    #[test]
    fn test_uniform_range() {
        let mut rng = ParticleRng::for_particle(3, 0);
        for _ in 0..10_000 {
            let u = uniform(&mut rng);
            assert!(u > 0.0 && u <= 1.0);
        }
    }

    #[test]
    fn test_gaussian_moments() {
        let mut rng = ParticleRng::for_particle(5, 1);
        let n = 50_000;
        let draws: Vec<f64> = (0..n).map(|_| gaussian(&mut rng)).collect();
        let mean = draws.iter().sum::<f64>() / f64::from(n);
        let var = draws.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / f64::from(n);
        assert!(mean.abs() < 0.03, "mean {mean}");
        assert!((var - 1.0).abs() < 0.05, "variance {var}");
    }

    #[test]
    fn test_clamp_limits_draws() {
        let mut rng = ParticleRng::for_particle(8, 2);
        for _ in 0..10_000 {
            assert!(clamped_gaussian(&mut rng, STANDARD_CLAMP).abs() <= STANDARD_CLAMP);
        }
    }

    #[test]
    fn test_fill_bytes_partial_chunk() {
        let mut rng = ParticleRng::for_particle(0, 0);
        let mut buf = [0u8; 7];
        rng.fill_bytes(&mut buf);
        assert!(buf.iter().any(|&b| b != 0));
    }
}

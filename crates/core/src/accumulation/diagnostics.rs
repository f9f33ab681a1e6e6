//! Run diagnostics
//!
//! Counters that are merged like the grids: removal reasons, log2 histograms of
//! steps and reflections per particle, and warnings about implausible input.
//! Abandoned particles are not errors; they show up here and in the log.

use crate::simulation::{RemovalReason, TrajectoryOutcome};
use tracing::{info, warn};

/// Number of log2 histogram bins (bin `i` holds counts in `[2^(i-1), 2^i)`, bin 0 holds zero)
pub const HISTOGRAM_BINS: usize = 40;

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostics {
    /// Trajectories integrated
    pub particles: u64,
    /// Counts per [`RemovalReason::index`]
    pub removals: [u64; 6],
    pub step_histogram: [u64; HISTOGRAM_BINS],
    pub reflection_histogram: [u64; HISTOGRAM_BINS],
    /// Steps with wind above the plausibility limit
    pub unrealistic_wind: u64,
    /// Transient mass below the re-injection threshold
    pub discarded_transient_mass: f64,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            particles: 0,
            removals: [0; 6],
            step_histogram: [0; HISTOGRAM_BINS],
            reflection_histogram: [0; HISTOGRAM_BINS],
            unrealistic_wind: 0,
            discarded_transient_mass: 0.0,
        }
    }
}

#[inline]
fn log2_bin(value: u64) -> usize {
    if value == 0 {
        0
    } else {
        ((64 - value.leading_zeros()) as usize).min(HISTOGRAM_BINS - 1)
    }
}

impl Diagnostics {
    pub fn record(&mut self, outcome: &TrajectoryOutcome) {
        self.particles += 1;
        self.removals[outcome.reason.index()] += 1;
        self.step_histogram[log2_bin(outcome.steps)] += 1;
        self.reflection_histogram[log2_bin(outcome.reflections)] += 1;
        self.unrealistic_wind += outcome.unrealistic_wind;
    }

    pub fn merge(&mut self, other: &Diagnostics) {
        self.particles += other.particles;
        for (a, b) in self.removals.iter_mut().zip(other.removals.iter()) {
            *a += b;
        }
        for (a, b) in self.step_histogram.iter_mut().zip(other.step_histogram.iter()) {
            *a += b;
        }
        for (a, b) in self
            .reflection_histogram
            .iter_mut()
            .zip(other.reflection_histogram.iter())
        {
            *a += b;
        }
        self.unrealistic_wind += other.unrealistic_wind;
        self.discarded_transient_mass += other.discarded_transient_mass;
    }

    pub fn removed(&self, reason: RemovalReason) -> u64 {
        self.removals[reason.index()]
    }

    /// Log the removal histogram and a warning per diagnostic condition
    pub fn report(&self) {
        let histogram: Vec<String> = RemovalReason::ALL
            .iter()
            .filter(|r| self.removed(**r) > 0)
            .map(|r| format!("{r}: {}", self.removed(*r)))
            .collect();
        info!(particles = self.particles, "removals [{}]", histogram.join(", "));

        let step_caps = self.removed(RemovalReason::StepCap);
        if step_caps > 0 {
            warn!("iteration cap exceeded {step_caps} times");
        }
        let reflection_caps = self.removed(RemovalReason::ReflectionCap);
        if reflection_caps > 0 {
            warn!("reflection cap exceeded {reflection_caps} times");
        }
        if self.unrealistic_wind > 0 {
            warn!("unrealistic wind speed encountered {} times", self.unrealistic_wind);
        }
        if self.discarded_transient_mass > 0.0 {
            info!(
                "discarded {:.3e} transient mass below the re-injection threshold",
                self.discarded_transient_mass
            );
        }
    }
}

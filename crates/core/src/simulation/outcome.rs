//! How a trajectory ended

use crate::core_types::Vec3;
use serde::{Deserialize, Serialize};

/// Reason a particle was removed from the simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemovalReason {
    /// Left the horizontal domain
    LeftDomain,
    /// Dispersion time used up
    TimeExhausted,
    /// Rose above the model top
    AboveModelTop,
    /// Mass fully decayed, washed out or deposited
    MassExhausted,
    /// Abandoned after too many steps
    StepCap,
    /// Abandoned after too many reflections
    ReflectionCap,
}

impl RemovalReason {
    /// All reasons in histogram order
    pub const ALL: [RemovalReason; 6] = [
        RemovalReason::LeftDomain,
        RemovalReason::TimeExhausted,
        RemovalReason::AboveModelTop,
        RemovalReason::MassExhausted,
        RemovalReason::StepCap,
        RemovalReason::ReflectionCap,
    ];

    /// Position in [`RemovalReason::ALL`]
    pub fn index(self) -> usize {
        match self {
            RemovalReason::LeftDomain => 0,
            RemovalReason::TimeExhausted => 1,
            RemovalReason::AboveModelTop => 2,
            RemovalReason::MassExhausted => 3,
            RemovalReason::StepCap => 4,
            RemovalReason::ReflectionCap => 5,
        }
    }

    /// The particle was abandoned by a safety cap
    pub fn is_abandoned(self) -> bool {
        matches!(self, RemovalReason::StepCap | RemovalReason::ReflectionCap)
    }
}

impl std::fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RemovalReason::LeftDomain => "left domain",
            RemovalReason::TimeExhausted => "time exhausted",
            RemovalReason::AboveModelTop => "above model top",
            RemovalReason::MassExhausted => "mass exhausted",
            RemovalReason::StepCap => "step cap",
            RemovalReason::ReflectionCap => "reflection cap",
        };
        f.write_str(name)
    }
}

/// Summary of one particle trajectory
///
/// Mass bookkeeping closes: `initial_mass = final_mass + deposited_mass +
/// washed_out_mass + decayed_mass` up to rounding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectoryOutcome {
    pub reason: RemovalReason,
    /// Integration steps taken
    pub steps: u64,
    /// Boundary reflections
    pub reflections: u64,
    /// Dispersion time covered (s)
    pub elapsed: f64,
    pub initial_mass: f64,
    pub final_mass: f64,
    /// Dry deposition at reflections
    pub deposited_mass: f64,
    /// Wet removal by washout
    pub washed_out_mass: f64,
    /// Loss by exponential decay
    pub decayed_mass: f64,
    /// Σ mass·dt over all steps (mass·s)
    pub exposure: f64,
    /// Part of `exposure` from reflection steps, which are not accumulated
    pub reflected_exposure: f64,
    /// Steps whose interpolated wind exceeded the plausibility limit
    pub unrealistic_wind: u64,
    pub final_position: Vec3,
}

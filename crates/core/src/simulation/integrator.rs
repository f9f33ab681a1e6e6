//! Trajectory integrator
//!
//! Drives one particle from release to removal. Each step runs through an
//! explicit state machine:
//!
//! ```text
//! Advancing / JetAdvancing ──motion step──▶ Reflecting ──clear──▶ bookkeeping ──▶ Advancing
//!                                              │  ▲                    │
//!                                              └──┘ reflected          └──▶ Removed
//! ```
//!
//! Bookkeeping applies decay and washout, and accumulates `mass × dt` unless the
//! step ended in a reflection. Step and reflection counts are capped; a capped
//! particle is abandoned and reported through the diagnostics.

use crate::accumulation::{Accumulator, Presence, ReceptorSet, ReceptorTally};
use crate::boundary::{self, BoundaryCheck, BoundaryQuery};
use crate::core_types::Vec3;
use crate::grid::FieldSnapshot;
use crate::simulation::config::DispersionConfig;
use crate::simulation::motion::MotionStep;
use crate::simulation::outcome::{RemovalReason, TrajectoryOutcome};
use crate::simulation::particle::Particle;
use rand::RngCore;
use tracing::debug;

/// Relative mass below which a particle counts as exhausted
const MASS_EPSILON: f64 = 1e-12;

/// Steps between two depositing surface contacts
const DEPOSITION_COOLDOWN_STEPS: u32 = 1;

/// Integration state of the current particle
#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    /// Ambient turbulent motion
    Advancing,
    /// Motion inside a tunnel jet
    JetAdvancing,
    /// Boundary resolution of a proposed step
    Reflecting(PendingStep),
    Removed(RemovalReason),
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingStep {
    motion: MotionStep,
    /// Position under test
    target: Vec3,
    /// Reflections within this step
    attempts: u32,
    reflected: bool,
}

/// Running totals of one trajectory
#[derive(Debug, Default)]
struct Ledger {
    steps: u64,
    reflections: u64,
    deposited: f64,
    washed_out: f64,
    decayed: f64,
    exposure: f64,
    reflected_exposure: f64,
    unrealistic_wind: u64,
}

/// Integrates trajectories against one field snapshot
///
/// Holds no state that outlives a trajectory besides a reusable receptor buffer,
/// so one integrator per worker is enough.
pub struct TrajectoryIntegrator<'a> {
    field: FieldSnapshot<'a>,
    config: &'a DispersionConfig,
    receptors: &'a ReceptorSet,
    step_cap: u64,
    reflection_cap: u64,
    tally: ReceptorTally,
}

impl<'a> TrajectoryIntegrator<'a> {
    pub fn new(field: FieldSnapshot<'a>, config: &'a DispersionConfig, receptors: &'a ReceptorSet) -> Self {
        Self {
            field,
            config,
            receptors,
            step_cap: config.caps.step_cap(config.dispersion_time, field.grid),
            reflection_cap: config.caps.reflection_cap(field.grid),
            tally: ReceptorTally::new(receptors.len()),
        }
    }

    pub fn step_cap(&self) -> u64 {
        self.step_cap
    }

    pub fn reflection_cap(&self) -> u64 {
        self.reflection_cap
    }

    /// Integrate one particle until it is removed
    ///
    /// Contributions go into `acc`; the returned outcome is also recorded in its
    /// diagnostics.
    pub fn run<R: RngCore + ?Sized>(
        &mut self,
        mut particle: Particle,
        acc: &mut Accumulator,
        rng: &mut R,
    ) -> TrajectoryOutcome {
        self.tally.reset();
        let mut ledger = Ledger::default();
        let mut phase = initial_phase(&particle);

        let reason = loop {
            phase = match phase {
                Phase::Advancing | Phase::JetAdvancing => {
                    if ledger.steps >= self.step_cap {
                        Phase::Removed(RemovalReason::StepCap)
                    } else {
                        let ctx = particle.step_context(&self.field, self.config);
                        let position = particle.position;
                        let motion = particle
                            .motion
                            .advance(&position, &mut particle.velocity, &ctx, rng);
                        ledger.steps += 1;
                        if motion.unrealistic_wind {
                            ledger.unrealistic_wind += 1;
                        }
                        Phase::Reflecting(PendingStep {
                            motion,
                            target: motion.proposed,
                            attempts: 0,
                            reflected: false,
                        })
                    }
                }
                Phase::Reflecting(pending) => self.resolve(&mut particle, pending, &mut ledger, acc, rng),
                Phase::Removed(reason) => break reason,
            };
        };

        if reason.is_abandoned() {
            debug!(
                particle = particle.id,
                steps = ledger.steps,
                reflections = ledger.reflections,
                "particle abandoned: {reason}"
            );
        }

        let outcome = TrajectoryOutcome {
            reason,
            steps: ledger.steps,
            reflections: ledger.reflections,
            elapsed: particle.elapsed,
            initial_mass: particle.initial_mass,
            final_mass: particle.mass,
            deposited_mass: ledger.deposited,
            washed_out_mass: ledger.washed_out,
            decayed_mass: ledger.decayed,
            exposure: ledger.exposure,
            reflected_exposure: ledger.reflected_exposure,
            unrealistic_wind: ledger.unrealistic_wind,
            final_position: particle.position,
        };
        acc.finish_trajectory(particle.source.group, &self.tally, &outcome);
        outcome
    }

    /// One boundary check of a pending step
    fn resolve<R: RngCore + ?Sized>(
        &mut self,
        particle: &mut Particle,
        mut pending: PendingStep,
        ledger: &mut Ledger,
        acc: &mut Accumulator,
        rng: &mut R,
    ) -> Phase {
        let mixing_height = (self.config.reflect_at_boundary_layer_top && !pending.motion.plume_active).then(|| {
            let p = &particle.position;
            self.field.surface_height_at(p.x, p.y)
                + self
                    .field
                    .wind
                    .stability_at(p.x, p.y)
                    .sanitized()
                    .boundary_layer_height
        });
        let query = BoundaryQuery {
            previous: particle.position,
            proposed: pending.target,
            jet_passage: pending.motion.jet_passage,
            mixing_height,
        };

        match boundary::resolve(&self.field, &query) {
            BoundaryCheck::Exited(reason) => Phase::Removed(reason),
            BoundaryCheck::Clear { position, .. } => self.complete_step(particle, position, pending, ledger, acc),
            BoundaryCheck::Reflected(event) => {
                ledger.reflections += 1;
                pending.reflected = true;
                pending.attempts += 1;

                let sigma = pending.motion.turbulence;
                if event.surface.is_solid() && particle.deposition_cooldown == 0 {
                    let cover = self.field.geometry.vegetation(event.cell);
                    let deposited = boundary::contact_deposit(particle.mass, &particle.deposition, cover, sigma.sigma_w);
                    if deposited > 0.0 {
                        particle.mass -= deposited;
                        ledger.deposited += deposited;
                        acc.add_deposition(particle.source.group, event.position.x, event.position.y, deposited);
                        particle.deposition_cooldown = DEPOSITION_COOLDOWN_STEPS;
                    }
                }
                if self.mass_exhausted(particle) {
                    particle.position = event.position;
                    return Phase::Removed(RemovalReason::MassExhausted);
                }
                if ledger.reflections >= self.reflection_cap {
                    particle.position = boundary::safe_position(&self.field, &particle.position, pending.motion.jet_passage);
                    return Phase::Removed(RemovalReason::ReflectionCap);
                }

                if !pending.motion.jet_passage {
                    particle.velocity = boundary::redraw_velocity(&event.normal, &sigma.as_vector(), rng);
                }
                if pending.attempts >= self.config.caps.reflections_per_step {
                    let safe = boundary::safe_position(&self.field, &particle.position, pending.motion.jet_passage);
                    return self.complete_step(particle, safe, pending, ledger, acc);
                }
                pending.target = event.position;
                Phase::Reflecting(pending)
            }
        }
    }

    /// Accept a position and do the step's bookkeeping
    fn complete_step(
        &mut self,
        particle: &mut Particle,
        position: Vec3,
        pending: PendingStep,
        ledger: &mut Ledger,
        acc: &mut Accumulator,
    ) -> Phase {
        let dt = pending.motion.dt;
        particle.position = position;
        particle.elapsed += dt;

        let weight = particle.mass * dt;
        ledger.exposure += weight;
        if pending.reflected {
            ledger.reflected_exposure += weight;
        } else {
            let height = position.z - self.field.surface_height_at(position.x, position.y);
            let presence = Presence {
                group: particle.source.group,
                position,
                height_above_surface: height,
                weight,
                concentration: particle.deposition.mode.reports_concentration(),
            };
            acc.add_presence(&presence, self.receptors, &mut self.tally);
        }

        let decay_rate = self.config.decay_rate(particle.source.group);
        if decay_rate > 0.0 {
            let lost = particle.mass * (1.0 - (-decay_rate * dt).exp());
            particle.mass -= lost;
            ledger.decayed += lost;
        }
        let washout = self.config.washout_coefficient;
        if washout > 0.0 {
            let lost = particle.mass * (1.0 - (-washout * dt).exp());
            particle.mass -= lost;
            ledger.washed_out += lost;
            if particle.deposition.mode.deposits() {
                acc.add_deposition(particle.source.group, position.x, position.y, lost);
            }
        }
        particle.deposition_cooldown = particle.deposition_cooldown.saturating_sub(1);

        if self.mass_exhausted(particle) {
            Phase::Removed(RemovalReason::MassExhausted)
        } else if particle.time_exhausted() {
            Phase::Removed(RemovalReason::TimeExhausted)
        } else {
            initial_phase(particle)
        }
    }

    fn mass_exhausted(&self, particle: &Particle) -> bool {
        particle.mass <= particle.initial_mass * MASS_EPSILON
    }
}

fn initial_phase(particle: &Particle) -> Phase {
    if particle.motion.is_jet() {
        Phase::JetAdvancing
    } else {
        Phase::Advancing
    }
}

//! Particle state
//!
//! A particle is owned by the worker integrating it and lives for exactly one
//! trajectory. It is created either from a source emission or from mass
//! re-injected out of the transient grid.

use crate::core_types::Vec3;
use crate::grid::FieldSnapshot;
use crate::physics::{PlumeRise, PortalExit, StackExit, TunnelJet};
use crate::simulation::config::DispersionConfig;
use crate::simulation::motion::{self, AmbientMotion, JetMotion, Motion, StepContext};
use crate::sources::{sample_start, DepositionParams, Source, SourceKind, SourceRef};
use rand::RngCore;

#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    /// Global particle index; also selects the random stream
    pub id: u64,
    pub position: Vec3,
    /// Turbulent velocity fluctuation (m/s)
    pub velocity: Vec3,
    pub mass: f64,
    pub initial_mass: f64,
    pub source: SourceRef,
    pub deposition: DepositionParams,
    /// Vertical extension of the emitting line source, if any (m)
    pub traffic_extension: Option<f64>,
    /// Dispersion time covered (s)
    pub elapsed: f64,
    /// Dispersion time available (s)
    pub lifetime: f64,
    /// Steps left before the next surface contact may deposit again
    pub deposition_cooldown: u32,
    /// Created from transient-grid mass
    pub reinjected: bool,
    pub motion: Motion,
}

impl Particle {
    /// New particle released by a source
    ///
    /// # Arguments
    /// * `id` - Global particle index
    /// * `index` - Source index in the catalogue
    /// * `source` - Source with the period's overrides applied
    /// * `mass` - Mass carried by the particle
    pub fn emit<R: RngCore + ?Sized>(
        id: u64,
        index: usize,
        source: &Source,
        mass: f64,
        field: &FieldSnapshot<'_>,
        config: &DispersionConfig,
        rng: &mut R,
    ) -> Self {
        let position = sample_start(source, field, rng);
        let traffic_extension = match source {
            Source::Line(line) => Some(line.vertical_extension),
            _ => None,
        };
        let mut particle = Self {
            id,
            position,
            velocity: Vec3::zeros(),
            mass,
            initial_mass: mass,
            source: SourceRef {
                kind: source.kind(),
                index,
                group: source.group(),
            },
            deposition: source.deposition(),
            traffic_extension,
            elapsed: 0.0,
            lifetime: config.dispersion_time,
            deposition_cooldown: 0,
            reinjected: false,
            motion: Motion::default(),
        };

        let ctx = particle.step_context(field, config);
        particle.velocity = motion::initial_velocity(&ctx, &position, rng);
        particle.motion = match source {
            Source::Point(stack) => {
                let exit = StackExit {
                    diameter: stack.diameter,
                    velocity: stack.exit_velocity,
                    temperature: stack.exit_temperature,
                };
                let wind_speed = motion::wind_speed_at(&ctx, &position);
                Motion::Ambient(AmbientMotion {
                    plume: PlumeRise::new(&exit, config.ambient_temperature, wind_speed),
                })
            }
            Source::Portal(portal) => {
                let exit = PortalExit {
                    start: (portal.x1, portal.y1),
                    end: (portal.x2, portal.y2),
                    velocity: portal.exit_velocity,
                    cross_section: portal.cross_section,
                    temperature_excess: portal.temperature_excess,
                };
                TunnelJet::new(&exit).map_or_else(Motion::default, |jet| Motion::Jet(JetMotion { jet }))
            }
            Source::Line(_) | Source::Area(_) => Motion::default(),
        };
        particle
    }

    /// Particle carrying mass re-injected from the transient grid
    pub fn reinjected<R: RngCore + ?Sized>(
        id: u64,
        position: Vec3,
        mass: f64,
        group: usize,
        deposition: DepositionParams,
        field: &FieldSnapshot<'_>,
        config: &DispersionConfig,
        rng: &mut R,
    ) -> Self {
        let mut particle = Self {
            id,
            position,
            velocity: Vec3::zeros(),
            mass,
            initial_mass: mass,
            source: SourceRef {
                kind: SourceKind::Area,
                index: usize::MAX,
                group,
            },
            deposition,
            traffic_extension: None,
            elapsed: 0.0,
            lifetime: config.dispersion_time,
            deposition_cooldown: 0,
            reinjected: true,
            motion: Motion::default(),
        };
        let ctx = particle.step_context(field, config);
        particle.velocity = motion::initial_velocity(&ctx, &position, rng);
        particle
    }

    /// Inputs of the next motion step
    pub fn step_context<'a>(&self, field: &FieldSnapshot<'a>, config: &DispersionConfig) -> StepContext<'a> {
        StepContext {
            field: *field,
            kind: self.source.kind,
            traffic_extension: self.traffic_extension,
            ambient_temperature: config.ambient_temperature,
            max_wind_speed: config.caps.max_wind_speed,
            remaining_time: (self.lifetime - self.elapsed).max(0.0),
        }
    }

    /// Dispersion time is used up
    pub fn time_exhausted(&self) -> bool {
        self.elapsed >= self.lifetime
    }
}

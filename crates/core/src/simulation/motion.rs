//! Per-step motion strategies
//!
//! A particle moves either with the ambient turbulent flow or, right after
//! leaving a tunnel portal, with the portal's momentum jet. Both strategies
//! share one interface: given the current position and turbulent velocity they
//! update the velocity and propose the next position. Boundary resolution
//! happens afterwards in the integrator.
//!
//! Ambient time steps are bounded by a fraction of the vertical Lagrangian
//! time scale and by Courant-like limits on the horizontal and vertical cell
//! sizes:
//!
//! ```text
//! dt = min(0.2 T_Lw, 0.5 min(Δx, Δy) / (|U| + 2σh), 0.5 Δz / (|W| + 2σw))   ∈ [0.1 s, 4 s]
//! ```

use crate::boundary::wall_velocity_bias;
use crate::core_types::rng::{clamped_gaussian, JET_ABANDON_CLAMP, STANDARD_CLAMP};
use crate::core_types::Vec3;
use crate::grid::{Cell, FieldSnapshot, StabilityParams};
use crate::physics::turbulence::{self, VerticalProfile, VELOCITY_LIMIT_SIGMAS};
use crate::physics::tunnel_jet::{JetExtinction, TunnelJet, JET_TURBULENCE_INTENSITY};
use crate::physics::PlumeRise;
use crate::sources::SourceKind;
use rand::RngCore;

/// Smallest ambient step (s)
pub const AMBIENT_DT_MIN: f64 = 0.1;
/// Largest ambient step (s)
pub const AMBIENT_DT_MAX: f64 = 4.0;

/// Read-only inputs of one motion step
#[derive(Clone, Copy)]
pub struct StepContext<'a> {
    pub field: FieldSnapshot<'a>,
    pub kind: SourceKind,
    /// Vertical extension of a line source, enabling traffic turbulence
    pub traffic_extension: Option<f64>,
    pub ambient_temperature: f64,
    /// Wind speeds above this are clamped (m/s)
    pub max_wind_speed: f64,
    /// Dispersion time left to the particle (s)
    pub remaining_time: f64,
}

/// Local turbulence standard deviations of a step (m/s)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalTurbulence {
    pub sigma_u: f64,
    pub sigma_v: f64,
    pub sigma_w: f64,
}

impl LocalTurbulence {
    pub fn as_vector(&self) -> Vec3 {
        Vec3::new(self.sigma_u, self.sigma_v, self.sigma_w)
    }
}

/// Result of one motion step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionStep {
    /// Position before boundary resolution
    pub proposed: Vec3,
    /// Step duration (s)
    pub dt: f64,
    pub turbulence: LocalTurbulence,
    /// Interpolated wind exceeded the plausibility limit and was clamped
    pub unrealistic_wind: bool,
    /// Particle was carried by a tunnel jet during this step
    pub jet_passage: bool,
    /// A plume rise was still active during this step
    pub plume_active: bool,
}

/// Motion under ambient turbulence, optionally with a rising plume
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AmbientMotion {
    pub plume: Option<PlumeRise>,
}

/// Motion inside a tunnel jet
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JetMotion {
    pub jet: TunnelJet,
}

/// Motion strategy of a particle
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Motion {
    Ambient(AmbientMotion),
    Jet(JetMotion),
}

impl Default for Motion {
    fn default() -> Self {
        Motion::Ambient(AmbientMotion::default())
    }
}

/// Mean wind and turbulence at a position
struct LocalFlow {
    cell: Cell,
    mean: Vec3,
    speed: f64,
    level_thickness: f64,
    stability: StabilityParams,
    profile: VerticalProfile,
    sigma_h: (f64, f64),
    unrealistic_wind: bool,
}

fn local_flow(ctx: &StepContext<'_>, position: &Vec3, jet_passage: bool) -> LocalFlow {
    let field = &ctx.field;
    let cell = field.grid.cell_of_clamped(position.x, position.y);
    let top = field.geometry.solid_top(cell, jet_passage);
    let height = (position.z - top).max(0.0);

    let sample = field.wind.interpolate_wind(cell, top, position);
    let mut mean = sample.velocity;
    let mut speed = mean.x.hypot(mean.y);
    let unrealistic_wind = speed > ctx.max_wind_speed;
    if unrealistic_wind {
        let scale = ctx.max_wind_speed / speed;
        mean.x *= scale;
        mean.y *= scale;
        speed = ctx.max_wind_speed;
    }

    let stability = field.wind.stability_at(position.x, position.y);
    let profile = turbulence::vertical_profile(&stability, height);
    let extra = ctx
        .traffic_extension
        .map_or(0.0, |ext| turbulence::traffic_variance(height, ext));
    let sigma_h = field
        .wind
        .standard_deviations(ctx.kind, &stability, height, speed, extra);

    LocalFlow {
        cell,
        mean,
        speed,
        level_thickness: field.grid.level_thickness(sample.level),
        stability,
        profile,
        sigma_h,
        unrealistic_wind,
    }
}

/// Initial turbulent velocity of a new particle, drawn from the local σ (±2σ)
pub fn initial_velocity<R: RngCore + ?Sized>(ctx: &StepContext<'_>, position: &Vec3, rng: &mut R) -> Vec3 {
    let flow = local_flow(ctx, position, false);
    Vec3::new(
        flow.sigma_h.0 * clamped_gaussian(rng, STANDARD_CLAMP),
        flow.sigma_h.1 * clamped_gaussian(rng, STANDARD_CLAMP),
        flow.profile.sigma_w * clamped_gaussian(rng, STANDARD_CLAMP),
    )
}

/// Horizontal wind speed at a position (m/s), used to bend new plumes
pub fn wind_speed_at(ctx: &StepContext<'_>, position: &Vec3) -> f64 {
    local_flow(ctx, position, false).speed
}

impl Motion {
    /// Whether the particle is still carried by a jet
    pub fn is_jet(&self) -> bool {
        matches!(self, Motion::Jet(_))
    }

    /// Whether a plume rise is still active
    pub fn has_plume(&self) -> bool {
        matches!(self, Motion::Ambient(AmbientMotion { plume: Some(_) }))
    }

    /// Update the turbulent velocity and propose the next position
    pub fn advance<R: RngCore + ?Sized>(
        &mut self,
        position: &Vec3,
        velocity: &mut Vec3,
        ctx: &StepContext<'_>,
        rng: &mut R,
    ) -> MotionStep {
        match self {
            Motion::Ambient(ambient) => ambient.advance(position, velocity, ctx, rng),
            Motion::Jet(jet) => {
                let (step, extinction) = jet.advance(position, velocity, ctx, rng);
                if let Some(extinction) = extinction {
                    if extinction == JetExtinction::OppositeLane {
                        let flow = local_flow(ctx, position, false);
                        *velocity = Vec3::new(
                            flow.sigma_h.0 * clamped_gaussian(rng, JET_ABANDON_CLAMP),
                            flow.sigma_h.1 * clamped_gaussian(rng, JET_ABANDON_CLAMP),
                            flow.profile.sigma_w * clamped_gaussian(rng, JET_ABANDON_CLAMP),
                        );
                    }
                    *self = Motion::Ambient(AmbientMotion::default());
                }
                step
            }
        }
    }
}

impl AmbientMotion {
    fn advance<R: RngCore + ?Sized>(
        &mut self,
        position: &Vec3,
        velocity: &mut Vec3,
        ctx: &StepContext<'_>,
        rng: &mut R,
    ) -> MotionStep {
        let grid = ctx.field.grid;
        let flow = local_flow(ctx, position, false);
        let sigma_w = flow.profile.sigma_w;
        let (sigma_u, sigma_v) = flow.sigma_h;

        let dt = (0.2 * flow.profile.time_scale)
            .min(0.5 * grid.dx.min(grid.dy) / (flow.speed + 2.0 * sigma_u.max(sigma_v)))
            .min(0.5 * flow.level_thickness / (flow.mean.z.abs() + 2.0 * sigma_w))
            .clamp(AMBIENT_DT_MIN, AMBIENT_DT_MAX)
            .min(ctx.remaining_time.max(0.0));

        let height = (position.z - ctx.field.geometry.building_height(flow.cell)).max(0.0);
        let drift = turbulence::vertical_drift(&flow.stability, height);
        velocity.z = turbulence::vertical_step(velocity.z, &drift, &flow.profile, dt, rng);
        let time_scale_h = turbulence::horizontal_time_scale(sigma_u.max(sigma_v), flow.profile.dissipation);
        let (u, v) = turbulence::horizontal_step(
            velocity.x,
            velocity.y,
            sigma_u,
            sigma_v,
            time_scale_h,
            flow.speed,
            dt,
            rng,
        );
        velocity.x = u;
        velocity.y = v;

        let bias = wall_velocity_bias(&ctx.field, position, flow.cell, sigma_u.max(sigma_v), sigma_w);
        *velocity += bias;
        let limit = VELOCITY_LIMIT_SIGMAS * Vec3::new(sigma_u, sigma_v, sigma_w);
        for axis in 0..3 {
            velocity[axis] = velocity[axis].clamp(-limit[axis], limit[axis]);
        }

        let mut rise = 0.0;
        let plume_active = self.plume.is_some();
        if self
            .plume
            .as_ref()
            .is_some_and(|p| p.is_finished(flow.profile.dissipation))
        {
            self.plume = None;
        }
        if let Some(plume) = &mut self.plume {
            let n_squared = flow.stability.brunt_vaisala_squared(ctx.ambient_temperature);
            rise = plume.advance(dt, n_squared);
        }

        let proposed = position + (flow.mean + *velocity) * dt + Vec3::new(0.0, 0.0, rise);

        MotionStep {
            proposed,
            dt,
            turbulence: LocalTurbulence {
                sigma_u,
                sigma_v,
                sigma_w,
            },
            unrealistic_wind: flow.unrealistic_wind,
            jet_passage: false,
            plume_active,
        }
    }
}

impl JetMotion {
    fn advance<R: RngCore + ?Sized>(
        &mut self,
        position: &Vec3,
        velocity: &mut Vec3,
        ctx: &StepContext<'_>,
        rng: &mut R,
    ) -> (MotionStep, Option<JetExtinction>) {
        let flow = local_flow(ctx, position, true);
        let dt = self.jet.time_step().min(ctx.remaining_time.max(0.0));

        let mut extinction = self.jet.advance(&flow.mean, dt);
        if ctx.field.geometry.is_opposite_lane(flow.cell) {
            extinction = Some(JetExtinction::OppositeLane);
        }

        let sigma = JET_TURBULENCE_INTENSITY * self.jet.speed();
        *velocity = Vec3::new(
            sigma * clamped_gaussian(rng, STANDARD_CLAMP),
            sigma * clamped_gaussian(rng, STANDARD_CLAMP),
            sigma * clamped_gaussian(rng, STANDARD_CLAMP),
        );
        let centre = self.jet.centreline_velocity(&flow.mean, ctx.ambient_temperature);
        let proposed = position + (centre + *velocity) * dt;

        let step = MotionStep {
            proposed,
            dt,
            turbulence: LocalTurbulence {
                sigma_u: sigma.max(flow.sigma_h.0),
                sigma_v: sigma.max(flow.sigma_h.1),
                sigma_w: sigma.max(flow.profile.sigma_w),
            },
            unrealistic_wind: flow.unrealistic_wind,
            jet_passage: true,
            plume_active: false,
        };
        (step, extinction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::ParticleRng;
    use crate::grid::{FlowGrid, GriddedWindField, StabilityField, Topography};
    use crate::physics::{PortalExit, StackExit};

    struct Scene {
        grid: FlowGrid,
        topo: Topography,
        wind: GriddedWindField,
    }

    impl Scene {
        fn new(wind: Vec3) -> Self {
            let grid = FlowGrid::uniform(0.0, 0.0, 10.0, 10.0, 40, 40, 0.0, 2.0, 50);
            let topo = Topography::flat(&grid, 0.0);
            let wind = GriddedWindField::uniform(&grid, wind, StabilityField::Global(StabilityParams::default()));
            Self { grid, topo, wind }
        }

        fn ctx(&self, remaining_time: f64) -> StepContext<'_> {
            StepContext {
                field: FieldSnapshot::new(&self.grid, &self.wind, &self.topo),
                kind: SourceKind::Point,
                traffic_extension: None,
                ambient_temperature: 283.15,
                max_wind_speed: 55.0,
                remaining_time,
            }
        }
    }

    #[test]
    fn test_ambient_step_is_clamped() {
        let scene = Scene::new(Vec3::new(3.0, 0.0, 0.0));
        let mut motion = Motion::default();
        let mut velocity = Vec3::zeros();
        let mut rng = ParticleRng::for_particle(1, 1);
        let step = motion.advance(&Vec3::new(100.0, 100.0, 20.0), &mut velocity, &scene.ctx(600.0), &mut rng);
        assert!(step.dt >= AMBIENT_DT_MIN && step.dt <= AMBIENT_DT_MAX);
        assert!(!step.jet_passage);
        // Mean transport dominates over one step
        assert!(step.proposed.x > 100.0);
    }

    #[test]
    fn test_wall_bias_enters_turbulent_velocity() {
        let mut scene = Scene::new(Vec3::zeros());
        scene.topo = Topography::flat(&scene.grid, 0.0).with_building(&scene.grid, 11..12, 0..40, 60.0);
        let position = Vec3::new(109.5, 105.0, 5.0);
        let n: u32 = 2000;
        let mean_u = |scene: &Scene, seed: u64| {
            (0..n)
                .map(|id| {
                    let mut motion = Motion::default();
                    let mut velocity = Vec3::zeros();
                    let mut rng = ParticleRng::for_particle(seed, u64::from(id));
                    motion.advance(&position, &mut velocity, &scene.ctx(600.0), &mut rng);
                    velocity.x
                })
                .sum::<f64>()
                / f64::from(n)
        };
        let walled = mean_u(&scene, 7);
        scene.topo = Topography::flat(&scene.grid, 0.0);
        let open = mean_u(&scene, 7);
        // Same draws, so the difference is the bias towards -x
        assert!(walled < open - 0.05, "walled {walled}, open {open}");
    }

    #[test]
    fn test_step_truncated_to_remaining_time() {
        let scene = Scene::new(Vec3::new(3.0, 0.0, 0.0));
        let mut motion = Motion::default();
        let mut velocity = Vec3::zeros();
        let mut rng = ParticleRng::for_particle(1, 2);
        let step = motion.advance(&Vec3::new(100.0, 100.0, 20.0), &mut velocity, &scene.ctx(0.03), &mut rng);
        assert_eq!(step.dt, 0.03);
    }

    #[test]
    fn test_unrealistic_wind_is_clamped() {
        let scene = Scene::new(Vec3::new(80.0, 0.0, 0.0));
        let mut motion = Motion::default();
        let mut velocity = Vec3::zeros();
        let mut rng = ParticleRng::for_particle(1, 3);
        let step = motion.advance(&Vec3::new(100.0, 100.0, 20.0), &mut velocity, &scene.ctx(600.0), &mut rng);
        assert!(step.unrealistic_wind);
        assert!(step.proposed.x - 100.0 < (55.0 + 10.0) * step.dt);
    }

    #[test]
    fn test_plume_lifts_particle_and_finishes() {
        let scene = Scene::new(Vec3::new(3.0, 0.0, 0.0));
        let exit = StackExit {
            diameter: 2.0,
            velocity: 15.0,
            temperature: 420.0,
        };
        let plume = PlumeRise::new(&exit, 283.15, 3.0).unwrap();
        let mut motion = Motion::Ambient(AmbientMotion { plume: Some(plume) });
        let mut velocity = Vec3::zeros();
        let mut rng = ParticleRng::for_particle(2, 0);
        let mut position = Vec3::new(50.0, 200.0, 30.0);
        let start = position.z;
        let mut steps = 0;
        while motion.has_plume() && steps < 10_000 {
            let step = motion.advance(&position, &mut velocity, &scene.ctx(600.0), &mut rng);
            position = step.proposed;
            position.z = position.z.clamp(1.0, 95.0);
            steps += 1;
        }
        assert!(!motion.has_plume());
        assert!(position.z > start);
    }

    #[test]
    fn test_jet_extinguishes_into_ambient() {
        let scene = Scene::new(Vec3::new(1.0, 0.0, 0.0));
        let jet = TunnelJet::new(&PortalExit {
            start: (100.0, 110.0),
            end: (100.0, 90.0),
            velocity: 6.0,
            cross_section: 50.0,
            temperature_excess: 0.0,
        })
        .unwrap();
        let mut motion = Motion::Jet(JetMotion { jet });
        let mut velocity = Vec3::zeros();
        let mut rng = ParticleRng::for_particle(4, 0);
        let mut position = Vec3::new(100.0, 100.0, 3.0);
        let mut steps = 0;
        while motion.is_jet() && steps < 100_000 {
            let step = motion.advance(&position, &mut velocity, &scene.ctx(600.0), &mut rng);
            assert!(step.dt <= 0.5);
            position = step.proposed;
            position.z = position.z.max(0.1);
            steps += 1;
        }
        assert!(!motion.is_jet());
    }

    #[test]
    fn test_opposite_lane_forces_extinction() {
        let mut scene = Scene::new(Vec3::new(1.0, 0.0, 0.0));
        scene.topo = Topography::flat(&scene.grid, 0.0).with_opposite_lane(Cell::new(10, 10));
        let jet = TunnelJet::new(&PortalExit {
            start: (100.0, 110.0),
            end: (100.0, 90.0),
            velocity: 6.0,
            cross_section: 50.0,
            temperature_excess: 0.0,
        })
        .unwrap();
        let mut motion = Motion::Jet(JetMotion { jet });
        let mut velocity = Vec3::zeros();
        let mut rng = ParticleRng::for_particle(4, 1);
        let step = motion.advance(&Vec3::new(105.0, 105.0, 3.0), &mut velocity, &scene.ctx(600.0), &mut rng);
        assert!(step.jet_passage);
        assert!(!motion.is_jet());
    }
}

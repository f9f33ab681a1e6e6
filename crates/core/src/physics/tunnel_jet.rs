//! Momentum jet leaving a tunnel portal
//!
//! Exhaust leaves a road tunnel as a horizontal jet perpendicular to the portal.
//! While the jet is faster than the ambient flow along its axis, particles follow
//! the jet centreline instead of the ambient wind:
//!
//! ```text
//! dV/dt = -K (V - Va) t / b²      K = 0.05 V₀²
//! b     = b₀ √(V₀ / V)            mass continuity, capped at 10 b₀
//! ΔT    = ΔT₀ (b₀ / b)²           dilution of the temperature excess
//! ```
//!
//! The jet bends with the crosswind component of the ambient flow and rises
//! with its buoyancy. It extinguishes once its speed has relaxed to the ambient
//! speed along the axis or drops to (almost) zero; the particle then continues
//! under ambient turbulence.
//!
//! # References
//!
//! - Oettl, D., Sturm, P.J., Almbauer, R. (2005). "Evaluation of GRAL for the
//!   pollutant dispersion from a city street tunnel portal at depressed level."
//!   Environmental Modelling & Software, 20, 499-504.
//! - Öttl, D., Sturm, P.J., Bacher, M., Pretterhofer, G., Almbauer, R.A. (2002).
//!   "A simple model for the dispersion of pollutants from a road tunnel portal."
//!   Atmospheric Environment, 36, 2943-2953.

use crate::core_types::Vec3;
use crate::grid::stability::GRAVITY;

/// Jet step duration bounds (s)
pub const JET_DT_MIN: f64 = 0.05;
pub const JET_DT_MAX: f64 = 0.5;

/// Relative strength of entrainment deceleration
const ENTRAINMENT_COEFFICIENT: f64 = 0.05;

/// The jet is extinguished when it is no faster than ambient plus this (m/s)
const EXTINCTION_MARGIN: f64 = 0.1;

/// Absolute speed below which the jet is extinguished (m/s)
const MIN_JET_SPEED: f64 = 0.05;

/// Upper bound of the jet half-width as multiple of its initial value
const MAX_WIDENING: f64 = 10.0;

/// Relative standard deviation of velocity fluctuations inside the jet
pub const JET_TURBULENCE_INTENSITY: f64 = 0.1;

/// Tunnel portal exit conditions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortalExit {
    /// First endpoint of the portal segment `(x, y)`
    pub start: (f64, f64),
    /// Second endpoint of the portal segment `(x, y)`
    pub end: (f64, f64),
    /// Exit velocity (m/s)
    pub velocity: f64,
    /// Cross-section of the tunnel (m²)
    pub cross_section: f64,
    /// Temperature excess of the exhaust over ambient air (K)
    pub temperature_excess: f64,
}

/// Why a jet stopped carrying its particle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JetExtinction {
    /// Relaxed to the ambient flow or stalled
    Relaxed,
    /// Entered the opposite carriageway
    OppositeLane,
}

/// State of a tunnel jet carried by one particle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TunnelJet {
    direction: Vec3,
    initial_speed: f64,
    speed: f64,
    initial_width: f64,
    width: f64,
    initial_temperature_excess: f64,
    age: f64,
}

impl TunnelJet {
    /// Jet leaving the portal, or `None` without exit momentum
    ///
    /// The jet axis points to the right of the segment from `start` to `end`.
    pub fn new(exit: &PortalExit) -> Option<Self> {
        let (dx, dy) = (exit.end.0 - exit.start.0, exit.end.1 - exit.start.1);
        let length = dx.hypot(dy);
        if exit.velocity <= 0.0 || length <= 0.0 {
            return None;
        }
        let direction = Vec3::new(dy / length, -dx / length, 0.0);
        let width = (exit.cross_section.max(1.0) / std::f64::consts::PI).sqrt();
        Some(Self {
            direction,
            initial_speed: exit.velocity,
            speed: exit.velocity,
            initial_width: width,
            width,
            initial_temperature_excess: exit.temperature_excess.max(0.0),
            age: 0.0,
        })
    }

    /// Unit vector of the jet axis
    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    /// Centreline speed (m/s)
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Half-width (m)
    pub fn width(&self) -> f64 {
        self.width
    }

    /// Temperature excess over ambient (K)
    pub fn temperature_excess(&self) -> f64 {
        let ratio = self.initial_width / self.width;
        self.initial_temperature_excess * ratio * ratio
    }

    /// Step duration resolving the jet width
    pub fn time_step(&self) -> f64 {
        (0.25 * self.width / self.speed.max(MIN_JET_SPEED)).clamp(JET_DT_MIN, JET_DT_MAX)
    }

    /// Ambient speed along the jet axis, never negative (m/s)
    pub fn ambient_axial_speed(&self, ambient: &Vec3) -> f64 {
        ambient.dot(&self.direction).max(0.0)
    }

    /// Decelerate the jet over one step
    ///
    /// Returns `Some(JetExtinction::Relaxed)` once the jet no longer carries its
    /// particle.
    pub fn advance(&mut self, ambient: &Vec3, dt: f64) -> Option<JetExtinction> {
        let va = self.ambient_axial_speed(ambient);
        self.age += dt;
        let k = ENTRAINMENT_COEFFICIENT * self.initial_speed * self.initial_speed;
        let decel = k * (self.speed - va) * self.age / (self.width * self.width);
        self.speed = (self.speed - decel * dt).max(0.0);
        self.width = if self.speed > 0.0 {
            (self.initial_width * (self.initial_speed / self.speed).sqrt())
                .min(MAX_WIDENING * self.initial_width)
        } else {
            MAX_WIDENING * self.initial_width
        };

        if self.speed <= va + EXTINCTION_MARGIN || self.speed <= MIN_JET_SPEED {
            Some(JetExtinction::Relaxed)
        } else {
            None
        }
    }

    /// Mean centreline velocity including crosswind bending and buoyant lift
    pub fn centreline_velocity(&self, ambient: &Vec3, ambient_temperature: f64) -> Vec3 {
        let axial = ambient.dot(&self.direction);
        let crosswind = Vec3::new(ambient.x - axial * self.direction.x, ambient.y - axial * self.direction.y, 0.0);
        let lift = 0.5 * (GRAVITY * self.width * self.temperature_excess() / ambient_temperature.max(200.0)).sqrt();
        self.direction * self.speed + crosswind + Vec3::new(0.0, 0.0, lift)
    }
}

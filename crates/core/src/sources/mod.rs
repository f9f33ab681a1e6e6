//! Emission sources
//!
//! Four source geometries release particles:
//!
//! - [`PointSource`]: stacks, optionally with buoyant plume rise
//! - [`PortalSource`]: road tunnel portals, optionally with a momentum jet
//! - [`LineSource`]: road segments with a width and a vertical mixing extension
//! - [`AreaSource`]: boxes of given horizontal and vertical extent
//!
//! Every source belongs to a source group (results are reported per group) and
//! carries the deposition parameters of its pollutant. Heights are relative to
//! the terrain below the source.

pub mod catalogue;
pub mod sampling;

pub use catalogue::{PeriodOverride, SourceCatalogue};
pub use sampling::sample_start;

use serde::{Deserialize, Serialize};

/// Source geometry type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Point,
    Portal,
    Line,
    Area,
}

/// How a pollutant interacts with surfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepositionMode {
    /// Gas without deposition
    #[default]
    None,
    /// Fine particles: concentration and deposition are both computed
    ConcentrationAndDeposition,
    /// Coarse particles: only deposition is reported
    DepositionOnly,
}

impl DepositionMode {
    /// Mass can be transferred to the deposition grid
    pub fn deposits(self) -> bool {
        !matches!(self, DepositionMode::None)
    }

    /// Particle contributes to concentration grids and receptors
    pub fn reports_concentration(self) -> bool {
        !matches!(self, DepositionMode::DepositionOnly)
    }
}

/// Deposition properties of a pollutant
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DepositionParams {
    /// Sedimentation velocity (m/s)
    pub settling_velocity: f64,
    /// Dry deposition velocity (m/s)
    pub deposition_velocity: f64,
    pub mode: DepositionMode,
}

/// Source a particle was released from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceRef {
    pub kind: SourceKind,
    /// Index into the source catalogue
    pub index: usize,
    /// Source group
    pub group: usize,
}

/// Stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointSource {
    pub x: f64,
    pub y: f64,
    /// Release height above terrain (m)
    pub height: f64,
    /// Emission rate (mass/s)
    pub emission_rate: f64,
    /// Inner stack diameter (m)
    #[serde(default)]
    pub diameter: f64,
    /// Exit velocity (m/s)
    #[serde(default)]
    pub exit_velocity: f64,
    /// Exit temperature (K)
    #[serde(default)]
    pub exit_temperature: f64,
    #[serde(default)]
    pub group: usize,
    #[serde(default)]
    pub deposition: DepositionParams,
}

/// Tunnel portal
///
/// The portal opening spans the segment from `(x1, y1)` to `(x2, y2)`; the
/// exhaust leaves to the right of that direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortalSource {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    /// Lower edge of the opening above terrain (m)
    #[serde(default)]
    pub base_height: f64,
    /// Height of the opening (m)
    pub height: f64,
    /// Tunnel cross-section (m²)
    pub cross_section: f64,
    /// Exit velocity of the tunnel air (m/s)
    #[serde(default)]
    pub exit_velocity: f64,
    /// Temperature excess of the tunnel air over ambient (K)
    #[serde(default)]
    pub temperature_excess: f64,
    pub emission_rate: f64,
    #[serde(default)]
    pub group: usize,
    #[serde(default)]
    pub deposition: DepositionParams,
}

/// Road segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineSource {
    pub x1: f64,
    pub y1: f64,
    /// Height above terrain at the first endpoint (m)
    #[serde(default)]
    pub z1: f64,
    pub x2: f64,
    pub y2: f64,
    /// Height above terrain at the second endpoint (m)
    #[serde(default)]
    pub z2: f64,
    /// Road width (m)
    pub width: f64,
    /// Initial vertical mixing depth from vehicle wakes (m)
    #[serde(default)]
    pub vertical_extension: f64,
    pub emission_rate: f64,
    #[serde(default)]
    pub group: usize,
    #[serde(default)]
    pub deposition: DepositionParams,
}

/// Box-shaped source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaSource {
    /// Centre x (m)
    pub x: f64,
    /// Centre y (m)
    pub y: f64,
    /// Lower edge above terrain (m)
    #[serde(default)]
    pub z: f64,
    pub extent_x: f64,
    pub extent_y: f64,
    /// Vertical extent above `z` (m)
    #[serde(default)]
    pub extent_z: f64,
    pub emission_rate: f64,
    #[serde(default)]
    pub group: usize,
    #[serde(default)]
    pub deposition: DepositionParams,
}

/// Any emission source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Source {
    Point(PointSource),
    Portal(PortalSource),
    Line(LineSource),
    Area(AreaSource),
}

impl Source {
    pub fn kind(&self) -> SourceKind {
        match self {
            Source::Point(_) => SourceKind::Point,
            Source::Portal(_) => SourceKind::Portal,
            Source::Line(_) => SourceKind::Line,
            Source::Area(_) => SourceKind::Area,
        }
    }

    /// Emission rate (mass/s)
    pub fn emission_rate(&self) -> f64 {
        match self {
            Source::Point(s) => s.emission_rate,
            Source::Portal(s) => s.emission_rate,
            Source::Line(s) => s.emission_rate,
            Source::Area(s) => s.emission_rate,
        }
    }

    pub fn group(&self) -> usize {
        match self {
            Source::Point(s) => s.group,
            Source::Portal(s) => s.group,
            Source::Line(s) => s.group,
            Source::Area(s) => s.group,
        }
    }

    pub fn deposition(&self) -> DepositionParams {
        match self {
            Source::Point(s) => s.deposition,
            Source::Portal(s) => s.deposition,
            Source::Line(s) => s.deposition,
            Source::Area(s) => s.deposition,
        }
    }

    /// Representative horizontal position (centre of the geometry)
    pub fn anchor(&self) -> (f64, f64) {
        match self {
            Source::Point(s) => (s.x, s.y),
            Source::Portal(s) => (0.5 * (s.x1 + s.x2), 0.5 * (s.y1 + s.y2)),
            Source::Line(s) => (0.5 * (s.x1 + s.x2), 0.5 * (s.y1 + s.y2)),
            Source::Area(s) => (s.x, s.y),
        }
    }
}

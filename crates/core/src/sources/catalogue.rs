//! Source catalogue with per-period overrides
//!
//! Sources are static; exit velocity and temperature of stacks and portals may
//! change per meteorological period (e.g. from traffic-dependent ventilation
//! time series). Overrides are applied on top of the static values when a
//! source is queried.

use crate::error::ConfigError;
use crate::sources::{DepositionParams, Source};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Time-series values for one source and one period
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PeriodOverride {
    /// Exit velocity (m/s)
    pub exit_velocity: Option<f64>,
    /// Exit temperature of stacks (K) or temperature excess of portals (K)
    pub exit_temperature: Option<f64>,
}

/// Validated collection of emission sources
#[derive(Debug, Clone, Default)]
pub struct SourceCatalogue {
    sources: Vec<Source>,
    overrides: FxHashMap<usize, PeriodOverride>,
}

impl SourceCatalogue {
    /// Build a catalogue
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] for negative or non-finite emission rates,
    /// negative deposition velocities, or degenerate source geometry.
    pub fn new(sources: Vec<Source>) -> Result<Self, ConfigError> {
        for (index, source) in sources.iter().enumerate() {
            validate_source(index, source)?;
        }
        Ok(Self {
            sources,
            overrides: FxHashMap::default(),
        })
    }

    /// Load sources from a JSON array
    ///
    /// # Errors
    /// Returns [`ConfigError::Io`] or [`ConfigError::Parse`] when the file cannot
    /// be read or parsed, and the validation errors of [`SourceCatalogue::new`].
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.as_ref().display())))?;
        let sources: Vec<Source> =
            serde_json::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::new(sources)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    /// Source with the current period's overrides applied
    pub fn effective(&self, index: usize) -> Option<Source> {
        let mut source = self.sources.get(index)?.clone();
        if let Some(o) = self.overrides.get(&index) {
            match &mut source {
                Source::Point(s) => {
                    if let Some(v) = o.exit_velocity {
                        s.exit_velocity = v;
                    }
                    if let Some(t) = o.exit_temperature {
                        s.exit_temperature = t;
                    }
                }
                Source::Portal(s) => {
                    if let Some(v) = o.exit_velocity {
                        s.exit_velocity = v;
                    }
                    if let Some(t) = o.exit_temperature {
                        s.temperature_excess = t;
                    }
                }
                Source::Line(_) | Source::Area(_) => {}
            }
        }
        Some(source)
    }

    /// Replace the overrides with those of a new period
    pub fn apply_period(&mut self, overrides: impl IntoIterator<Item = (usize, PeriodOverride)>) {
        self.overrides.clear();
        self.overrides
            .extend(overrides.into_iter().filter(|(index, _)| *index < self.sources.len()));
    }

    /// Number of source groups (highest group index + 1)
    pub fn group_count(&self) -> usize {
        self.sources.iter().map(|s| s.group() + 1).max().unwrap_or(0)
    }

    /// Total emission rate over all sources (mass/s)
    pub fn total_emission_rate(&self) -> f64 {
        self.sources.iter().map(Source::emission_rate).sum()
    }

    /// Split a particle budget between sources in proportion to emission rate
    ///
    /// Largest-remainder apportionment: the counts sum to exactly `total`
    /// whenever any source emits.
    pub fn apportion(&self, total: usize) -> Vec<usize> {
        let total_rate = self.total_emission_rate();
        if total_rate <= 0.0 {
            return vec![0; self.sources.len()];
        }
        let quotas: Vec<f64> = self
            .sources
            .iter()
            .map(|s| s.emission_rate() / total_rate * total as f64)
            .collect();
        let mut counts: Vec<usize> = quotas.iter().map(|q| q.floor() as usize).collect();
        let assigned: usize = counts.iter().sum();

        let mut order: Vec<usize> = (0..quotas.len()).collect();
        // Ties go to the lower index
        order.sort_by(|&a, &b| {
            let ra = quotas[a] - quotas[a].floor();
            let rb = quotas[b] - quotas[b].floor();
            rb.total_cmp(&ra).then(a.cmp(&b))
        });
        for &index in order.iter().take(total.saturating_sub(assigned)) {
            counts[index] += 1;
        }
        counts
    }

    /// Mass carried by each particle of a source over one dispersion period
    pub fn particle_mass(&self, index: usize, particles: usize, dispersion_time: f64) -> f64 {
        if particles == 0 {
            return 0.0;
        }
        self.sources
            .get(index)
            .map_or(0.0, |s| s.emission_rate() * dispersion_time / particles as f64)
    }

    /// Deposition parameters of a source group (those of its first source)
    pub fn group_deposition(&self, group: usize) -> DepositionParams {
        self.sources
            .iter()
            .find(|s| s.group() == group)
            .map(Source::deposition)
            .unwrap_or_default()
    }
}

fn validate_source(index: usize, source: &Source) -> Result<(), ConfigError> {
    let rate = source.emission_rate();
    if !rate.is_finite() || rate < 0.0 {
        return Err(ConfigError::invalid(
            "sources",
            format!("source {index}: emission rate {rate} must be finite and non-negative"),
        ));
    }
    let dep = source.deposition();
    if dep.settling_velocity < 0.0 || dep.deposition_velocity < 0.0 {
        return Err(ConfigError::invalid(
            "sources",
            format!("source {index}: deposition velocities must be non-negative"),
        ));
    }
    let degenerate = match source {
        Source::Point(s) => s.height < 0.0 || s.diameter < 0.0,
        Source::Portal(s) => {
            (s.x1 == s.x2 && s.y1 == s.y2) || s.height <= 0.0 || s.cross_section < 0.0
        }
        Source::Line(s) => (s.x1 == s.x2 && s.y1 == s.y2) || s.width < 0.0,
        Source::Area(s) => s.extent_x <= 0.0 || s.extent_y <= 0.0 || s.extent_z < 0.0,
    };
    if degenerate {
        return Err(ConfigError::invalid(
            "sources",
            format!("source {index}: degenerate {:?} geometry", source.kind()),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{AreaSource, PointSource, PortalSource};

    fn point(rate: f64, group: usize) -> Source {
        Source::Point(PointSource {
            x: 0.0,
            y: 0.0,
            height: 10.0,
            emission_rate: rate,
            diameter: 1.0,
            exit_velocity: 5.0,
            exit_temperature: 350.0,
            group,
            deposition: DepositionParams::default(),
        })
    }

    #[test]
    fn test_apportion_sums_to_total() {
        let cat = SourceCatalogue::new(vec![point(1.0, 0), point(1.0, 0), point(1.0, 1)]).unwrap();
        let counts = cat.apportion(100);
        assert_eq!(counts.iter().sum::<usize>(), 100);
        assert_eq!(counts, vec![34, 33, 33]);
        assert_eq!(cat.group_count(), 2);
    }

    #[test]
    fn test_apportion_without_emission() {
        let cat = SourceCatalogue::new(vec![point(0.0, 0)]).unwrap();
        assert_eq!(cat.apportion(10), vec![0]);
    }

    #[test]
    fn test_particle_mass() {
        let cat = SourceCatalogue::new(vec![point(2.0, 0)]).unwrap();
        assert!((cat.particle_mass(0, 100, 600.0) - 12.0).abs() < 1e-12);
        assert_eq!(cat.particle_mass(0, 0, 600.0), 0.0);
    }

    #[test]
    fn test_period_overrides() {
        let portal = Source::Portal(PortalSource {
            x1: 0.0,
            y1: 0.0,
            x2: 0.0,
            y2: 8.0,
            base_height: 0.0,
            height: 5.0,
            cross_section: 40.0,
            exit_velocity: 4.0,
            temperature_excess: 2.0,
            emission_rate: 1.0,
            group: 0,
            deposition: DepositionParams::default(),
        });
        let mut cat = SourceCatalogue::new(vec![point(1.0, 0), portal]).unwrap();
        cat.apply_period([
            (
                0,
                PeriodOverride {
                    exit_velocity: Some(12.0),
                    exit_temperature: None,
                },
            ),
            (
                1,
                PeriodOverride {
                    exit_velocity: None,
                    exit_temperature: Some(7.0),
                },
            ),
            (9, PeriodOverride::default()),
        ]);
        match cat.effective(0) {
            Some(Source::Point(s)) => {
                assert_eq!(s.exit_velocity, 12.0);
                assert_eq!(s.exit_temperature, 350.0);
            }
            other => panic!("unexpected {other:?}"),
        }
        match cat.effective(1) {
            Some(Source::Portal(s)) => assert_eq!(s.temperature_excess, 7.0),
            other => panic!("unexpected {other:?}"),
        }
        cat.apply_period([]);
        match cat.effective(0) {
            Some(Source::Point(s)) => assert_eq!(s.exit_velocity, 5.0),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_rejects_invalid_sources() {
        assert!(SourceCatalogue::new(vec![point(-1.0, 0)]).is_err());
        let flat_area = Source::Area(AreaSource {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            extent_x: 0.0,
            extent_y: 5.0,
            extent_z: 0.0,
            emission_rate: 1.0,
            group: 0,
            deposition: DepositionParams::default(),
        });
        assert!(SourceCatalogue::new(vec![flat_area]).is_err());
    }
}

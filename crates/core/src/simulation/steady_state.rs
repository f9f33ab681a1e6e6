//! Steady-state driver
//!
//! Releases the configured particle budget once per dispersion period. The
//! budget is split between sources by emission rate; every particle of a
//! source carries the same share of the mass emitted over the period.

use crate::accumulation::Accumulator;
use crate::core_types::ParticleRng;
use crate::simulation::integrator::TrajectoryIntegrator;
use crate::simulation::model::{period_seed, ParticleModel};
use crate::simulation::particle::Particle;
use crate::sources::Source;
use std::time::Instant;
use tracing::info;

/// One particle to release
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Emission {
    pub id: u64,
    pub source: usize,
    pub mass: f64,
}

/// Emission list of one period, in source order
pub(crate) fn emissions(model: &ParticleModel<'_>) -> Vec<Emission> {
    let counts = model.sources.apportion(model.config.particle_count);
    let mut jobs = Vec::with_capacity(model.config.particle_count);
    for (source, &count) in counts.iter().enumerate() {
        let mass = model
            .sources
            .particle_mass(source, count, model.config.dispersion_time);
        for _ in 0..count {
            jobs.push(Emission {
                id: jobs.len() as u64,
                source,
                mass,
            });
        }
    }
    jobs
}

/// Release and integrate one emitted particle
pub(crate) fn release(
    model: &ParticleModel<'_>,
    sources: &[Source],
    run_seed: u64,
    job: &Emission,
    integrator: &mut TrajectoryIntegrator<'_>,
    acc: &mut Accumulator,
) {
    let Some(source) = sources.get(job.source) else {
        return;
    };
    let mut rng = ParticleRng::for_particle(run_seed, job.id);
    let particle = Particle::emit(job.id, job.source, source, job.mass, &model.field, model.config, &mut rng);
    acc.record_emission(particle.source.group, job.mass);
    integrator.run(particle, acc, &mut rng);
}

/// Fresh-particle driver
pub struct SteadyStateDriver<'m, 'a> {
    model: &'m ParticleModel<'a>,
}

impl<'m, 'a> SteadyStateDriver<'m, 'a> {
    pub fn new(model: &'m ParticleModel<'a>) -> Self {
        Self { model }
    }

    /// Run the first dispersion period
    pub fn run(&self) -> Accumulator {
        self.run_period(0)
    }

    /// Run one dispersion period with the catalogue's current overrides
    pub fn run_period(&self, period: u64) -> Accumulator {
        let model = self.model;
        let started = Instant::now();
        let jobs = emissions(model);
        let sources: Vec<Source> = (0..model.sources.len())
            .filter_map(|i| model.sources.effective(i))
            .collect();
        let run_seed = period_seed(model.config.seed, period);

        info!(
            period,
            particles = jobs.len(),
            sources = sources.len(),
            groups = model.layout.groups,
            "steady-state dispersion started"
        );

        let acc = model.run_partitioned(&jobs, |job, integrator, acc| {
            release(model, &sources, run_seed, job, integrator, acc);
        });

        info!(
            period,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "steady-state dispersion finished"
        );
        acc.diagnostics().report();
        acc
    }
}

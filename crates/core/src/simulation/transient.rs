//! Transient (non-steady-state) driver
//!
//! Each dispersion period releases fresh particles like the steady-state
//! driver and, in addition, re-injects the mass held in the transient 3D grid
//! of the previous period. Every populated cell is split into a fixed number
//! of sub-particles placed uniformly inside the cell, which lowers the
//! variance of the re-injected field. Cells below the mass threshold are
//! dropped and the dropped mass is counted in the diagnostics.

use crate::accumulation::{Accumulator, CellBounds, TransientLayout};
use crate::core_types::rng::uniform;
use crate::core_types::{ParticleRng, Vec3};
use crate::simulation::integrator::TrajectoryIntegrator;
use crate::simulation::model::{period_seed, ParticleModel};
use crate::simulation::particle::Particle;
use crate::simulation::steady_state::{emissions, release, Emission};
use crate::sources::Source;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

/// Mass per transient cell carried from one period to the next
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransientField {
    pub layout: TransientLayout,
    pub groups: usize,
    /// Stored as `[group][k][iy][ix]`
    mass: Vec<f64>,
}

impl TransientField {
    /// Time-mean mass per cell of an accumulator's transient grid
    ///
    /// Returns `None` when the accumulator has no transient grid.
    pub fn from_accumulator(acc: &Accumulator, total_time: f64) -> Option<Self> {
        let layout = acc.layout().transient.clone()?;
        let groups = acc.layout().groups;
        let mass = (0..groups)
            .flat_map(|group| acc.transient_mass(group, total_time))
            .collect();
        Some(Self { layout, groups, mass })
    }

    /// Mass per cell of one group
    pub fn mass(&self, group: usize) -> &[f64] {
        let cells = self.layout.cell_count();
        &self.mass[group * cells..(group + 1) * cells]
    }

    pub fn total_mass(&self, group: usize) -> f64 {
        self.mass(group).iter().sum()
    }
}

/// One sub-particle drawn from a transient cell
#[derive(Debug, Clone, Copy, PartialEq)]
struct Reinjection {
    id: u64,
    group: usize,
    bounds: CellBounds,
    mass: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Job {
    Emit(Emission),
    Reinject(Reinjection),
}

/// Periodic driver with mass carried over through the transient grid
pub struct TransientDriver<'m, 'a> {
    model: &'m ParticleModel<'a>,
}

impl<'m, 'a> TransientDriver<'m, 'a> {
    pub fn new(model: &'m ParticleModel<'a>) -> Self {
        Self { model }
    }

    /// Run `periods` consecutive periods and return each period's grids
    pub fn run(&self, periods: u64) -> Vec<Accumulator> {
        let mut carried: Option<TransientField> = None;
        let mut results = Vec::with_capacity(periods as usize);
        for period in 0..periods {
            let (acc, next) = self.run_period(period, carried.as_ref());
            carried = next;
            results.push(acc);
        }
        results
    }

    /// Run one period, re-injecting `carried` mass
    ///
    /// Returns the period's grids and the transient field for the next period
    /// (`None` when the model has no transient grid).
    pub fn run_period(&self, period: u64, carried: Option<&TransientField>) -> (Accumulator, Option<TransientField>) {
        let model = self.model;
        let started = Instant::now();
        let run_seed = period_seed(model.config.seed, period);
        let sources: Vec<Source> = (0..model.sources.len())
            .filter_map(|i| model.sources.effective(i))
            .collect();

        let mut jobs: Vec<Job> = emissions(model).into_iter().map(Job::Emit).collect();
        let fresh = jobs.len();
        let discarded = carried.map_or(0.0, |field| self.plan_reinjection(field, &mut jobs));

        info!(
            period,
            fresh,
            reinjected = jobs.len() - fresh,
            sources = sources.len(),
            groups = model.layout.groups,
            "transient dispersion started"
        );

        let mut acc = model.run_partitioned(&jobs, |job, integrator, acc| match job {
            Job::Emit(emission) => release(model, &sources, run_seed, emission, integrator, acc),
            Job::Reinject(r) => reinject(model, run_seed, r, integrator, acc),
        });
        acc.diagnostics_mut().discarded_transient_mass += discarded;

        let next = TransientField::from_accumulator(&acc, model.config.dispersion_time);
        info!(
            period,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "transient dispersion finished"
        );
        acc.diagnostics().report();
        (acc, next)
    }

    /// Append re-injection jobs and return the discarded mass
    fn plan_reinjection(&self, field: &TransientField, jobs: &mut Vec<Job>) -> f64 {
        let Some(settings) = &self.model.config.transient else {
            return 0.0;
        };
        if field.layout != settings.layout {
            debug!("transient field layout differs from the configured layout; skipping re-injection");
            return 0.0;
        }
        let sub_particles = settings.sub_particles.max(1);
        let groups = field.groups.min(self.model.layout.groups);
        let mut discarded = 0.0;
        for group in 0..groups {
            for (index, &mass) in field.mass(group).iter().enumerate() {
                if mass <= 0.0 {
                    continue;
                }
                if mass < settings.min_cell_mass {
                    discarded += mass;
                    continue;
                }
                let bounds = field.layout.cell_bounds(index);
                let share = mass / sub_particles as f64;
                for _ in 0..sub_particles {
                    jobs.push(Job::Reinject(Reinjection {
                        id: jobs.len() as u64,
                        group,
                        bounds,
                        mass: share,
                    }));
                }
            }
        }
        discarded
    }
}

fn reinject(
    model: &ParticleModel<'_>,
    run_seed: u64,
    job: &Reinjection,
    integrator: &mut TrajectoryIntegrator<'_>,
    acc: &mut Accumulator,
) {
    let mut rng = ParticleRng::for_particle(run_seed, job.id);
    let b = &job.bounds;
    let x = b.x + uniform(&mut rng) * b.dx;
    let y = b.y + uniform(&mut rng) * b.dy;
    let height = b.bottom + uniform(&mut rng) * (b.top - b.bottom);
    let z = model.field.surface_height_at(x, y) + height;
    let deposition = model.sources.group_deposition(job.group);
    let particle = Particle::reinjected(
        job.id,
        Vec3::new(x, y, z),
        job.mass,
        job.group,
        deposition,
        &model.field,
        model.config,
        &mut rng,
    );
    integrator.run(particle, acc, &mut rng);
}

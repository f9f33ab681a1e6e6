//! Validated model inputs and the partitioned parallel runner

use crate::accumulation::{Accumulator, ConcentrationRaster, GridLayout, Receptor, ReceptorSet};
use crate::error::ConfigError;
use crate::grid::FieldSnapshot;
use crate::simulation::config::DispersionConfig;
use crate::simulation::integrator::TrajectoryIntegrator;
use crate::sources::SourceCatalogue;
use rayon::prelude::*;

/// Everything a driver needs, validated once
pub struct ParticleModel<'a> {
    pub field: FieldSnapshot<'a>,
    pub sources: &'a SourceCatalogue,
    pub config: &'a DispersionConfig,
    pub layout: GridLayout,
    pub receptors: ReceptorSet,
}

impl<'a> ParticleModel<'a> {
    /// Validate the inputs and size the output grids
    ///
    /// # Errors
    /// Returns the validation errors of the configuration, flow grid, raster,
    /// transient layout and receptors, or [`ConfigError::Invalid`] for an empty
    /// source catalogue.
    pub fn new(
        field: FieldSnapshot<'a>,
        sources: &'a SourceCatalogue,
        config: &'a DispersionConfig,
        raster: ConcentrationRaster,
        receptors: Vec<Receptor>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        field.grid.validate()?;
        if sources.is_empty() {
            return Err(ConfigError::invalid("sources", "catalogue has no sources"));
        }
        let layout = GridLayout {
            raster,
            groups: sources.group_count(),
            receptors: receptors.len(),
            transient: config.transient.as_ref().map(|t| t.layout.clone()),
            odour: config.odour,
        };
        layout.validate()?;
        let receptors = ReceptorSet::build(receptors, &layout.raster, &field)?;
        Ok(Self {
            field,
            sources,
            config,
            layout,
            receptors,
        })
    }

    /// Zeroed accumulator for this model's grids
    pub fn new_accumulator(&self) -> Accumulator {
        Accumulator::new(&self.layout)
    }

    pub fn integrator(&self) -> TrajectoryIntegrator<'_> {
        TrajectoryIntegrator::new(self.field, self.config, &self.receptors)
    }

    /// Run `work` over `jobs` in parallel and merge the results
    ///
    /// Jobs are split into `config.partial_grids` contiguous chunks. Every
    /// chunk is processed sequentially into a private accumulator and the
    /// partials are merged in chunk order, so the result does not depend on
    /// thread scheduling.
    pub(crate) fn run_partitioned<J, F>(&self, jobs: &[J], work: F) -> Accumulator
    where
        J: Sync,
        F: Fn(&J, &mut TrajectoryIntegrator<'_>, &mut Accumulator) + Sync,
    {
        let chunk_size = jobs.len().div_ceil(self.config.partial_grids.max(1)).max(1);
        let partials: Vec<Accumulator> = jobs
            .par_chunks(chunk_size)
            .map(|chunk| {
                let mut acc = self.new_accumulator();
                let mut integrator = self.integrator();
                for job in chunk {
                    work(job, &mut integrator, &mut acc);
                }
                acc
            })
            .collect();

        let mut total = self.new_accumulator();
        for partial in &partials {
            total.merge(partial);
        }
        total
    }
}

/// Run seed of a dispersion period
pub(crate) fn period_seed(seed: u64, period: u64) -> u64 {
    seed ^ period.wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

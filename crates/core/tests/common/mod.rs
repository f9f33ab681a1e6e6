//! Shared scenes for the integration tests
#![allow(dead_code)]

use gral_particles_core::accumulation::TransientLayout;
use gral_particles_core::simulation::Particle;
use gral_particles_core::sources::PointSource;
use gral_particles_core::{
    Accumulator, ConcentrationRaster, DepositionParams, DispersionConfig, FieldSnapshot, FlowGrid,
    GridLayout, GriddedWindField, ParticleRng, ReceptorSet, Source, StabilityField, StabilityParams,
    Topography, TrajectoryIntegrator, TrajectoryOutcome, Vec3,
};
use tracing_subscriber::EnvFilter;

#[ctor::ctor]
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Grid, terrain and wind owned together so snapshots can borrow them
pub struct Scene {
    pub grid: FlowGrid,
    pub topo: Topography,
    pub wind: GriddedWindField,
}

impl Scene {
    /// Flat terrain with a uniform wind, 20 m cells and 5 m levels up to 200 m
    pub fn flat(cells: usize, wind: Vec3) -> Self {
        Self::flat_with_stability(cells, wind, StabilityParams::default())
    }

    pub fn flat_with_stability(cells: usize, wind: Vec3, stability: StabilityParams) -> Self {
        let grid = FlowGrid::uniform(0.0, 0.0, 20.0, 20.0, cells, cells, 0.0, 5.0, 40);
        let topo = Topography::flat(&grid, 0.0);
        let wind = GriddedWindField::uniform(&grid, wind, StabilityField::Global(stability));
        Self { grid, topo, wind }
    }

    /// Flat scene with a building block over the given columns
    pub fn with_building(cells: usize, wind: Vec3, ix: std::ops::Range<usize>, iy: std::ops::Range<usize>, height: f64) -> Self {
        let mut scene = Self::flat(cells, wind);
        scene.topo = scene.topo.with_building(&scene.grid, ix, iy, height);
        scene
    }

    pub fn field(&self) -> FieldSnapshot<'_> {
        FieldSnapshot::new(&self.grid, &self.wind, &self.topo)
    }

    /// One ground slice over the whole domain
    pub fn raster(&self) -> ConcentrationRaster {
        ConcentrationRaster {
            origin_x: self.grid.origin_x,
            origin_y: self.grid.origin_y,
            dx: self.grid.dx,
            dy: self.grid.dy,
            nx: self.grid.nx,
            ny: self.grid.ny,
            slice_heights: vec![1.5],
            slice_thickness: 3.0,
        }
    }

    /// Transient grid covering the domain up to the model top
    pub fn full_transient_layout(&self) -> TransientLayout {
        TransientLayout {
            origin_x: self.grid.origin_x,
            origin_y: self.grid.origin_y,
            dx: self.grid.dx * 5.0,
            dy: self.grid.dy * 5.0,
            nx: self.grid.nx.div_ceil(5),
            ny: self.grid.ny.div_ceil(5),
            level_faces: vec![0.0, 10.0, 50.0, 100.0, self.grid.model_top() - self.grid.base()],
        }
    }

    pub fn layout(&self, transient: Option<TransientLayout>) -> GridLayout {
        GridLayout {
            raster: self.raster(),
            groups: 1,
            receptors: 0,
            transient,
            odour: false,
        }
    }
}

pub fn stack(x: f64, y: f64, height: f64, deposition: DepositionParams) -> Source {
    Source::Point(PointSource {
        x,
        y,
        height,
        emission_rate: 1.0,
        diameter: 0.0,
        exit_velocity: 0.0,
        exit_temperature: 0.0,
        group: 0,
        deposition,
    })
}

/// Emit and integrate particle `id` of `source` into `acc`
pub fn run_particle(
    field: FieldSnapshot<'_>,
    config: &DispersionConfig,
    source: &Source,
    id: u64,
    mass: f64,
    acc: &mut Accumulator,
) -> TrajectoryOutcome {
    let receptors = ReceptorSet::none();
    let mut integrator = TrajectoryIntegrator::new(field, config, &receptors);
    let mut rng = ParticleRng::for_particle(config.seed, id);
    let particle = Particle::emit(id, 0, source, mass, &field, config, &mut rng);
    integrator.run(particle, acc, &mut rng)
}

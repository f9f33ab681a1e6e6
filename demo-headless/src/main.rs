use clap::{Parser, ValueEnum};
use gral_particles_core::accumulation::TransientLayout;
use gral_particles_core::simulation::TransientSettings;
use gral_particles_core::sources::PointSource;
use gral_particles_core::{
    Accumulator, ConcentrationRaster, ConfigError, DepositionMode, DepositionParams, DispersionConfig,
    FieldSnapshot, FlowGrid, GriddedWindField, ParticleModel, Receptor, RemovalReason, Source,
    SourceCatalogue, StabilityField, StabilityParams, SteadyStateDriver, Topography, TransientDriver,
};
use std::process::ExitCode;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Stability {
    Convective,
    Neutral,
    Stable,
}

impl Stability {
    fn params(self) -> StabilityParams {
        match self {
            Stability::Convective => StabilityParams::new(0.4, -30.0, 0.2, 1200.0),
            Stability::Neutral => StabilityParams::neutral(0.3, 0.2, 800.0),
            Stability::Stable => StabilityParams::new(0.15, 40.0, 0.2, 200.0),
        }
    }
}

/// Lagrangian particle dispersion demo on a synthetic domain
#[derive(Parser, Debug)]
#[command(name = "gral-demo")]
#[command(about = "Point-source dispersion over flat terrain, optionally with a building", long_about = None)]
struct Args {
    /// Particles released per dispersion period
    #[arg(short = 'n', long, default_value_t = 20_000)]
    particles: usize,

    /// Wind speed at 10 m in m/s
    #[arg(short, long, default_value_t = 3.0)]
    wind_speed: f64,

    /// Meteorological wind direction in degrees (270 = westerly)
    #[arg(long, default_value_t = 270.0)]
    wind_direction: f64,

    /// Atmospheric stability
    #[arg(long, value_enum, default_value_t = Stability::Neutral)]
    stability: Stability,

    /// Source height above ground in m
    #[arg(long, default_value_t = 5.0)]
    source_height: f64,

    /// Dispersion time per period in s
    #[arg(short, long, default_value_t = 600.0)]
    dispersion_time: f64,

    /// Place a 20 m building downwind of the source
    #[arg(short, long)]
    building: bool,

    /// Run this many transient periods instead of one steady-state period
    #[arg(short, long, default_value_t = 0)]
    periods: u64,

    /// Run seed
    #[arg(short, long, default_value_t = 1)]
    seed: u64,

    /// Load the run configuration from a JSON file (overrides the options above)
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// Load the sources from a JSON file instead of the default stack
    #[arg(long)]
    sources: Option<std::path::PathBuf>,
}

const DOMAIN_CELLS: usize = 200;
const CELL_SIZE: f64 = 10.0;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), ConfigError> {
    println!("=== GRAL Particle Dispersion Demo ===\n");

    let grid = FlowGrid::stretched(0.0, 0.0, CELL_SIZE, CELL_SIZE, DOMAIN_CELLS, DOMAIN_CELLS, 0.0, 2.0, 1.1, 40);
    let mut topography = Topography::flat(&grid, 0.0);
    if args.building {
        topography = topography.with_building(&grid, 110..114, 98..102, 20.0);
        println!("Building: 40 x 40 m, 20 m high, 100 m downwind of the source");
    }
    let stability = StabilityField::Global(args.stability.params());
    let wind = GriddedWindField::log_profile(&grid, &topography, args.wind_speed, args.wind_direction, stability);
    let field = FieldSnapshot::new(&grid, &wind, &topography);

    let config = match &args.config {
        Some(path) => DispersionConfig::load(path)?,
        None => default_config(args),
    };

    let sources = match &args.sources {
        Some(path) => SourceCatalogue::load(path)?,
        None => SourceCatalogue::new(vec![Source::Point(PointSource {
            x: 1000.0,
            y: 1000.0,
            height: args.source_height,
            emission_rate: 1.0,
            diameter: 0.0,
            exit_velocity: 0.0,
            exit_temperature: 0.0,
            group: 0,
            deposition: DepositionParams {
                settling_velocity: 0.0,
                deposition_velocity: 0.001,
                mode: DepositionMode::ConcentrationAndDeposition,
            },
        })])?,
    };

    let raster = ConcentrationRaster {
        origin_x: 0.0,
        origin_y: 0.0,
        dx: CELL_SIZE,
        dy: CELL_SIZE,
        nx: DOMAIN_CELLS,
        ny: DOMAIN_CELLS,
        slice_heights: vec![1.5, 10.0],
        slice_thickness: 2.0,
    };
    let receptors = vec![Receptor {
        name: "R1".to_string(),
        x: 1200.0,
        y: 1000.0,
        height: 1.5,
    }];

    println!(
        "Wind: {:.1} m/s from {:.0}°, stability {:?}",
        args.wind_speed, args.wind_direction, args.stability
    );
    println!(
        "Particles: {}, dispersion time: {:.0} s, seed: {}\n",
        config.particle_count, config.dispersion_time, config.seed
    );

    if args.periods > 0 && config.transient.is_none() {
        warn!(periods = args.periods, "configuration has no transient grid, running one steady-state period");
    }

    let model = ParticleModel::new(field, &sources, &config, raster, receptors)?;
    if config.transient.is_some() {
        let results = TransientDriver::new(&model).run(args.periods.max(1));
        for (period, acc) in results.iter().enumerate() {
            println!("--- Period {} ---", period + 1);
            summarize(acc, &model, config.dispersion_time);
        }
    } else {
        let acc = SteadyStateDriver::new(&model).run();
        summarize(&acc, &model, config.dispersion_time);
    }
    Ok(())
}

fn default_config(args: &Args) -> DispersionConfig {
    let transient = (args.periods > 0).then(|| TransientSettings {
        layout: TransientLayout {
            origin_x: 0.0,
            origin_y: 0.0,
            dx: 50.0,
            dy: 50.0,
            nx: DOMAIN_CELLS / 5,
            ny: DOMAIN_CELLS / 5,
            level_faces: vec![0.0, 5.0, 20.0, 50.0, 100.0, 200.0, 400.0],
        },
        sub_particles: 4,
        min_cell_mass: 1e-6,
    });
    DispersionConfig {
        dispersion_time: args.dispersion_time,
        particle_count: args.particles,
        seed: args.seed,
        transient,
        ..DispersionConfig::default()
    }
}

fn summarize(acc: &Accumulator, model: &ParticleModel<'_>, total_time: f64) {
    let diagnostics = acc.diagnostics();
    for group in 0..model.layout.groups {
        let ground = acc.concentration(group, 0, total_time);
        let (peak_index, peak) = ground
            .iter()
            .copied()
            .enumerate()
            .fold((0, 0.0_f64), |best, (i, c)| if c > best.1 { (i, c) } else { best });
        let (px, py) = model
            .layout
            .raster
            .cell_center(peak_index % model.layout.raster.nx, peak_index / model.layout.raster.nx);
        println!("Group {group}:");
        println!("  emitted mass:        {:.3e}", acc.emitted_mass(group));
        println!("  deposited mass:      {:.3e}", acc.deposited_mass(group));
        println!("  ground-level max:    {:.3e} at ({:.0}, {:.0})", peak, px, py);
        for (r, receptor) in model.receptors.receptors().iter().enumerate() {
            println!(
                "  receptor {:<4}        {:.3e} (single-particle max {:.3e})",
                receptor.name,
                acc.receptor_concentration(r, group, total_time),
                acc.receptor_max_concentration(r, group, total_time)
            );
        }
    }
    println!("Removals:");
    for reason in RemovalReason::ALL {
        let count = diagnostics.removed(reason);
        if count > 0 {
            println!("  {:<16} {}", reason.to_string(), count);
        }
    }
    println!();
}

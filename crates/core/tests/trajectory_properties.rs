//! Whole-trajectory properties: mass bookkeeping, bounded termination and
//! reproducibility, checked against full scenes rather than single kernels.

mod common;

use approx::assert_relative_eq;
use common::{run_particle, stack, Scene};
use gral_particles_core::simulation::SafetyCaps;
use gral_particles_core::{
    Accumulator, ConcentrationRaster, DepositionMode, DepositionParams, DispersionConfig, FieldSnapshot,
    FlowGrid, GriddedWindField, ParticleModel, RemovalReason, SourceCatalogue, StabilityField,
    StabilityParams, SteadyStateDriver, Topography, Vec3,
};

fn gas() -> DepositionParams {
    DepositionParams::default()
}

fn fine_dust() -> DepositionParams {
    DepositionParams {
        settling_velocity: 0.005,
        deposition_velocity: 0.02,
        mode: DepositionMode::ConcentrationAndDeposition,
    }
}

#[test]
fn test_mass_conservation_without_sinks() {
    let scene = Scene::flat(100, Vec3::new(2.0, 0.5, 0.0));
    let config = DispersionConfig {
        dispersion_time: 400.0,
        ..DispersionConfig::default()
    };
    let layout = scene.layout(Some(scene.full_transient_layout()));
    let source = stack(500.0, 1000.0, 3.0, gas());

    for id in 0..25 {
        let mut acc = Accumulator::new(&layout);
        let outcome = run_particle(scene.field(), &config, &source, id, 1.5, &mut acc);

        assert_eq!(outcome.final_mass, outcome.initial_mass);
        let recorded: f64 = acc.transient_mass(0, config.dispersion_time).iter().sum::<f64>() * config.dispersion_time;
        assert_relative_eq!(
            recorded,
            outcome.exposure - outcome.reflected_exposure,
            max_relative = 1e-9,
            epsilon = 1e-12
        );
        if outcome.reason == RemovalReason::TimeExhausted {
            assert_relative_eq!(outcome.exposure, 1.5 * config.dispersion_time, max_relative = 1e-12);
        }
    }
}

#[test]
fn test_grid_holds_full_exposure_aloft() {
    // Nearly calm stable air keeps σw at its floor, so particles released at
    // 100 m never reach the ground or the 200 m model top
    let calm = StabilityParams::new(0.02, 50.0, 0.1, 800.0);
    let scene = Scene::flat_with_stability(100, Vec3::new(2.0, 0.0, 0.0), calm);
    let config = DispersionConfig {
        dispersion_time: 300.0,
        ..DispersionConfig::default()
    };
    let layout = scene.layout(Some(scene.full_transient_layout()));
    let source = stack(500.0, 1000.0, 100.0, gas());
    let mass = 1.5;

    for id in 0..25 {
        let mut acc = Accumulator::new(&layout);
        let outcome = run_particle(scene.field(), &config, &source, id, mass, &mut acc);
        assert_eq!(outcome.reason, RemovalReason::TimeExhausted);
        assert_eq!(outcome.reflections, 0);

        let recorded: f64 = acc.transient_mass(0, config.dispersion_time).iter().sum::<f64>() * config.dispersion_time;
        assert_relative_eq!(recorded, mass * config.dispersion_time, max_relative = 1e-9);
    }
}

#[test]
fn test_certain_deposition_exhausts_mass_on_first_contact() {
    let scene = Scene::flat(60, Vec3::new(2.0, 0.0, 0.0));
    let config = DispersionConfig {
        dispersion_time: 600.0,
        ..DispersionConfig::default()
    };
    // vd far above the surface flux velocity, so the contact probability clamps to 1
    let sticky = DepositionParams {
        settling_velocity: 0.0,
        deposition_velocity: 100.0,
        mode: DepositionMode::ConcentrationAndDeposition,
    };
    let source = stack(600.0, 600.0, 1.0, sticky);
    let layout = scene.layout(None);

    for id in 0..20 {
        let mut acc = Accumulator::new(&layout);
        let outcome = run_particle(scene.field(), &config, &source, id, 2.0, &mut acc);
        assert_eq!(outcome.reason, RemovalReason::MassExhausted);
        assert_eq!(outcome.reflections, 1);
        assert_eq!(outcome.final_mass, 0.0);
        assert_eq!(outcome.deposited_mass, outcome.initial_mass);
        assert_eq!(acc.deposited_mass(0), 2.0);
        assert!(outcome.elapsed < config.dispersion_time);
    }
}

#[test]
fn test_deposition_balance_near_buildings() {
    let scene = Scene::with_building(60, Vec3::new(4.0, 0.0, 0.0), 25..28, 20..40, 15.0);
    let config = DispersionConfig {
        dispersion_time: 900.0,
        ..DispersionConfig::default()
    };
    let source = stack(420.0, 600.0, 2.0, fine_dust());
    let layout = scene.layout(None);

    let mut total_deposited = 0.0;
    let mut acc = Accumulator::new(&layout);
    for id in 0..40 {
        let before = acc.deposited_mass(0);
        let outcome = run_particle(scene.field(), &config, &source, id, 1.0, &mut acc);
        let lost = outcome.initial_mass - outcome.final_mass;
        assert_relative_eq!(lost, outcome.deposited_mass, max_relative = 1e-9, epsilon = 1e-15);
        assert_relative_eq!(acc.deposited_mass(0) - before, outcome.deposited_mass, max_relative = 1e-9, epsilon = 1e-15);
        assert!(outcome.final_mass >= 0.0);
        total_deposited += outcome.deposited_mass;
    }
    assert!(total_deposited > 0.0);
    assert_eq!(acc.diagnostics().particles, 40);
}

#[test]
fn test_particle_pinned_against_wall_terminates() {
    // 30 m/s straight into a wall that spans the domain and nearly reaches the model top
    let scene = Scene::with_building(60, Vec3::new(30.0, 0.0, 0.0), 30..32, 0..60, 190.0);
    let config = DispersionConfig {
        dispersion_time: 3600.0,
        caps: SafetyCaps {
            min_reflections: 40,
            reflections_per_cell: 0,
            ..SafetyCaps::default()
        },
        ..DispersionConfig::default()
    };
    let step_cap = config.caps.step_cap(config.dispersion_time, &scene.grid);
    let reflection_cap = config.caps.reflection_cap(&scene.grid);
    assert_eq!(reflection_cap, 40);

    let source = stack(599.0, 600.0, 20.0, fine_dust());
    let layout = scene.layout(None);
    let mut reflections = 0;
    for id in 0..10 {
        let mut acc = Accumulator::new(&layout);
        let outcome = run_particle(scene.field(), &config, &source, id, 1.0, &mut acc);
        assert!(outcome.steps <= step_cap);
        assert!(outcome.reflections <= reflection_cap);
        assert!(outcome.elapsed <= config.dispersion_time + 1e-9);
        reflections += outcome.reflections;
    }
    assert!(reflections > 0);
}

#[test]
fn test_reflection_cap_abandons_without_error() {
    let scene = Scene::with_building(60, Vec3::new(30.0, 0.0, 0.0), 30..32, 0..60, 190.0);
    let config = DispersionConfig {
        dispersion_time: 3600.0,
        particle_count: 50,
        caps: SafetyCaps {
            min_reflections: 1,
            reflections_per_cell: 0,
            ..SafetyCaps::default()
        },
        ..DispersionConfig::default()
    };
    let sources = SourceCatalogue::new(vec![stack(599.0, 600.0, 20.0, gas())]).unwrap();
    let model = ParticleModel::new(scene.field(), &sources, &config, scene.raster(), Vec::new()).unwrap();
    let acc = SteadyStateDriver::new(&model).run();

    let diagnostics = acc.diagnostics();
    assert_eq!(diagnostics.particles, 50);
    assert!(diagnostics.removed(RemovalReason::ReflectionCap) > 0);
    let removed: u64 = RemovalReason::ALL.iter().map(|&r| diagnostics.removed(r)).sum();
    assert_eq!(removed, 50);
}

#[test]
fn test_identical_results_on_any_thread_count() {
    let scene = Scene::with_building(60, Vec3::new(3.0, 1.0, 0.0), 25..28, 25..28, 20.0);
    let config = DispersionConfig {
        dispersion_time: 300.0,
        particle_count: 400,
        partial_grids: 6,
        ..DispersionConfig::default()
    };
    let sources = SourceCatalogue::new(vec![stack(400.0, 520.0, 4.0, fine_dust())]).unwrap();
    let model = ParticleModel::new(scene.field(), &sources, &config, scene.raster(), Vec::new()).unwrap();

    let run_on = |threads: usize| {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .unwrap()
            .install(|| SteadyStateDriver::new(&model).run())
    };
    let single = run_on(1);
    let many = run_on(4);

    assert_eq!(single.raw_concentration(0, 0), many.raw_concentration(0, 0));
    assert_eq!(single.deposition(0), many.deposition(0));
    assert_eq!(single.deposited_mass(0), many.deposited_mass(0));
    assert_eq!(single.diagnostics(), many.diagnostics());
}

#[test]
fn test_westerly_stack_keeps_mass_for_full_dispersion_time() {
    // 6 km square with 40 m cells, stretched levels up to roughly 885 m
    let grid = FlowGrid::stretched(0.0, 0.0, 40.0, 40.0, 150, 150, 0.0, 2.0, 1.1, 40);
    let topo = Topography::flat(&grid, 0.0);
    let wind = GriddedWindField::log_profile(
        &grid,
        &topo,
        3.0,
        270.0,
        StabilityField::Global(StabilityParams::default()),
    );
    let field = FieldSnapshot::new(&grid, &wind, &topo);
    let config = DispersionConfig {
        dispersion_time: 600.0,
        decay_rates: vec![0.0],
        ..DispersionConfig::default()
    };
    let raster = ConcentrationRaster {
        origin_x: 0.0,
        origin_y: 0.0,
        dx: 40.0,
        dy: 40.0,
        nx: 150,
        ny: 150,
        slice_heights: vec![1.5],
        slice_thickness: 3.0,
    };
    let layout = gral_particles_core::GridLayout {
        raster,
        groups: 1,
        receptors: 0,
        transient: None,
        odour: false,
    };
    let source = stack(1000.0, 1000.0, 5.0, gas());

    for id in 0..10 {
        let mut acc = Accumulator::new(&layout);
        let outcome = run_particle(field, &config, &source, id, 0.25, &mut acc);
        assert_eq!(outcome.reason, RemovalReason::TimeExhausted);
        assert_eq!(outcome.final_mass, outcome.initial_mass);
        assert_eq!(outcome.deposited_mass, 0.0);
        assert!(outcome.elapsed >= 600.0 - 1e-9);
        assert!(outcome.final_position.x > 1000.0);
    }
}

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

mod cli;
mod config;
mod execute;
mod field;
mod io;
mod kernels;
mod logging;
mod particle;
mod seeding;

use cli::get_args;
use config::{OutputFormat, SECONDS_PER_DAY, SECONDS_PER_HOUR, SimulationConfig};
use execute::{ExecuteOptions, Schedule, execute};
use field::{FieldSet, VerticalAverage};
use io::TrajectorySink;
use io::csv::CsvTrajectoryWriter;
use io::netcdf::NetCdfTrajectoryWriter;
use kernels::{
    AdvectionRK4, DeleteParticle, DriftTime, ErrorCode, KernelChain, OffTheGrid,
    PeriodicBoundaryEast, PeriodicBoundaryWest, Recovery,
};
use logging::init_logging;
use particle::ParticleSet;
use seeding::seed_grid;

fn main() -> Result<()> {
    // Configuration
    let args = get_args();
    init_logging(args.log_level.as_deref());
    let config = args.simulation_config()?;

    // Field set
    log::info!("Building field set from {:?}", config.fieldset.data_root);
    let mut fieldset =
        FieldSet::from_nemo(&config.fieldset).context("Failed to build field set")?;
    let averaging = VerticalAverage::from_depth(&fieldset.grid.depth)
        .context("Failed to derive vertical averaging weights")?;
    fieldset.set_compute_on_load(Box::new(averaging));
    if let Some(max_drift) = fieldset.constant("max_drift_time") {
        log::info!("Field set constant max_drift_time = {} s", max_drift);
    }

    // Particles
    let points = seed_grid(&config.seeding);
    let start = fieldset.time.first();
    let repeat_dt = config.seeding.repeat_days * SECONDS_PER_DAY;
    let mut pset = ParticleSet::from_list(points, start, Some(repeat_dt));

    let chain = KernelChain::new()
        .then(AdvectionRK4)
        .then(PeriodicBoundaryEast)
        .then(PeriodicBoundaryWest)
        .then(OffTheGrid {
            lat_cutoff: config.rules.lat_cutoff,
        })
        .then(DriftTime {
            increment: config.rules.drift_increment_hours * SECONDS_PER_HOUR,
            max: config.rules.max_drift_days * SECONDS_PER_DAY,
        });
    let recovery = Recovery::new().on(ErrorCode::OutOfBounds, DeleteParticle);

    let schedule = Schedule {
        start,
        runtime: config.run.runtime_seconds(),
        dt: config.run.dt_seconds(),
        output_dt: config.run.output_seconds(),
    };

    let mut sinks = create_sinks(&config, &fieldset)?;

    print_configuration(&config, &fieldset, &pset, &schedule);

    // Create progress bar
    let pb = ProgressBar::new(schedule.n_steps() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} steps {msg} ({eta})")?
            .progress_chars("#>-"),
    );

    let summary = execute(
        &mut pset,
        &mut fieldset,
        &chain,
        &recovery,
        schedule,
        &mut sinks,
        ExecuteOptions {
            threads: config.run.worker_threads(),
            progress: Some(&pb),
        },
    )
    .context("Particle execution failed")?;

    summary.log();
    log::info!("Output saved to {}", config.output.path.display());
    Ok(())
}

fn create_sinks(config: &SimulationConfig, fieldset: &FieldSet) -> Result<Vec<Box<dyn TrajectorySink>>> {
    let mut sinks: Vec<Box<dyn TrajectorySink>> = Vec::new();
    let format = config.output.format;

    if matches!(format, OutputFormat::NetCdf | OutputFormat::Both) {
        let path = &config.output.path;
        ensure_parent_dir(path)?;
        let writer = NetCdfTrajectoryWriter::create(path, &fieldset.time.origin)
            .with_context(|| format!("Failed to create NetCDF output: {:?}", path))?;
        sinks.push(Box::new(writer));
    }
    if matches!(format, OutputFormat::Csv | OutputFormat::Both) {
        let path = config.output.csv_path();
        ensure_parent_dir(&path)?;
        let writer = CsvTrajectoryWriter::create(&path)
            .with_context(|| format!("Failed to create CSV output: {:?}", path))?;
        sinks.push(Box::new(writer));
    }
    Ok(sinks)
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {:?}", parent))?;
    }
    Ok(())
}

fn print_configuration(
    config: &SimulationConfig,
    fieldset: &FieldSet,
    pset: &ParticleSet,
    schedule: &Schedule,
) {
    let origin = fieldset.time.origin;
    log::info!("Simulation Configuration:");
    log::info!(
        "  Field period: {} to {} ({} slices)",
        config.fieldset.start_date,
        config.fieldset.end_date,
        fieldset.time.n_times()
    );
    log::info!("  Time origin: {}", origin);
    log::info!(
        "  Seed grid: {} points, re-released every {} days",
        pset.release_points().len(),
        config.seeding.repeat_days
    );
    log::info!(
        "  Run: {} days at dt = {} h, output every {} days",
        config.run.runtime_days,
        config.run.dt_hours,
        config.run.output_days
    );
    log::info!("  Timesteps: {}", schedule.n_steps());
    log::info!("  Output: {:?} ({:?})", config.output.path, config.output.format);
}

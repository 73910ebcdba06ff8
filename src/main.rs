use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{debug, error, info};
use movement_calibration::fit::ScalingLawFitter;
use movement_calibration::output::{self, OutputFormat};
use movement_calibration::{
    CalibrationError, CalibrationHarness, HomeRangeCalibration, OccupancyCalibration, ResultTensor,
    VelocityCalibration, WorldGeometry,
};
use movement_common::{CalibrationConfig, FittedParameters, MovementModel};
use std::path::PathBuf;
use std::time::Instant;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Velocity,
    HomeRange,
    Occupancy,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Calibration config file (.toml)
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Which calibration to run
    #[arg(short, long, value_enum)]
    kind: Kind,

    /// Base filename for outputs (overrides output.base_filename)
    #[arg(short, long)]
    output: Option<String>,

    /// Report format: json, bincode or messagepack (overrides output.format)
    #[arg(long)]
    format: Option<String>,

    /// Worker threads (overrides harness.threads)
    #[arg(long)]
    threads: Option<usize>,

    /// Base seed (overrides harness.seed)
    #[arg(long)]
    seed: Option<u64>,

    /// Only simulate; skip fitting and the model update
    #[arg(long)]
    no_fit: bool,
}

fn main() -> Result<()> {
    // Initialize the logger
    env_logger::init();
    let args = Args::parse();

    info!("Starting movement calibration ({:?})...", args.kind);

    // --- Load Configuration ---
    let config = CalibrationConfig::load(&args.config)?;
    let model = config.movement_model()?;
    info!("Calibrating {}.", model.name());
    debug!("Model parameters: {:#?}", model.parameters());

    let world = WorldGeometry::new(config.range(), config.world.resolution);
    info!(
        "World: {} x {} km ({:.1} km^2), resolution {} km.",
        world.range.0,
        world.range.1,
        world.area(),
        world.resolution
    );

    // --- Build Harness ---
    let axes = match args.kind {
        Kind::Velocity => {
            let sweep = config.velocity.as_ref().context("config has no [velocity] section")?;
            VelocityCalibration::axes(&sweep.velocities, &sweep.niche_sizes)?
        }
        Kind::HomeRange => {
            let sweep = config.home_range.as_ref().context("config has no [home_range] section")?;
            HomeRangeCalibration::axes(&sweep.velocities, &sweep.niche_sizes)?
        }
        Kind::Occupancy => {
            let sweep = config.occupancy.as_ref().context("config has no [occupancy] section")?;
            OccupancyCalibration::axes(&sweep.home_ranges, &sweep.niche_sizes, &sweep.nums)?
        }
    };
    let mut harness = CalibrationHarness::new(
        axes,
        config.harness.num_worlds,
        config.harness.trials_per_world,
    )?
    .with_seed(args.seed.unwrap_or(config.harness.seed))
    .with_progress(true);
    if let Some(threads) = args.threads.or(config.harness.threads) {
        harness = harness.with_threads(threads)?;
    }

    // --- Run ---
    let start_time = Instant::now();
    let (name, result, fit) = match args.kind {
        Kind::Velocity => {
            let sweep = config.velocity.as_ref().context("config has no [velocity] section")?;
            let calibration = VelocityCalibration::new(model.clone(), world, sweep.days);
            let tensor = run(&harness, &calibration)?;
            let fit = fit_unless(args.no_fit, || {
                calibration.fit(&tensor, &ScalingLawFitter::default())
            });
            (VelocityCalibration::NAME, tensor, fit)
        }
        Kind::HomeRange => {
            let sweep = config.home_range.as_ref().context("config has no [home_range] section")?;
            let calibration = HomeRangeCalibration::new(model.clone(), world, sweep.days);
            let tensor = run(&harness, &calibration)?;
            let fit = fit_unless(args.no_fit, || {
                calibration.fit(&tensor, &ScalingLawFitter::default())
            });
            (HomeRangeCalibration::NAME, tensor, fit)
        }
        Kind::Occupancy => {
            let sweep = config.occupancy.as_ref().context("config has no [occupancy] section")?;
            let calibration = OccupancyCalibration::new(
                model.clone(),
                world,
                sweep.season,
                sweep.max_individuals,
            );
            let tensor = run(&harness, &calibration)?;
            let fitter = ScalingLawFitter::new(sweep.degeneracy)?;
            let fit = fit_unless(args.no_fit, || calibration.fit(&tensor, &fitter));
            (OccupancyCalibration::NAME, tensor, fit)
        }
    };
    info!(
        "Simulated {} values in {:.3} seconds.",
        result.data().len(),
        start_time.elapsed().as_secs_f64()
    );

    // --- Save Results ---
    let base = args.output.unwrap_or_else(|| config.output.base_filename.clone());
    let format =
        OutputFormat::from_name(args.format.as_deref().or(config.output.format.as_deref()));
    let report = result.to_report(name, model.name(), fit.clone());
    output::write_report(&report, &base, format)?;

    if config.output.save_summary {
        output::write_summary(&result, &base, name)?;
    } else {
        info!("Skipping summary as per config (save_summary is false).");
    }

    if let Some(fit) = fit {
        for (coefficient, value) in fit.coefficients() {
            info!("Fitted {}.{} = {:.6}", fit.group(), coefficient, value);
        }
        output::write_fitted(&fit, &base)?;
        let updated: MovementModel = model.apply_fit(&fit)?;
        output::write_model(&updated, &base)?;
    }

    info!("Calibration Complete.");
    Ok(())
}

fn run<T: movement_calibration::CalibrationTask>(
    harness: &CalibrationHarness,
    calibration: &T,
) -> Result<ResultTensor> {
    match harness.run(calibration) {
        Ok(tensor) => Ok(tensor),
        Err(CalibrationError::Cancelled) => {
            error!("Calibration cancelled; no results were written.");
            anyhow::bail!("calibration cancelled")
        }
        Err(e) => Err(e).context("calibration failed"),
    }
}

// Fit failures are logged and reported as no fit; the data is still written.
fn fit_unless<F>(skip: bool, fit: F) -> Option<FittedParameters>
where
    F: FnOnce() -> Result<FittedParameters, movement_calibration::FitError>,
{
    if skip {
        info!("Skipping fit (--no-fit).");
        return None;
    }
    match fit() {
        Ok(fitted) => Some(fitted),
        Err(e) => {
            error!("Fit failed: {}", e);
            None
        }
    }
}

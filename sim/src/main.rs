//! LOCALIZER SIM: run and generate landmark-based particle filter localization scenarios.
//!
//! This program has three subcommands:
//!
//! - `generate`: Build a synthetic scenario (landmark map, noisy odometry, noisy landmark observations, and
//!   ground truth) and write it to a directory.
//! - `run`: Drive the particle filter through a scenario directory and write the per-step results, and
//!   optionally the full particle set of every step.
//! - `config`: Write a template filter configuration file (TOML/JSON/YAML).
//!
//! Filter parameters come from the defaults, then from `--config` if given, then from individual flags.

mod common;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use common::{create_parent_dir, init_logger, parse_pose, validate_scenario_dir};
use localizer::sim::{Scenario, ScenarioConfig, StepResult, mean_error, run_scenario};
use localizer::{FilterConfig, ParticleFilter, Pose, ResamplingStrategy};
use log::{error, info};
use rand::SeedableRng;
use rand::rngs::StdRng;

const LONG_ABOUT: &str = "LOCALIZER SIM: landmark-based Monte Carlo localization of planar vehicles.

A scenario is a directory holding:
* map.csv: landmark map with columns id,x,y
* control.csv: one row per step with columns step,dt,velocity,yaw_rate
* observations.csv: vehicle-frame landmark observations with columns step,x,y
* ground_truth.csv (optional): true pose per step with columns step,x,y,theta

Use `generate` to build a synthetic scenario, `run` to localize against one, and `config` to write a
template filter configuration.";

/// Command line arguments
#[derive(Parser)]
#[command(
    author,
    version,
    about = "Landmark-based particle filter localization.",
    long_about = LONG_ABOUT
)]
struct Cli {
    /// Filter configuration file (TOML/JSON/YAML). Individual flags override its values.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Log file path (if not specified, logs to stderr)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

/// Top-level commands
#[derive(Subcommand, Clone)]
enum Command {
    #[command(
        name = "generate",
        about = "Generate a synthetic scenario",
        long_about = "Generate a synthetic scenario: landmarks scattered over a square field, a constant velocity and turn rate trajectory, odometry with Gaussian noise, and noisy vehicle-frame observations of every landmark in sensor range."
    )]
    Generate(GenerateArgs),
    #[command(
        name = "run",
        about = "Run the particle filter over a scenario",
        long_about = "Run the particle filter over a scenario directory. The filter is initialized around the first ground-truth pose, or around --start if given, then predicts, weighs, and resamples once per step."
    )]
    Run(RunArgs),
    #[command(name = "config", about = "Generate a template configuration file")]
    CreateConfig(CreateConfigArgs),
}

#[derive(Args, Clone, Debug)]
struct GenerateArgs {
    /// Output scenario directory
    #[arg(short, long, value_parser)]
    output: PathBuf,
    /// Number of steps
    #[arg(long)]
    steps: Option<usize>,
    /// Number of landmarks
    #[arg(long)]
    landmarks: Option<usize>,
    /// Side length of the square landmark field (m)
    #[arg(long)]
    field_size: Option<f64>,
    /// Sensor range used when generating observations (m)
    #[arg(long)]
    sensor_range: Option<f64>,
    /// Random seed for the scenario
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

#[derive(Args, Clone, Debug)]
struct RunArgs {
    /// Input scenario directory
    #[arg(short, long, value_parser)]
    input: PathBuf,
    /// Output CSV file for the per-step results
    #[arg(short, long, value_parser)]
    output: PathBuf,
    /// Append the particle set of every step to this file, one `x y theta` line per particle
    #[arg(long)]
    particles_out: Option<PathBuf>,
    /// Initial pose estimate as x,y,theta. Defaults to the first ground-truth pose.
    #[arg(long, value_parser = parse_pose, allow_hyphen_values = true)]
    start: Option<Pose>,
    #[command(flatten)]
    filter: FilterArgs,
}

/// Flags overriding individual [`FilterConfig`] values
#[derive(Args, Clone, Debug, Default)]
struct FilterArgs {
    /// Number of particles
    #[arg(long)]
    particles: Option<usize>,
    /// Random seed for the filter
    #[arg(long)]
    seed: Option<u64>,
    /// Sensor range (m)
    #[arg(long)]
    sensor_range: Option<f64>,
    /// Resampling strategy
    #[arg(long, value_enum)]
    resampling: Option<ResamplingStrategy>,
    /// Score particles on a single thread
    #[arg(long)]
    serial: bool,
}
impl FilterArgs {
    fn apply(&self, config: &mut FilterConfig) {
        if let Some(particles) = self.particles {
            config.num_particles = particles;
        }
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        if let Some(range) = self.sensor_range {
            config.sensor_range = range;
        }
        if let Some(resampling) = self.resampling {
            config.resampling = resampling;
        }
        if self.serial {
            config.parallel = false;
        }
    }
}

#[derive(Args, Clone, Debug)]
struct CreateConfigArgs {
    /// Output file path (.toml, .json, .yaml, or .yml)
    #[arg(short, long, value_parser)]
    output: PathBuf,
}

fn load_filter_config(path: Option<&PathBuf>, overrides: &FilterArgs) -> Result<FilterConfig> {
    let mut config = match path {
        Some(path) => FilterConfig::from_file(path)
            .with_context(|| format!("failed to read filter configuration {}", path.display()))?,
        None => FilterConfig::default(),
    };
    overrides.apply(&mut config);
    config.validate()?;
    Ok(config)
}

fn generate(args: &GenerateArgs) -> Result<()> {
    let mut config = ScenarioConfig::default();
    if let Some(steps) = args.steps {
        config.steps = steps;
    }
    if let Some(landmarks) = args.landmarks {
        config.num_landmarks = landmarks;
    }
    if let Some(field_size) = args.field_size {
        config.field_size = field_size;
    }
    if let Some(range) = args.sensor_range {
        config.sensor_range = range;
    }
    let mut rng = StdRng::seed_from_u64(args.seed);
    let scenario = Scenario::generate(&config, &mut rng)?;
    scenario
        .save(&args.output)
        .with_context(|| format!("failed to write scenario to {}", args.output.display()))?;
    info!("Scenario written to {}", args.output.display());
    Ok(())
}

fn run(args: &RunArgs, config_path: Option<&PathBuf>) -> Result<()> {
    validate_scenario_dir(&args.input)?;
    let config = load_filter_config(config_path, &args.filter)?;
    let scenario = Scenario::load(&args.input)
        .with_context(|| format!("failed to load scenario {}", args.input.display()))?;
    info!(
        "Running {} particles ({} resampling) over {} steps from {}",
        config.num_particles,
        config.resampling,
        scenario.num_steps(),
        args.input.display()
    );
    let mut filter = ParticleFilter::new(config)?;

    let mut particle_writer = match &args.particles_out {
        Some(path) => {
            create_parent_dir(path)?;
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Some(BufWriter::new(file))
        }
        None => None,
    };
    let sink = particle_writer.as_mut().map(|w| w as &mut dyn Write);
    let results = run_scenario(&mut filter, &scenario, args.start, sink)?;
    if let Some(mut writer) = particle_writer {
        writer.flush()?;
    }

    create_parent_dir(&args.output)?;
    StepResult::to_csv(&results, &args.output)
        .with_context(|| format!("failed to write results to {}", args.output.display()))?;
    let diagnostics = filter.diagnostics();
    if diagnostics.degenerate_resamples > 0 {
        error!(
            "Filter diverged on {} of {} steps",
            diagnostics.degenerate_resamples,
            results.len()
        );
    }
    match mean_error(&results) {
        Some(err) => info!(
            "Results written to {}. Mean error: x {:.3} m, y {:.3} m, theta {:.4} rad",
            args.output.display(),
            err.x,
            err.y,
            err.theta
        ),
        None => info!("Results written to {}", args.output.display()),
    }
    Ok(())
}

fn create_config_file(args: &CreateConfigArgs) -> Result<()> {
    create_parent_dir(&args.output)?;
    let config = FilterConfig {
        seed: Some(42),
        ..Default::default()
    };
    config
        .to_file(&args.output)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    info!(
        "Template configuration written to {}",
        args.output.display()
    );
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(&cli.log_level, cli.log_file.as_ref())?;

    match &cli.command {
        Command::Generate(args) => generate(args),
        Command::Run(args) => run(args, cli.config.as_ref()),
        Command::CreateConfig(args) => create_config_file(args),
    }
}

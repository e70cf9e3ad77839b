//! Scenario I/O, synthetic scenario generation, and the closed-loop driver.
//!
//! This module provides:
//! - CSV records for controls, observations, and ground truth, and the [`Scenario`] that groups them with a
//!   landmark map in a single directory
//! - [`Scenario::generate`] for building synthetic runs with known ground truth
//! - [`run_scenario`], which drives a [`ParticleFilter`] through a scenario and reports per-step results
//! - [`StepResult`] CSV import/export and the `x y theta` particle dump used as the state sink
//!
//! A scenario directory contains:
//! - `map.csv` with columns `id,x,y`
//! - `control.csv` with columns `step,dt,velocity,yaw_rate`, one row per step. The control of step `k` moves the
//!   vehicle from step `k` to step `k + 1`.
//! - `observations.csv` with columns `step,x,y`, zero or more rows per step, in the vehicle frame
//! - `ground_truth.csv` with columns `step,x,y,theta` (optional)
use std::fs;
use std::io::Write;
use std::path::Path;

use log::{debug, info};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::error::{FilterError, Result};
use crate::filter::ParticleFilter;
use crate::geometry::transform_to_vehicle;
use crate::map::LandmarkMap;
use crate::{Control, Landmark, LandmarkObservation, LandmarkStd, Particle, Pose, pose_error};

pub const MAP_FILE: &str = "map.csv";
pub const CONTROL_FILE: &str = "control.csv";
pub const OBSERVATIONS_FILE: &str = "observations.csv";
pub const GROUND_TRUTH_FILE: &str = "ground_truth.csv";

/// One row of `control.csv`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ControlRecord {
    pub step: usize,
    pub dt: f64,
    pub velocity: f64,
    pub yaw_rate: f64,
}
/// One row of `observations.csv`. Coordinates are in the vehicle frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub step: usize,
    pub x: f64,
    pub y: f64,
}
/// One row of `ground_truth.csv`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthRecord {
    pub step: usize,
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

fn read_records<T, P>(path: P) -> Result<Vec<T>>
where
    T: for<'de> Deserialize<'de>,
    P: AsRef<Path>,
{
    let mut rdr = csv::Reader::from_path(path)?;
    let mut records = Vec::new();
    for result in rdr.deserialize() {
        let record: T = result?;
        records.push(record);
    }
    Ok(records)
}

fn write_records<T, P>(records: &[T], path: P) -> Result<()>
where
    T: Serialize,
    P: AsRef<Path>,
{
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// A complete localization run: map, per-step controls and observations, and optional ground truth.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Scenario {
    pub map: LandmarkMap,
    /// Control applied after each step. The last entry is never used by the filter.
    pub controls: Vec<Control>,
    /// Vehicle-frame observations per step, index-aligned with `controls`.
    pub observations: Vec<Vec<LandmarkObservation>>,
    /// True vehicle pose per step, when known.
    pub ground_truth: Option<Vec<Pose>>,
}
impl Scenario {
    pub fn num_steps(&self) -> usize {
        self.controls.len()
    }
    /// Check that controls, observations and ground truth cover the same number of steps.
    pub fn validate(&self) -> Result<()> {
        let steps = self.controls.len();
        if self.observations.len() != steps {
            return Err(FilterError::Format(format!(
                "scenario has {steps} controls but {} observation steps",
                self.observations.len()
            )));
        }
        if let Some(truth) = &self.ground_truth
            && truth.len() != steps
        {
            return Err(FilterError::Format(format!(
                "scenario has {steps} controls but {} ground-truth poses",
                truth.len()
            )));
        }
        Ok(())
    }
    /// Read a scenario directory.
    ///
    /// The number of steps is the number of control rows. Control and ground-truth rows must be listed in
    /// step order starting at zero, and every observation must refer to an existing step.
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let map = LandmarkMap::from_csv(dir.join(MAP_FILE))?;

        let control_records: Vec<ControlRecord> = read_records(dir.join(CONTROL_FILE))?;
        check_step_order(control_records.iter().map(|r| r.step), CONTROL_FILE)?;
        let controls: Vec<Control> = control_records
            .iter()
            .map(|r| Control::new(r.dt, r.velocity, r.yaw_rate))
            .collect();
        let steps = controls.len();

        let mut observations: Vec<Vec<LandmarkObservation>> = vec![Vec::new(); steps];
        let observation_records: Vec<ObservationRecord> =
            read_records(dir.join(OBSERVATIONS_FILE))?;
        for record in observation_records {
            let bucket = observations.get_mut(record.step).ok_or_else(|| {
                FilterError::Format(format!(
                    "{OBSERVATIONS_FILE}: step {} is past the last of {steps} steps",
                    record.step
                ))
            })?;
            let id = bucket.len();
            bucket.push(LandmarkObservation::new(id, record.x, record.y));
        }

        let truth_path = dir.join(GROUND_TRUTH_FILE);
        let ground_truth = if truth_path.exists() {
            let records: Vec<GroundTruthRecord> = read_records(&truth_path)?;
            check_step_order(records.iter().map(|r| r.step), GROUND_TRUTH_FILE)?;
            if records.len() != steps {
                return Err(FilterError::Format(format!(
                    "{GROUND_TRUTH_FILE}: {} rows for {steps} steps",
                    records.len()
                )));
            }
            let poses: Vec<Pose> = records
                .iter()
                .map(|r| Pose::new(r.x, r.y, r.theta))
                .collect();
            Some(poses)
        } else {
            None
        };
        debug!(
            "Loaded scenario from {}: {steps} steps, {} landmarks",
            dir.display(),
            map.len()
        );
        Ok(Scenario {
            map,
            controls,
            observations,
            ground_truth,
        })
    }
    /// Write the scenario into `dir`, creating it if needed.
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        self.map.to_csv(dir.join(MAP_FILE))?;
        let controls: Vec<ControlRecord> = self
            .controls
            .iter()
            .enumerate()
            .map(|(step, c)| ControlRecord {
                step,
                dt: c.dt,
                velocity: c.velocity,
                yaw_rate: c.yaw_rate,
            })
            .collect();
        write_records(&controls, dir.join(CONTROL_FILE))?;
        let observations: Vec<ObservationRecord> = self
            .observations
            .iter()
            .enumerate()
            .flat_map(|(step, obs)| {
                obs.iter().map(move |o| ObservationRecord {
                    step,
                    x: o.x,
                    y: o.y,
                })
            })
            .collect();
        write_observations(&observations, dir.join(OBSERVATIONS_FILE))?;
        if let Some(truth) = &self.ground_truth {
            let records: Vec<GroundTruthRecord> = truth
                .iter()
                .enumerate()
                .map(|(step, p)| GroundTruthRecord {
                    step,
                    x: p.x,
                    y: p.y,
                    theta: p.theta,
                })
                .collect();
            write_records(&records, dir.join(GROUND_TRUTH_FILE))?;
        }
        Ok(())
    }
    /// Build a synthetic scenario.
    ///
    /// Landmarks are scattered uniformly over a square field centered on the origin. The vehicle follows a
    /// constant velocity, constant turn rate trajectory from `config.start`. The recorded controls are the
    /// true controls corrupted by odometry noise. At every step each landmark within the sensor range is
    /// observed in the vehicle frame with independent Gaussian noise on both axes.
    pub fn generate<R: Rng + ?Sized>(config: &ScenarioConfig, rng: &mut R) -> Result<Self> {
        config.validate()?;
        let half = config.field_size / 2.0;
        let landmarks: Vec<Landmark> = (0..config.num_landmarks)
            .map(|i| {
                Landmark::new(
                    i + 1,
                    rng.random_range(-half..=half),
                    rng.random_range(-half..=half),
                )
            })
            .collect();
        let map = LandmarkMap::new(landmarks);

        let velocity_noise = Normal::new(0.0, config.velocity_std)?;
        let yaw_rate_noise = Normal::new(0.0, config.yaw_rate_std)?;
        let obs_noise_x = Normal::new(0.0, config.observation_std.x)?;
        let obs_noise_y = Normal::new(0.0, config.observation_std.y)?;

        let true_control = Control::new(config.dt, config.velocity, config.yaw_rate);
        let mut pose = config.start;
        let mut controls = Vec::with_capacity(config.steps);
        let mut observations = Vec::with_capacity(config.steps);
        let mut ground_truth = Vec::with_capacity(config.steps);
        for _ in 0..config.steps {
            ground_truth.push(pose);
            let visible = map.landmarks_in_range(pose.x, pose.y, config.sensor_range);
            let observed: Vec<LandmarkObservation> = transform_to_vehicle(&pose, &visible)
                .into_iter()
                .enumerate()
                .map(|(i, o)| {
                    LandmarkObservation::new(
                        i,
                        o.x + obs_noise_x.sample(rng),
                        o.y + obs_noise_y.sample(rng),
                    )
                })
                .collect();
            observations.push(observed);
            controls.push(Control::new(
                config.dt,
                config.velocity + velocity_noise.sample(rng),
                config.yaw_rate + yaw_rate_noise.sample(rng),
            ));
            pose = pose.advance(&true_control);
        }
        info!(
            "Generated scenario: {} steps, {} landmarks over a {} m field",
            config.steps, config.num_landmarks, config.field_size
        );
        Ok(Scenario {
            map,
            controls,
            observations,
            ground_truth: Some(ground_truth),
        })
    }
}

fn check_step_order(steps: impl Iterator<Item = usize>, file: &str) -> Result<()> {
    for (expected, step) in steps.enumerate() {
        if step != expected {
            return Err(FilterError::Format(format!(
                "{file}: expected step {expected}, found {step}"
            )));
        }
    }
    Ok(())
}

/// Observations may legitimately be empty, so the header is written explicitly to keep the file loadable.
fn write_observations<P: AsRef<Path>>(records: &[ObservationRecord], path: P) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    writer.write_record(["step", "x", "y"])?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Parameters of [`Scenario::generate`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub steps: usize,
    /// Time between steps (s).
    pub dt: f64,
    pub num_landmarks: usize,
    /// Side length of the square landmark field (m).
    pub field_size: f64,
    /// True forward velocity (m/s).
    pub velocity: f64,
    /// True yaw rate (rad/s).
    pub yaw_rate: f64,
    pub start: Pose,
    pub sensor_range: f64,
    /// Odometry noise on the recorded velocity.
    pub velocity_std: f64,
    /// Odometry noise on the recorded yaw rate.
    pub yaw_rate_std: f64,
    /// Vehicle-frame observation noise.
    pub observation_std: LandmarkStd,
}
impl Default for ScenarioConfig {
    fn default() -> Self {
        ScenarioConfig {
            steps: 100,
            dt: 0.1,
            num_landmarks: 60,
            field_size: 200.0,
            velocity: 5.0,
            yaw_rate: 0.05,
            start: Pose::default(),
            sensor_range: crate::config::DEFAULT_SENSOR_RANGE,
            velocity_std: 0.1,
            yaw_rate_std: 0.01,
            observation_std: LandmarkStd::default(),
        }
    }
}
impl ScenarioConfig {
    pub fn validate(&self) -> Result<()> {
        if self.steps == 0 {
            return Err(FilterError::InvalidConfig(
                "a scenario needs at least one step".to_string(),
            ));
        }
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(FilterError::InvalidConfig(format!(
                "time step must be positive, got {}",
                self.dt
            )));
        }
        if !(self.field_size.is_finite() && self.field_size > 0.0) {
            return Err(FilterError::InvalidConfig(format!(
                "field size must be positive, got {}",
                self.field_size
            )));
        }
        crate::config::validate_sensor_range(self.sensor_range)?;
        for (name, value) in [
            ("velocity_std", self.velocity_std),
            ("yaw_rate_std", self.yaw_rate_std),
            ("observation_std.x", self.observation_std.x),
            ("observation_std.y", self.observation_std.y),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(FilterError::InvalidConfig(format!(
                    "{name} must be non-negative, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Filter output for one step.
///
/// `x`, `y`, `theta`, and `weight` describe the best particle after resampling. The errors are absolute
/// differences to the ground truth and are empty when no ground truth is available.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step: usize,
    pub x: f64,
    pub y: f64,
    pub theta: f64,
    pub weight: f64,
    /// Effective sample size after the weight update, before resampling.
    pub ess: f64,
    pub error_x: Option<f64>,
    pub error_y: Option<f64>,
    pub error_theta: Option<f64>,
}
impl StepResult {
    /// Writes results to a CSV file.
    pub fn to_csv<P: AsRef<Path>>(results: &[Self], path: P) -> Result<()> {
        write_records(results, path)
    }
    /// Reads results from a CSV file written by [`StepResult::to_csv`].
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Self>> {
        read_records(path)
    }
}

/// Mean absolute pose error over the steps that carry ground truth, or `None` if there are none.
pub fn mean_error(results: &[StepResult]) -> Option<Pose> {
    let errors: Vec<Pose> = results
        .iter()
        .filter_map(|r| match (r.error_x, r.error_y, r.error_theta) {
            (Some(x), Some(y), Some(theta)) => Some(Pose::new(x, y, theta)),
            _ => None,
        })
        .collect();
    if errors.is_empty() {
        return None;
    }
    let n = errors.len() as f64;
    Some(Pose::new(
        errors.iter().map(|e| e.x).sum::<f64>() / n,
        errors.iter().map(|e| e.y).sum::<f64>() / n,
        errors.iter().map(|e| e.theta).sum::<f64>() / n,
    ))
}

/// Write one `x y theta` line per particle.
pub fn write_particles<W: Write + ?Sized>(writer: &mut W, particles: &[Particle]) -> Result<()> {
    for p in particles {
        writeln!(writer, "{} {} {}", p.x, p.y, p.theta)?;
    }
    Ok(())
}

/// Drive `filter` through every step of `scenario`.
///
/// Step 0 initializes the filter around `start`, or around the first ground-truth pose when `start` is
/// `None`, using the configured initial standard deviation. Every later step predicts with the previous
/// step's control. Each step then updates the weights against that step's observations and resamples.
/// When `sink` is given, the particle set after resampling is appended to it every step.
///
/// # Returns
/// * One [`StepResult`] per step.
/// * `Err(FilterError::Format)` if the scenario fails [`Scenario::validate`].
/// * `Err(FilterError::InvalidConfig)` if there is no start pose.
pub fn run_scenario(
    filter: &mut ParticleFilter,
    scenario: &Scenario,
    start: Option<Pose>,
    mut sink: Option<&mut dyn Write>,
) -> Result<Vec<StepResult>> {
    scenario.validate()?;
    let first_truth = scenario.ground_truth.as_ref().and_then(|t| t.first());
    let Some(start) = start.or(first_truth.copied()) else {
        return Err(FilterError::InvalidConfig(
            "no start pose given and the scenario has no ground truth".to_string(),
        ));
    };
    let config = filter.config().clone();
    let mut results = Vec::with_capacity(scenario.num_steps());
    for (step, observations) in scenario.observations.iter().enumerate() {
        if step == 0 {
            filter.init(start, &config.init_std)?;
        } else {
            filter.predict(&scenario.controls[step - 1], &config.motion_std)?;
        }
        filter.update_weights(
            config.sensor_range,
            &config.landmark_std,
            observations,
            &scenario.map,
        )?;
        let ess = filter.diagnostics().effective_sample_size;
        filter.resample()?;

        let best = filter.best_particle()?;
        let error = scenario
            .ground_truth
            .as_ref()
            .and_then(|truth| truth.get(step))
            .map(|truth| pose_error(&best.pose(), truth));
        if let Some(w) = sink.as_deref_mut() {
            write_particles(w, filter.particles())?;
        }
        debug!(
            "Step {step}: best {} (weight {:.4e}), ESS {ess:.2}",
            best.pose(),
            best.weight
        );
        results.push(StepResult {
            step,
            x: best.x,
            y: best.y,
            theta: best.theta,
            weight: best.weight,
            ess,
            error_x: error.map(|e| e.x),
            error_y: error.map(|e| e.y),
            error_theta: error.map(|e| e.theta),
        });
    }
    if let Some(err) = mean_error(&results) {
        info!(
            "Finished {} steps: mean error x {:.3} m, y {:.3} m, theta {:.4} rad",
            results.len(),
            err.x,
            err.y,
            err.theta
        );
    } else {
        info!("Finished {} steps", results.len());
    }
    Ok(results)
}

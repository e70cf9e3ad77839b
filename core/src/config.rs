//! Filter configuration and its on-disk representations.
//!
//! A [`FilterConfig`] can be written to and read from JSON, YAML, or TOML. Every field has a default, so a
//! partial file only needs the values that differ from the reference kidnapped-vehicle setup.
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FilterError, Result};
use crate::resampling::ResamplingStrategy;
use crate::{LandmarkStd, PoseStd};

/// Default particle count of the reference localizer.
pub const DEFAULT_NUM_PARTICLES: usize = 75;
/// Default sensor range in meters.
pub const DEFAULT_SENSOR_RANGE: f64 = 50.0;

/// Parameters fixed for the lifetime of a [`crate::ParticleFilter`].
///
/// # Example
/// ```rust
/// use localizer::FilterConfig;
/// let config = FilterConfig { num_particles: 200, seed: Some(7), ..Default::default() };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Number of particles N, fixed after initialization.
    pub num_particles: usize,
    /// Maximum landmark range used when selecting candidates for association (m).
    pub sensor_range: f64,
    /// Standard deviation of the initial pose estimate (GPS uncertainty).
    pub init_std: PoseStd,
    /// Process noise added to every particle on prediction.
    pub motion_std: PoseStd,
    /// Independent x/y standard deviation of the landmark measurement model.
    pub landmark_std: LandmarkStd,
    /// Resampling scheme.
    pub resampling: ResamplingStrategy,
    /// Seed for the filter's random number generator. `None` seeds from OS entropy.
    pub seed: Option<u64>,
    /// Score particles on the rayon thread pool.
    pub parallel: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            num_particles: DEFAULT_NUM_PARTICLES,
            sensor_range: DEFAULT_SENSOR_RANGE,
            init_std: PoseStd::default(),
            motion_std: PoseStd::default(),
            landmark_std: LandmarkStd::default(),
            resampling: ResamplingStrategy::default(),
            seed: None,
            parallel: true,
        }
    }
}

impl FilterConfig {
    /// Reject configurations the filter cannot run with.
    ///
    /// Initial and motion standard deviations may be zero (deterministic runs) but not negative or
    /// non-finite. Landmark standard deviations must be strictly positive since they divide the Gaussian
    /// exponent. The sensor range must be positive and finite.
    pub fn validate(&self) -> Result<()> {
        if self.num_particles == 0 {
            return Err(FilterError::InvalidConfig(
                "particle count must be greater than zero".to_string(),
            ));
        }
        validate_sensor_range(self.sensor_range)?;
        validate_pose_std("init_std", &self.init_std)?;
        validate_pose_std("motion_std", &self.motion_std)?;
        validate_landmark_std(&self.landmark_std)?;
        Ok(())
    }

    /// Write the configuration to a JSON file (pretty-printed).
    pub fn to_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
    /// Read the configuration from a JSON file.
    pub fn from_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(file)?)
    }
    /// Write the configuration as YAML.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut file = File::create(path)?;
        let s = serde_yaml::to_string(self)?;
        file.write_all(s.as_bytes())?;
        Ok(())
    }
    /// Read the configuration from YAML.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(serde_yaml::from_reader(file)?)
    }
    /// Write the configuration as TOML.
    pub fn to_toml<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut file = File::create(path)?;
        let s = toml::to_string(self)?;
        file.write_all(s.as_bytes())?;
        Ok(())
    }
    /// Read the configuration from TOML.
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut s = String::new();
        let mut file = File::open(path)?;
        file.read_to_string(&mut s)?;
        Ok(toml::from_str(&s)?)
    }
    /// Generic write: choose format by file extension (.json/.yaml/.yml/.toml)
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let p = path.as_ref();
        match extension(p).as_deref() {
            Some("json") => self.to_json(p),
            Some("yaml") | Some("yml") => self.to_yaml(p),
            Some("toml") => self.to_toml(p),
            _ => Err(FilterError::UnsupportedFormat(p.display().to_string())),
        }
    }
    /// Generic read: choose format by file extension (.json/.yaml/.yml/.toml)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let p = path.as_ref();
        match extension(p).as_deref() {
            Some("json") => Self::from_json(p),
            Some("yaml") | Some("yml") => Self::from_yaml(p),
            Some("toml") => Self::from_toml(p),
            _ => Err(FilterError::UnsupportedFormat(p.display().to_string())),
        }
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
}

pub(crate) fn validate_sensor_range(sensor_range: f64) -> Result<()> {
    if !(sensor_range.is_finite() && sensor_range > 0.0) {
        return Err(FilterError::InvalidConfig(format!(
            "sensor range must be positive and finite, got {sensor_range}"
        )));
    }
    Ok(())
}

pub(crate) fn validate_pose_std(name: &str, std: &PoseStd) -> Result<()> {
    for (axis, value) in [("x", std.x), ("y", std.y), ("theta", std.theta)] {
        if !(value.is_finite() && value >= 0.0) {
            return Err(FilterError::InvalidConfig(format!(
                "{name}.{axis} must be a non-negative finite standard deviation, got {value}"
            )));
        }
    }
    Ok(())
}

pub(crate) fn validate_landmark_std(std: &LandmarkStd) -> Result<()> {
    for (axis, value) in [("x", std.x), ("y", std.y)] {
        if !(value.is_finite() && value > 0.0) {
            return Err(FilterError::InvalidConfig(format!(
                "landmark_std.{axis} must be positive and finite, got {value}"
            )));
        }
    }
    Ok(())
}

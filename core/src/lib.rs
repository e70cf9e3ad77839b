//! Landmark-based Monte Carlo localization for planar vehicles
//!
//! This crate estimates the pose $(x, y, \theta)$ of a vehicle moving in the plane by fusing a noisy
//! motion model with noisy observations of landmarks whose map positions are known ahead of time. The
//! estimator is a Sequential Monte Carlo filter (a particle filter): the belief over the pose is
//! represented by a fixed number of weighted hypotheses (particles) that are propagated, scored, and
//! resampled every time step.
//!
//! This crate is primarily built off of a handful of additional dependencies:
//! - [`rand`](https://crates.io/crates/rand) and [`rand_distr`](https://crates.io/crates/rand_distr): Provides
//!   random number generation for the process noise and the categorical resampling draws.
//! - [`nalgebra`](https://crates.io/crates/nalgebra): Provides the rigid-body transforms used to move
//!   observations from the vehicle frame into the map frame.
//! - [`rayon`](https://crates.io/crates/rayon): Provides the worker pool used to score particles in parallel.
//! - [`serde`](https://crates.io/crates/serde) and [`csv`](https://crates.io/crates/csv): Provide the
//!   configuration and scenario I/O.
//!
//! ## Crate overview
//!
//! This crate is organized into several modules:
//! - [geometry]: Euclidean distance, vehicle-to-map frame transform, and the bivariate Gaussian density.
//! - [map]: The landmark map and the selection of landmarks within sensor range of a particle.
//! - [association]: Nearest-neighbor data association between observations and candidate landmarks.
//! - [likelihood]: Importance weight of a single particle given its associated observations.
//! - [resampling]: Categorical resampling strategies.
//! - [config]: Filter configuration and its file formats.
//! - [filter]: The particle filter itself (initialization, prediction, weight update, resampling).
//! - [sim]: Scenario I/O, synthetic scenario generation, and the closed-loop driver.
//!
//! ## Filter cycle
//!
//! Each time step runs three stages strictly in sequence, since each stage consumes the full output of the
//! previous one:
//!
//! 1. **Prediction.** Every particle is advanced through a constant turn rate and velocity (bicycle) motion
//!    model using the shared control input $(v, \omega)$ over $\Delta t$, then perturbed with independent
//!    zero-mean Gaussian noise on each axis. For $|\omega| > 0$:
//!
//! $$
//! x' = x + \frac{v}{\omega}\left(\sin(\theta + \omega \Delta t) - \sin\theta\right), \quad
//! y' = y + \frac{v}{\omega}\left(\cos\theta - \cos(\theta + \omega \Delta t)\right), \quad
//! \theta' = \theta + \omega \Delta t
//! $$
//!
//!    and for $\omega \approx 0$ the straight-line limit $x' = x + v \Delta t \cos\theta$,
//!    $y' = y + v \Delta t \sin\theta$, $\theta' = \theta$. Weights are reset to one.
//!
//! 2. **Weight update.** For each particle, independently: select the map landmarks within sensor range,
//!    transform the observations into the map frame using the particle's pose, associate each transformed
//!    observation with its nearest candidate landmark, and set the weight to the product of the bivariate
//!    Gaussian densities of the residuals.
//!
//! $$
//! w = \prod_i \frac{1}{2 \pi \sigma_x \sigma_y}
//!     \exp\left(-\left[\frac{(x_i - \mu_{x,i})^2}{2\sigma_x^2} + \frac{(y_i - \mu_{y,i})^2}{2\sigma_y^2}\right]\right)
//! $$
//!
//! 3. **Resampling.** A new generation of $N$ particles is drawn with replacement with probability
//!    proportional to weight. Weights travel with the copied particles until the next prediction resets them.
//!
//! ## Coordinate conventions
//!
//! Map coordinates are a right-handed planar frame in meters. Headings are in radians, measured
//! counter-clockwise from the map x-axis. Observations are expressed in the vehicle frame: x forward, y to
//! the left. Headings are not wrapped during prediction; use [wrap_to_pi] when comparing headings.
pub mod association;
pub mod config;
pub mod error;
pub mod filter;
pub mod geometry;
pub mod likelihood;
pub mod map;
pub mod resampling;
pub mod sim;

pub use config::FilterConfig;
pub use error::{FilterError, Result};
pub use filter::{FilterDiagnostics, ParticleFilter};
pub use map::LandmarkMap;
pub use resampling::ResamplingStrategy;

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// Yaw rates with a magnitude at or below this value use the straight-line motion model.
pub const YAW_RATE_EPSILON: f64 = 1e-5;

/// Planar pose of the vehicle (or of a single hypothesis of it).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Map-frame x position in meters
    pub x: f64,
    /// Map-frame y position in meters
    pub y: f64,
    /// Heading in radians, counter-clockwise from the map x-axis
    pub theta: f64,
}
impl Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pose {{ x: {:.4}, y: {:.4}, theta: {:.4} }}",
            self.x, self.y, self.theta
        )
    }
}
impl From<[f64; 3]> for Pose {
    fn from(values: [f64; 3]) -> Self {
        Pose {
            x: values[0],
            y: values[1],
            theta: values[2],
        }
    }
}
impl From<Pose> for [f64; 3] {
    fn from(pose: Pose) -> Self {
        [pose.x, pose.y, pose.theta]
    }
}
impl Pose {
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Pose { x, y, theta }
    }
    /// Advance the pose through the constant turn rate and velocity model without noise.
    ///
    /// # Arguments
    /// * `control` - Elapsed time, forward velocity, and yaw rate applied over the interval.
    ///
    /// # Returns
    /// * The noise-free pose at the end of the interval. The heading is not wrapped.
    ///
    /// # Example
    /// ```rust
    /// use localizer::{Control, Pose};
    /// let pose = Pose::new(0.0, 0.0, 0.0).advance(&Control::new(1.0, 1.0, 0.0));
    /// assert_eq!(pose, Pose::new(1.0, 0.0, 0.0));
    /// ```
    pub fn advance(&self, control: &Control) -> Pose {
        let Control {
            dt,
            velocity,
            yaw_rate,
        } = *control;
        if yaw_rate.abs() > YAW_RATE_EPSILON {
            let theta_f = self.theta + yaw_rate * dt;
            let radius = velocity / yaw_rate;
            Pose {
                x: self.x + radius * (theta_f.sin() - self.theta.sin()),
                y: self.y + radius * (self.theta.cos() - theta_f.cos()),
                theta: theta_f,
            }
        } else {
            Pose {
                x: self.x + velocity * dt * self.theta.cos(),
                y: self.y + velocity * dt * self.theta.sin(),
                theta: self.theta,
            }
        }
    }
}

/// Independent per-axis standard deviations for a planar pose.
///
/// Used both for the initial pose uncertainty and for the per-step process noise.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseStd {
    /// Standard deviation of x in meters
    pub x: f64,
    /// Standard deviation of y in meters
    pub y: f64,
    /// Standard deviation of the heading in radians
    pub theta: f64,
}
impl Default for PoseStd {
    fn default() -> Self {
        PoseStd {
            x: 0.3,
            y: 0.3,
            theta: 0.01,
        }
    }
}
impl PoseStd {
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        PoseStd { x, y, theta }
    }
    /// All-zero noise, which makes initialization and prediction deterministic.
    pub fn zero() -> Self {
        PoseStd::new(0.0, 0.0, 0.0)
    }
}

/// Landmark measurement noise, used as the independent x/y standard deviations of the bivariate
/// Gaussian that scores an associated observation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LandmarkStd {
    /// Standard deviation along the map x-axis in meters
    pub x: f64,
    /// Standard deviation along the map y-axis in meters
    pub y: f64,
}
impl Default for LandmarkStd {
    fn default() -> Self {
        LandmarkStd { x: 0.3, y: 0.3 }
    }
}
impl LandmarkStd {
    pub fn new(x: f64, y: f64) -> Self {
        LandmarkStd { x, y }
    }
}

/// Control input shared by every particle for a single prediction step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Control {
    /// Elapsed time in seconds
    pub dt: f64,
    /// Forward velocity in m/s
    pub velocity: f64,
    /// Yaw rate in rad/s
    pub yaw_rate: f64,
}
impl Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Control {{ dt: {:.4}, velocity: {:.4}, yaw_rate: {:.4} }}",
            self.dt, self.velocity, self.yaw_rate
        )
    }
}
impl Control {
    pub fn new(dt: f64, velocity: f64, yaw_rate: f64) -> Self {
        Control {
            dt,
            velocity,
            yaw_rate,
        }
    }
}

/// A single pose hypothesis and its importance weight.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Particle {
    /// Index assigned at initialization. Copies made during resampling keep the id of their source.
    pub id: usize,
    pub x: f64,
    pub y: f64,
    pub theta: f64,
    /// Unnormalized importance weight, always non-negative
    pub weight: f64,
}
impl Display for Particle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Particle")
            .field("id", &self.id)
            .field("x", &self.x)
            .field("y", &self.y)
            .field("theta", &self.theta)
            .field("weight", &self.weight)
            .finish()
    }
}
impl Particle {
    pub fn new(id: usize, pose: Pose, weight: f64) -> Self {
        Particle {
            id,
            x: pose.x,
            y: pose.y,
            theta: pose.theta,
            weight,
        }
    }
    pub fn pose(&self) -> Pose {
        Pose::new(self.x, self.y, self.theta)
    }
}

/// A point observation of a landmark.
///
/// Depending on context this is either a raw sensor observation in the vehicle frame, an observation
/// transformed into the map frame, or a map landmark projected into the same record shape.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LandmarkObservation {
    pub id: usize,
    pub x: f64,
    pub y: f64,
}
impl LandmarkObservation {
    pub fn new(id: usize, x: f64, y: f64) -> Self {
        LandmarkObservation { id, x, y }
    }
}

/// A map landmark with a known, fixed position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub id: usize,
    pub x: f64,
    pub y: f64,
}
impl Landmark {
    pub fn new(id: usize, x: f64, y: f64) -> Self {
        Landmark { id, x, y }
    }
}
impl From<&Landmark> for LandmarkObservation {
    fn from(landmark: &Landmark) -> Self {
        LandmarkObservation::new(landmark.id, landmark.x, landmark.y)
    }
}

/// Wrap an angle to the range $[-\pi, \pi]$ radians
///
/// # Example
/// ```rust
/// use localizer::wrap_to_pi;
/// use std::f64::consts::PI;
/// assert!((wrap_to_pi(3.0 * PI / 2.0) + PI / 2.0).abs() < 1e-12);
/// ```
pub fn wrap_to_pi(angle: f64) -> f64 {
    let mut wrapped = angle;
    while wrapped > std::f64::consts::PI {
        wrapped -= 2.0 * std::f64::consts::PI;
    }
    while wrapped < -std::f64::consts::PI {
        wrapped += 2.0 * std::f64::consts::PI;
    }
    wrapped
}

/// Absolute error between an estimated pose and the true pose.
///
/// The heading error is wrapped to $[0, \pi]$ so that estimates on either side of the $\pm\pi$ seam compare
/// correctly.
pub fn pose_error(estimate: &Pose, truth: &Pose) -> Pose {
    Pose {
        x: (estimate.x - truth.x).abs(),
        y: (estimate.y - truth.y).abs(),
        theta: wrap_to_pi(estimate.theta - truth.theta).abs(),
    }
}

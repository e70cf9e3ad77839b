//! Planar geometry and likelihood helpers shared by the weight update.
//!
//! All functions here are pure. The frame transform relies on [`nalgebra::Isometry2`] so that the rotation
//! and translation are applied in a single rigid-body operation.
use nalgebra::{Isometry2, Point2, Vector2};

use crate::{LandmarkObservation, Pose};

/// Euclidean distance between two points in the plane.
///
/// # Example
/// ```rust
/// use localizer::geometry::dist;
/// assert_eq!(dist(0.0, 0.0, 3.0, 4.0), 5.0);
/// ```
pub fn dist(x1: f64, y1: f64, x2: f64, y2: f64) -> f64 {
    (x2 - x1).hypot(y2 - y1)
}

/// Rigid-body transform from the vehicle frame of `pose` into the map frame.
pub fn vehicle_to_map(pose: &Pose) -> Isometry2<f64> {
    Isometry2::new(Vector2::new(pose.x, pose.y), pose.theta)
}

/// Transform vehicle-frame observations into the map frame as seen from `pose`.
///
/// Each observation $(o_x, o_y)$ is rotated by $\theta$ and then translated by $(x, y)$:
///
/// $$
/// X = x + o_x \cos\theta - o_y \sin\theta, \quad Y = y + o_x \sin\theta + o_y \cos\theta
/// $$
///
/// Order and ids are preserved.
///
/// # Example
/// ```rust
/// use localizer::{LandmarkObservation, Pose};
/// use localizer::geometry::transform_to_map;
/// use std::f64::consts::FRAC_PI_2;
/// let map_frame = transform_to_map(
///     &Pose::new(5.0, 5.0, FRAC_PI_2),
///     &[LandmarkObservation::new(0, 2.0, 0.0)],
/// );
/// assert!((map_frame[0].x - 5.0).abs() < 1e-12);
/// assert!((map_frame[0].y - 7.0).abs() < 1e-12);
/// ```
pub fn transform_to_map(
    pose: &Pose,
    observations: &[LandmarkObservation],
) -> Vec<LandmarkObservation> {
    let transform = vehicle_to_map(pose);
    observations
        .iter()
        .map(|obs| {
            let p = transform * Point2::new(obs.x, obs.y);
            LandmarkObservation::new(obs.id, p.x, p.y)
        })
        .collect()
}

/// Inverse of [transform_to_map]: express map-frame points in the vehicle frame of `pose`.
pub fn transform_to_vehicle(
    pose: &Pose,
    points: &[LandmarkObservation],
) -> Vec<LandmarkObservation> {
    let transform = vehicle_to_map(pose).inverse();
    points
        .iter()
        .map(|point| {
            let p = transform * Point2::new(point.x, point.y);
            LandmarkObservation::new(point.id, p.x, p.y)
        })
        .collect()
}

/// Bivariate Gaussian density with diagonal covariance $\mathrm{diag}(\sigma_x^2, \sigma_y^2)$ evaluated at
/// $(x, y)$ for mean $(\mu_x, \mu_y)$.
pub fn bivariate_gaussian(
    x: f64,
    y: f64,
    mu_x: f64,
    mu_y: f64,
    sigma_x: f64,
    sigma_y: f64,
) -> f64 {
    log_bivariate_gaussian(x, y, mu_x, mu_y, sigma_x, sigma_y).exp()
}

/// Natural logarithm of [`bivariate_gaussian`]. Finite wherever the density itself would overflow or
/// underflow.
pub fn log_bivariate_gaussian(
    x: f64,
    y: f64,
    mu_x: f64,
    mu_y: f64,
    sigma_x: f64,
    sigma_y: f64,
) -> f64 {
    let exponent = (x - mu_x).powi(2) / (2.0 * sigma_x.powi(2))
        + (y - mu_y).powi(2) / (2.0 * sigma_y.powi(2));
    -(2.0 * std::f64::consts::PI * sigma_x * sigma_y).ln() - exponent
}

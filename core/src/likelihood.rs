//! Importance weight of a single particle.
use crate::geometry::log_bivariate_gaussian;
use crate::{LandmarkObservation, LandmarkStd};

/// Product of bivariate Gaussian densities of each observation about its associated landmark.
///
/// # Arguments
/// * `observations` - Observations in the map frame of the particle being scored.
/// * `matches` - Associated landmark positions, index-aligned with `observations` (the output of
///   [`crate::association::associate`]). These are the Gaussian means.
/// * `std_landmark` - Independent x/y standard deviations of the density.
///
/// # Returns
/// * The unnormalized weight. The empty product is `1.0`, so a cycle with no observations leaves the
///   prior weight unchanged. The product can underflow to `0.0` for particles far from the truth, or
///   overflow to infinity for many observations with small standard deviations. Use
///   [`log_particle_weight`] when comparing particles in either regime.
pub fn particle_weight(
    observations: &[LandmarkObservation],
    matches: &[LandmarkObservation],
    std_landmark: &LandmarkStd,
) -> f64 {
    log_particle_weight(observations, matches, std_landmark).exp()
}

/// Natural logarithm of [`particle_weight`], accumulated as a sum of log densities so it stays finite for
/// any number of observations.
pub fn log_particle_weight(
    observations: &[LandmarkObservation],
    matches: &[LandmarkObservation],
    std_landmark: &LandmarkStd,
) -> f64 {
    debug_assert_eq!(observations.len(), matches.len());
    observations
        .iter()
        .zip(matches.iter())
        .map(|(obs, mean)| {
            log_bivariate_gaussian(obs.x, obs.y, mean.x, mean.y, std_landmark.x, std_landmark.y)
        })
        .sum()
}

//! The particle filter: initialization, prediction, weight update, and resampling.
//!
//! The filter owns its particle set, an index-aligned mirror of the particle weights, and a single random
//! number generator that lives as long as the filter. A typical closed loop looks like:
//!
//! ```rust
//! use localizer::{Control, FilterConfig, Landmark, LandmarkMap, LandmarkObservation, ParticleFilter, Pose};
//! let config = FilterConfig { num_particles: 50, seed: Some(1), ..Default::default() };
//! let mut pf = ParticleFilter::new(config).unwrap();
//! let map = LandmarkMap::new(vec![Landmark::new(1, 5.0, 0.0), Landmark::new(2, 0.0, 5.0)]);
//! pf.init(Pose::new(0.0, 0.0, 0.0), &Default::default()).unwrap();
//! let observations = vec![LandmarkObservation::new(0, 4.0, 0.0), LandmarkObservation::new(0, -1.0, 5.0)];
//! pf.step(&Control::new(0.1, 10.0, 0.0), &observations, &map).unwrap();
//! let best = pf.best_particle().unwrap();
//! assert!((best.x - 1.0).abs() < 2.0);
//! ```
use std::fmt::{self, Debug};

use log::{debug, trace, warn};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;
use rayon::prelude::*;
use serde::Serialize;

use crate::association::associate;
use crate::config::{FilterConfig, validate_landmark_std, validate_pose_std, validate_sensor_range};
use crate::error::{FilterError, Result};
use crate::geometry::transform_to_map;
use crate::likelihood::log_particle_weight;
use crate::map::LandmarkMap;
use crate::{Control, LandmarkObservation, LandmarkStd, Particle, Pose, PoseStd};

/// Per-cycle health indicators of the filter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct FilterDiagnostics {
    /// Completed resampling steps.
    pub iterations: usize,
    /// Effective sample size after the latest weight update.
    pub effective_sample_size: f64,
    /// Largest weight after the latest weight update.
    pub max_weight: f64,
    /// Particles that had observations but no landmark in sensor range during the latest weight update.
    pub particles_without_landmarks: usize,
    /// Total number of resampling steps that fell back to uniform selection.
    pub degenerate_resamples: usize,
    /// Whether the latest resampling step found no usable weights.
    pub diverged: bool,
}

/// Largest log weight kept without rescaling. `exp` overflows just above 709.
const MAX_LOG_WEIGHT: f64 = 700.0;

/// Outcome of scoring one particle against the current observations.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Score {
    /// Natural log of the weight, `-inf` for a zero weight.
    log_weight: f64,
    no_landmarks_in_range: bool,
}

pub struct ParticleFilter {
    config: FilterConfig,
    particles: Vec<Particle>,
    weights: Vec<f64>,
    rng: StdRng,
    initialized: bool,
    diagnostics: FilterDiagnostics,
}
impl Debug for ParticleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let max_weight = self.weights.iter().copied().fold(0.0, f64::max);
        let min_weight = self.weights.iter().copied().fold(f64::INFINITY, f64::min);
        f.debug_struct("ParticleFilter")
            .field("num_particles", &self.particles.len())
            .field("initialized", &self.initialized)
            .field("resampling", &self.config.resampling)
            .field("effective_particles", &self.effective_sample_size())
            .field(
                "weight_range",
                &format_args!("[{:.4e}, {:.4e}]", min_weight, max_weight),
            )
            .field("diagnostics", &self.diagnostics)
            .finish()
    }
}
impl ParticleFilter {
    /// Create an uninitialized filter after validating `config`.
    ///
    /// The random number generator is seeded from `config.seed` when present and from OS entropy
    /// otherwise. It is reused by every subsequent call.
    pub fn new(config: FilterConfig) -> Result<Self> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Ok(ParticleFilter {
            config,
            particles: Vec::new(),
            weights: Vec::new(),
            rng,
            initialized: false,
            diagnostics: FilterDiagnostics::default(),
        })
    }
    /// Sample the initial particle set around a pose estimate.
    ///
    /// Draws `num_particles` particles from independent Gaussians centered on `pose` with the per-axis
    /// standard deviations in `std`. Particle ids are their indices and all weights are one. Calling this
    /// again discards the current particle set and starts over.
    pub fn init(&mut self, pose: Pose, std: &PoseStd) -> Result<()> {
        validate_pose_std("init_std", std)?;
        let dist_x = Normal::new(pose.x, std.x)?;
        let dist_y = Normal::new(pose.y, std.y)?;
        let dist_theta = Normal::new(pose.theta, std.theta)?;
        let n = self.config.num_particles;
        let rng = &mut self.rng;
        self.particles = (0..n)
            .map(|id| {
                let sample = Pose::new(
                    dist_x.sample(rng),
                    dist_y.sample(rng),
                    dist_theta.sample(rng),
                );
                Particle::new(id, sample, 1.0)
            })
            .collect();
        self.weights = vec![1.0; n];
        self.diagnostics = FilterDiagnostics::default();
        self.initialized = true;
        debug!("Initialized {n} particles around {pose}");
        Ok(())
    }
    /// Advance every particle through the motion model and add process noise.
    ///
    /// All particles receive the same control input; each draws its own noise on every axis. Weights are
    /// reset to one since no evidence has been seen yet this cycle.
    pub fn predict(&mut self, control: &Control, std_pos: &PoseStd) -> Result<()> {
        self.ensure_initialized()?;
        validate_pose_std("motion_std", std_pos)?;
        if !(control.dt.is_finite() && control.dt >= 0.0) {
            return Err(FilterError::InvalidConfig(format!(
                "time step must be non-negative and finite, got {}",
                control.dt
            )));
        }
        let noise_x = Normal::new(0.0, std_pos.x)?;
        let noise_y = Normal::new(0.0, std_pos.y)?;
        let noise_theta = Normal::new(0.0, std_pos.theta)?;
        for particle in self.particles.iter_mut() {
            let moved = particle.pose().advance(control);
            particle.x = moved.x + noise_x.sample(&mut self.rng);
            particle.y = moved.y + noise_y.sample(&mut self.rng);
            particle.theta = moved.theta + noise_theta.sample(&mut self.rng);
            particle.weight = 1.0;
        }
        self.weights.fill(1.0);
        trace!(
            "Predicted {} particles with {control}",
            self.particles.len()
        );
        Ok(())
    }
    /// Score every particle against the current observations.
    ///
    /// For each particle: select the map landmarks within `sensor_range`, transform `observations` from the
    /// vehicle frame into the map frame, associate them with their nearest candidates, and set the weight
    /// to the product of the bivariate Gaussian likelihoods. A particle with observations but no landmark in
    /// range gets weight zero. The weight mirror is rebuilt before returning.
    ///
    /// Products are accumulated in log space. When the largest product would overflow, or every product
    /// would underflow to zero, all weights are divided by the largest one so that it becomes `1.0`. Only
    /// weight ratios matter to resampling and to [`ParticleFilter::best_particle`], so both are unchanged.
    ///
    /// # Arguments
    /// * `sensor_range` - Maximum landmark range in meters.
    /// * `std_landmark` - Independent x/y standard deviations of the landmark measurement.
    /// * `observations` - Landmark observations in the vehicle frame.
    /// * `map` - The landmark map.
    pub fn update_weights(
        &mut self,
        sensor_range: f64,
        std_landmark: &LandmarkStd,
        observations: &[LandmarkObservation],
        map: &LandmarkMap,
    ) -> Result<()> {
        self.ensure_initialized()?;
        validate_sensor_range(sensor_range)?;
        validate_landmark_std(std_landmark)?;

        let score = |particle: &Particle| {
            weigh_particle(particle, sensor_range, std_landmark, observations, map)
        };
        let scores: Vec<Score> = if self.config.parallel {
            self.particles.par_iter().map(score).collect()
        } else {
            self.particles.iter().map(score).collect()
        };

        let max_log = scores
            .iter()
            .map(|s| s.log_weight)
            .filter(|w| w.is_finite())
            .fold(f64::NEG_INFINITY, f64::max);
        let shift = if max_log.is_finite() && max_log.abs() > MAX_LOG_WEIGHT {
            debug!(
                "Rescaling weights by exp({:.3}) to keep them representable",
                -max_log
            );
            max_log
        } else {
            0.0
        };

        let mut without_landmarks = 0;
        for ((particle, mirror), s) in self
            .particles
            .iter_mut()
            .zip(self.weights.iter_mut())
            .zip(scores)
        {
            let weight = (s.log_weight - shift).exp();
            particle.weight = weight;
            *mirror = weight;
            if s.no_landmarks_in_range {
                without_landmarks += 1;
            }
        }
        if without_landmarks > 0 {
            warn!(
                "{without_landmarks} of {} particles have no landmarks within {sensor_range} m; their weights are zero",
                self.particles.len()
            );
        }
        self.diagnostics.particles_without_landmarks = without_landmarks;
        self.diagnostics.effective_sample_size = self.effective_sample_size();
        self.diagnostics.max_weight = self.weights.iter().copied().fold(0.0, f64::max);
        debug!(
            "Weight update: {} particles, {} observations, ESS {:.2}, max weight {:.4e}",
            self.particles.len(),
            observations.len(),
            self.diagnostics.effective_sample_size,
            self.diagnostics.max_weight
        );
        Ok(())
    }
    /// Draw a new generation of particles with probability proportional to weight.
    ///
    /// Copies keep the weight of their source particle until the next prediction. If the weights do not
    /// form a usable distribution (all zero or non-finite) the draw falls back to uniform selection and the
    /// cycle is flagged as diverged in [`FilterDiagnostics`].
    pub fn resample(&mut self) -> Result<()> {
        self.ensure_initialized()?;
        let n = self.particles.len();
        let resampled = self
            .config
            .resampling
            .resample_indices(&self.weights, n, &mut self.rng);
        let indices = match resampled {
            Some(indices) => {
                self.diagnostics.diverged = false;
                indices
            }
            None => {
                warn!(
                    "Degenerate particle weights (sum {:.4e}); resampling uniformly",
                    self.weights.iter().sum::<f64>()
                );
                self.diagnostics.degenerate_resamples += 1;
                self.diagnostics.diverged = true;
                (0..n).map(|_| self.rng.random_range(0..n)).collect()
            }
        };
        self.particles = indices.iter().map(|&i| self.particles[i]).collect();
        self.weights = self.particles.iter().map(|p| p.weight).collect();
        self.diagnostics.iterations += 1;
        Ok(())
    }
    /// One full cycle using the noise and range settings from the configuration.
    pub fn step(
        &mut self,
        control: &Control,
        observations: &[LandmarkObservation],
        map: &LandmarkMap,
    ) -> Result<()> {
        let motion_std = self.config.motion_std;
        let landmark_std = self.config.landmark_std;
        let sensor_range = self.config.sensor_range;
        self.predict(control, &motion_std)?;
        self.update_weights(sensor_range, &landmark_std, observations, map)?;
        self.resample()
    }
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }
    /// Weight mirror, index-aligned with [`ParticleFilter::particles`].
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
    pub fn num_particles(&self) -> usize {
        self.config.num_particles
    }
    pub fn config(&self) -> &FilterConfig {
        &self.config
    }
    pub fn diagnostics(&self) -> &FilterDiagnostics {
        &self.diagnostics
    }
    /// The particle with the largest weight. Ties go to the lowest index.
    pub fn best_particle(&self) -> Result<Particle> {
        self.ensure_initialized()?;
        self.particles
            .iter()
            .fold(None::<&Particle>, |best, p| match best {
                Some(b) if b.weight >= p.weight => Some(b),
                _ => Some(p),
            })
            .copied()
            .ok_or(FilterError::NotInitialized)
    }
    /// Weighted mean pose of the particle set.
    ///
    /// The heading is a circular mean, $\operatorname{atan2}(\sum w \sin\theta, \sum w \cos\theta)$. When
    /// the weights sum to zero every particle counts equally.
    pub fn estimate(&self) -> Result<Pose> {
        self.ensure_initialized()?;
        let total: f64 = self.weights.iter().sum();
        let uniform = !(total > 0.0 && total.is_finite());
        let (mut x, mut y, mut sin, mut cos, mut sum) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for particle in &self.particles {
            let w = if uniform { 1.0 } else { particle.weight };
            x += w * particle.x;
            y += w * particle.y;
            sin += w * particle.theta.sin();
            cos += w * particle.theta.cos();
            sum += w;
        }
        Ok(Pose::new(x / sum, y / sum, sin.atan2(cos)))
    }
    /// Effective sample size $(\sum w)^2 / \sum w^2$, or zero when all weights are zero.
    pub fn effective_sample_size(&self) -> f64 {
        let sum: f64 = self.weights.iter().sum();
        let sum_of_squares: f64 = self.weights.iter().map(|w| w * w).sum();
        if sum_of_squares > 0.0 && sum_of_squares.is_finite() {
            sum * sum / sum_of_squares
        } else {
            0.0
        }
    }
    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(FilterError::NotInitialized)
        }
    }
}

/// Weight of a single particle. Pure: reads the particle and the shared inputs only.
fn weigh_particle(
    particle: &Particle,
    sensor_range: f64,
    std_landmark: &LandmarkStd,
    observations: &[LandmarkObservation],
    map: &LandmarkMap,
) -> Score {
    let candidates = map.landmarks_in_range(particle.x, particle.y, sensor_range);
    let transformed = transform_to_map(&particle.pose(), observations);
    let score = match associate(&candidates, &transformed) {
        Some(matches) => Score {
            log_weight: log_particle_weight(&transformed, &matches, std_landmark),
            no_landmarks_in_range: false,
        },
        None => Score {
            log_weight: f64::NEG_INFINITY,
            no_landmarks_in_range: true,
        },
    };
    trace!(
        "Particle {} at ({:.3}, {:.3}, {:.3}): {} candidates, log weight {:.4}",
        particle.id,
        particle.x,
        particle.y,
        particle.theta,
        candidates.len(),
        score.log_weight
    );
    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Landmark;
    use crate::resampling::ResamplingStrategy;
    use assert_approx_eq::assert_approx_eq;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn config(n: usize) -> FilterConfig {
        FilterConfig {
            num_particles: n,
            seed: Some(42),
            ..Default::default()
        }
    }
    fn square_map() -> LandmarkMap {
        LandmarkMap::new(vec![
            Landmark::new(1, 10.0, 0.0),
            Landmark::new(2, 0.0, 10.0),
            Landmark::new(3, -10.0, 0.0),
            Landmark::new(4, 0.0, -10.0),
        ])
    }
    /// Observations of `map` from `pose` in the vehicle frame, without noise.
    fn observe(map: &LandmarkMap, pose: &Pose, range: f64) -> Vec<LandmarkObservation> {
        crate::geometry::transform_to_vehicle(pose, &map.landmarks_in_range(pose.x, pose.y, range))
    }
    fn assert_mirror(pf: &ParticleFilter) {
        assert_eq!(pf.weights().len(), pf.particles().len());
        for (w, p) in pf.weights().iter().zip(pf.particles()) {
            assert_eq!(*w, p.weight);
        }
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let result = ParticleFilter::new(config(0));
        assert!(matches!(result, Err(FilterError::InvalidConfig(_))));
        let bad_landmark = FilterConfig {
            landmark_std: LandmarkStd::new(-0.3, 0.3),
            ..config(10)
        };
        assert!(ParticleFilter::new(bad_landmark).is_err());
    }
    #[test]
    fn test_uninitialized_use_fails() {
        let mut pf = ParticleFilter::new(config(10)).unwrap();
        assert!(!pf.is_initialized());
        let control = Control::new(0.1, 1.0, 0.0);
        assert!(matches!(
            pf.predict(&control, &PoseStd::default()),
            Err(FilterError::NotInitialized)
        ));
        assert!(matches!(
            pf.update_weights(50.0, &LandmarkStd::default(), &[], &square_map()),
            Err(FilterError::NotInitialized)
        ));
        assert!(matches!(pf.resample(), Err(FilterError::NotInitialized)));
        assert!(matches!(pf.best_particle(), Err(FilterError::NotInitialized)));
        assert!(matches!(pf.estimate(), Err(FilterError::NotInitialized)));
    }
    #[test]
    fn test_init_zero_std_reproduces_seed_pose() {
        let mut pf = ParticleFilter::new(config(30)).unwrap();
        let pose = Pose::new(4.0, -2.5, 0.3);
        pf.init(pose, &PoseStd::zero()).unwrap();
        assert!(pf.is_initialized());
        assert_eq!(pf.particles().len(), 30);
        for (i, p) in pf.particles().iter().enumerate() {
            assert_eq!(p.id, i);
            assert_eq!(p.pose(), pose);
            assert_eq!(p.weight, 1.0);
        }
        assert_mirror(&pf);
    }
    #[test]
    fn test_init_spread_matches_std() {
        let mut pf = ParticleFilter::new(config(4000)).unwrap();
        pf.init(Pose::new(100.0, 50.0, 1.0), &PoseStd::new(2.0, 0.5, 0.1))
            .unwrap();
        let n = pf.particles().len() as f64;
        let mean_x = pf.particles().iter().map(|p| p.x).sum::<f64>() / n;
        let sum_sq: f64 = pf.particles().iter().map(|p| (p.x - mean_x).powi(2)).sum();
        let var_x = sum_sq / n;
        let mean_y = pf.particles().iter().map(|p| p.y).sum::<f64>() / n;
        assert_approx_eq!(mean_x, 100.0, 0.15);
        assert_approx_eq!(mean_y, 50.0, 0.05);
        assert_approx_eq!(var_x.sqrt(), 2.0, 0.15);
    }
    #[test]
    fn test_init_rejects_negative_std() {
        let mut pf = ParticleFilter::new(config(10)).unwrap();
        let result = pf.init(Pose::default(), &PoseStd::new(-1.0, 0.0, 0.0));
        assert!(matches!(result, Err(FilterError::InvalidConfig(_))));
        assert!(!pf.is_initialized());
    }
    #[test]
    fn test_same_seed_same_particles() {
        let mut a = ParticleFilter::new(config(20)).unwrap();
        let mut b = ParticleFilter::new(config(20)).unwrap();
        a.init(Pose::default(), &PoseStd::default()).unwrap();
        b.init(Pose::default(), &PoseStd::default()).unwrap();
        assert_eq!(a.particles(), b.particles());
    }
    #[test]
    fn test_rng_is_not_reseeded_between_calls() {
        // two successive predictions with the same input must draw different noise
        let mut pf = ParticleFilter::new(config(5)).unwrap();
        pf.init(Pose::default(), &PoseStd::zero()).unwrap();
        let control = Control::new(0.0, 0.0, 0.0);
        pf.predict(&control, &PoseStd::new(1.0, 1.0, 0.1)).unwrap();
        let first: Vec<f64> = pf.particles().iter().map(|p| p.x).collect();
        pf.init(Pose::default(), &PoseStd::zero()).unwrap();
        pf.predict(&control, &PoseStd::new(1.0, 1.0, 0.1)).unwrap();
        let second: Vec<f64> = pf.particles().iter().map(|p| p.x).collect();
        assert_ne!(first, second);
        // noise draws are independent across particles as well
        assert!(first.windows(2).all(|w| w[0] != w[1]));
    }
    #[test]
    fn test_predict_straight_line() {
        let mut pf = ParticleFilter::new(config(10)).unwrap();
        pf.init(Pose::new(0.0, 0.0, 0.0), &PoseStd::zero()).unwrap();
        pf.predict(&Control::new(1.0, 1.0, 0.0), &PoseStd::zero())
            .unwrap();
        for p in pf.particles() {
            assert_eq!(p.pose(), Pose::new(1.0, 0.0, 0.0));
        }
    }
    #[test]
    fn test_predict_turning() {
        let mut pf = ParticleFilter::new(config(10)).unwrap();
        pf.init(Pose::new(0.0, 0.0, 0.0), &PoseStd::zero()).unwrap();
        pf.predict(&Control::new(1.0, 1.0, FRAC_PI_2), &PoseStd::zero())
            .unwrap();
        for p in pf.particles() {
            assert_approx_eq!(p.theta, FRAC_PI_2, 1e-12);
            assert_approx_eq!(p.x, 2.0 / PI, 1e-12);
            assert_approx_eq!(p.y, 2.0 / PI, 1e-12);
        }
    }
    #[test]
    fn test_predict_resets_weights() {
        let mut pf = ParticleFilter::new(config(10)).unwrap();
        pf.init(Pose::default(), &PoseStd::zero()).unwrap();
        for (i, (p, w)) in pf
            .particles
            .iter_mut()
            .zip(pf.weights.iter_mut())
            .enumerate()
        {
            p.weight = i as f64;
            *w = i as f64;
        }
        pf.predict(&Control::new(0.1, 1.0, 0.2), &PoseStd::default())
            .unwrap();
        assert!(pf.particles().iter().all(|p| p.weight == 1.0));
        assert_mirror(&pf);
    }
    #[test]
    fn test_predict_rejects_negative_dt() {
        let mut pf = ParticleFilter::new(config(10)).unwrap();
        pf.init(Pose::default(), &PoseStd::zero()).unwrap();
        let result = pf.predict(&Control::new(-0.1, 1.0, 0.0), &PoseStd::zero());
        assert!(matches!(result, Err(FilterError::InvalidConfig(_))));
    }
    #[test]
    fn test_update_weights_prefers_true_pose() {
        let map = square_map();
        let truth = Pose::new(0.0, 0.0, 0.0);
        let observations = observe(&map, &truth, 50.0);
        let mut pf = ParticleFilter::new(config(200)).unwrap();
        pf.init(truth, &PoseStd::new(1.0, 1.0, 0.05)).unwrap();
        pf.update_weights(50.0, &LandmarkStd::default(), &observations, &map)
            .unwrap();
        assert!(pf.weights().iter().all(|w| *w >= 0.0));
        assert_mirror(&pf);
        let best = pf.best_particle().unwrap();
        let best_error = best.x.hypot(best.y);
        let mean_error = pf.particles().iter().map(|p| p.x.hypot(p.y)).sum::<f64>() / 200.0;
        assert!(best_error < mean_error);
        assert!(pf.diagnostics().effective_sample_size > 0.0);
        assert!(pf.diagnostics().effective_sample_size <= 200.0 + 1e-9);
        assert_eq!(pf.diagnostics().max_weight, best.weight);
    }
    #[test]
    fn test_update_weights_without_observations_keeps_prior() {
        let mut pf = ParticleFilter::new(config(10)).unwrap();
        pf.init(Pose::default(), &PoseStd::default()).unwrap();
        pf.update_weights(50.0, &LandmarkStd::default(), &[], &square_map())
            .unwrap();
        assert!(pf.weights().iter().all(|w| *w == 1.0));
        assert_eq!(pf.diagnostics().particles_without_landmarks, 0);
    }
    #[test]
    fn test_no_landmarks_in_range_gives_zero_weight() {
        let mut pf = ParticleFilter::new(config(25)).unwrap();
        pf.init(Pose::new(500.0, 500.0, 0.0), &PoseStd::default())
            .unwrap();
        let observations = vec![LandmarkObservation::new(0, 3.0, 1.0)];
        pf.update_weights(50.0, &LandmarkStd::default(), &observations, &square_map())
            .unwrap();
        assert!(pf.weights().iter().all(|w| *w == 0.0));
        assert_eq!(pf.diagnostics().particles_without_landmarks, 25);
        assert_eq!(pf.effective_sample_size(), 0.0);
        assert_mirror(&pf);
    }
    #[test]
    fn test_all_zero_weights_fall_back_to_uniform() {
        let mut pf = ParticleFilter::new(config(25)).unwrap();
        pf.init(Pose::new(500.0, 500.0, 0.0), &PoseStd::default())
            .unwrap();
        let observations = vec![LandmarkObservation::new(0, 3.0, 1.0)];
        pf.update_weights(50.0, &LandmarkStd::default(), &observations, &square_map())
            .unwrap();
        pf.resample().unwrap();
        assert_eq!(pf.particles().len(), 25);
        assert!(pf.diagnostics().diverged);
        assert_eq!(pf.diagnostics().degenerate_resamples, 1);
        assert_mirror(&pf);
        // the estimate stays defined on an all-zero weight vector
        let estimate = pf.estimate().unwrap();
        assert!(estimate.x.is_finite() && estimate.y.is_finite());
    }
    #[test]
    fn test_update_weights_rejects_bad_inputs() {
        let mut pf = ParticleFilter::new(config(5)).unwrap();
        pf.init(Pose::default(), &PoseStd::default()).unwrap();
        let map = square_map();
        assert!(
            pf.update_weights(0.0, &LandmarkStd::default(), &[], &map)
                .is_err()
        );
        assert!(
            pf.update_weights(f64::NAN, &LandmarkStd::default(), &[], &map)
                .is_err()
        );
        assert!(
            pf.update_weights(10.0, &LandmarkStd::new(0.0, 0.3), &[], &map)
                .is_err()
        );
    }
    #[test]
    fn test_many_sharp_observations_do_not_overflow() {
        // 120 landmarks in sensor range observed with a 1 cm standard deviation
        let landmarks: Vec<Landmark> = (0..120)
            .map(|i| {
                let angle = i as f64 * 2.0 * PI / 120.0;
                Landmark::new(i + 1, 20.0 * angle.cos(), 20.0 * angle.sin())
            })
            .collect();
        let map = LandmarkMap::new(landmarks);
        let truth = Pose::new(0.0, 0.0, 0.0);
        let observations = observe(&map, &truth, 50.0);
        assert_eq!(observations.len(), 120);
        let sharp = LandmarkStd::new(0.01, 0.01);
        let mut pf = ParticleFilter::new(FilterConfig {
            landmark_std: sharp,
            ..config(3)
        })
        .unwrap();
        pf.init(truth, &PoseStd::zero()).unwrap();
        pf.particles[1].x = 0.005;
        pf.particles[2].x = 0.02;
        pf.update_weights(50.0, &sharp, &observations, &map)
            .unwrap();
        assert!(pf.weights().iter().all(|w| w.is_finite() && *w > 0.0));
        assert_approx_eq!(pf.weights()[0], 1.0, 1e-9);
        assert!(pf.weights()[0] > pf.weights()[1]);
        assert!(pf.weights()[1] > pf.weights()[2]);
        assert_mirror(&pf);
        pf.resample().unwrap();
        assert!(!pf.diagnostics().diverged);
        assert_eq!(pf.diagnostics().degenerate_resamples, 0);
    }
    #[test]
    fn test_far_particles_are_rescaled_instead_of_zeroed() {
        let map = square_map();
        let observations = observe(&map, &Pose::default(), 50.0);
        let mut pf = ParticleFilter::new(config(2)).unwrap();
        pf.init(Pose::default(), &PoseStd::zero()).unwrap();
        // both particles are far off, so every raw product underflows
        pf.particles[0].x = 6.0;
        pf.particles[1].x = 7.0;
        pf.update_weights(50.0, &LandmarkStd::new(0.05, 0.05), &observations, &map)
            .unwrap();
        assert_approx_eq!(pf.weights()[0], 1.0, 1e-9);
        assert!(pf.weights()[1] < pf.weights()[0]);
        pf.resample().unwrap();
        assert!(!pf.diagnostics().diverged);
    }
    #[test]
    fn test_parallel_and_serial_weights_agree() {
        let map = square_map();
        let observations = observe(&map, &Pose::new(0.5, -0.5, 0.1), 50.0);
        let mut parallel = ParticleFilter::new(config(64)).unwrap();
        let mut serial = ParticleFilter::new(FilterConfig {
            parallel: false,
            ..config(64)
        })
        .unwrap();
        for pf in [&mut parallel, &mut serial] {
            pf.init(Pose::default(), &PoseStd::new(1.0, 1.0, 0.1))
                .unwrap();
            pf.update_weights(50.0, &LandmarkStd::default(), &observations, &map)
                .unwrap();
        }
        assert_eq!(parallel.weights(), serial.weights());
    }
    #[test]
    fn test_resample_cardinality_and_carry_over() {
        let map = square_map();
        let observations = observe(&map, &Pose::default(), 50.0);
        for strategy in [
            ResamplingStrategy::Multinomial,
            ResamplingStrategy::Systematic,
            ResamplingStrategy::Stratified,
            ResamplingStrategy::Residual,
        ] {
            let mut pf = ParticleFilter::new(FilterConfig {
                resampling: strategy,
                ..config(37)
            })
            .unwrap();
            pf.init(Pose::default(), &PoseStd::new(1.0, 1.0, 0.1))
                .unwrap();
            pf.update_weights(50.0, &LandmarkStd::default(), &observations, &map)
                .unwrap();
            let before = pf.particles().to_vec();
            pf.resample().unwrap();
            assert_eq!(pf.particles().len(), 37);
            assert_mirror(&pf);
            assert!(!pf.diagnostics().diverged);
            assert_eq!(pf.diagnostics().iterations, 1);
            // every copy is an exact copy of a source particle, weight included
            for p in pf.particles() {
                assert_eq!(*p, before[p.id]);
            }
        }
    }
    #[test]
    fn test_resample_frequency_follows_weights() {
        let mut pf = ParticleFilter::new(config(4)).unwrap();
        pf.init(Pose::default(), &PoseStd::zero()).unwrap();
        let source: Vec<Particle> = [1.0, 10.0, 0.0, 5.0]
            .iter()
            .enumerate()
            .map(|(i, &w)| Particle::new(i, Pose::new(i as f64, 0.0, 0.0), w))
            .collect();
        let mut counts = [0usize; 4];
        for _ in 0..20_000 {
            pf.particles = source.clone();
            pf.weights = source.iter().map(|p| p.weight).collect();
            pf.resample().unwrap();
            for p in pf.particles() {
                counts[p.id] += 1;
            }
        }
        assert_eq!(counts[2], 0);
        let ratio = counts[1] as f64 / counts[0] as f64;
        assert!(
            (8.5..11.5).contains(&ratio),
            "ratio {ratio} not close to 10"
        );
    }
    #[test]
    fn test_best_particle_and_estimate() {
        let mut pf = ParticleFilter::new(config(3)).unwrap();
        pf.init(Pose::default(), &PoseStd::zero()).unwrap();
        pf.particles = vec![
            Particle::new(0, Pose::new(0.0, 0.0, PI - 0.1), 1.0),
            Particle::new(1, Pose::new(2.0, 4.0, -PI + 0.1), 3.0),
            Particle::new(2, Pose::new(4.0, 0.0, PI - 0.1), 0.0),
        ];
        pf.weights = vec![1.0, 3.0, 0.0];
        assert_eq!(pf.best_particle().unwrap().id, 1);
        let estimate = pf.estimate().unwrap();
        assert_approx_eq!(estimate.x, 1.5, 1e-12);
        assert_approx_eq!(estimate.y, 3.0, 1e-12);
        // circular mean across the +/- pi seam stays near pi
        assert!(crate::wrap_to_pi(estimate.theta - PI).abs() < 0.1);
        assert_approx_eq!(pf.effective_sample_size(), 16.0 / 10.0, 1e-12);
    }
    #[test]
    fn test_step_localizes_known_pose() {
        let map = square_map();
        let mut truth = Pose::new(0.0, 0.0, 0.0);
        let control = Control::new(0.1, 2.0, 0.1);
        let mut pf = ParticleFilter::new(FilterConfig {
            motion_std: PoseStd::new(0.05, 0.05, 0.005),
            ..config(200)
        })
        .unwrap();
        pf.init(truth, &PoseStd::default()).unwrap();
        for _ in 0..20 {
            truth = truth.advance(&control);
            let observations = observe(&map, &truth, 50.0);
            pf.step(&control, &observations, &map).unwrap();
        }
        let estimate = pf.estimate().unwrap();
        assert!((estimate.x - truth.x).abs() < 0.5);
        assert!((estimate.y - truth.y).abs() < 0.5);
        assert!(crate::wrap_to_pi(estimate.theta - truth.theta).abs() < 0.1);
        assert_eq!(pf.diagnostics().iterations, 20);
    }
}

//! Resampling strategies for the particle filter.
//!
//! Every strategy draws `n` source indices with replacement such that the expected number of copies of
//! index `i` is `n * w_i / sum(w)`. Weights do not need to be normalized beforehand. The strategies only
//! differ in their variance:
//! - `Multinomial`: `n` independent categorical draws.
//! - `Stratified`: one uniform draw inside each of `n` equal strata of the cumulative weight.
//! - `Systematic`: a single uniform offset shared by `n` evenly spaced pointers.
//! - `Residual`: deterministic `floor(n * w_i)` copies, with the remainder drawn systematically from the
//!   residual weights.
use rand::Rng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum ResamplingStrategy {
    #[default]
    Multinomial,
    Systematic,
    Stratified,
    Residual,
}
impl Display for ResamplingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResamplingStrategy::Multinomial => "multinomial",
            ResamplingStrategy::Systematic => "systematic",
            ResamplingStrategy::Stratified => "stratified",
            ResamplingStrategy::Residual => "residual",
        };
        write!(f, "{name}")
    }
}

impl ResamplingStrategy {
    /// Draw `n` indices into `weights` according to this strategy.
    ///
    /// Returns `None` when the weights cannot define a distribution: empty, any weight negative or
    /// non-finite, or a zero (or overflowing) total. Callers decide the fallback.
    pub fn resample_indices<R: Rng + ?Sized>(
        &self,
        weights: &[f64],
        n: usize,
        rng: &mut R,
    ) -> Option<Vec<usize>> {
        let total = total_weight(weights)?;
        let indices = match self {
            ResamplingStrategy::Multinomial => multinomial(weights, n, rng)?,
            ResamplingStrategy::Systematic => systematic(weights, total, n, rng),
            ResamplingStrategy::Stratified => stratified(weights, total, n, rng),
            ResamplingStrategy::Residual => residual(weights, total, n, rng),
        };
        Some(indices)
    }
}

/// Sum of the weights, or `None` if they do not form a usable distribution.
fn total_weight(weights: &[f64]) -> Option<f64> {
    if weights.is_empty() || weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return None;
    }
    let total: f64 = weights.iter().sum();
    if total > 0.0 && total.is_finite() {
        Some(total)
    } else {
        None
    }
}

fn multinomial<R: Rng + ?Sized>(weights: &[f64], n: usize, rng: &mut R) -> Option<Vec<usize>> {
    let categorical = WeightedIndex::new(weights).ok()?;
    Some((0..n).map(|_| categorical.sample(rng)).collect())
}

/// Walk sorted pointers in `[0, total)` through the cumulative weights.
///
/// Pointers that round up to the total are clamped to the last index with non-zero weight.
fn select_sorted(weights: &[f64], pointers: impl Iterator<Item = f64>, n: usize) -> Vec<usize> {
    let last = weights.iter().rposition(|w| *w > 0.0).unwrap_or(0);
    let mut indices = Vec::with_capacity(n);
    let mut i = 0;
    let mut cumsum = weights[0];
    for u in pointers {
        while u >= cumsum && i < last {
            i += 1;
            cumsum += weights[i];
        }
        indices.push(i);
    }
    indices
}

fn systematic<R: Rng + ?Sized>(weights: &[f64], total: f64, n: usize, rng: &mut R) -> Vec<usize> {
    let step = total / n as f64;
    let offset = rng.random::<f64>() * step;
    select_sorted(weights, (0..n).map(|k| offset + k as f64 * step), n)
}

fn stratified<R: Rng + ?Sized>(weights: &[f64], total: f64, n: usize, rng: &mut R) -> Vec<usize> {
    let step = total / n as f64;
    let pointers: Vec<f64> = (0..n)
        .map(|k| (k as f64 + rng.random::<f64>()) * step)
        .collect();
    select_sorted(weights, pointers.into_iter(), n)
}

fn residual<R: Rng + ?Sized>(weights: &[f64], total: f64, n: usize, rng: &mut R) -> Vec<usize> {
    let mut indices = Vec::with_capacity(n);
    let mut residuals = Vec::with_capacity(weights.len());
    for (i, w) in weights.iter().enumerate() {
        let expected = w / total * n as f64;
        let copies = expected.floor() as usize;
        indices.extend(std::iter::repeat_n(i, copies));
        residuals.push(expected - copies as f64);
    }
    let remaining = n.saturating_sub(indices.len());
    if remaining > 0 {
        let residual_total: f64 = residuals.iter().sum();
        if residual_total > 0.0 {
            indices.extend(systematic(&residuals, residual_total, remaining, rng));
        } else {
            // floor() rounding left slots without any residual mass; fill from the full weights
            indices.extend(systematic(weights, total, remaining, rng));
        }
    }
    indices.truncate(n);
    indices
}

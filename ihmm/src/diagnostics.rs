//! Convergence diagnostics and an experiment driver for the samplers.
//!
//! Nothing here samples on its own: [`SamplerTester`] only calls the public
//! [`Sampler`] contract and records what it observes between sweeps.

use std::time::{Duration, Instant};

use rand::Rng;

use crate::config::{SamplerConfig, DEFAULT_BURN_IN_REPETITIONS};
use crate::emission::Emission;
use crate::error::SamplerError;
use crate::mcmc::Sampler;
use crate::models::Model;
use crate::utils::MeanAndVariance;

/// Sample autocovariance at lag `k`,
/// `γ(k) = 1/(n-k) Σ_{t<n-k} (x_t - x̄)(x_{t+k} - x̄)`.
///
/// Lags at or beyond the trajectory length have no terms and give `0`.
#[must_use]
pub fn autocorrelation(samples: &[f64], k: usize) -> f64 {
    let n = samples.len();
    if k >= n {
        return 0.0;
    }
    let mean = samples.iter().copied().collect::<MeanAndVariance>().mean();

    let sum: f64 = samples
        .iter()
        .zip(&samples[k..])
        .map(|(a, b)| (a - mean) * (b - mean))
        .sum();

    #[allow(clippy::cast_precision_loss)]
    let terms = (n - k) as f64;
    sum / terms
}

/// Integrated autocorrelation time `τ = 1 + 2 Σ_{k=1}^{K} γ(k) / γ(0)` with
/// `K = min(max_lag, n - 1)`.
///
/// A trajectory with no spread has `τ = 1`.
#[must_use]
pub fn autocorrelation_time(samples: &[f64], max_lag: usize) -> f64 {
    let gamma_0 = autocorrelation(samples, 0);
    if !(gamma_0.is_finite() && gamma_0 > 0.0) {
        return 1.0;
    }

    let last_lag = max_lag.min(samples.len().saturating_sub(1));
    let rho_sum: f64 = (1..=last_lag)
        .map(|k| autocorrelation(samples, k) / gamma_0)
        .sum();

    2.0f64.mul_add(rho_sum, 1.0)
}

/// Collapse `samples[..start]` into its mean and append `samples[start..stop]`.
///
/// `stop` is clamped to the trajectory length. With `start == 0` there is no
/// prefix to collapse.
#[must_use]
pub fn windowed(samples: &[f64], start: usize, stop: usize) -> Vec<f64> {
    let stop = stop.min(samples.len());
    let start = start.min(stop);

    let head = (start > 0).then(|| {
        samples[..start]
            .iter()
            .copied()
            .collect::<MeanAndVariance>()
            .mean()
    });

    head.into_iter()
        .chain(samples[start..stop].iter().copied())
        .collect()
}

/// `γ(k)` of the [`windowed`] trajectory for `k` in `0..(stop - start)`.
#[must_use]
pub fn autocorrelation_curve(samples: &[f64], start: usize, stop: usize) -> Vec<f64> {
    let window = windowed(samples, start, stop);
    let n_lags = stop.min(samples.len()).saturating_sub(start);
    (0..n_lags).map(|k| autocorrelation(&window, k)).collect()
}

/// Drives a sampler through burn-in and records trajectories between sweeps.
#[derive(Clone, Debug)]
pub struct SamplerTester<S> {
    sampler: S,
}

impl<S: Sampler> SamplerTester<S> {
    /// Wrap `sampler` and run `n_init_iterations` burn-in sweeps of
    /// [`DEFAULT_BURN_IN_REPETITIONS`] proposals per observation.
    pub fn new<R: Rng>(sampler: S, n_init_iterations: usize, rng: &mut R) -> Self {
        Self::burn_in(sampler, DEFAULT_BURN_IN_REPETITIONS, n_init_iterations, rng)
    }

    /// Wrap `sampler` and run the burn-in described by `config`.
    ///
    /// # Errors
    /// If the configuration is invalid.
    pub fn from_config<R: Rng>(
        sampler: S,
        config: &SamplerConfig,
        rng: &mut R,
    ) -> Result<Self, SamplerError> {
        config.validate()?;
        Ok(Self::burn_in(
            sampler,
            config.burn_in_repetitions,
            config.burn_in_iterations,
            rng,
        ))
    }

    fn burn_in<R: Rng>(
        mut sampler: S,
        repetitions: usize,
        iterations: usize,
        rng: &mut R,
    ) -> Self {
        sampler.init_train(repetitions, iterations, rng);
        log::info!(
            "initialized chain with {} clusters after {iterations} burn-in sweeps",
            sampler.state_count()
        );
        Self { sampler }
    }

    pub const fn sampler(&self) -> &S {
        &self.sampler
    }

    pub fn into_inner(self) -> S {
        self.sampler
    }

    /// Learned parameters after each of `n_iterations` sweeps.
    pub fn test_parameter<R: Rng>(
        &mut self,
        n_iterations: usize,
        rng: &mut R,
    ) -> Vec<<S::Emission as Emission>::Parameters> {
        self.sampler
            .iter_sample(rng, S::learned_parameters)
            .take(n_iterations)
            .collect()
    }

    /// Number of clusters after each of `n_iterations` sweeps.
    pub fn test_state_count<R: Rng>(&mut self, n_iterations: usize, rng: &mut R) -> Vec<usize> {
        self.sampler
            .iter_sample(rng, S::state_count)
            .take(n_iterations)
            .collect()
    }

    /// Log score of the chain after each of `n_iterations` sweeps.
    pub fn test_ln_score<R: Rng>(&mut self, n_iterations: usize, rng: &mut R) -> Vec<f64> {
        self.sampler
            .iter_sample(rng, |s| s.chain().ln_score())
            .take(n_iterations)
            .collect()
    }

    /// Mean wall time of a sweep over `n_iterations` sweeps.
    pub fn test_measure_time<R: Rng>(&mut self, n_iterations: usize, rng: &mut R) -> Duration {
        let total: Duration = (0..n_iterations)
            .map(|_| {
                let start = Instant::now();
                self.sampler.train_step(rng);
                start.elapsed()
            })
            .sum();

        let mean = u32::try_from(n_iterations)
            .ok()
            .filter(|&n| n > 0)
            .map_or(Duration::ZERO, |n| total / n);
        log::debug!("mean sweep time over {n_iterations} sweeps: {mean:?}");
        mean
    }
}

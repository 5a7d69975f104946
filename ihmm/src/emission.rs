//! Emission distributions owned by clusters.
//!
//! The samplers only rely on [`Emission`]. The Gaussian, exponential and gamma
//! families below are thin wrappers over `rv` so the engine can be driven
//! without pulling in a separate fitting layer.

use std::fmt::Debug;

use rand::Rng;
use rv::dist::{Exponential, Gamma, Gaussian};
use rv::traits::{Cdf, HasDensity, InverseCdf, Sampleable};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::SamplerError;

/// Likelihood model attached to a single cluster.
pub trait Emission: Clone + Debug {
    /// Structural parameters, e.g. the mean of a Gaussian.
    type Parameters: Clone + Debug;

    fn parameters(&self) -> Self::Parameters;

    /// Draw one observation.
    fn next_sample<R: Rng>(&self, rng: &mut R) -> f64;

    /// Density (likelihood) of `observation`. Never negative.
    fn probability(&self, observation: f64) -> f64;

    /// Draw a new emission, treating `self` as the base measure and `prior` as
    /// the distribution over its parameters.
    fn from_prior<Pr, R>(&self, prior: &Pr, rng: &mut R) -> Self
    where
        Pr: Sampleable<Self::Parameters>,
        R: Rng;

    fn quantile(&self, probability: f64) -> f64;

    /// Density sampled at `start + t (stop - start) / n_samples` for `t` in `0..n_samples`.
    fn pdf(&self, n_samples: usize, start: f64, stop: f64) -> Vec<f64> {
        #[allow(clippy::cast_precision_loss)]
        let delta = (stop - start) / n_samples as f64;
        (0..n_samples)
            .map(|t| {
                #[allow(clippy::cast_precision_loss)]
                let x = (t as f64).mul_add(delta, start);
                self.probability(x)
            })
            .collect()
    }
}

/// Gaussian emission with a learnable mean and fixed spread.
#[derive(Clone, Debug, PartialEq)]
pub struct GaussianEmission {
    inner: Gaussian,
}

impl GaussianEmission {
    /// # Errors
    /// If `mean` is not finite or `std` is not finite and positive.
    pub fn new(mean: f64, std: f64) -> Result<Self, SamplerError> {
        Gaussian::new(mean, std)
            .map(|inner| Self { inner })
            .map_err(|e| SamplerError::InvalidEmission(format!("{e:?}")))
    }

    #[must_use]
    pub fn mean(&self) -> f64 {
        self.inner.mu()
    }

    #[must_use]
    pub fn std(&self) -> f64 {
        self.inner.sigma()
    }
}

impl Emission for GaussianEmission {
    type Parameters = f64;

    fn parameters(&self) -> f64 {
        self.mean()
    }

    fn next_sample<R: Rng>(&self, rng: &mut R) -> f64 {
        self.inner.draw(rng)
    }

    fn probability(&self, observation: f64) -> f64 {
        self.inner.f(&observation)
    }

    fn from_prior<Pr, R>(&self, prior: &Pr, rng: &mut R) -> Self
    where
        Pr: Sampleable<f64>,
        R: Rng,
    {
        let offset: f64 = prior.draw(rng);
        Self {
            inner: Gaussian::new_unchecked(self.mean() + offset, self.std()),
        }
    }

    fn quantile(&self, probability: f64) -> f64 {
        self.inner.invcdf(probability)
    }
}

/// Exponential emission parameterized by its rate.
#[derive(Clone, Debug, PartialEq)]
pub struct ExponentialEmission {
    inner: Exponential,
}

impl ExponentialEmission {
    /// # Errors
    /// If `rate` is not finite and positive.
    pub fn new(rate: f64) -> Result<Self, SamplerError> {
        Exponential::new(rate)
            .map(|inner| Self { inner })
            .map_err(|e| SamplerError::InvalidEmission(format!("{e:?}")))
    }

    #[must_use]
    pub fn rate(&self) -> f64 {
        self.inner.rate()
    }
}

impl Emission for ExponentialEmission {
    type Parameters = f64;

    fn parameters(&self) -> f64 {
        self.rate()
    }

    fn next_sample<R: Rng>(&self, rng: &mut R) -> f64 {
        self.inner.draw(rng)
    }

    fn probability(&self, observation: f64) -> f64 {
        if observation < 0.0 {
            0.0
        } else {
            self.inner.f(&observation)
        }
    }

    /// An invalid rate drawn from the prior keeps the current emission.
    fn from_prior<Pr, R>(&self, prior: &Pr, rng: &mut R) -> Self
    where
        Pr: Sampleable<f64>,
        R: Rng,
    {
        let rate: f64 = prior.draw(rng);
        Self::new(rate).unwrap_or_else(|_| self.clone())
    }

    fn quantile(&self, probability: f64) -> f64 {
        -(1.0 - probability).ln() / self.rate()
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GammaParameters {
    pub shape: f64,
    pub scale: f64,
}

/// Gamma emission in shape / scale form.
#[derive(Clone, Debug, PartialEq)]
pub struct GammaEmission {
    inner: Gamma,
}

const QUANTILE_TOLERANCE: f64 = 1E-12;
const QUANTILE_MAX_ITER: usize = 500;

impl GammaEmission {
    /// # Errors
    /// If `shape` or `scale` are not finite and positive.
    pub fn new(shape: f64, scale: f64) -> Result<Self, SamplerError> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(SamplerError::InvalidEmission(format!(
                "gamma scale must be finite and positive, got {scale}"
            )));
        }
        Gamma::new(shape, scale.recip())
            .map(|inner| Self { inner })
            .map_err(|e| SamplerError::InvalidEmission(format!("{e:?}")))
    }

    #[must_use]
    pub fn shape(&self) -> f64 {
        self.inner.shape()
    }

    #[must_use]
    pub fn scale(&self) -> f64 {
        self.inner.rate().recip()
    }

    fn cdf(&self, x: f64) -> f64 {
        if x <= 0.0 {
            0.0
        } else {
            self.inner.cdf(&x)
        }
    }
}

impl Emission for GammaEmission {
    type Parameters = GammaParameters;

    fn parameters(&self) -> GammaParameters {
        GammaParameters {
            shape: self.shape(),
            scale: self.scale(),
        }
    }

    fn next_sample<R: Rng>(&self, rng: &mut R) -> f64 {
        self.inner.draw(rng)
    }

    fn probability(&self, observation: f64) -> f64 {
        if observation <= 0.0 {
            0.0
        } else {
            self.inner.f(&observation)
        }
    }

    /// Invalid parameters drawn from the prior keep the current emission.
    fn from_prior<Pr, R>(&self, prior: &Pr, rng: &mut R) -> Self
    where
        Pr: Sampleable<GammaParameters>,
        R: Rng,
    {
        let GammaParameters { shape, scale } = prior.draw(rng);
        Self::new(shape, scale).unwrap_or_else(|_| self.clone())
    }

    /// Inverts the CDF by bisection, growing the upper bracket geometrically
    /// from the mean until it holds at least `probability` mass.
    fn quantile(&self, probability: f64) -> f64 {
        if probability.is_nan() {
            return f64::NAN;
        }
        if probability <= 0.0 {
            return 0.0;
        }
        if probability >= 1.0 {
            return f64::INFINITY;
        }

        let mut lower = 0.0;
        let mut upper = (self.shape() * self.scale()).max(self.scale());
        while self.cdf(upper) < probability {
            lower = upper;
            upper *= 2.0;
        }

        for _ in 0..QUANTILE_MAX_ITER {
            let mid = 0.5 * (lower + upper);
            if self.cdf(mid) < probability {
                lower = mid;
            } else {
                upper = mid;
            }
            if upper - lower <= QUANTILE_TOLERANCE * upper.max(1.0) {
                break;
            }
        }
        0.5 * (lower + upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    /// A prior over gamma parameters made of two independent gamma draws.
    struct GammaParameterPrior {
        shape: Gamma,
        scale: Gamma,
    }

    impl Sampleable<GammaParameters> for GammaParameterPrior {
        fn draw<R: Rng>(&self, rng: &mut R) -> GammaParameters {
            GammaParameters {
                shape: self.shape.draw(rng),
                scale: self.scale.draw(rng),
            }
        }
    }

    #[test]
    fn gaussian_density_at_mean() {
        let g = GaussianEmission::new(1.5, 0.5).expect("valid parameters");
        let expected = 1.0 / (0.5 * (2.0 * std::f64::consts::PI).sqrt());
        assert::close(g.probability(1.5), expected, 1E-12);
        assert_eq!(g.parameters(), 1.5);
    }

    #[test]
    fn gaussian_rejects_bad_std() {
        assert!(GaussianEmission::new(0.0, 0.0).is_err());
        assert!(GaussianEmission::new(0.0, -1.0).is_err());
    }

    #[test]
    fn gaussian_from_prior_shifts_mean_and_keeps_std() {
        let mut rng = SmallRng::seed_from_u64(0x1234);
        let base = GaussianEmission::new(10.0, 0.1).expect("valid parameters");
        let prior = Gaussian::new_unchecked(0.0, 1.0);

        let draws: Vec<GaussianEmission> =
            (0..2_000).map(|_| base.from_prior(&prior, &mut rng)).collect();

        assert!(draws.iter().all(|d| (d.std() - 0.1).abs() < 1E-15));
        #[allow(clippy::cast_precision_loss)]
        let mean = draws.iter().map(GaussianEmission::mean).sum::<f64>() / draws.len() as f64;
        assert::close(mean, 10.0, 0.1);
    }

    #[test]
    fn gaussian_quantile_is_symmetric() {
        let g = GaussianEmission::new(-2.0, 3.0).expect("valid parameters");
        assert::close(g.quantile(0.5), -2.0, 1E-9);
        assert::close(g.quantile(0.975) + g.quantile(0.025), -4.0, 1E-9);
    }

    #[test]
    fn pdf_samples_the_requested_grid() {
        let g = GaussianEmission::new(0.0, 1.0).expect("valid parameters");
        let curve = g.pdf(4, -2.0, 2.0);
        assert_eq!(curve.len(), 4);
        assert::close(curve[0], g.probability(-2.0), 1E-12);
        assert::close(curve[2], g.probability(0.0), 1E-12);
    }

    #[test]
    fn exponential_quantile_inverts_cdf() {
        let e = ExponentialEmission::new(2.0).expect("valid parameters");
        let q = e.quantile(0.3);
        assert::close(1.0 - (-2.0 * q).exp(), 0.3, 1E-12);
        assert_eq!(e.probability(-1.0), 0.0);
    }

    #[test]
    fn exponential_from_prior_keeps_rate_on_invalid_draw() {
        let mut rng = SmallRng::seed_from_u64(0x1234);
        let e = ExponentialEmission::new(2.0).expect("valid parameters");
        let prior = Gaussian::new_unchecked(-50.0, 1E-3);
        assert_eq!(e.from_prior(&prior, &mut rng), e);
    }

    #[test]
    fn gamma_quantile_inverts_cdf() {
        let g = GammaEmission::new(2.5, 1.5).expect("valid parameters");
        for p in [0.01, 0.25, 0.5, 0.9, 0.999] {
            let q = g.quantile(p);
            assert::close(g.cdf(q), p, 1E-9);
        }
        assert_eq!(g.quantile(0.0), 0.0);
        assert!(g.quantile(1.0).is_infinite());
    }

    #[test]
    fn gamma_from_prior_draws_new_parameters() {
        let mut rng = SmallRng::seed_from_u64(0xF00D);
        let g = GammaEmission::new(1.0, 1.0).expect("valid parameters");
        let prior = GammaParameterPrior {
            shape: Gamma::new_unchecked(20.0, 10.0),
            scale: Gamma::new_unchecked(30.0, 10.0),
        };

        let drawn = g.from_prior(&prior, &mut rng);
        let GammaParameters { shape, scale } = drawn.parameters();
        assert!(shape > 0.0 && scale > 0.0);
        assert_ne!(drawn, g);
    }
}

use rand::Rng;
use rv::traits::Sampleable;

use crate::emission::Emission;
use crate::models::mixture::MixtureChain;

pub mod samplers;

/// Additive guard on likelihood ratio denominators.
pub const EPSILON: f64 = 1E-12;

/// Trait for the cluster-assignment samplers.
///
/// Every sampler owns a [`MixtureChain`] and mutates it in place, one full
/// sweep over the observations per [`Sampler::train_step`].
pub trait Sampler: Sized {
    type Emission: Emission;
    type Prior: Sampleable<<Self::Emission as Emission>::Parameters>;

    fn chain(&self) -> &MixtureChain<Self::Emission, Self::Prior>;

    fn chain_mut(&mut self) -> &mut MixtureChain<Self::Emission, Self::Prior>;

    /// One sweep over the observations in increasing index order.
    fn train_step<R: Rng>(&mut self, rng: &mut R);

    /// Current number of clusters.
    fn state_count(&self) -> usize {
        self.chain().store().n_states()
    }

    fn learned_parameters(&self) -> <Self::Emission as Emission>::Parameters {
        self.chain().learned_parameters()
    }

    /// Burn-in with `iterations` Metropolis-Hastings sweeps of `repetitions`
    /// proposals per observation.
    fn init_train<R: Rng>(&mut self, repetitions: usize, iterations: usize, rng: &mut R) {
        for _ in 0..iterations {
            self.chain_mut().metropolis_sweep(repetitions, rng);
        }
        log::info!(
            "burn-in of {iterations} sweeps done with {} clusters",
            self.state_count()
        );
    }

    /// Run `iterations` sweeps.
    fn fit<R: Rng>(&mut self, iterations: usize, rng: &mut R) {
        for _ in 0..iterations {
            self.train_step(rng);
        }
    }

    /// Drop the current partition and seat every observation again.
    fn clear_chain<R: Rng>(&mut self, rng: &mut R) {
        self.chain_mut().clear_chain(rng);
    }

    /// Endless iterator applying `f` to the sampler after each sweep.
    fn iter_sample<'a, T, F, R>(&'a mut self, rng: &'a mut R, f: F) -> impl Iterator<Item = T>
    where
        F: Fn(&Self) -> T + 'a,
        R: Rng,
    {
        std::iter::repeat_with(move || {
            self.train_step(rng);
            f(&*self)
        })
    }
}

/// `min(1, ratio)` where a non-finite ratio is a certain acceptance.
pub(crate) fn acceptance_probability(ratio: f64) -> f64 {
    if ratio.is_nan() {
        1.0
    } else {
        ratio.clamp(0.0, 1.0)
    }
}

/// `p_new / (p_current + ε)`.
pub(crate) fn likelihood_ratio(p_new: f64, p_current: f64) -> f64 {
    p_new / (p_current + EPSILON)
}

/// Metropolis-Hastings acceptance of a move proposed from the CRP prior.
pub(crate) fn metropolis_acceptance(p_new: f64, p_current: f64) -> f64 {
    acceptance_probability(likelihood_ratio(p_new, p_current))
}

/// Acceptance of a singleton merging into one of the other `n_states - 1` clusters.
pub(crate) fn merge_acceptance(p_new: f64, p_current: f64, alpha: f64, n_states: usize) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let others = n_states as f64 - 1.0;
    acceptance_probability(likelihood_ratio(p_new, p_current) * alpha / others)
}

/// Acceptance of an observation splitting off into a new cluster.
pub(crate) fn split_acceptance(p_new: f64, p_current: f64, alpha: f64, n_states: usize) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let others = n_states as f64 - 1.0;
    acceptance_probability(likelihood_ratio(p_new, p_current) * others / alpha)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acceptance_probability_is_clamped() {
        assert::close(acceptance_probability(0.25), 0.25, 1E-12);
        assert::close(acceptance_probability(7.0), 1.0, 1E-12);
        assert::close(acceptance_probability(f64::INFINITY), 1.0, 1E-12);
        assert::close(acceptance_probability(f64::NAN), 1.0, 1E-12);
        assert::close(acceptance_probability(-1.0), 0.0, 1E-12);
    }

    #[test]
    fn metropolis_acceptance_by_hand() {
        // 0.2 / 0.4
        assert::close(metropolis_acceptance(0.2, 0.4), 0.5, 1E-9);
        assert::close(metropolis_acceptance(0.8, 0.4), 1.0, 1E-12);
        assert::close(metropolis_acceptance(0.0, 0.4), 0.0, 1E-12);
        // A vanishing current likelihood is guarded by epsilon: 1e-13 / 1e-12.
        assert::close(metropolis_acceptance(1E-13, 0.0), 0.1, 1E-9);
    }

    #[test]
    fn merge_acceptance_by_hand() {
        // LR = 0.1 / 0.4, times alpha / (k - 1) = 1.5 / 3
        assert::close(merge_acceptance(0.1, 0.4, 1.5, 4), 0.125, 1E-9);
        // LR = 0.25, times 6 / 3
        assert::close(merge_acceptance(0.1, 0.4, 6.0, 4), 0.5, 1E-9);
        // No other cluster to merge into: alpha / 0 is infinite.
        assert::close(merge_acceptance(0.1, 0.4, 1.0, 1), 1.0, 1E-12);
        assert::close(merge_acceptance(0.0, 0.4, 1.0, 1), 1.0, 1E-12);
    }

    #[test]
    fn split_acceptance_by_hand() {
        // LR = 0.1 / 0.4, times (k - 1) / alpha = 3 / 1.5
        assert::close(split_acceptance(0.1, 0.4, 1.5, 4), 0.5, 1E-9);
        // LR = 0.25, times 3 / 6
        assert::close(split_acceptance(0.1, 0.4, 6.0, 4), 0.125, 1E-9);
        // A lone cluster never splits off another.
        assert::close(split_acceptance(0.9, 0.1, 1.0, 1), 0.0, 1E-12);
    }
}

use rand::Rng;
use rv::traits::Sampleable;

use crate::config::SamplerConfig;
use crate::data::clusters::Candidate;
use crate::emission::Emission;
use crate::error::SamplerError;
use crate::mcmc::Sampler;
use crate::models::mixture::MixtureChain;
use crate::utils::{inverse_cdf, normalize};

/// Gibbs sampling with auxiliary clusters.
///
/// Each observation chooses among the existing clusters and `m` auxiliary
/// clusters drawn from the prior, each auxiliary carrying `α / m` of the new
/// cluster mass. If the observation sits alone, its own cluster takes one of
/// the auxiliary slots and keeps its weight at its store position.
///
/// Reference: Neal (2000), "Markov Chain Sampling Methods for Dirichlet
/// Process Mixture Models", algorithm 8.
#[derive(Clone, Debug)]
pub struct AuxiliaryGibbsSampler<E, Pr>
where
    E: Emission,
    Pr: Sampleable<E::Parameters>,
{
    chain: MixtureChain<E, Pr>,
    n_auxiliary_states: usize,
}

impl<E, Pr> AuxiliaryGibbsSampler<E, Pr>
where
    E: Emission,
    Pr: Sampleable<E::Parameters>,
{
    /// # Errors
    /// If `n_auxiliary_states` is zero.
    pub fn new(
        chain: MixtureChain<E, Pr>,
        n_auxiliary_states: usize,
    ) -> Result<Self, SamplerError> {
        if n_auxiliary_states == 0 {
            return Err(SamplerError::NoAuxiliaryStates);
        }
        Ok(Self {
            chain,
            n_auxiliary_states,
        })
    }

    /// # Errors
    /// If the configuration is invalid.
    pub fn from_config(
        chain: MixtureChain<E, Pr>,
        config: &SamplerConfig,
    ) -> Result<Self, SamplerError> {
        config.validate()?;
        Self::new(chain, config.n_auxiliary_states)
    }

    #[must_use]
    pub const fn n_auxiliary_states(&self) -> usize {
        self.n_auxiliary_states
    }

    pub fn into_chain(self) -> MixtureChain<E, Pr> {
        self.chain
    }

    fn auxiliary_states<R: Rng>(&self, index: usize, rng: &mut R) -> Vec<Candidate<E>> {
        let own = self.chain.store().get_state(index);
        let (first, n_fresh) = if own.is_singleton() {
            (Some(Candidate::Existing(own.id())), self.n_auxiliary_states - 1)
        } else {
            (None, self.n_auxiliary_states)
        };

        first
            .into_iter()
            .chain((0..n_fresh).map(|_| Candidate::Fresh(self.chain.propose_from_prior(rng))))
            .collect()
    }

    /// Normalized weights over the clusters in store order followed by the
    /// auxiliary states.
    fn weights(&self, index: usize, auxiliary: &[Candidate<E>]) -> Vec<f64> {
        let x = self.chain.observations()[index];
        #[allow(clippy::cast_precision_loss)]
        let aux_weight = self.chain.alpha() / self.n_auxiliary_states as f64;

        let weights = self
            .chain
            .store()
            .clusters()
            .iter()
            .map(|c| {
                #[allow(clippy::cast_precision_loss)]
                let m = c.multiplicity() as f64;
                m * c.probability(x)
            })
            .chain(
                auxiliary
                    .iter()
                    .map(|a| aux_weight * self.chain.candidate_probability(a, x)),
            )
            .collect();

        normalize(weights)
    }

    fn step<R: Rng>(&mut self, index: usize, rng: &mut R) {
        let mut auxiliary = self.auxiliary_states(index, rng);
        let weights = self.weights(index, &auxiliary);
        let n_states = self.chain.store().n_states();

        let u: f64 = rng.random();
        let candidate = match inverse_cdf(&weights, u) {
            Some(k) if k < n_states => Candidate::Existing(self.chain.store().clusters()[k].id()),
            Some(k) => auxiliary.swap_remove(k - n_states),
            None => auxiliary
                .pop()
                .unwrap_or_else(|| unreachable!("at least one auxiliary state")),
        };

        let id = self.chain.store_mut().update_state(candidate, index);
        log::trace!("observation {index} assigned to cluster {id}");
    }
}

impl<E, Pr> Sampler for AuxiliaryGibbsSampler<E, Pr>
where
    E: Emission,
    Pr: Sampleable<E::Parameters>,
{
    type Emission = E;
    type Prior = Pr;

    fn chain(&self) -> &MixtureChain<E, Pr> {
        &self.chain
    }

    fn chain_mut(&mut self) -> &mut MixtureChain<E, Pr> {
        &mut self.chain
    }

    fn train_step<R: Rng>(&mut self, rng: &mut R) {
        for index in 0..self.chain.duration() {
            self.step(index, rng);
        }
        log::debug!(
            "auxiliary gibbs sweep: {} clusters",
            self.chain.store().n_states()
        );
    }
}

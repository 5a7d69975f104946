use rand::Rng;
use rv::traits::Sampleable;

use crate::data::clusters::Candidate;
use crate::emission::Emission;
use crate::mcmc::{merge_acceptance, split_acceptance, Sampler};
use crate::models::mixture::MixtureChain;
use crate::utils::normalize;

/// Hybrid Metropolis / partial Gibbs sampler.
///
/// A singleton proposes to merge into an existing cluster picked by
/// multiplicity; any other observation proposes to split off into a prior
/// draw. An observation left alone afterwards gets a Gibbs update over the
/// existing clusters.
#[derive(Clone, Debug)]
pub struct PartialGibbsSampler<E, Pr>
where
    E: Emission,
    Pr: Sampleable<E::Parameters>,
{
    chain: MixtureChain<E, Pr>,
}

impl<E, Pr> PartialGibbsSampler<E, Pr>
where
    E: Emission,
    Pr: Sampleable<E::Parameters>,
{
    #[must_use]
    pub const fn new(chain: MixtureChain<E, Pr>) -> Self {
        Self { chain }
    }

    pub fn into_chain(self) -> MixtureChain<E, Pr> {
        self.chain
    }

    /// Multiplicity weights over the clusters in store order.
    fn merge_distribution(&self) -> Vec<f64> {
        let store = self.chain.store();
        #[allow(clippy::cast_precision_loss)]
        let total = store.n_assigned() as f64;
        store
            .clusters()
            .iter()
            .map(|c| {
                #[allow(clippy::cast_precision_loss)]
                let m = c.multiplicity() as f64;
                m / total
            })
            .collect()
    }

    /// Leave-one-out Gibbs weights for a singleton `index`: its own cluster
    /// is weighted by `α`, the others by their multiplicity.
    fn correction_distribution(&self, index: usize) -> Vec<f64> {
        let x = self.chain.observations()[index];
        let own = self.chain.store().get_state(index).id();
        let alpha = self.chain.alpha();

        let weights = self
            .chain
            .store()
            .clusters()
            .iter()
            .map(|c| {
                let w = if c.id() == own {
                    alpha
                } else {
                    #[allow(clippy::cast_precision_loss)]
                    let m = c.multiplicity() as f64;
                    m
                };
                w * c.probability(x)
            })
            .collect();

        normalize(weights)
    }

    fn step<R: Rng>(&mut self, index: usize, rng: &mut R) {
        let x = self.chain.observations()[index];
        let current = self.chain.store().get_state(index);
        let current_p = current.probability(x);
        let is_singleton = current.is_singleton();

        let n_states = self.chain.store().n_states();
        let alpha = self.chain.alpha();

        let (candidate, acceptance) = if is_singleton {
            let last = self
                .chain
                .store()
                .clusters()
                .last()
                .map(|c| Candidate::Existing(c.id()))
                .unwrap_or_else(|| unreachable!("the observation's own cluster is present"));
            let candidate = self
                .chain
                .store()
                .propose_state(&self.merge_distribution(), Some(last), rng)
                .unwrap_or_else(|| unreachable!("a fallback was supplied"));
            let p_new = self.chain.candidate_probability(&candidate, x);
            (candidate, merge_acceptance(p_new, current_p, alpha, n_states))
        } else {
            let candidate = Candidate::Fresh(self.chain.propose_from_prior(rng));
            let p_new = self.chain.candidate_probability(&candidate, x);
            (candidate, split_acceptance(p_new, current_p, alpha, n_states))
        };

        let u: f64 = rng.random();
        self.chain.accept_with(index, candidate, acceptance, u);

        if self.chain.store().get_state(index).is_singleton() {
            let own = Candidate::Existing(self.chain.store().get_state(index).id());
            let candidate = self
                .chain
                .store()
                .propose_state(&self.correction_distribution(index), Some(own), rng)
                .unwrap_or_else(|| unreachable!("a fallback was supplied"));
            self.chain.store_mut().update_state(candidate, index);
        }
    }
}

impl<E, Pr> Sampler for PartialGibbsSampler<E, Pr>
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
            "partial gibbs sweep: {} clusters",
            self.chain.store().n_states()
        );
    }
}

use rand::Rng;
use rv::traits::Sampleable;

use crate::data::clusters::Candidate;
use crate::emission::Emission;
use crate::mcmc::Sampler;
use crate::models::mixture::MixtureChain;
use crate::utils::normalize;

/// "No gaps" collapsed Gibbs.
///
/// An observation is only revisited with probability `1 / (k + 1)` for `k`
/// clusters. When it is, the candidates are the existing clusters plus one
/// extra slot: the observation's own cluster if it is a singleton, otherwise a
/// prior draw. A singleton therefore competes both at its store position and
/// in the extra slot. The categorical draw is always committed.
#[derive(Clone, Debug)]
pub struct NoGapsSampler<E, Pr>
where
    E: Emission,
    Pr: Sampleable<E::Parameters>,
{
    chain: MixtureChain<E, Pr>,
}

impl<E, Pr> NoGapsSampler<E, Pr>
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

    /// Normalized weights over the clusters in store order followed by the
    /// extra slot.
    fn weights(&self, index: usize, extra: &Candidate<E>) -> Vec<f64> {
        let x = self.chain.observations()[index];
        let store = self.chain.store();

        #[allow(clippy::cast_precision_loss)]
        let extra_weight = self.chain.alpha() / (store.n_states() + 1) as f64;

        let weights = store
            .clusters()
            .iter()
            .map(|c| {
                #[allow(clippy::cast_precision_loss)]
                let m = c.multiplicity() as f64;
                m * c.probability(x)
            })
            .chain(std::iter::once(
                extra_weight * self.chain.candidate_probability(extra, x),
            ))
            .collect();

        normalize(weights)
    }

    fn step<R: Rng>(&mut self, index: usize, rng: &mut R) {
        #[allow(clippy::cast_precision_loss)]
        let n_states = self.chain.store().n_states() as f64;
        let r: f64 = rng.random();
        if r <= n_states / (n_states + 1.0) {
            return;
        }

        let own = self.chain.store().get_state(index);
        let extra = if own.is_singleton() {
            Candidate::Existing(own.id())
        } else {
            Candidate::Fresh(self.chain.propose_from_prior(rng))
        };

        let weights = self.weights(index, &extra);
        let candidate = self
            .chain
            .store()
            .propose_state(&weights, Some(extra), rng)
            .unwrap_or_else(|| unreachable!("a fallback was supplied"));

        let id = self.chain.store_mut().update_state(candidate, index);
        log::trace!("observation {index} assigned to cluster {id}");
    }
}

impl<E, Pr> Sampler for NoGapsSampler<E, Pr>
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
        log::debug!("no gaps sweep: {} clusters", self.chain.store().n_states());
    }
}

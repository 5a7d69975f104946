use std::fmt::Debug;

use rand::Rng;
use rv::data::Partition;
use rv::dist::Crp;
use rv::traits::{HasDensity, Sampleable};

use crate::config::{validate_alpha, SamplerConfig};
use crate::data::clusters::{Candidate, ClusterId, ClusterStore};
use crate::emission::Emission;
use crate::error::SamplerError;
use crate::mcmc::metropolis_acceptance;

use super::Model;

/// Observations partitioned into clusters under a CRP prior.
///
/// New clusters take their emission from `observation_distribution` with
/// parameters drawn from `prior`. The chain owns its [`ClusterStore`] and every
/// sampler mutates it through this type.
#[derive(Clone)]
pub struct MixtureChain<E, Pr>
where
    E: Emission,
    Pr: Sampleable<E::Parameters>,
{
    observations: Vec<f64>,
    observation_distribution: E,
    prior: Pr,
    alpha: f64,
    store: ClusterStore<E>,
}

impl<E, Pr> Debug for MixtureChain<E, Pr>
where
    E: Emission,
    Pr: Sampleable<E::Parameters> + Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MixtureChain")
            .field("observation_distribution", &self.observation_distribution)
            .field("prior", &self.prior)
            .field("alpha", &self.alpha)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl<E, Pr> MixtureChain<E, Pr>
where
    E: Emission,
    Pr: Sampleable<E::Parameters>,
{
    /// Build a chain and seat every observation in order: the first gets a
    /// prior draw, later ones join an existing cluster or open a new one
    /// following the CRP.
    ///
    /// # Errors
    /// If there are no observations or `alpha` is not finite and positive.
    pub fn new<R: Rng>(
        observations: impl Into<Vec<f64>>,
        observation_distribution: E,
        prior: Pr,
        alpha: f64,
        rng: &mut R,
    ) -> Result<Self, SamplerError> {
        let observations = observations.into();
        if observations.is_empty() {
            return Err(SamplerError::EmptyObservations);
        }
        validate_alpha(alpha)?;

        let mut chain = Self {
            store: ClusterStore::new(observations.len()),
            observations,
            observation_distribution,
            prior,
            alpha,
        };
        chain.initialize(rng);

        log::info!(
            "initialized chain of {} observations with {} clusters (alpha = {})",
            chain.duration(),
            chain.store.n_states(),
            chain.alpha
        );
        Ok(chain)
    }

    /// [`MixtureChain::new`] taking `alpha` from a validated [`SamplerConfig`].
    ///
    /// # Errors
    /// If the configuration is invalid or there are no observations.
    pub fn from_config<R: Rng>(
        observations: impl Into<Vec<f64>>,
        observation_distribution: E,
        prior: Pr,
        config: &SamplerConfig,
        rng: &mut R,
    ) -> Result<Self, SamplerError> {
        config.validate()?;
        Self::new(observations, observation_distribution, prior, config.alpha, rng)
    }

    fn initialize<R: Rng>(&mut self, rng: &mut R) {
        for i in 0..self.duration() {
            let candidate = if i == 0 {
                None
            } else {
                self.store.propose_state(&self.chain_distribution(), None, rng)
            };
            let candidate = candidate.unwrap_or_else(|| Candidate::Fresh(self.propose_from_prior(rng)));
            self.store.add(candidate, i);
        }
    }

    /// Forget the current partition and seat every observation again.
    pub fn clear_chain<R: Rng>(&mut self, rng: &mut R) {
        self.store.clear();
        self.initialize(rng);
    }

    #[must_use]
    pub fn observations(&self) -> &[f64] {
        &self.observations
    }

    /// Number of observations.
    #[must_use]
    pub fn duration(&self) -> usize {
        self.observations.len()
    }

    #[must_use]
    pub const fn alpha(&self) -> f64 {
        self.alpha
    }

    #[must_use]
    pub const fn prior(&self) -> &Pr {
        &self.prior
    }

    #[must_use]
    pub const fn store(&self) -> &ClusterStore<E> {
        &self.store
    }

    pub(crate) fn store_mut(&mut self) -> &mut ClusterStore<E> {
        &mut self.store
    }

    /// Parameters of the first cluster in store order.
    ///
    /// # Panics
    /// If the store is empty, which cannot happen after initialization.
    #[must_use]
    pub fn learned_parameters(&self) -> E::Parameters {
        self.store
            .clusters()
            .first()
            .map(|c| c.parameters())
            .unwrap_or_else(|| panic!("an initialized chain always holds a cluster"))
    }

    /// Emission for a brand new cluster.
    pub fn propose_from_prior<R: Rng>(&self, rng: &mut R) -> E {
        self.observation_distribution.from_prior(&self.prior, rng)
    }

    /// CRP seating probabilities: one entry per cluster in store order, then
    /// the probability of opening a new cluster.
    #[must_use]
    pub fn chain_distribution(&self) -> Vec<f64> {
        #[allow(clippy::cast_precision_loss)]
        let total = self.store.n_assigned() as f64 + self.alpha;
        self.store
            .clusters()
            .iter()
            .map(|c| {
                #[allow(clippy::cast_precision_loss)]
                let m = c.multiplicity() as f64;
                m / total
            })
            .chain(std::iter::once(self.alpha / total))
            .collect()
    }

    /// Likelihood of `observation` under `candidate`.
    ///
    /// # Panics
    /// If an existing candidate is not in the store.
    pub fn candidate_probability(&self, candidate: &Candidate<E>, observation: f64) -> f64 {
        match candidate {
            Candidate::Existing(id) => self
                .store
                .cluster(*id)
                .unwrap_or_else(|| panic!("proposed cluster {id} is not in the store"))
                .probability(observation),
            Candidate::Fresh(emission) => emission.probability(observation),
        }
    }

    /// Metropolis-Hastings updates of the assignment of `index`.
    ///
    /// Each repetition proposes from [`MixtureChain::chain_distribution`]
    /// (a prior draw for the new-cluster slot) and accepts with probability
    /// `min(1, p_new(x) / (p_current(x) + ε))`.
    pub fn metropolis_step<R: Rng>(&mut self, index: usize, repetitions: usize, rng: &mut R) {
        let x = self.observations[index];

        for _ in 0..repetitions {
            let current_p = self.store.get_state(index).probability(x);
            let candidate = self
                .store
                .propose_state(&self.chain_distribution(), None, rng)
                .unwrap_or_else(|| Candidate::Fresh(self.propose_from_prior(rng)));

            let acceptance =
                metropolis_acceptance(self.candidate_probability(&candidate, x), current_p);
            let u: f64 = rng.random();
            self.accept_with(index, candidate, acceptance, u);
        }
    }

    /// Commit `candidate` for `index` when `u < acceptance`.
    pub(crate) fn accept_with(
        &mut self,
        index: usize,
        candidate: Candidate<E>,
        acceptance: f64,
        u: f64,
    ) -> Option<ClusterId> {
        if u < acceptance {
            let id = self.store.update_state(candidate, index);
            log::trace!("observation {index} accepted move to cluster {id} (p = {acceptance})");
            Some(id)
        } else {
            log::trace!("observation {index} rejected move (p = {acceptance})");
            None
        }
    }

    /// One Metropolis-Hastings sweep over every observation in order.
    pub fn metropolis_sweep<R: Rng>(&mut self, repetitions: usize, rng: &mut R) {
        for index in 0..self.duration() {
            self.metropolis_step(index, repetitions, rng);
        }
    }
}

impl<E, Pr> MixtureChain<E, Pr>
where
    E: Emission,
    Pr: Sampleable<E::Parameters>,
{
    /// Log likelihood of the observations under their cluster's emission.
    pub fn ln_likelihood(&self) -> f64 {
        self.observations
            .iter()
            .enumerate()
            .map(|(i, x)| self.store.get_state(i).probability(*x).ln())
            .sum()
    }

    /// Portion of the `ln_score` from the CRP prior.
    pub fn crp_ln_f(&self) -> f64 {
        let z: Vec<usize> = self.store.assignments().into_iter().flatten().collect();
        let counts: Vec<usize> = self
            .store
            .clusters()
            .iter()
            .map(|c| c.multiplicity())
            .collect();

        let partition = Partition::new_unchecked(z, counts);
        Crp::new_unchecked(self.alpha, self.duration()).ln_f(&partition)
    }
}

impl<E, Pr> Model for MixtureChain<E, Pr>
where
    E: Emission,
    Pr: Sampleable<E::Parameters>,
{
    fn ln_score(&self) -> f64 {
        self.crp_ln_f() + self.ln_likelihood()
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use rv::dist::Gaussian;

    use super::*;
    use crate::emission::GaussianEmission;

    fn chain(
        data: &[f64],
        alpha: f64,
        rng: &mut SmallRng,
    ) -> MixtureChain<GaussianEmission, Gaussian> {
        MixtureChain::new(
            data.to_vec(),
            GaussianEmission::new(0.0, 0.1).expect("valid parameters"),
            Gaussian::new_unchecked(0.0, 1.0),
            alpha,
            rng,
        )
        .expect("valid chain")
    }

    #[test]
    fn empty_observations_are_rejected() {
        let mut rng = SmallRng::seed_from_u64(0x1234);
        let res = MixtureChain::new(
            Vec::<f64>::new(),
            GaussianEmission::new(0.0, 0.1).expect("valid parameters"),
            Gaussian::new_unchecked(0.0, 1.0),
            1.0,
            &mut rng,
        );
        assert_eq!(res.err(), Some(SamplerError::EmptyObservations));
    }

    #[test]
    fn invalid_alpha_is_rejected() {
        let mut rng = SmallRng::seed_from_u64(0x1234);
        let res = MixtureChain::new(
            vec![1.0],
            GaussianEmission::new(0.0, 0.1).expect("valid parameters"),
            Gaussian::new_unchecked(0.0, 1.0),
            -1.0,
            &mut rng,
        );
        assert_eq!(res.err(), Some(SamplerError::InvalidAlpha { alpha: -1.0 }));
    }

    #[test]
    fn initialization_assigns_every_observation() {
        let mut rng = SmallRng::seed_from_u64(0x1234);
        let data: Vec<f64> = (0..50).map(f64::from).collect();
        let chain = chain(&data, 2.0, &mut rng);

        let store = chain.store();
        assert_eq!(store.n_assigned(), 50);
        assert!((0..50).all(|i| store.owner(i).is_some()));
        assert!(store.clusters().iter().all(|c| c.multiplicity() > 0));
    }

    #[test]
    fn chain_distribution_follows_crp() {
        let mut rng = SmallRng::seed_from_u64(0x1234);
        let chain = chain(&[0.0, 0.1, 0.2, 0.3], 1.0, &mut rng);

        let dist = chain.chain_distribution();
        assert_eq!(dist.len(), chain.store().n_states() + 1);
        assert::close(dist.iter().sum::<f64>(), 1.0, 1E-12);
        assert::close(*dist.last().expect("non empty"), 1.0 / 5.0, 1E-12);
    }

    #[test]
    fn metropolis_sweep_preserves_counts() {
        let mut rng = SmallRng::seed_from_u64(0xF00D);
        let mut chain = chain(&[-1.0, -0.9, 0.0, 1.0, 1.1], 1.0, &mut rng);

        for _ in 0..50 {
            chain.metropolis_sweep(4, &mut rng);
            assert_eq!(chain.store().n_assigned(), 5);
        }
    }

    #[test]
    fn metropolis_moves_toward_the_likelier_cluster() {
        let mut rng = SmallRng::seed_from_u64(0x1234);
        let mut base = chain(&[0.0, 0.0], 1.0, &mut rng);
        let store = base.store_mut();
        let far = store.update_state(
            Candidate::Fresh(GaussianEmission::new(5.0, 0.1).expect("valid")),
            0,
        );
        let near = store.update_state(
            Candidate::Fresh(GaussianEmission::new(0.0, 0.1).expect("valid")),
            1,
        );

        let current_p = base.store().get_state(0).probability(0.0);
        let acceptance = metropolis_acceptance(
            base.candidate_probability(&Candidate::Existing(near), 0.0),
            current_p,
        );
        assert::close(acceptance, 1.0, 1E-12);

        for _ in 0..100 {
            let u: f64 = rng.random();

            // Leaving the far cluster for the near one is always accepted.
            let mut chain = base.clone();
            assert_eq!(
                chain.accept_with(0, Candidate::Existing(near), acceptance, u),
                Some(near)
            );
            assert_eq!(chain.store().owner(0), Some(near));
            assert!(chain.store().cluster(far).is_none());

            // Splitting off into a far fresh cluster is always rejected.
            let mut chain = base.clone();
            let fresh = GaussianEmission::new(5.0, 0.1).expect("valid");
            let to_far = metropolis_acceptance(
                chain.candidate_probability(&Candidate::Fresh(fresh.clone()), 0.0),
                chain.store().get_state(1).probability(0.0),
            );
            assert_eq!(chain.accept_with(1, Candidate::Fresh(fresh), to_far, u), None);
            assert_eq!(chain.store().owner(1), Some(near));
        }
    }

    #[test]
    fn accept_with_compares_the_uniform_draw() {
        let mut rng = SmallRng::seed_from_u64(0x1234);
        let mut chain = chain(&[0.0, 1.0], 1.0, &mut rng);
        let before = chain.store().owner(0);

        let fresh = GaussianEmission::new(0.0, 0.1).expect("valid");
        assert_eq!(chain.accept_with(0, Candidate::Fresh(fresh.clone()), 0.5, 0.51), None);
        assert_eq!(chain.store().owner(0), before);

        let moved = chain.accept_with(0, Candidate::Fresh(fresh), 0.5, 0.49);
        assert!(moved.is_some());
        assert_eq!(chain.store().owner(0), moved);
        assert_eq!(chain.store().n_assigned(), 2);
    }

    #[test]
    fn clear_chain_reseats_observations() {
        let mut rng = SmallRng::seed_from_u64(0x1234);
        let mut chain = chain(&[0.0, 0.5, 1.0], 1.0, &mut rng);
        chain.clear_chain(&mut rng);
        assert_eq!(chain.store().n_assigned(), 3);
    }

    #[test]
    fn ln_score_matches_single_cluster_by_hand() {
        let mut rng = SmallRng::seed_from_u64(0x1234);
        let chain = chain(&[0.3], 1.0, &mut rng);

        // A lone observation sits at its own table with probability one.
        let expected = chain.store().get_state(0).probability(0.3).ln();
        assert::close(chain.ln_score(), expected, 1E-10);
    }
}

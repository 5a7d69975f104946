use rand::Rng;
use rv::traits::Sampleable;

use crate::config::SamplerConfig;
use crate::emission::Emission;
use crate::error::SamplerError;
use crate::mcmc::Sampler;
use crate::models::mixture::MixtureChain;

/// Metropolis-Hastings over single-observation reassignments.
///
/// Each observation receives `repetitions` proposals drawn from the CRP
/// seating distribution, so new clusters are proposed from the prior.
#[derive(Clone, Debug)]
pub struct MetropolisSampler<E, Pr>
where
    E: Emission,
    Pr: Sampleable<E::Parameters>,
{
    chain: MixtureChain<E, Pr>,
    repetitions: usize,
}

impl<E, Pr> MetropolisSampler<E, Pr>
where
    E: Emission,
    Pr: Sampleable<E::Parameters>,
{
    pub const DEFAULT_REPETITIONS: usize = 4;

    #[must_use]
    pub const fn new(chain: MixtureChain<E, Pr>) -> Self {
        Self {
            chain,
            repetitions: Self::DEFAULT_REPETITIONS,
        }
    }

    /// # Errors
    /// If `repetitions` is zero.
    pub fn with_repetitions(
        chain: MixtureChain<E, Pr>,
        repetitions: usize,
    ) -> Result<Self, SamplerError> {
        if repetitions == 0 {
            return Err(SamplerError::NoRepetitions { repetitions });
        }
        Ok(Self { chain, repetitions })
    }

    /// # Errors
    /// If the configuration is invalid.
    pub fn from_config(
        chain: MixtureChain<E, Pr>,
        config: &SamplerConfig,
    ) -> Result<Self, SamplerError> {
        config.validate()?;
        Self::with_repetitions(chain, config.repetitions)
    }

    #[must_use]
    pub const fn repetitions(&self) -> usize {
        self.repetitions
    }

    pub fn into_chain(self) -> MixtureChain<E, Pr> {
        self.chain
    }
}

impl<E, Pr> Sampler for MetropolisSampler<E, Pr>
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
        self.chain.metropolis_sweep(self.repetitions, rng);
        log::debug!("metropolis sweep: {} clusters", self.chain.store().n_states());
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    use super::*;
    use crate::mcmc::samplers::partition::test_support::{assert_partition, two_mode_chain};

    #[test]
    fn zero_repetitions_is_an_error() {
        let mut rng = SmallRng::seed_from_u64(0x1234);
        let res = MetropolisSampler::with_repetitions(two_mode_chain(&mut rng), 0);
        assert_eq!(res.err(), Some(SamplerError::NoRepetitions { repetitions: 0 }));
    }

    #[test]
    fn sweeps_keep_partition() {
        let mut rng = SmallRng::seed_from_u64(0x1234);
        let mut sampler = MetropolisSampler::new(two_mode_chain(&mut rng));
        assert_eq!(sampler.repetitions(), 4);

        for _ in 0..200 {
            sampler.train_step(&mut rng);
            assert_partition(sampler.chain().store());
            assert!((1..=9).contains(&sampler.state_count()));
        }
    }

    #[test]
    fn iter_sample_yields_state_counts() {
        let mut rng = SmallRng::seed_from_u64(0xABCD);
        let mut sampler = MetropolisSampler::new(two_mode_chain(&mut rng));

        let counts: Vec<usize> = sampler
            .iter_sample(&mut rng, |s| s.state_count())
            .take(25)
            .collect();
        assert_eq!(counts.len(), 25);
        assert!(counts.iter().all(|c| (1..=9).contains(c)));
    }
}

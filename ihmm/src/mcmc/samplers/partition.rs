//! Samplers over the assignment of observations to clusters.

pub mod aux_gibbs;
pub mod metropolis;
pub mod no_gaps;
pub mod partial_gibbs;

pub use aux_gibbs::AuxiliaryGibbsSampler;
pub use metropolis::MetropolisSampler;
pub use no_gaps::NoGapsSampler;
pub use partial_gibbs::PartialGibbsSampler;

#[cfg(test)]
pub(crate) mod test_support {
    use rand::rngs::SmallRng;
    use rv::dist::Gaussian;

    use crate::data::clusters::ClusterStore;
    use crate::emission::GaussianEmission;
    use crate::models::mixture::MixtureChain;

    pub const TWO_MODES: [f64; 9] = [-1.48, -1.40, -1.16, -1.08, -1.02, 0.14, 0.51, 0.53, 0.78];

    pub fn two_mode_chain(rng: &mut SmallRng) -> MixtureChain<GaussianEmission, Gaussian> {
        MixtureChain::new(
            TWO_MODES,
            GaussianEmission::new(0.0, 0.1).expect("valid parameters"),
            Gaussian::new_unchecked(0.0, 1.0),
            1.0,
            rng,
        )
        .expect("valid chain")
    }

    /// Every observation is owned by exactly one non-empty cluster.
    pub fn assert_partition<E>(store: &ClusterStore<E>) {
        let mut seen = vec![false; store.chain_size()];
        for cluster in store.clusters() {
            assert!(cluster.multiplicity() > 0, "empty cluster {}", cluster.id());
            for &obs in cluster.observations() {
                assert!(!seen[obs], "observation {obs} assigned twice");
                seen[obs] = true;
                assert!(cluster.contains(obs));
                assert_eq!(store.owner(obs), Some(cluster.id()));
            }
        }
        assert!(seen.into_iter().all(|s| s));
        assert_eq!(store.n_assigned(), store.chain_size());
    }

    /// Fraction of sweeps in which each pair of observations shared a cluster.
    #[allow(clippy::cast_precision_loss)]
    pub fn association_matrix(snapshots: &[Vec<Option<usize>>]) -> Vec<Vec<f64>> {
        let n = snapshots.first().map_or(0, Vec::len);
        let mut assoc = vec![vec![0.0; n]; n];
        for z in snapshots {
            for i in 0..n {
                for j in 0..n {
                    if z[i] == z[j] {
                        assoc[i][j] += 1.0;
                    }
                }
            }
        }
        let total = snapshots.len() as f64;
        assoc
            .into_iter()
            .map(|row| row.into_iter().map(|x| x / total).collect())
            .collect()
    }
}

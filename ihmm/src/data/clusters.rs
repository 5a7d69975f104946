use std::collections::BTreeSet;
use std::fmt;

use itertools::Itertools;
use rand::Rng;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::emission::Emission;
use crate::utils::inverse_cdf;

/// Stable identity of a cluster within one [`ClusterStore`].
///
/// Identities are handed out in creation order and never reused, so two
/// clusters with equal emission parameters remain distinct.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClusterId(u64);

impl ClusterId {
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A latent cluster: an emission distribution and the observations assigned to it.
#[derive(Clone, Debug)]
pub struct Cluster<E> {
    id: ClusterId,
    emission: E,
    observations: BTreeSet<usize>,
}

impl<E> Cluster<E> {
    #[must_use]
    pub const fn id(&self) -> ClusterId {
        self.id
    }

    #[must_use]
    pub const fn emission(&self) -> &E {
        &self.emission
    }

    #[must_use]
    pub const fn observations(&self) -> &BTreeSet<usize> {
        &self.observations
    }

    #[must_use]
    pub fn multiplicity(&self) -> usize {
        self.observations.len()
    }

    #[must_use]
    pub fn is_singleton(&self) -> bool {
        self.multiplicity() == 1
    }

    #[must_use]
    pub fn contains(&self, observation: usize) -> bool {
        self.observations.contains(&observation)
    }
}

impl<E: Emission> Cluster<E> {
    pub fn probability(&self, observation: f64) -> f64 {
        self.emission.probability(observation)
    }

    pub fn parameters(&self) -> E::Parameters {
        self.emission.parameters()
    }

    pub fn new_value<R: Rng>(&self, rng: &mut R) -> f64 {
        self.emission.next_sample(rng)
    }
}

impl<E: Emission> fmt::Display for Cluster<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cluster {} with params {:?} and observations [{}]",
            self.id,
            self.parameters(),
            self.observations.iter().join(", ")
        )
    }
}

/// A proposed destination for an observation.
#[derive(Clone, Debug, PartialEq)]
pub enum Candidate<E> {
    /// A cluster already present in the store.
    Existing(ClusterId),
    /// A new cluster with the given emission, created if the proposal is committed.
    Fresh(E),
}

/// Partition of the observation indices `0..chain_size` into clusters.
///
/// Every observation belongs to at most one cluster and clusters are never
/// empty. Broken invariants panic: they can only be reached through a
/// sampler bug.
#[derive(Clone)]
pub struct ClusterStore<E> {
    chain_size: usize,
    clusters: Vec<Cluster<E>>,
    owners: Vec<Option<ClusterId>>,
    next_id: u64,
}

impl<E> ClusterStore<E> {
    /// Create an empty store for `chain_size` observations.
    #[must_use]
    pub fn new(chain_size: usize) -> Self {
        Self {
            chain_size,
            clusters: Vec::new(),
            owners: vec![None; chain_size],
            next_id: 0,
        }
    }

    #[must_use]
    pub const fn chain_size(&self) -> usize {
        self.chain_size
    }

    /// Number of clusters.
    #[must_use]
    pub fn n_states(&self) -> usize {
        self.clusters.len()
    }

    /// Number of observations currently assigned to some cluster.
    #[must_use]
    pub fn n_assigned(&self) -> usize {
        self.clusters.iter().map(Cluster::multiplicity).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Clusters in creation order.
    #[must_use]
    pub fn clusters(&self) -> &[Cluster<E>] {
        &self.clusters
    }

    #[must_use]
    pub fn position(&self, id: ClusterId) -> Option<usize> {
        self.clusters.iter().position(|c| c.id == id)
    }

    #[must_use]
    pub fn cluster(&self, id: ClusterId) -> Option<&Cluster<E>> {
        self.position(id).map(|pos| &self.clusters[pos])
    }

    /// The cluster owning `observation`, if any.
    #[must_use]
    pub fn owner(&self, observation: usize) -> Option<ClusterId> {
        self.owners.get(observation).copied().flatten()
    }

    /// Get the cluster owning `observation`.
    ///
    /// # Panics
    /// If no cluster owns `observation`.
    #[must_use]
    pub fn get_state(&self, observation: usize) -> &Cluster<E> {
        self.owner(observation)
            .and_then(|id| self.cluster(id))
            .unwrap_or_else(|| panic!("observation {observation} is not assigned to any cluster"))
    }

    /// Assign `observation` to `candidate`, creating a new cluster for [`Candidate::Fresh`].
    ///
    /// # Panics
    /// If `observation` is out of range or already assigned, or if an
    /// [`Candidate::Existing`] cluster is not in the store.
    pub fn add(&mut self, candidate: Candidate<E>, observation: usize) -> ClusterId {
        assert!(
            observation < self.chain_size,
            "observation {observation} out of range for a chain of size {}",
            self.chain_size
        );
        if let Some(owner) = self.owners[observation] {
            panic!("observation {observation} is already assigned to cluster {owner}");
        }

        let id = match candidate {
            Candidate::Existing(id) => {
                let pos = self
                    .position(id)
                    .unwrap_or_else(|| panic!("cluster {id} is not in the store"));
                self.clusters[pos].observations.insert(observation);
                id
            }
            Candidate::Fresh(emission) => {
                let id = ClusterId(self.next_id);
                self.next_id += 1;
                self.clusters.push(Cluster {
                    id,
                    emission,
                    observations: BTreeSet::from([observation]),
                });
                log::trace!("created cluster {id} for observation {observation}");
                id
            }
        };

        self.owners[observation] = Some(id);
        id
    }

    /// Unassign `observation`, dropping its cluster if it was a singleton.
    ///
    /// # Panics
    /// If `observation` is not assigned.
    pub fn remove(&mut self, observation: usize) {
        let id = self
            .owner(observation)
            .unwrap_or_else(|| panic!("observation {observation} is not assigned to any cluster"));
        let pos = self
            .position(id)
            .unwrap_or_else(|| panic!("owner {id} of observation {observation} is missing"));

        self.owners[observation] = None;
        if self.clusters[pos].is_singleton() {
            self.clusters.remove(pos);
            log::trace!("removed cluster {id} with its last observation {observation}");
        } else {
            self.clusters[pos].observations.remove(&observation);
        }
    }

    /// Reassign `observation` to `candidate`.
    ///
    /// Reassigning an observation to the cluster that already owns it leaves
    /// the store untouched, which keeps singletons alive.
    ///
    /// # Panics
    /// Under the same conditions as [`ClusterStore::remove`] and [`ClusterStore::add`].
    pub fn update_state(&mut self, candidate: Candidate<E>, observation: usize) -> ClusterId {
        if let Candidate::Existing(id) = candidate {
            if self.owner(observation) == Some(id) {
                return id;
            }
        }
        self.remove(observation);
        self.add(candidate, observation)
    }

    /// Categorical draw over the existing clusters and a fallback.
    ///
    /// `chain_distribution[j]` is the probability of cluster `j` (in store
    /// order) for `j < n_states`; any further mass selects `fallback`.
    pub fn propose_state<R: Rng>(
        &self,
        chain_distribution: &[f64],
        fallback: Option<Candidate<E>>,
        rng: &mut R,
    ) -> Option<Candidate<E>> {
        let u: f64 = rng.random();
        self.propose_state_with(chain_distribution, fallback, u)
    }

    /// [`ClusterStore::propose_state`] for a given uniform draw `u`.
    ///
    /// When round-off keeps every cumulative value at or below `u` the
    /// fallback is returned.
    #[must_use]
    pub fn propose_state_with(
        &self,
        chain_distribution: &[f64],
        fallback: Option<Candidate<E>>,
        u: f64,
    ) -> Option<Candidate<E>> {
        match inverse_cdf(chain_distribution, u) {
            Some(index) if index < self.n_states() => {
                Some(Candidate::Existing(self.clusters[index].id))
            }
            _ => fallback,
        }
    }

    /// Drop every cluster and assignment.
    pub fn clear(&mut self) {
        self.clusters.clear();
        self.owners.iter_mut().for_each(|o| *o = None);
    }

    /// Dense labels: the store position of each observation's cluster.
    #[must_use]
    pub fn assignments(&self) -> Vec<Option<usize>> {
        self.owners
            .iter()
            .map(|owner| owner.and_then(|id| self.position(id)))
            .collect()
    }
}

impl<E: Emission> fmt::Display for ClusterStore<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for cluster in &self.clusters {
            writeln!(f, "{cluster}")?;
        }
        Ok(())
    }
}

/// Single-line `[a, b, c]` listing that ignores `{:#?}`.
struct Inline<'a, T>(&'a [T]);

impl<T: fmt::Display> fmt::Debug for Inline<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.iter().join(", "))
    }
}

impl<E: fmt::Debug> fmt::Debug for ClusterStore<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let owners: Vec<String> = self
            .owners
            .iter()
            .map(|o| o.map_or_else(|| String::from("-"), |id| id.to_string()))
            .collect();
        let counts: Vec<usize> = self.clusters.iter().map(Cluster::multiplicity).collect();

        f.debug_struct("ClusterStore")
            .field("chain_size", &self.chain_size)
            .field("owners", &Inline(&owners))
            .field("counts", &Inline(&counts))
            .finish_non_exhaustive()
    }
}

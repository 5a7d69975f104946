//! Cluster-assignment MCMC for Dirichlet process mixtures and the state
//! layer of infinite hidden Markov models.
//!
//! A [`MixtureChain`](models::mixture::MixtureChain) holds the observations
//! and their partition into clusters. The samplers in
//! [`mcmc::samplers::partition`] each implement one transition kernel over
//! that partition, and [`diagnostics`] provides autocorrelation tools to judge
//! their mixing.

pub mod config;
pub mod data;
pub mod diagnostics;
pub mod emission;
pub mod error;
pub mod mcmc;
pub mod models;

pub mod utils;

pub use config::SamplerConfig;
pub use error::SamplerError;

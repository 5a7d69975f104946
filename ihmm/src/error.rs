use thiserror::Error;

/// Errors raised while building a chain or a sampler.
///
/// Broken store invariants are not represented here: they indicate a bug and
/// abort with a panic instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SamplerError {
    #[error("cannot sample cluster assignments for an empty observation sequence")]
    EmptyObservations,
    #[error("concentration parameter must be finite and strictly positive, got {alpha}")]
    InvalidAlpha { alpha: f64 },
    #[error("the auxiliary Gibbs sampler needs at least one auxiliary state")]
    NoAuxiliaryStates,
    #[error("at least one proposal per observation is required, got {repetitions}")]
    NoRepetitions { repetitions: usize },
    #[error("invalid emission distribution: {0}")]
    InvalidEmission(String),
}

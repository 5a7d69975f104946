#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::SamplerError;

/// Metropolis-Hastings proposals per observation during burn-in.
pub const DEFAULT_BURN_IN_REPETITIONS: usize = 5;
/// Burn-in sweeps run before sampling.
pub const DEFAULT_BURN_IN_ITERATIONS: usize = 100;

/// Tuning knobs shared by the samplers.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case", default))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SamplerConfig {
    /// CRP concentration parameter.
    pub alpha: f64,
    /// Number of auxiliary prior draws offered per observation by the auxiliary Gibbs sweep.
    pub n_auxiliary_states: usize,
    /// Metropolis-Hastings proposals per observation in a regular sweep.
    pub repetitions: usize,
    /// Metropolis-Hastings proposals per observation during burn-in.
    pub burn_in_repetitions: usize,
    /// Number of burn-in sweeps.
    pub burn_in_iterations: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            n_auxiliary_states: 30,
            repetitions: 4,
            burn_in_repetitions: DEFAULT_BURN_IN_REPETITIONS,
            burn_in_iterations: DEFAULT_BURN_IN_ITERATIONS,
        }
    }
}

impl SamplerConfig {
    #[must_use]
    pub const fn with_alpha(self, alpha: f64) -> Self {
        Self { alpha, ..self }
    }

    #[must_use]
    pub const fn with_auxiliary_states(self, n_auxiliary_states: usize) -> Self {
        Self {
            n_auxiliary_states,
            ..self
        }
    }

    #[must_use]
    pub const fn with_repetitions(self, repetitions: usize) -> Self {
        Self {
            repetitions,
            ..self
        }
    }

    #[must_use]
    pub const fn with_burn_in(self, repetitions: usize, iterations: usize) -> Self {
        Self {
            burn_in_repetitions: repetitions,
            burn_in_iterations: iterations,
            ..self
        }
    }

    /// Check the configuration before a chain is built from it.
    ///
    /// # Errors
    /// If `alpha` is not finite and positive, or either repetition count is zero.
    pub fn validate(&self) -> Result<(), SamplerError> {
        validate_alpha(self.alpha)?;

        if self.repetitions == 0 {
            return Err(SamplerError::NoRepetitions {
                repetitions: self.repetitions,
            });
        }
        if self.burn_in_repetitions == 0 {
            return Err(SamplerError::NoRepetitions {
                repetitions: self.burn_in_repetitions,
            });
        }
        Ok(())
    }
}

pub(crate) fn validate_alpha(alpha: f64) -> Result<(), SamplerError> {
    if alpha.is_finite() && alpha > 0.0 {
        Ok(())
    } else {
        Err(SamplerError::InvalidAlpha { alpha })
    }
}

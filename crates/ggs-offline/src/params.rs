// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use ggs_core::SegError;

pub const DEFAULT_K_MAX: usize = 10;
pub const DEFAULT_LAMB: f64 = 1.0;
pub const DEFAULT_MAX_SHUFFLES: usize = 250;
/// Seed used for refinement order when `random_state` is `None`.
pub const DEFAULT_SEED: u64 = 0;

/// Hyperparameters of [`crate::GreedyGaussianSegmentation`].
///
/// Equality is field-wise. With the `serde` feature the JSON form is an object
/// with exactly the keys `k_max`, `lamb`, `verbose`, `max_shuffles` and
/// `random_state`; missing keys take their defaults.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GgsParams {
    /// Maximum number of change points added by the growth phase.
    pub k_max: usize,
    /// Covariance regularization strength.
    pub lamb: f64,
    /// Emit per-step events at `info` level instead of `debug`.
    pub verbose: bool,
    /// Upper bound on refinement passes after each insertion.
    pub max_shuffles: usize,
    /// Seed for the refinement visit order.
    pub random_state: Option<u64>,
}

impl Default for GgsParams {
    fn default() -> Self {
        Self {
            k_max: DEFAULT_K_MAX,
            lamb: DEFAULT_LAMB,
            verbose: false,
            max_shuffles: DEFAULT_MAX_SHUFFLES,
            random_state: None,
        }
    }
}

impl GgsParams {
    /// `k_max` and `lamb` with every other field at its default.
    pub fn new(k_max: usize, lamb: f64) -> Self {
        Self {
            k_max,
            lamb,
            ..Self::default()
        }
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn with_max_shuffles(mut self, max_shuffles: usize) -> Self {
        self.max_shuffles = max_shuffles;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn validate(&self) -> Result<(), SegError> {
        if self.k_max == 0 {
            return Err(SegError::invalid_parameter("k_max must be >= 1; got 0"));
        }
        if self.max_shuffles == 0 {
            return Err(SegError::invalid_parameter(
                "max_shuffles must be >= 1; got 0",
            ));
        }
        if !self.lamb.is_finite() || self.lamb < 0.0 {
            return Err(SegError::invalid_parameter(format!(
                "lamb must be finite and >= 0.0; got {}",
                self.lamb
            )));
        }
        Ok(())
    }

    pub fn effective_seed(&self) -> u64 {
        self.random_state.unwrap_or(DEFAULT_SEED)
    }
}

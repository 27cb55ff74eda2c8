// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Regularized Gaussian segment cost used by greedy Gaussian segmentation.

pub mod gaussian;
pub mod linalg;
mod prefix;

pub use gaussian::{CostWorkspace, GaussianCache, GaussianCost, SplitCandidate, SplitScan};
pub use linalg::linalg_available;

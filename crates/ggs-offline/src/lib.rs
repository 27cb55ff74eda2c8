// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

pub mod ggs;
pub mod params;
mod rng;

pub use ggs::GreedyGaussianSegmentation;
pub use params::{DEFAULT_K_MAX, DEFAULT_LAMB, DEFAULT_MAX_SHUFFLES, DEFAULT_SEED, GgsParams};

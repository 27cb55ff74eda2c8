// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Synthetic signals shared by the criterion benches.

use ggs_core::{SegError, SeriesBuffer};

/// `regimes` equal-length blocks of `d` features, each block at a distinct level,
/// with a deterministic sinusoidal wobble so segments are not degenerate.
pub fn piecewise_signal(n: usize, d: usize, regimes: usize) -> Result<SeriesBuffer, SegError> {
    let block = n.div_ceil(regimes.max(1)).max(1);
    let rows: Vec<Vec<f64>> = (0..n)
        .map(|t| {
            let regime = (t / block) as f64;
            (0..d)
                .map(|dim| {
                    let level = 3.0 * regime * if dim % 2 == 0 { 1.0 } else { -1.0 };
                    level + 0.25 * (0.7 * t as f64 + dim as f64).sin()
                })
                .collect()
        })
        .collect();
    SeriesBuffer::from_rows(&rows)
}

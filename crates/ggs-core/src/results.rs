// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::{Diagnostics, SegError};

/// Validates a boundary-inclusive change-point list `[0, ..., n]`.
pub fn validate_change_points(n: usize, change_points: &[usize]) -> Result<(), SegError> {
    if n == 0 {
        return Err(SegError::invalid_input("n must be >= 1"));
    }
    match (change_points.first(), change_points.last()) {
        (Some(0), Some(&last)) if last == n && change_points.len() >= 2 => {}
        _ => {
            return Err(SegError::invalid_input(format!(
                "change points must start at 0 and end at n={n}; got {change_points:?}"
            )));
        }
    }
    if let Some(pair) = change_points.windows(2).find(|pair| pair[0] >= pair[1]) {
        return Err(SegError::invalid_input(format!(
            "change points must be strictly increasing; found {} followed by {}",
            pair[0], pair[1]
        )));
    }
    Ok(())
}

/// Output of an offline segmentation run.
///
/// Deserialization goes through [`SegmentationResult::new`], so decoded
/// results satisfy the same invariants as computed ones.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct SegmentationResult {
    /// Boundary-inclusive breakpoints `[0, c1, ..., ck, n]`.
    pub change_points: Vec<usize>,
    /// Breakpoints after each growth step, starting with `[0, n]`.
    pub intermediate_change_points: Vec<Vec<usize>>,
    /// Cumulative log-likelihood matching each entry of `intermediate_change_points`.
    pub intermediate_log_likelihood: Vec<f64>,
    pub log_likelihood: f64,
    pub diagnostics: Diagnostics,
}

impl SegmentationResult {
    pub fn new(
        n: usize,
        change_points: Vec<usize>,
        intermediate_change_points: Vec<Vec<usize>>,
        intermediate_log_likelihood: Vec<f64>,
        diagnostics: Diagnostics,
    ) -> Result<Self, SegError> {
        validate_change_points(n, &change_points)?;
        if intermediate_change_points.len() != intermediate_log_likelihood.len() {
            return Err(SegError::invalid_input(format!(
                "intermediate path length mismatch: {} change-point sets vs {} log-likelihoods",
                intermediate_change_points.len(),
                intermediate_log_likelihood.len()
            )));
        }
        let log_likelihood = intermediate_log_likelihood
            .last()
            .copied()
            .unwrap_or(f64::NAN);
        Ok(Self {
            change_points,
            intermediate_change_points,
            intermediate_log_likelihood,
            log_likelihood,
            diagnostics,
        })
    }

    /// Series length covered by the result.
    pub fn n(&self) -> usize {
        self.change_points.last().copied().unwrap_or(0)
    }

    /// Breakpoints without the `0` and `n` boundaries.
    pub fn interior_change_points(&self) -> &[usize] {
        let len = self.change_points.len();
        if len <= 2 {
            return &[];
        }
        &self.change_points[1..len - 1]
    }

    /// Half-open `[start, end)` segments in order.
    pub fn segments(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.change_points.windows(2).map(|pair| (pair[0], pair[1]))
    }

    /// Per-sample segment labels `0..k`.
    ///
    /// Segments that do not fit `0..n` (possible only after editing the public
    /// fields) are skipped.
    pub fn labels(&self) -> Vec<usize> {
        let mut labels = vec![0; self.n()];
        for (label, (start, end)) in self.segments().enumerate() {
            if let Some(slice) = labels.get_mut(start..end) {
                slice.fill(label);
            }
        }
        labels
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for SegmentationResult {
    /// `log_likelihood` is taken from the intermediate path, not the input.
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(serde::Deserialize)]
        struct Fields {
            change_points: Vec<usize>,
            intermediate_change_points: Vec<Vec<usize>>,
            intermediate_log_likelihood: Vec<Option<f64>>,
            diagnostics: Diagnostics,
        }

        let fields = Fields::deserialize(deserializer)?;
        let n = fields.change_points.last().copied().unwrap_or(0);
        let intermediate_log_likelihood = fields
            .intermediate_log_likelihood
            .into_iter()
            .map(|value| value.unwrap_or(f64::NAN))
            .collect();
        Self::new(
            n,
            fields.change_points,
            fields.intermediate_change_points,
            intermediate_log_likelihood,
            fields.diagnostics,
        )
        .map_err(serde::de::Error::custom)
    }
}

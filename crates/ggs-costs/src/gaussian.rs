// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

#[cfg(feature = "dense-linalg")]
use crate::linalg::{cholesky_in_place, log_det_from_cholesky, trace_inverse_from_cholesky};
use crate::linalg::linalg_available;
use crate::prefix::Accumulator;
use ggs_core::{ReproMode, SegError, TimeSeriesView};

/// Minimum number of observations on each side of a candidate split.
pub const MIN_SIDE_LEN: usize = 2;

/// Relative size of the rounding error in a difference of two prefix sums.
const VARIANCE_NOISE_FLOOR: f64 = 16.0 * f64::EPSILON;

/// Per-feature mean of the whole series; `row` is scratch of length `d`.
fn series_mean(x: &TimeSeriesView<'_>, row: &mut [f64], compensated: bool) -> Vec<f64> {
    let mut sums = vec![Accumulator::default(); x.d];
    for t in 0..x.n {
        x.read_row(t, row);
        for (acc, value) in sums.iter_mut().zip(row.iter()) {
            acc.add(*value, compensated);
        }
    }
    let n = x.n.max(1) as f64;
    sums.iter().map(|acc| acc.value() / n).collect()
}

/// Ridge-regularized multivariate Gaussian segment cost.
///
/// For a segment of length `m` with biased empirical covariance `S`, the
/// regularized covariance is `Sigma = S + (lamb / m) I` and the cost is
/// `m * logdet(Sigma) - lamb * trace(Sigma^-1)`. Lower cost is a better fit;
/// the segment log-likelihood is the negated cost.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GaussianCost {
    lamb: f64,
    repro_mode: ReproMode,
}

impl GaussianCost {
    /// Validates `lamb` and checks that the linear-algebra backend is present.
    pub fn new(lamb: f64, repro_mode: ReproMode) -> Result<Self, SegError> {
        if !linalg_available() {
            return Err(SegError::missing_dependency(
                "GaussianCost requires the `dense-linalg` feature of ggs-costs",
            ));
        }
        if !lamb.is_finite() || lamb < 0.0 {
            return Err(SegError::invalid_parameter(format!(
                "lamb must be finite and >= 0.0; got {lamb}"
            )));
        }
        Ok(Self { lamb, repro_mode })
    }

    /// Same cost with a different reproducibility mode.
    pub fn with_repro_mode(self, repro_mode: ReproMode) -> Self {
        Self { repro_mode, ..self }
    }

    pub fn name(&self) -> &'static str {
        "gaussian_regularized"
    }

    pub fn lamb(&self) -> f64 {
        self.lamb
    }

    pub fn repro_mode(&self) -> ReproMode {
        self.repro_mode
    }

    /// Builds prefix sums of observations and their outer products.
    ///
    /// Rows are centered on the per-feature series mean before accumulation,
    /// so a constant offset does not inflate the prefix magnitudes. Input must
    /// already be finite; `ReproMode::Strict` uses compensated sums.
    pub fn precompute(&self, x: &TimeSeriesView<'_>) -> Result<GaussianCache, SegError> {
        let (n, d) = (x.n, x.d);
        let overflow =
            || SegError::resource_limit(format!("GaussianCache size overflow for n={n}, d={d}"));
        let rows = n.checked_add(1).ok_or_else(overflow)?;
        let sum_len = rows.checked_mul(d).ok_or_else(overflow)?;
        let outer_width = d.checked_mul(d).ok_or_else(overflow)?;
        let outer_len = rows.checked_mul(outer_width).ok_or_else(overflow)?;

        let compensated = matches!(self.repro_mode, ReproMode::Strict);
        let mut row = vec![0.0; d];
        let offset = series_mean(x, &mut row, compensated);

        let mut prefix_sum = Vec::with_capacity(sum_len);
        let mut prefix_outer = Vec::with_capacity(outer_len);
        prefix_sum.resize(d, 0.0);
        prefix_outer.resize(outer_width, 0.0);

        let mut sums = vec![Accumulator::default(); d];
        let mut outers = vec![Accumulator::default(); outer_width];
        for t in 0..n {
            x.read_row(t, &mut row);
            for (value, center) in row.iter_mut().zip(&offset) {
                *value -= center;
            }
            for (acc, value) in sums.iter_mut().zip(&row) {
                acc.add(*value, compensated);
            }
            for i in 0..d {
                for j in 0..=i {
                    outers[i * d + j].add(row[i] * row[j], compensated);
                }
            }
            prefix_sum.extend(sums.iter().map(Accumulator::value));
            prefix_outer.extend(outers.iter().map(Accumulator::value));
        }

        Ok(GaussianCache {
            prefix_sum,
            prefix_outer,
            n,
            d,
        })
    }

    /// Cost of `[start, end)`, or `None` when the regularized covariance is
    /// not positive definite (only reachable with `lamb == 0`).
    pub fn segment_cost(
        &self,
        cache: &GaussianCache,
        start: usize,
        end: usize,
        workspace: &mut CostWorkspace,
    ) -> Option<f64> {
        assert!(
            start < end,
            "segment_cost requires start < end; got start={start}, end={end}"
        );
        assert!(
            end <= cache.n,
            "segment_cost end out of bounds: end={end}, n={}",
            cache.n
        );
        self.regularized_covariance(cache, start, end, workspace);
        self.cost_from_covariance(end - start, workspace)
    }

    /// Segment log-likelihood; a degenerate covariance has unbounded likelihood.
    pub fn segment_log_likelihood(
        &self,
        cache: &GaussianCache,
        start: usize,
        end: usize,
        workspace: &mut CostWorkspace,
    ) -> f64 {
        self.segment_cost(cache, start, end, workspace)
            .map_or(f64::INFINITY, |cost| -cost)
    }

    /// Sum of segment log-likelihoods over a boundary-inclusive breakpoint list.
    pub fn cumulative_log_likelihood(
        &self,
        cache: &GaussianCache,
        change_points: &[usize],
        workspace: &mut CostWorkspace,
    ) -> f64 {
        change_points
            .windows(2)
            .map(|pair| self.segment_log_likelihood(cache, pair[0], pair[1], workspace))
            .sum()
    }

    /// Best single split of `[start, end)` leaving at least two observations per side.
    ///
    /// Ties keep the lowest split index. Only strictly positive gains are reported.
    pub fn best_split(
        &self,
        cache: &GaussianCache,
        start: usize,
        end: usize,
        workspace: &mut CostWorkspace,
    ) -> SplitScan {
        let mut scan = SplitScan::default();
        let len = end.saturating_sub(start);
        if len < 2 * MIN_SIDE_LEN {
            return scan;
        }

        scan.cost_evals += 1;
        let Some(full_cost) = self.segment_cost(cache, start, end, workspace) else {
            return scan;
        };

        let mut best_total = full_cost;
        let mut best_split = None;
        for split in (start + MIN_SIDE_LEN)..=(end - MIN_SIDE_LEN) {
            scan.cost_evals += 2;
            let Some(left) = self.segment_cost(cache, start, split, workspace) else {
                continue;
            };
            let Some(right) = self.segment_cost(cache, split, end, workspace) else {
                continue;
            };
            let total = left + right;
            if total < best_total {
                best_total = total;
                best_split = Some(split);
            }
        }

        scan.best = best_split.map(|split| SplitCandidate {
            split,
            gain: full_cost - best_total,
        });
        scan
    }

    fn regularized_covariance(
        &self,
        cache: &GaussianCache,
        start: usize,
        end: usize,
        workspace: &mut CostWorkspace,
    ) {
        let d = cache.d;
        let m = (end - start) as f64;
        let ridge = self.lamb / m;

        for i in 0..d {
            let mean = (cache.sum_at(end, i) - cache.sum_at(start, i)) / m;
            let (outer_end, outer_start) = (cache.outer_at(end, i, i), cache.outer_at(start, i, i));
            let variance = (outer_end - outer_start) / m - mean * mean;
            // Anything at or below the rounding error of the prefix difference is zero.
            let noise_floor = VARIANCE_NOISE_FLOOR * (outer_end + outer_start) / m;
            workspace.mean[i] = mean;
            workspace.variance[i] = if variance > noise_floor { variance } else { 0.0 };
        }
        for i in 0..d {
            for j in 0..i {
                let cov = if workspace.variance[i] == 0.0 || workspace.variance[j] == 0.0 {
                    0.0
                } else {
                    (cache.outer_at(end, i, j) - cache.outer_at(start, i, j)) / m
                        - workspace.mean[i] * workspace.mean[j]
                };
                workspace.matrix[i * d + j] = cov;
                workspace.matrix[j * d + i] = cov;
            }
            workspace.matrix[i * d + i] = workspace.variance[i] + ridge;
        }
    }

    #[cfg(feature = "dense-linalg")]
    fn cost_from_covariance(&self, len: usize, workspace: &mut CostWorkspace) -> Option<f64> {
        let d = workspace.d;
        if !cholesky_in_place(&mut workspace.matrix, d) {
            return None;
        }
        let log_det = log_det_from_cholesky(&workspace.matrix, d);
        let trace = if self.lamb > 0.0 {
            trace_inverse_from_cholesky(&workspace.matrix, d, &mut workspace.column)
        } else {
            0.0
        };
        Some(len as f64 * log_det - self.lamb * trace)
    }

    #[cfg(not(feature = "dense-linalg"))]
    fn cost_from_covariance(&self, _len: usize, _workspace: &mut CostWorkspace) -> Option<f64> {
        None
    }
}

/// Prefix-statistic cache for O(d^3) segment-cost queries.
#[derive(Clone, Debug, PartialEq)]
pub struct GaussianCache {
    prefix_sum: Vec<f64>,
    prefix_outer: Vec<f64>,
    n: usize,
    d: usize,
}

impl GaussianCache {
    pub fn n(&self) -> usize {
        self.n
    }

    pub fn d(&self) -> usize {
        self.d
    }

    /// Fresh scratch space sized for this cache's dimensionality.
    pub fn workspace(&self) -> CostWorkspace {
        CostWorkspace::new(self.d)
    }

    fn sum_at(&self, t: usize, dim: usize) -> f64 {
        self.prefix_sum[t * self.d + dim]
    }

    fn outer_at(&self, t: usize, i: usize, j: usize) -> f64 {
        self.prefix_outer[t * self.d * self.d + i * self.d + j]
    }
}

/// Reusable scratch buffers; one per thread.
#[derive(Clone, Debug)]
pub struct CostWorkspace {
    d: usize,
    mean: Vec<f64>,
    variance: Vec<f64>,
    matrix: Vec<f64>,
    #[cfg_attr(not(feature = "dense-linalg"), allow(dead_code))]
    column: Vec<f64>,
}

impl CostWorkspace {
    pub fn new(d: usize) -> Self {
        Self {
            d,
            mean: vec![0.0; d],
            variance: vec![0.0; d],
            matrix: vec![0.0; d * d],
            column: vec![0.0; d],
        }
    }
}

/// Winning split of a segment scan.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SplitCandidate {
    /// Absolute index of the first observation of the right-hand segment.
    pub split: usize,
    /// Strictly positive cost decrease of the split.
    pub gain: f64,
}

/// Outcome of [`GaussianCost::best_split`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SplitScan {
    pub best: Option<SplitCandidate>,
    pub cost_evals: usize,
}

#[cfg(all(test, feature = "dense-linalg"))]
mod tests {
    use super::{GaussianCost, MIN_SIDE_LEN};
    use ggs_core::{MemoryLayout, ReproMode, SegError, TimeSeriesView};

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        let diff = (actual - expected).abs();
        assert!(
            diff <= tol,
            "expected {expected}, got {actual}, |diff|={diff}, tol={tol}"
        );
    }

    fn mean_shift() -> Vec<f64> {
        (0..4)
            .flat_map(|level| std::iter::repeat_n((level * level) as f64, 5))
            .collect()
    }

    /// Direct univariate formula for cross-checking the cached path.
    fn naive_univariate_cost(values: &[f64], lamb: f64) -> f64 {
        let m = values.len() as f64;
        let mean = values.iter().sum::<f64>() / m;
        let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / m;
        let sigma = var + lamb / m;
        m * sigma.ln() - lamb / sigma
    }

    #[test]
    fn new_validates_lamb() {
        for lamb in [-0.1, f64::NAN, f64::INFINITY] {
            let err = GaussianCost::new(lamb, ReproMode::Balanced).expect_err("lamb must fail");
            assert!(matches!(err, SegError::InvalidParameter(_)), "{err}");
        }
        let cost = GaussianCost::new(0.0, ReproMode::Balanced).expect("zero lamb is allowed");
        assert_eq!(cost.lamb(), 0.0);
        assert_eq!(cost.name(), "gaussian_regularized");
    }

    #[test]
    fn univariate_cost_matches_direct_formula() {
        let values = mean_shift();
        let view = TimeSeriesView::univariate(&values).expect("view should be valid");
        let cost = GaussianCost::new(1.0, ReproMode::Balanced).expect("cost should build");
        let cache = cost.precompute(&view).expect("cache should build");
        let mut ws = cache.workspace();

        for (start, end) in [(0, 20), (0, 15), (15, 20), (3, 11), (7, 8)] {
            let cached = cost
                .segment_cost(&cache, start, end, &mut ws)
                .expect("regularized covariance is positive definite");
            assert_close(
                cached,
                naive_univariate_cost(&values[start..end], 1.0),
                1e-9,
            );
        }
    }

    #[test]
    fn constant_segment_cost_uses_ridge_only() {
        let values = [9.0; 5];
        let view = TimeSeriesView::univariate(&values).expect("view should be valid");
        let cost = GaussianCost::new(1.0, ReproMode::Balanced).expect("cost should build");
        let cache = cost.precompute(&view).expect("cache should build");
        let mut ws = cache.workspace();

        // Sigma = 1/5 -> 5 ln(0.2) - 1 / 0.2
        let expected = 5.0 * 0.2_f64.ln() - 5.0;
        let actual = cost.segment_cost(&cache, 0, 5, &mut ws).expect("finite");
        assert_close(actual, expected, 1e-12);
        assert_close(
            cost.segment_log_likelihood(&cache, 0, 5, &mut ws),
            -expected,
            1e-12,
        );
    }

    #[test]
    fn single_observation_segment_stays_finite() {
        let values = [3.0, -1.0];
        let view = TimeSeriesView::univariate(&values).expect("view should be valid");
        let cost = GaussianCost::new(0.5, ReproMode::Balanced).expect("cost should build");
        let cache = cost.precompute(&view).expect("cache should build");
        let mut ws = cache.workspace();
        let value = cost.segment_cost(&cache, 1, 2, &mut ws).expect("finite");
        assert!(value.is_finite());
    }

    #[test]
    fn zero_lamb_constant_segment_is_degenerate() {
        let values = [2.0, 2.0, 2.0, 2.0];
        let view = TimeSeriesView::univariate(&values).expect("view should be valid");
        let cost = GaussianCost::new(0.0, ReproMode::Balanced).expect("cost should build");
        let cache = cost.precompute(&view).expect("cache should build");
        let mut ws = cache.workspace();

        assert!(cost.segment_cost(&cache, 0, 4, &mut ws).is_none());
        assert_eq!(
            cost.segment_log_likelihood(&cache, 0, 4, &mut ws),
            f64::INFINITY
        );
        assert!(cost.best_split(&cache, 0, 4, &mut ws).best.is_none());
    }

    #[test]
    fn zero_lamb_constant_run_is_degenerate_inside_a_longer_series() {
        let mut values = vec![3.0, -1.0, 5.0, 2.0];
        values.extend([0.1; 7]);
        values.extend([4.0, -2.0, 7.0]);
        let cost = GaussianCost::new(0.0, ReproMode::Balanced).expect("cost should build");

        let view = TimeSeriesView::univariate(&values).expect("view should be valid");
        let cache = cost.precompute(&view).expect("cache should build");
        let mut ws = cache.workspace();
        assert!(cost.segment_cost(&cache, 4, 11, &mut ws).is_none());

        let alone = TimeSeriesView::univariate(&values[4..11]).expect("view should be valid");
        let alone_cache = cost.precompute(&alone).expect("cache should build");
        assert!(cost.segment_cost(&alone_cache, 0, 7, &mut ws).is_none());
    }

    #[test]
    fn constant_feature_has_no_covariance_with_the_others() {
        let mut flat = Vec::new();
        for (t, other) in [3.0, -1.0, 5.0, 2.0, 6.0, 0.5, 4.0, -2.0, 7.0, 1.0].iter().enumerate() {
            flat.push(if (2..9).contains(&t) { 0.1 } else { t as f64 });
            flat.push(*other);
        }
        let view = TimeSeriesView::from_f64(&flat, 10, 2, MemoryLayout::CContiguous)
            .expect("view should be valid");
        let cost = GaussianCost::new(1.0, ReproMode::Balanced).expect("cost should build");
        let cache = cost.precompute(&view).expect("cache should build");
        let mut ws = cache.workspace();

        let window: Vec<f64> = flat[4..18].iter().skip(1).step_by(2).copied().collect();
        let ridge: f64 = 1.0 / 7.0;
        let mean = window.iter().sum::<f64>() / 7.0;
        let var = window.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / 7.0;
        let expected = 7.0 * (ridge.ln() + (var + ridge).ln()) - (1.0 / ridge + 1.0 / (var + ridge));
        let actual = cost.segment_cost(&cache, 2, 9, &mut ws).expect("finite");
        assert_close(actual, expected, 1e-9);
    }

    #[test]
    fn costs_are_invariant_to_a_large_constant_offset() {
        let base: Vec<f64> = (0..60)
            .map(|t| {
                let level = (t / 15) as f64;
                15.0 * level * level + 0.3 * (1.7 * t as f64).sin()
            })
            .collect();
        let cost = GaussianCost::new(1.0, ReproMode::Balanced).expect("cost should build");
        let base_view = TimeSeriesView::univariate(&base).expect("view should be valid");
        let base_cache = cost.precompute(&base_view).expect("cache should build");
        let mut ws = base_cache.workspace();
        let base_split = cost
            .best_split(&base_cache, 0, 60, &mut ws)
            .best
            .expect("the level change must be found");

        for offset in [1e7, 1e8] {
            let shifted: Vec<f64> = base.iter().map(|v| v + offset).collect();
            let view = TimeSeriesView::univariate(&shifted).expect("view should be valid");
            let cache = cost.precompute(&view).expect("cache should build");
            for (start, end) in [(0, 60), (0, 15), (15, 30), (30, 45), (45, 60), (5, 40)] {
                let expected = cost
                    .segment_cost(&base_cache, start, end, &mut ws)
                    .expect("finite");
                let actual = cost.segment_cost(&cache, start, end, &mut ws).expect("finite");
                assert_close(actual, expected, 1e-7 * expected.abs());
            }
            let split = cost
                .best_split(&cache, 0, 60, &mut ws)
                .best
                .expect("the level change must be found");
            assert_eq!(split.split, base_split.split, "offset={offset}");
        }
    }

    #[test]
    fn multivariate_cost_matches_diagonal_case() {
        // Two independent features: the cost of a diagonal covariance is the
        // sum of per-feature log terms with a shared trace penalty.
        let rows: Vec<[f64; 2]> = vec![[0.0, 1.0], [2.0, 1.0], [0.0, 5.0], [2.0, 5.0]];
        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        let view = TimeSeriesView::from_f64(&flat, 4, 2, MemoryLayout::CContiguous)
            .expect("view should be valid");
        let cost = GaussianCost::new(2.0, ReproMode::Balanced).expect("cost should build");
        let cache = cost.precompute(&view).expect("cache should build");
        let mut ws = cache.workspace();

        // var = [1, 4], cov = 0, ridge = 0.5
        let s1: f64 = 1.5;
        let s2: f64 = 4.5;
        let expected = 4.0 * (s1.ln() + s2.ln()) - 2.0 * (1.0 / s1 + 1.0 / s2);
        let actual = cost.segment_cost(&cache, 0, 4, &mut ws).expect("finite");
        assert_close(actual, expected, 1e-9);
    }

    #[test]
    fn f_contiguous_and_f32_inputs_match_c_contiguous() {
        let c_order = [1.0_f64, 4.0, 2.0, 3.0, 7.0, 0.0, 5.0, 5.0, 1.0, 2.0];
        let f_order = [1.0_f64, 2.0, 7.0, 5.0, 1.0, 4.0, 3.0, 0.0, 5.0, 2.0];
        let f32_order: Vec<f32> = c_order.iter().map(|v| *v as f32).collect();

        let cost = GaussianCost::new(1.0, ReproMode::Balanced).expect("cost should build");
        let c_cache = cost
            .precompute(
                &TimeSeriesView::from_f64(&c_order, 5, 2, MemoryLayout::CContiguous)
                    .expect("view should be valid"),
            )
            .expect("cache should build");
        let f_cache = cost
            .precompute(
                &TimeSeriesView::from_f64(&f_order, 5, 2, MemoryLayout::FContiguous)
                    .expect("view should be valid"),
            )
            .expect("cache should build");
        let f32_cache = cost
            .precompute(
                &TimeSeriesView::from_f32(&f32_order, 5, 2, MemoryLayout::CContiguous)
                    .expect("view should be valid"),
            )
            .expect("cache should build");

        assert_eq!(c_cache, f_cache);
        assert_eq!(c_cache, f32_cache);
    }

    #[test]
    fn strict_mode_matches_balanced_on_exact_data() {
        let values = mean_shift();
        let view = TimeSeriesView::univariate(&values).expect("view should be valid");
        let strict = GaussianCost::new(1.0, ReproMode::Strict).expect("cost should build");
        let balanced = GaussianCost::new(1.0, ReproMode::Balanced).expect("cost should build");
        assert_eq!(
            strict.precompute(&view).expect("cache should build"),
            balanced.precompute(&view).expect("cache should build")
        );
    }

    #[test]
    fn best_split_finds_largest_mean_shift() {
        let values = mean_shift();
        let view = TimeSeriesView::univariate(&values).expect("view should be valid");
        let cost = GaussianCost::new(1.0, ReproMode::Balanced).expect("cost should build");
        let cache = cost.precompute(&view).expect("cache should build");
        let mut ws = cache.workspace();

        let scan = cost.best_split(&cache, 0, 20, &mut ws);
        let best = scan.best.expect("a split must improve the fit");
        assert_eq!(best.split, 15);
        assert!(best.gain > 0.0);
        // One unsplit evaluation plus two per candidate in [2, 18].
        assert_eq!(scan.cost_evals, 1 + 2 * 17);
    }

    #[test]
    fn best_split_ignores_constant_segments_and_short_segments() {
        let values = mean_shift();
        let view = TimeSeriesView::univariate(&values).expect("view should be valid");
        let cost = GaussianCost::new(1.0, ReproMode::Balanced).expect("cost should build");
        let cache = cost.precompute(&view).expect("cache should build");
        let mut ws = cache.workspace();

        assert!(cost.best_split(&cache, 5, 10, &mut ws).best.is_none());
        let short = cost.best_split(&cache, 0, 2 * MIN_SIDE_LEN - 1, &mut ws);
        assert!(short.best.is_none());
        assert_eq!(short.cost_evals, 0);
    }

    #[test]
    fn cumulative_log_likelihood_improves_with_true_partition() {
        let values = mean_shift();
        let view = TimeSeriesView::univariate(&values).expect("view should be valid");
        let cost = GaussianCost::new(1.0, ReproMode::Balanced).expect("cost should build");
        let cache = cost.precompute(&view).expect("cache should build");
        let mut ws = cache.workspace();

        let trivial = cost.cumulative_log_likelihood(&cache, &[0, 20], &mut ws);
        let truth = cost.cumulative_log_likelihood(&cache, &[0, 5, 10, 15, 20], &mut ws);
        assert!(truth > trivial, "truth={truth}, trivial={trivial}");
        assert_close(truth, 4.0 * (5.0 - 5.0 * 0.2_f64.ln()), 1e-9);
    }
}

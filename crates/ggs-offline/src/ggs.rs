// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::params::GgsParams;
use crate::rng::StableRng;
use ggs_core::{
    Diagnostics, ExecutionContext, OfflineSegmenter, ReproMode, SegError, SegmentationResult,
    TimeSeriesView,
};
use ggs_costs::{CostWorkspace, GaussianCache, GaussianCost, SplitCandidate, SplitScan};
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use std::borrow::Cow;
use std::time::Instant;

const CANCEL_CHECK_EVERY: usize = 16;

/// Routes per-step events to `info` when verbose, `debug` otherwise.
macro_rules! step_event {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::info!($($arg)+);
        } else {
            tracing::debug!($($arg)+);
        }
    };
}

/// Greedy Gaussian segmentation.
///
/// Splits a multivariate series into segments that are each modeled as a
/// ridge-regularized Gaussian. Change points are added one at a time, always
/// taking the split with the largest likelihood gain, and after each addition
/// the existing points are locally re-optimized in a seeded random order.
#[derive(Clone, Debug)]
pub struct GreedyGaussianSegmentation {
    params: GgsParams,
    cost: GaussianCost,
    fitted: Option<SegmentationResult>,
}

impl GreedyGaussianSegmentation {
    /// Validates parameters and checks the linear-algebra capability.
    pub fn new(params: GgsParams) -> Result<Self, SegError> {
        params.validate()?;
        let cost = GaussianCost::new(params.lamb, ReproMode::Balanced)?;
        Ok(Self {
            params,
            cost,
            fitted: None,
        })
    }

    /// Parameters exactly as passed to [`Self::new`].
    pub fn get_params(&self) -> GgsParams {
        self.params
    }

    pub fn params(&self) -> &GgsParams {
        &self.params
    }

    #[cfg(feature = "serde")]
    pub fn params_json(&self) -> Result<serde_json::Value, SegError> {
        serde_json::to_value(self.params)
            .map_err(|err| SegError::invalid_parameter(format!("params serialization: {err}")))
    }

    /// Boundary-inclusive breakpoints `[0, c1, ..., ck, n]`.
    pub fn find_change_points(&self, x: &TimeSeriesView<'_>) -> Result<Vec<usize>, SegError> {
        Ok(self.segment(x, &ExecutionContext::new())?.change_points)
    }

    /// Breakpoints without the `0` and `n` boundaries.
    pub fn interior_change_points(&self, x: &TimeSeriesView<'_>) -> Result<Vec<usize>, SegError> {
        let result = self.segment(x, &ExecutionContext::new())?;
        Ok(result.interior_change_points().to_vec())
    }

    /// Runs the segmentation and keeps the result; any previous fit is replaced.
    pub fn fit(&mut self, x: &TimeSeriesView<'_>) -> Result<&SegmentationResult, SegError> {
        self.fitted = None;
        let result = self.segment(x, &ExecutionContext::new())?;
        Ok(self.fitted.insert(result))
    }

    /// Per-sample segment labels for `x`, computed from a fresh run.
    pub fn predict(&self, x: &TimeSeriesView<'_>) -> Result<Vec<usize>, SegError> {
        Ok(self.segment(x, &ExecutionContext::new())?.labels())
    }

    pub fn fit_predict(&mut self, x: &TimeSeriesView<'_>) -> Result<Vec<usize>, SegError> {
        Ok(self.fit(x)?.labels())
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Breakpoints of the last [`Self::fit`], if any.
    pub fn change_points(&self) -> Option<&[usize]> {
        self.fitted
            .as_ref()
            .map(|result| result.change_points.as_slice())
    }

    pub fn result(&self) -> Option<&SegmentationResult> {
        self.fitted.as_ref()
    }
}

#[derive(Default, Clone, Copy, Debug)]
struct RuntimeStats {
    cost_evals: usize,
    shuffle_passes: usize,
    relocations: usize,
    used_parallel: bool,
}

/// Outcome of one refinement call. `converged` is false when the last
/// permitted pass still moved a point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Refinement {
    passes: usize,
    converged: bool,
}

/// Per-call state; nothing here outlives one `segment` call.
struct Run<'a> {
    params: &'a GgsParams,
    cost: GaussianCost,
    cache: GaussianCache,
    workspace: CostWorkspace,
    ctx: &'a ExecutionContext<'a>,
    runtime: RuntimeStats,
}

fn checked_add_evals(runtime: &mut RuntimeStats, scan: &SplitScan) -> Result<(), SegError> {
    runtime.cost_evals = runtime
        .cost_evals
        .checked_add(scan.cost_evals)
        .ok_or_else(|| SegError::resource_limit("cost_evals counter overflow"))?;
    Ok(())
}

fn insert_sorted_unique(values: &mut Vec<usize>, value: usize) -> Result<usize, SegError> {
    match values.binary_search(&value) {
        Ok(_) => Err(SegError::numerical_issue(format!(
            "duplicate split selected at {value}; internal GGS state is inconsistent"
        ))),
        Err(idx) => {
            values.insert(idx, value);
            Ok(idx)
        }
    }
}

/// Highest gain wins; equal gains keep the earlier segment.
fn pick_best(scans: impl IntoIterator<Item = SplitScan>) -> Option<SplitCandidate> {
    let mut best: Option<SplitCandidate> = None;
    for candidate in scans.into_iter().filter_map(|scan| scan.best) {
        if best.is_none_or(|current| candidate.gain > current.gain) {
            best = Some(candidate);
        }
    }
    best
}

impl Run<'_> {
    fn scan_segment(&mut self, start: usize, end: usize) -> Result<SplitScan, SegError> {
        let scan = self
            .cost
            .best_split(&self.cache, start, end, &mut self.workspace);
        checked_add_evals(&mut self.runtime, &scan)?;
        Ok(scan)
    }

    fn log_likelihood(&mut self, change_points: &[usize]) -> f64 {
        self.cost
            .cumulative_log_likelihood(&self.cache, change_points, &mut self.workspace)
    }

    /// Best split across every current segment.
    fn best_partition_split(
        &mut self,
        change_points: &[usize],
    ) -> Result<Option<SplitCandidate>, SegError> {
        #[cfg(feature = "rayon")]
        if self.ctx.repro_mode != ReproMode::Strict && change_points.len() > 2 {
            return self.best_partition_split_parallel(change_points);
        }

        let mut scans = Vec::with_capacity(change_points.len() - 1);
        for (iteration, pair) in change_points.windows(2).enumerate() {
            self.ctx.check_cancelled_every(iteration, CANCEL_CHECK_EVERY)?;
            scans.push(self.scan_segment(pair[0], pair[1])?);
        }
        Ok(pick_best(scans))
    }

    #[cfg(feature = "rayon")]
    fn best_partition_split_parallel(
        &mut self,
        change_points: &[usize],
    ) -> Result<Option<SplitCandidate>, SegError> {
        self.ctx.check_cancelled()?;
        let cost = self.cost;
        let cache = &self.cache;
        let scans: Vec<SplitScan> = change_points
            .par_windows(2)
            .map_init(
                || cache.workspace(),
                |workspace, pair| cost.best_split(cache, pair[0], pair[1], workspace),
            )
            .collect();
        for scan in &scans {
            checked_add_evals(&mut self.runtime, scan)?;
        }
        self.runtime.used_parallel = true;
        Ok(pick_best(scans))
    }

    /// Local re-optimization of interior points.
    ///
    /// A point is revisited only while one of its neighbours moved in the
    /// current or previous pass. The newly inserted point starts as moved.
    fn refine(
        &mut self,
        change_points: &mut [usize],
        inserted_idx: usize,
    ) -> Result<Refinement, SegError> {
        if change_points.len() <= 3 {
            return Ok(Refinement {
                passes: 0,
                converged: true,
            });
        }

        let verbose = self.params.verbose;
        let mut rng = StableRng::new(self.params.effective_seed());
        let mut this_pass = vec![false; change_points.len()];
        this_pass[inserted_idx] = true;
        let mut order: Vec<usize> = Vec::with_capacity(change_points.len() - 2);

        for pass in 0..self.params.max_shuffles {
            self.ctx.check_cancelled()?;
            let last_pass = this_pass.clone();
            this_pass.fill(false);
            let mut moved_any = false;

            order.clear();
            order.extend(1..change_points.len() - 1);
            rng.shuffle(&mut order)?;

            for (iteration, &idx) in order.iter().enumerate() {
                self.ctx.check_cancelled_every(iteration, CANCEL_CHECK_EVERY)?;
                let neighbour_moved = last_pass[idx - 1]
                    || last_pass[idx + 1]
                    || this_pass[idx - 1]
                    || this_pass[idx + 1];
                if !neighbour_moved {
                    continue;
                }

                let (lo, hi) = (change_points[idx - 1], change_points[idx + 1]);
                let scan = self.scan_segment(lo, hi)?;
                let Some(candidate) = scan.best else {
                    continue;
                };
                if candidate.split == change_points[idx] {
                    continue;
                }

                step_event!(
                    verbose,
                    pass,
                    from = change_points[idx],
                    to = candidate.split,
                    "ggs: relocated change point"
                );
                change_points[idx] = candidate.split;
                this_pass[idx] = true;
                moved_any = true;
                self.runtime.relocations += 1;
            }

            self.runtime.shuffle_passes += 1;
            if !moved_any {
                return Ok(Refinement {
                    passes: pass + 1,
                    converged: true,
                });
            }
        }

        Ok(Refinement {
            passes: self.params.max_shuffles,
            converged: false,
        })
    }
}

impl OfflineSegmenter for GreedyGaussianSegmentation {
    fn segment(
        &self,
        x: &TimeSeriesView<'_>,
        ctx: &ExecutionContext<'_>,
    ) -> Result<SegmentationResult, SegError> {
        self.params.validate()?;
        x.ensure_finite()?;

        let started_at = Instant::now();
        let cost = self.cost.with_repro_mode(ctx.repro_mode);
        let cache = cost.precompute(x)?;
        let verbose = self.params.verbose;
        let mut run = Run {
            params: &self.params,
            cost,
            workspace: cache.workspace(),
            cache,
            ctx,
            runtime: RuntimeStats::default(),
        };

        let mut notes = vec![];
        let mut warnings = vec![];
        let mut change_points = vec![0, x.n];
        let mut intermediate_change_points = vec![change_points.clone()];
        let mut intermediate_log_likelihood = vec![run.log_likelihood(&change_points)];

        step_event!(verbose, n = x.n, d = x.d, k_max = self.params.k_max, "ggs: start");

        for step in 0..self.params.k_max {
            let Some(best) = run.best_partition_split(&change_points)? else {
                notes.push(format!(
                    "growth stopped after {step} change points: no split with positive gain"
                ));
                break;
            };

            let inserted_idx = insert_sorted_unique(&mut change_points, best.split)?;
            step_event!(
                verbose,
                step,
                split = best.split,
                gain = best.gain,
                "ggs: added change point"
            );

            let refinement = run.refine(&mut change_points, inserted_idx)?;
            let log_likelihood = run.log_likelihood(&change_points);
            step_event!(
                verbose,
                step,
                passes = refinement.passes,
                converged = refinement.converged,
                log_likelihood,
                change_points = ?change_points,
                "ggs: refinement finished"
            );
            if !refinement.converged {
                tracing::warn!(
                    step,
                    max_shuffles = self.params.max_shuffles,
                    "ggs: refinement stopped before converging"
                );
                warnings.push(format!(
                    "refinement did not converge within max_shuffles={} at step {step}",
                    self.params.max_shuffles
                ));
            }

            intermediate_change_points.push(change_points.clone());
            intermediate_log_likelihood.push(log_likelihood);
            ctx.report_progress((step + 1) as f32 / self.params.k_max as f32);
        }

        let runtime = run.runtime;
        let runtime_ms = u64::try_from(started_at.elapsed().as_millis()).unwrap_or(u64::MAX);
        ctx.record_scalar("offline.ggs.cost_evals", runtime.cost_evals as f64);
        ctx.record_scalar("offline.ggs.shuffle_passes", runtime.shuffle_passes as f64);
        ctx.record_scalar("offline.ggs.runtime_ms", runtime_ms as f64);
        ctx.report_progress(1.0);

        notes.push(format!(
            "final_change_count={}, cost_evals={}, shuffle_passes={}, relocations={}, used_parallel={}",
            change_points.len() - 2,
            runtime.cost_evals,
            runtime.shuffle_passes,
            runtime.relocations,
            runtime.used_parallel
        ));

        #[cfg(feature = "rayon")]
        let thread_count = runtime
            .used_parallel
            .then(rayon::current_num_threads);
        #[cfg(not(feature = "rayon"))]
        let thread_count = None;

        let diagnostics = Diagnostics {
            n: x.n,
            d: x.d,
            runtime_ms: Some(runtime_ms),
            notes,
            warnings,
            algorithm: Cow::Borrowed("ggs"),
            cost_model: Cow::Borrowed(cost.name()),
            seed: Some(self.params.effective_seed()),
            repro_mode: ctx.repro_mode,
            thread_count,
            cost_evals: Some(runtime.cost_evals),
            shuffle_passes: Some(runtime.shuffle_passes),
            #[cfg(feature = "serde")]
            params_json: Some(self.params_json()?),
            ..Diagnostics::default()
        };

        SegmentationResult::new(
            x.n,
            change_points,
            intermediate_change_points,
            intermediate_log_likelihood,
            diagnostics,
        )
    }
}

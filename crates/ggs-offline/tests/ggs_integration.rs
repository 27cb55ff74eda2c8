// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use ggs_core::{
    ExecutionContext, MemoryLayout, OfflineSegmenter, ReproMode, SeriesBuffer, TimeSeriesView,
    validate_change_points,
};
use ggs_offline::{GgsParams, GreedyGaussianSegmentation};

fn make_view(values: &[f64], n: usize, d: usize) -> TimeSeriesView<'_> {
    TimeSeriesView::from_f64(values, n, d, MemoryLayout::CContiguous)
        .expect("test view should be valid")
}

fn estimator(params: GgsParams) -> GreedyGaussianSegmentation {
    GreedyGaussianSegmentation::new(params).expect("params should be valid")
}

/// Three regimes of 40 rows in three features, with a small deterministic wobble.
fn three_regime_multivariate() -> SeriesBuffer {
    let levels = [[0.0, 1.0, -1.0], [3.0, 1.0, 2.0], [3.0, -2.0, 2.0]];
    let rows: Vec<Vec<f64>> = (0..120)
        .map(|t| {
            (0..3)
                .map(|dim| levels[t / 40][dim] + 0.3 * (1.7 * t as f64 + dim as f64).sin())
                .collect()
        })
        .collect();
    SeriesBuffer::from_rows(&rows).expect("rows should be rectangular")
}

#[test]
fn mean_shift_matches_reference_partition() {
    let values: Vec<f64> = [0.0, 1.0, 4.0, 9.0]
        .iter()
        .flat_map(|level| std::iter::repeat_n(*level, 5))
        .collect();
    let view = make_view(&values, 20, 1);
    let cps = estimator(GgsParams::new(10, 1.0))
        .find_change_points(&view)
        .expect("segmentation should succeed");
    validate_change_points(20, &cps).expect("change points should be well formed");
    assert_eq!(cps, vec![0, 5, 10, 15, 20]);
}

#[test]
fn multivariate_regimes_are_recovered_for_any_seed() {
    let buffer = three_regime_multivariate();
    let view = buffer.view();
    for seed in [0, 7, 12_345] {
        let params = GgsParams::new(10, 1.0).with_random_state(seed);
        let result = estimator(params)
            .segment(&view, &ExecutionContext::new())
            .expect("segmentation should succeed");
        assert_eq!(result.change_points, vec![0, 40, 80, 120], "seed={seed}");
        assert_eq!(result.diagnostics.seed, Some(seed));
        assert_eq!(result.diagnostics.d, 3);
    }
}

#[test]
fn column_major_input_gives_the_same_partition() {
    let buffer = three_regime_multivariate();
    let (n, d) = (buffer.n(), buffer.d());
    let row_major = buffer.as_slice();
    let mut column_major = vec![0.0; n * d];
    for t in 0..n {
        for dim in 0..d {
            column_major[dim * n + t] = row_major[t * d + dim];
        }
    }
    let view = TimeSeriesView::from_f64(&column_major, n, d, MemoryLayout::FContiguous)
        .expect("view should be valid");

    let segmenter = estimator(GgsParams::new(10, 1.0));
    assert_eq!(
        segmenter
            .find_change_points(&view)
            .expect("segmentation should succeed"),
        segmenter
            .find_change_points(&buffer.view())
            .expect("segmentation should succeed")
    );
}

#[test]
fn variance_change_is_detected_without_mean_change() {
    let values: Vec<f64> = (0..100)
        .map(|t| {
            let amplitude = if t < 50 { 0.5 } else { 4.0 };
            amplitude * (2.3 * t as f64).sin()
        })
        .collect();
    let view = make_view(&values, 100, 1);
    for lamb in [0.0, 1.0] {
        let cps = estimator(GgsParams::new(1, lamb))
            .find_change_points(&view)
            .expect("segmentation should succeed");
        assert_eq!(cps, vec![0, 50, 100], "lamb={lamb}");
    }
}

#[test]
fn strict_and_balanced_modes_agree_on_clean_steps() {
    let mut values = Vec::with_capacity(90);
    values.extend(std::iter::repeat_n(0.0, 30));
    values.extend(std::iter::repeat_n(8.0, 30));
    values.extend(std::iter::repeat_n(-4.0, 30));
    let view = make_view(&values, 90, 1);
    let segmenter = estimator(GgsParams::new(10, 1.0));

    let strict = segmenter
        .segment(
            &view,
            &ExecutionContext::new().with_repro_mode(ReproMode::Strict),
        )
        .expect("strict run should succeed");
    let balanced = segmenter
        .segment(&view, &ExecutionContext::new())
        .expect("balanced run should succeed");
    assert_eq!(strict.change_points, vec![0, 30, 60, 90]);
    assert_eq!(strict.change_points, balanced.change_points);
    assert_eq!(
        strict.intermediate_change_points,
        balanced.intermediate_change_points
    );
}

#[test]
fn large_constant_offsets_do_not_change_the_partition() {
    let base: Vec<f64> = (0..60)
        .map(|t| {
            let level = (t / 15) as f64;
            15.0 * level * level + 0.3 * (1.7 * t as f64).sin()
        })
        .collect();
    let segmenter = estimator(GgsParams::new(10, 1.0));
    for offset in [0.0, 1e7, 1e8] {
        let shifted: Vec<f64> = base.iter().map(|v| v + offset).collect();
        let cps = segmenter
            .find_change_points(&make_view(&shifted, 60, 1))
            .expect("segmentation should succeed");
        assert_eq!(cps, vec![0, 15, 30, 45, 60], "offset={offset}");
    }
}

/// Monotonicity in `lamb` holds for well-separated steps like these; see the
/// irregular case below for where it does not.
#[test]
fn larger_lamb_never_adds_change_points_on_clean_steps() {
    let mut values = Vec::with_capacity(60);
    for level in [0.0, 2.0, 5.0, 1.0] {
        values.extend(std::iter::repeat_n(level, 15));
    }
    let view = make_view(&values, 60, 1);

    let mut previous = usize::MAX;
    for lamb in [0.1, 1.0, 10.0, 100.0] {
        let count = estimator(GgsParams::new(10, lamb))
            .interior_change_points(&view)
            .expect("segmentation should succeed")
            .len();
        assert!(
            count <= previous,
            "lamb={lamb} produced {count} change points, previous {previous}"
        );
        previous = count;
    }
}

#[test]
fn larger_lamb_can_add_change_points_on_irregular_data() {
    // No level structure: lamb=3 takes one more split than lamb=1.
    let values = [-0.7, 2.7, 0.4, -1.9, 0.0, 1.1, 1.6, -2.3];
    let view = make_view(&values, 8, 1);
    let at = |lamb| {
        estimator(GgsParams::new(10, lamb))
            .find_change_points(&view)
            .expect("segmentation should succeed")
    };
    assert_eq!(at(1.0), vec![0, 3, 5, 8]);
    assert_eq!(at(3.0), vec![0, 2, 4, 6, 8]);
}

#[test]
fn f32_input_is_accepted() {
    let values: Vec<f32> = [0.0_f32, 6.0]
        .iter()
        .flat_map(|level| std::iter::repeat_n(*level, 10))
        .collect();
    let view = TimeSeriesView::from_f32(&values, 20, 1, MemoryLayout::CContiguous)
        .expect("view should be valid");
    let cps = estimator(GgsParams::new(3, 1.0))
        .find_change_points(&view)
        .expect("segmentation should succeed");
    assert_eq!(cps, vec![0, 10, 20]);
}

#[cfg(feature = "serde")]
#[test]
fn diagnostics_carry_parameter_json() {
    let values = [0.0, 0.0, 0.0, 5.0, 5.0, 5.0];
    let view = make_view(&values, 6, 1);
    let result = estimator(GgsParams::new(2, 0.5).with_random_state(3))
        .segment(&view, &ExecutionContext::new())
        .expect("segmentation should succeed");
    assert_eq!(
        result.diagnostics.params_json,
        Some(serde_json::json!({
            "k_max": 2,
            "lamb": 0.5,
            "verbose": false,
            "max_shuffles": 250,
            "random_state": 3,
        }))
    );
}

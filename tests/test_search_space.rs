//! Integration tests for data-dependent search spaces and the adaptive search

use market_regimes::error::RegimeError;
use market_regimes::optimizer::{
    AdaptiveSearchCV, SearchConfig, SearchDistribution, SearchSpaceBuilder, SearchSpacePolicy,
};
use market_regimes::regime::MixtureRegimeSelector;
use market_regimes::training::{CVStrategy, GaussianMixture};
use ndarray::{Array2, ArrayView2};

fn matrix(rows: usize, cols: usize) -> Array2<f64> {
    Array2::from_shape_fn((rows, cols), |(i, j)| ((i * 31 + j * 17) % 23) as f64 * 0.1)
}

// ============================================================================
// Bound policies
// ============================================================================

#[test]
fn test_mixture_bound_on_100_rows() {
    let dist = SearchSpacePolicy::mixture().build(matrix(100, 6).view()).unwrap();
    assert_eq!((dist.low(), dist.high()), (1, 10));
}

#[test]
fn test_decomposition_bound_limited_by_columns() {
    let dist = SearchSpacePolicy::decomposition().build(matrix(100, 6).view()).unwrap();
    assert_eq!((dist.low(), dist.high()), (1, 6));
}

#[test]
fn test_decomposition_bound_limited_by_rows() {
    let dist = SearchSpacePolicy::decomposition().build(matrix(5, 40).view()).unwrap();
    assert_eq!(dist.high(), 4);
}

#[test]
fn test_bounds_hold_across_shapes() {
    for rows in [20usize, 37, 64, 150, 1000] {
        for cols in [1usize, 3, 12, 50] {
            let x = matrix(rows, cols);
            if let Ok(d) = SearchSpacePolicy::mixture().build(x.view()) {
                assert_eq!(d.low(), 1);
                assert!(d.high() as f64 <= rows as f64 * 0.1);
            }
            if let Ok(d) = SearchSpacePolicy::decomposition().build(x.view()) {
                assert_eq!(d.low(), 1);
                assert!(d.high() as usize <= cols);
                assert!(d.high() as f64 <= rows as f64 * 0.8);
            }
        }
    }
}

#[test]
fn test_collapsed_mixture_space() {
    let err = SearchSpacePolicy::mixture().build(matrix(5, 6).view()).unwrap_err();
    assert!(matches!(err, RegimeError::InvalidSearchSpace { high: 0, .. }));

    // Exactly 10 rows gives [1, 1], which has no room to search
    let err = SearchSpacePolicy::mixture().build(matrix(10, 6).view()).unwrap_err();
    assert!(matches!(err, RegimeError::InvalidSearchSpace { high: 1, .. }));
}

#[test]
fn test_single_column_decomposition_collapses() {
    assert!(matches!(
        SearchSpacePolicy::decomposition().build(matrix(100, 1).view()),
        Err(RegimeError::InvalidSearchSpace { .. })
    ));
}

// ============================================================================
// Custom builders
// ============================================================================

#[test]
fn test_closure_builder_drives_search() {
    let fixed = |_x: ArrayView2<'_, f64>| SearchDistribution::new(2, 3);
    let x = matrix(60, 2);
    let mut search = AdaptiveSearchCV::new(
        |seed| GaussianMixture::new(1).with_random_state(seed),
        "n_components",
        fixed,
        SearchConfig::default().with_n_iter(8).with_cv(CVStrategy::folds(3)),
    );
    search.fit(x.view()).unwrap();
    let results = search.results().unwrap();
    assert!(results.iter().all(|r| r.value == 2 || r.value == 3));
    assert!(results.iter().all(|r| r.cv.n_folds == 3));
    assert!(matches!(search.best_value(), Some(2) | Some(3)));
}

#[test]
fn test_selector_fails_before_any_fit_on_five_rows() {
    let mut selector = MixtureRegimeSelector::default();
    let err = selector.fit(matrix(5, 6).view()).unwrap_err();
    assert!(matches!(err, RegimeError::InvalidSearchSpace { .. }));
    assert!(selector.best_mixture().is_none());
    assert!(selector.results().is_none());
}

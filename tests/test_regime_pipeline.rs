//! End-to-end tests for the regime stages and the pipeline runner

use chrono::{Days, NaiveDate};
use market_regimes::error::RegimeError;
use market_regimes::optimizer::SearchDistribution;
use market_regimes::pipeline::{PipelineConfig, RegimePipeline};
use market_regimes::preprocessing::PcaDecomposer;
use market_regimes::regime::{
    CenterSeededClusterer, LabelDateJoiner, MixtureRegimeSelector, RetainedIndex,
};
use market_regimes::training::CenterSource;
use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeSet;

/// Three regimes in 6 features; regime blocks of ~33 consecutive days
fn regime_matrix(rows: usize) -> Array2<f64> {
    regime_matrix_with_seed(rows, 11)
}

fn regime_matrix_with_seed(rows: usize, seed: u64) -> Array2<f64> {
    let centers = [
        [0.02, 0.01, 0.015, 0.0, 0.01, 0.02],
        [-0.03, -0.02, -0.025, -0.01, -0.02, -0.03],
        [0.0, 0.04, -0.04, 0.03, -0.03, 0.0],
    ];
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let block = rows.div_ceil(3);
    Array2::from_shape_fn((rows, 6), |(i, j)| {
        centers[i / block][j] + rng.gen_range(-0.003..0.003)
    })
}

fn trading_days(n: usize) -> RetainedIndex {
    let start = NaiveDate::from_ymd_opt(2008, 1, 2).unwrap();
    (0..n).map(|i| start + Days::new(i as u64)).collect()
}

// ============================================================================
// Stage by stage
// ============================================================================

#[test]
fn test_stages_on_100_by_6() {
    let x = regime_matrix(100);
    let index = trading_days(100);

    let mut decomposer = PcaDecomposer::default();
    let reduced = decomposer.fit_transform(x.view(), &index).unwrap();
    let retained = decomposer.retained_index().unwrap().clone();
    assert_eq!(retained.len(), 100);
    assert!((1..=6).contains(&decomposer.n_components().unwrap()));

    let mut selector = MixtureRegimeSelector::default();
    selector.fit(reduced.view()).unwrap();
    let distribution = selector.search().fitted().unwrap().distribution;
    assert_eq!(distribution, SearchDistribution::new(1, 10).unwrap());

    let centers = selector.center_set().unwrap().clone();
    assert_eq!(centers.nrows(), selector.n_regimes().unwrap());
    assert_eq!(centers.ncols(), reduced.ncols());

    let passed = selector.transform(reduced.view());
    assert_eq!(passed, reduced.view());

    let mut clusterer = CenterSeededClusterer::default();
    clusterer.fit(passed, &selector).unwrap();
    let timeline = clusterer.transform(passed, &retained).unwrap();

    assert_eq!(timeline.len(), 100);
    let distinct: BTreeSet<usize> = timeline.labels().into_iter().collect();
    assert_eq!(distinct.len(), selector.n_regimes().unwrap());
    assert!(distinct.iter().all(|&c| c < centers.nrows()));
    assert_eq!(timeline.dates(), retained.as_slice());
    assert_eq!(timeline.dates(), trading_days(100).as_slice());
}

#[test]
fn test_every_regime_is_used_across_seeds() {
    for seed in 0..6u64 {
        let x = regime_matrix_with_seed(100, seed);

        let mut selector = MixtureRegimeSelector::default();
        selector.fit(x.view()).unwrap();
        let mut clusterer = CenterSeededClusterer::default();
        clusterer.fit(x.view(), &selector).unwrap();
        let timeline = clusterer.transform(x.view(), &trading_days(100)).unwrap();

        let distinct: BTreeSet<usize> = timeline.labels().into_iter().collect();
        assert_eq!(distinct.len(), selector.n_regimes().unwrap(), "seed {}", seed);
    }
}

#[test]
fn test_failed_refit_leaves_no_stale_centers() {
    let mut selector = MixtureRegimeSelector::default();
    selector.fit(regime_matrix(100).view()).unwrap();
    assert!(selector.center_set().is_some());

    let small = regime_matrix(5);
    assert!(matches!(
        selector.fit(small.view()),
        Err(RegimeError::InvalidSearchSpace { .. })
    ));
    assert!(!selector.is_fitted());
    assert!(selector.center_set().is_none());

    let mut clusterer = CenterSeededClusterer::default();
    assert!(matches!(
        clusterer.fit(small.view(), &selector),
        Err(RegimeError::NotFittedError(_))
    ));
    assert!(!clusterer.is_fitted());
}

#[test]
fn test_clusterer_requires_fitted_selector() {
    let x = regime_matrix(60);
    let selector = MixtureRegimeSelector::default();
    let mut clusterer = CenterSeededClusterer::default();
    assert!(matches!(
        clusterer.fit(x.view(), &selector),
        Err(RegimeError::NotFittedError(_))
    ));
}

#[test]
fn test_joiner_round_trip() {
    let index = trading_days(7);
    let labels = vec![0, 0, 2, 2, 1, 0, 0];
    let (back_labels, back_index) = LabelDateJoiner::join(&labels, &index).unwrap().split();
    assert_eq!(back_labels, labels);
    assert_eq!(back_index, index);
}

// ============================================================================
// Pipeline runner
// ============================================================================

#[test]
fn test_pipeline_end_to_end() {
    let x = regime_matrix(100);
    let index = trading_days(100);
    let report = RegimePipeline::default().run(x.view(), &index).unwrap();

    assert_eq!(report.rows_in, 100);
    assert_eq!(report.rows_kept, 100);
    assert!(report.decomposition.is_some());
    assert!((1..=10).contains(&report.n_regimes));
    assert!(report.mixture_score.is_finite());
    assert!(report.timeline.iter().all(|p| p.cluster < report.n_regimes));
    assert_eq!(report.regime_counts().values().sum::<usize>(), 100);
}

#[test]
fn test_pipeline_is_deterministic() {
    let x = regime_matrix(90);
    let index = trading_days(90);
    let pipeline = RegimePipeline::new(PipelineConfig::default());
    let a = pipeline.run(x.view(), &index).unwrap();
    let b = pipeline.run(x.view(), &index).unwrap();
    assert_eq!(a.n_regimes, b.n_regimes);
    assert_eq!(a.timeline, b.timeline);
}

#[test]
fn test_pipeline_parallel_matches_serial() {
    let x = regime_matrix(90);
    let index = trading_days(90);
    let serial = RegimePipeline::default().run(x.view(), &index).unwrap();

    let mut config = PipelineConfig::default();
    config.search.n_jobs = Some(4);
    let parallel = RegimePipeline::new(config).run(x.view(), &index).unwrap();

    assert_eq!(serial.n_regimes, parallel.n_regimes);
    assert_eq!(serial.timeline, parallel.timeline);
}

#[test]
fn test_pipeline_five_rows_fails() {
    let x = regime_matrix(5);
    let index = trading_days(5);
    let pipeline = RegimePipeline::new(PipelineConfig::default().with_decompose(false));
    assert!(matches!(
        pipeline.run(x.view(), &index),
        Err(RegimeError::InvalidSearchSpace { .. })
    ));
}

#[test]
fn test_timeline_serializes_with_dates() {
    let x = regime_matrix(60);
    let index = trading_days(60);
    let report = RegimePipeline::new(PipelineConfig::default().with_decompose(false))
        .run(x.view(), &index)
        .unwrap();
    let json = serde_json::to_value(&report.timeline).unwrap();
    let first = &json.as_array().unwrap()[0];
    assert_eq!(first["date"], "2008-01-02");
    assert!(first["cluster"].is_u64());
}

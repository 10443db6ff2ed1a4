//! End-to-end regime run

use crate::error::{RegimeError, Result};
use crate::optimizer::adaptive_cv::CandidateResult;
use crate::pipeline::config::PipelineConfig;
use crate::preprocessing::decomposition::{finite_rows, PcaDecomposer};
use crate::preprocessing::returns::{QuoteRecord, ReturnsTransform};
use crate::regime::{CenterSeededClusterer, LabeledTimeline, MixtureRegimeSelector, RetainedIndex};
use chrono::NaiveDate;
use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{info, warn};

/// Outcome of the decomposition stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecompositionSummary {
    pub n_components: usize,
    pub best_score: f64,
    pub n_dropped: usize,
    pub explained_variance_ratio: Vec<f64>,
}

/// Everything a run produces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeReport<D = NaiveDate> {
    pub timeline: LabeledTimeline<D>,
    pub rows_in: usize,
    pub rows_kept: usize,
    /// `None` when decomposition is disabled
    pub decomposition: Option<DecompositionSummary>,
    pub n_regimes: usize,
    pub mixture_score: f64,
    pub mixture_candidates: Vec<CandidateResult>,
    pub kmeans_inertia: f64,
    pub kmeans_iterations: usize,
    pub elapsed_ms: u64,
}

impl<D> RegimeReport<D> {
    /// Days per regime
    pub fn regime_counts(&self) -> BTreeMap<usize, usize> {
        self.timeline.regime_counts()
    }
}

/// Decomposition → mixture selection → seeded k-means → date join.
///
/// Each run builds fresh stages; nothing is shared between runs.
#[derive(Debug, Clone, Default)]
pub struct RegimePipeline {
    config: PipelineConfig,
}

impl RegimePipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run on a feature matrix whose rows are identified by `index`
    pub fn run<D: Clone>(&self, x: ArrayView2<'_, f64>, index: &RetainedIndex<D>) -> Result<RegimeReport<D>> {
        self.config.validate()?;
        if index.len() != x.nrows() {
            return Err(RegimeError::ShapeError {
                expected: format!("{} index entries", x.nrows()),
                actual: format!("{} index entries", index.len()),
            });
        }
        let start = Instant::now();
        info!(
            rows = x.nrows(),
            cols = x.ncols(),
            decompose = self.config.decompose,
            "Starting regime pipeline"
        );

        let (features, retained, decomposition) = if self.config.decompose {
            let mut decomposer =
                PcaDecomposer::new(self.config.decomposition.clone(), self.config.search.clone());
            let projected = decomposer.fit_transform(x, index)?;
            let summary = DecompositionSummary {
                n_components: decomposer.n_components().unwrap_or(0),
                best_score: decomposer.best_score().unwrap_or(f64::NAN),
                n_dropped: decomposer.n_dropped(),
                explained_variance_ratio: decomposer
                    .pca()
                    .map(|p| p.explained_variance_ratio())
                    .unwrap_or_default(),
            };
            (projected, decomposer.retained_index()?.clone(), Some(summary))
        } else {
            let (clean, kept) = drop_non_finite(x, index)?;
            (clean, kept, None)
        };

        let mut selector =
            MixtureRegimeSelector::new(self.config.mixture.clone(), self.config.search.clone());
        selector.fit(features.view())?;
        let passed = selector.transform(features.view());

        let mut clusterer = CenterSeededClusterer::new(self.config.kmeans.clone());
        clusterer.fit(passed, &selector)?;
        let timeline = clusterer.transform(passed, &retained)?;

        let report = RegimeReport {
            rows_in: x.nrows(),
            rows_kept: timeline.len(),
            decomposition,
            n_regimes: selector.n_regimes().unwrap_or(0),
            mixture_score: selector.best_score().unwrap_or(f64::NAN),
            mixture_candidates: selector.results().map(<[_]>::to_vec).unwrap_or_default(),
            kmeans_inertia: clusterer.inertia().unwrap_or(0.0),
            kmeans_iterations: clusterer.n_iter().unwrap_or(0),
            elapsed_ms: start.elapsed().as_millis() as u64,
            timeline,
        };

        info!(
            n_regimes = report.n_regimes,
            rows_kept = report.rows_kept,
            n_transitions = report.timeline.transitions().len(),
            elapsed_ms = report.elapsed_ms,
            "Regime pipeline complete"
        );
        Ok(report)
    }

    /// Build weighted returns from raw quotes, then [`run`](Self::run)
    pub fn run_quotes(&self, records: &[QuoteRecord]) -> Result<RegimeReport> {
        let returns = ReturnsTransform::new(self.config.alpha).transform(records)?;
        self.run(returns.matrix.view(), &returns.index)
    }
}

fn drop_non_finite<D: Clone>(
    x: ArrayView2<'_, f64>,
    index: &RetainedIndex<D>,
) -> Result<(Array2<f64>, RetainedIndex<D>)> {
    let rows = finite_rows(x);
    if rows.len() < x.nrows() {
        warn!(n_dropped = x.nrows() - rows.len(), "Dropping rows with non-finite values");
    }
    if rows.is_empty() {
        return Err(RegimeError::DataError("no finite rows to cluster".to_string()));
    }
    Ok((x.select(Axis(0), &rows), index.select(&rows)?))
}

//! K-means refinement seeded with an upstream center set

use crate::error::{RegimeError, Result};
use crate::regime::joiner::{LabelDateJoiner, LabeledTimeline};
use crate::regime::{ClusterAssignment, RetainedIndex};
use crate::training::clustering::KMeans;
use crate::training::models::CenterSource;
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeededKMeansConfig {
    /// Iteration budget; exhausting it is a fit error
    pub max_iter: usize,
    /// Relative tolerance on the squared center shift
    pub tol: f64,
}

impl Default for SeededKMeansConfig {
    fn default() -> Self {
        Self {
            max_iter: 300,
            tol: 1e-4,
        }
    }
}

impl SeededKMeansConfig {
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_iter == 0 {
            return Err(RegimeError::ConfigError("k-means max_iter must be at least 1".to_string()));
        }
        if self.tol < 0.0 {
            return Err(RegimeError::ConfigError("k-means tol must be non-negative".to_string()));
        }
        Ok(())
    }
}

/// Hard assignment by a single k-means run started at the upstream centers.
///
/// The cluster count is the number of centers; nothing is searched here.
#[derive(Debug, Clone, Default)]
pub struct CenterSeededClusterer {
    config: SeededKMeansConfig,
    model: Option<KMeans>,
    assignment: Option<ClusterAssignment>,
}

impl CenterSeededClusterer {
    pub fn new(config: SeededKMeansConfig) -> Self {
        Self {
            config,
            model: None,
            assignment: None,
        }
    }

    /// Refine the centers exposed by `source` on `x`
    pub fn fit<S>(&mut self, x: ArrayView2<'_, f64>, source: &S) -> Result<&mut Self>
    where
        S: CenterSource + ?Sized,
    {
        self.model = None;
        self.assignment = None;
        self.config.validate()?;
        let centers = source.center_set().ok_or_else(|| {
            RegimeError::NotFittedError("upstream stage has no center set; fit it first".to_string())
        })?;
        if centers.nrows() == 0 {
            return Err(RegimeError::DataError("upstream center set is empty".to_string()));
        }

        let n_clusters = centers.nrows();
        let mut model = KMeans::from_centers(centers.clone())
            .with_max_iter(self.config.max_iter)
            .with_tol(self.config.tol);
        model.fit(x)?;

        if !model.converged {
            return Err(RegimeError::ClusterFitError {
                iterations: model.n_iter,
                shift: model.last_shift,
            });
        }

        let labels = model.labels.clone().ok_or_else(|| {
            RegimeError::TrainingError("k-means produced no labels".to_string())
        })?;
        let assignment = ClusterAssignment::new(labels, n_clusters)?;

        info!(
            n_clusters,
            n_distinct = assignment.n_distinct(),
            n_iter = model.n_iter,
            inertia = model.inertia.unwrap_or(0.0),
            "Seeded k-means refinement complete"
        );

        self.model = Some(model);
        self.assignment = Some(assignment);
        Ok(self)
    }

    /// Join the fitted labels with `index`.
    ///
    /// This is the terminal stage, so unlike the intermediate stages it does
    /// not return `x`; `x` must be the matrix the labels were fit on.
    pub fn transform<D: Clone>(
        &self,
        x: ArrayView2<'_, f64>,
        index: &RetainedIndex<D>,
    ) -> Result<LabeledTimeline<D>> {
        let assignment = self.assignment.as_ref().ok_or_else(|| {
            RegimeError::NotFittedError("CenterSeededClusterer".to_string())
        })?;
        if x.nrows() != assignment.len() {
            return Err(RegimeError::ShapeError {
                expected: format!("{} rows", assignment.len()),
                actual: format!("{} rows", x.nrows()),
            });
        }
        LabelDateJoiner::join(assignment.labels(), index)
    }

    pub fn is_fitted(&self) -> bool {
        self.assignment.is_some()
    }

    pub fn assignment(&self) -> Option<&ClusterAssignment> {
        self.assignment.as_ref()
    }

    pub fn n_clusters(&self) -> Option<usize> {
        self.assignment.as_ref().map(|a| a.n_clusters())
    }

    /// Refined centers
    pub fn centroids(&self) -> Option<&Array2<f64>> {
        self.model.as_ref().and_then(|m| m.centroids())
    }

    pub fn inertia(&self) -> Option<f64> {
        self.model.as_ref().and_then(|m| m.inertia)
    }

    pub fn n_iter(&self) -> Option<usize> {
        self.model.as_ref().map(|m| m.n_iter)
    }
}

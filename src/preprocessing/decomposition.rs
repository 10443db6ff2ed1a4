//! Principal component decomposition with a cross-validated component count
//!
//! [`Pca`] extracts the leading eigenvectors of the covariance matrix by
//! power iteration with deflation and scores held-out rows with the
//! probabilistic-PCA log-likelihood, so the number of components can be
//! chosen by [`AdaptiveSearchCV`]. [`PcaDecomposer`] wraps that search as a
//! pipeline stage and records which sample identifiers survive it.

use crate::error::{RegimeError, Result};
use crate::optimizer::adaptive_cv::{AdaptiveSearchCV, CandidateResult, SearchConfig};
use crate::optimizer::search_space::{SearchSpacePolicy, DEFAULT_TRAINING_FRACTION};
use crate::regime::RetainedIndex;
use crate::training::models::Estimator;
use chrono::NaiveDate;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::{info, warn};

/// Floor applied to eigenvalues and the noise variance before taking logs
const VARIANCE_FLOOR: f64 = 1e-12;

/// Principal component analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pca {
    pub n_components: usize,
    /// Divide each feature by its standard deviation after centering
    pub scale: bool,
    /// Power iteration budget per component
    pub max_iter: usize,
    pub tol: f64,
    pub random_state: Option<u64>,
    mean: Option<Array1<f64>>,
    std: Option<Array1<f64>>,
    /// Unit eigenvectors (n_components × n_features)
    components: Option<Array2<f64>>,
    explained_variance: Vec<f64>,
    total_variance: f64,
    noise_variance: f64,
}

impl Default for Pca {
    fn default() -> Self {
        Self::new(2)
    }
}

impl Pca {
    pub fn new(n_components: usize) -> Self {
        Self {
            n_components,
            scale: false,
            max_iter: 500,
            tol: 1e-9,
            random_state: Some(42),
            mean: None,
            std: None,
            components: None,
            explained_variance: Vec::new(),
            total_variance: 0.0,
            noise_variance: 0.0,
        }
    }

    pub fn with_scale(mut self, scale: bool) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    pub fn with_random_state(mut self, seed: Option<u64>) -> Self {
        self.random_state = seed;
        self
    }

    pub fn is_fitted(&self) -> bool {
        self.components.is_some()
    }

    pub fn components(&self) -> Option<&Array2<f64>> {
        self.components.as_ref()
    }

    /// Variance captured by each retained component
    pub fn explained_variance(&self) -> &[f64] {
        &self.explained_variance
    }

    pub fn explained_variance_ratio(&self) -> Vec<f64> {
        let total = self.total_variance.max(VARIANCE_FLOOR);
        self.explained_variance.iter().map(|v| (v / total).max(0.0)).collect()
    }

    /// Mean variance of the discarded directions
    pub fn noise_variance(&self) -> f64 {
        self.noise_variance
    }

    pub fn fit(&mut self, x: ArrayView2<'_, f64>) -> Result<&mut Self> {
        let (n_samples, n_features) = x.dim();
        if n_samples < 2 {
            return Err(RegimeError::DataError("PCA requires at least 2 samples".to_string()));
        }
        if n_features == 0 {
            return Err(RegimeError::DataError("PCA requires at least 1 feature".to_string()));
        }
        let k = self.n_components;
        if k == 0 || k > n_features.min(n_samples) {
            return Err(RegimeError::InvalidParameter {
                name: "n_components".to_string(),
                value: k.to_string(),
                reason: format!(
                    "must be in [1, {}] for a {}x{} input",
                    n_features.min(n_samples),
                    n_samples,
                    n_features
                ),
            });
        }

        let mean = x
            .mean_axis(Axis(0))
            .ok_or_else(|| RegimeError::DataError("cannot average an empty matrix".to_string()))?;
        let std = if self.scale {
            x.std_axis(Axis(0), 1.0).mapv(|s| s.max(VARIANCE_FLOOR))
        } else {
            Array1::ones(n_features)
        };
        let standardized = (&x - &mean) / &std;
        let cov = standardized.t().dot(&standardized) / (n_samples as f64 - 1.0);
        let total_variance = cov.diag().sum();

        let (eigenvalues, components) = self.power_iteration(&cov, k);
        let noise_variance = if k < n_features {
            ((total_variance - eigenvalues.iter().sum::<f64>()) / (n_features - k) as f64).max(0.0)
        } else {
            0.0
        };

        self.mean = Some(mean);
        self.std = Some(std);
        self.components = Some(components);
        self.explained_variance = eigenvalues;
        self.total_variance = total_variance;
        self.noise_variance = noise_variance;
        Ok(self)
    }

    /// Leading `k` eigenpairs of a symmetric matrix, largest first
    fn power_iteration(&self, cov: &Array2<f64>, k: usize) -> (Vec<f64>, Array2<f64>) {
        let d = cov.nrows();
        let mut rng = match self.random_state {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        let mut work = cov.clone();
        let mut eigenvalues = Vec::with_capacity(k);
        let mut components = Array2::zeros((k, d));

        for c in 0..k {
            let mut v: Array1<f64> = (0..d).map(|_| rng.gen_range(-1.0..1.0)).collect();
            let norm = v.dot(&v).sqrt().max(VARIANCE_FLOOR);
            v /= norm;

            let mut eigenvalue = 0.0;
            for _ in 0..self.max_iter {
                let w = work.dot(&v);
                eigenvalue = v.dot(&w);
                let w_norm = w.dot(&w).sqrt();
                // Remaining spectrum is numerically zero
                if w_norm < VARIANCE_FLOOR {
                    break;
                }
                let next = w / w_norm;
                let diff = (&next - &v).mapv(|e| e * e).sum().sqrt();
                v = next;
                if diff < self.tol {
                    break;
                }
            }

            let eigenvalue = eigenvalue.max(0.0);
            for i in 0..d {
                for j in 0..d {
                    work[[i, j]] -= eigenvalue * v[i] * v[j];
                }
            }
            components.row_mut(c).assign(&v);
            eigenvalues.push(eigenvalue);
        }

        (eigenvalues, components)
    }

    fn fitted_parts(&self) -> Result<(&Array1<f64>, &Array1<f64>, &Array2<f64>)> {
        match (&self.mean, &self.std, &self.components) {
            (Some(mean), Some(std), Some(components)) => Ok((mean, std, components)),
            _ => Err(RegimeError::NotFittedError("Pca".to_string())),
        }
    }

    fn standardize(&self, x: ArrayView2<'_, f64>) -> Result<(Array2<f64>, &Array2<f64>)> {
        let (mean, std, components) = self.fitted_parts()?;
        if x.ncols() != mean.len() {
            return Err(RegimeError::ShapeError {
                expected: format!("{} features", mean.len()),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(((&x - mean) / std, components))
    }

    /// Project rows onto the retained components (n_samples × n_components)
    pub fn transform(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        let (standardized, components) = self.standardize(x)?;
        Ok(standardized.dot(&components.t()))
    }

    pub fn fit_transform(&mut self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        self.fit(x)?;
        self.transform(x)
    }

    /// Per-row log-likelihood under the probabilistic PCA model
    ///
    /// The model covariance is `W diag(λ) Wᵀ + σ² (I - W Wᵀ)`, so both its
    /// inverse and log-determinant follow from the eigenpairs directly.
    pub fn score_samples(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        let (standardized, components) = self.standardize(x)?;
        let (k, d) = components.dim();
        let noise = self.noise_variance.max(VARIANCE_FLOOR);
        let lambdas: Vec<f64> = self
            .explained_variance
            .iter()
            .map(|&l| l.max(VARIANCE_FLOOR))
            .collect();

        let mut log_det: f64 = lambdas.iter().map(|l| l.ln()).sum();
        if k < d {
            log_det += (d - k) as f64 * noise.ln();
        }
        // Jacobian of the per-feature scaling
        let scale_log_det: f64 = match &self.std {
            Some(std) if self.scale => std.iter().map(|s| s.ln()).sum(),
            _ => 0.0,
        };
        let constant = d as f64 * (2.0 * PI).ln() + log_det;

        let projected = standardized.dot(&components.t());
        let scores = standardized
            .outer_iter()
            .zip(projected.outer_iter())
            .map(|(row, proj)| {
                let explained: f64 = proj.iter().zip(&lambdas).map(|(p, l)| p * p / l).sum();
                let residual = if k < d {
                    (row.dot(&row) - proj.dot(&proj)).max(0.0) / noise
                } else {
                    0.0
                };
                -0.5 * (explained + residual + constant) - scale_log_det
            })
            .collect();
        Ok(scores)
    }

    /// Mean held-out log-likelihood
    pub fn score(&self, x: ArrayView2<'_, f64>) -> Result<f64> {
        let scores = self.score_samples(x)?;
        scores
            .mean()
            .ok_or_else(|| RegimeError::DataError("cannot score an empty matrix".to_string()))
    }
}

impl Estimator for Pca {
    fn set_param(&mut self, name: &str, value: usize) -> Result<()> {
        match name {
            "n_components" => self.n_components = value,
            "max_iter" => self.max_iter = value,
            _ => {
                return Err(RegimeError::InvalidParameter {
                    name: name.to_string(),
                    value: value.to_string(),
                    reason: "not an integer parameter of Pca".to_string(),
                })
            }
        }
        Ok(())
    }

    fn fit(&mut self, x: ArrayView2<'_, f64>) -> Result<()> {
        Pca::fit(self, x).map(|_| ())
    }

    fn score(&self, x: ArrayView2<'_, f64>) -> Result<f64> {
        Pca::score(self, x)
    }
}

/// Decomposition stage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecompositionConfig {
    /// Fraction of rows that bounds the component count
    pub proportion: f64,
    pub scale: bool,
    pub max_iter: usize,
    pub tol: f64,
}

impl Default for DecompositionConfig {
    fn default() -> Self {
        Self {
            proportion: DEFAULT_TRAINING_FRACTION,
            scale: false,
            max_iter: 500,
            tol: 1e-9,
        }
    }
}

impl DecompositionConfig {
    pub fn with_proportion(mut self, proportion: f64) -> Self {
        self.proportion = proportion;
        self
    }

    pub fn with_scale(mut self, scale: bool) -> Self {
        self.scale = scale;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.proportion > 0.0 && self.proportion <= 1.0) {
            return Err(RegimeError::ConfigError(format!(
                "decomposition proportion must be in (0, 1], got {}",
                self.proportion
            )));
        }
        if self.max_iter == 0 {
            return Err(RegimeError::ConfigError(
                "decomposition max_iter must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// PCA stage whose component count is chosen by adaptive cross-validation.
///
/// Rows holding any non-finite value are dropped before fitting; the
/// identifiers of the surviving rows are exposed through
/// [`retained_index`](Self::retained_index).
#[derive(Debug)]
pub struct PcaDecomposer<D = NaiveDate> {
    search: AdaptiveSearchCV<Pca, SearchSpacePolicy>,
    retained: Option<RetainedIndex<D>>,
    n_dropped: usize,
}

impl<D: Clone> PcaDecomposer<D> {
    pub fn new(config: DecompositionConfig, search: SearchConfig) -> Self {
        let policy = SearchSpacePolicy::DecompositionBound {
            proportion: config.proportion,
        };
        let factory = move |seed: Option<u64>| {
            Pca::new(1)
                .with_scale(config.scale)
                .with_max_iter(config.max_iter)
                .with_tol(config.tol)
                .with_random_state(seed)
        };
        Self {
            search: AdaptiveSearchCV::new(factory, "n_components", policy, search),
            retained: None,
            n_dropped: 0,
        }
    }

    /// Fit on the finite rows of `x`; `index` holds one identifier per row
    pub fn fit(&mut self, x: ArrayView2<'_, f64>, index: &RetainedIndex<D>) -> Result<&mut Self> {
        self.retained = None;
        self.n_dropped = 0;
        self.search.reset();
        if index.len() != x.nrows() {
            return Err(RegimeError::ShapeError {
                expected: format!("{} index entries", x.nrows()),
                actual: format!("{} index entries", index.len()),
            });
        }

        let rows = finite_rows(x);
        let n_dropped = x.nrows() - rows.len();
        if n_dropped > 0 {
            warn!(n_dropped, "Dropping rows with non-finite values");
        }
        if rows.is_empty() {
            return Err(RegimeError::DataError("no finite rows to decompose".to_string()));
        }

        let clean = x.select(Axis(0), &rows);
        self.search.fit(clean.view())?;
        self.retained = Some(index.select(&rows)?);
        self.n_dropped = n_dropped;

        info!(
            n_components = self.search.best_value().unwrap_or(0),
            rows_kept = rows.len(),
            n_dropped,
            "Decomposition fitted"
        );
        Ok(self)
    }

    /// Drop non-finite rows of `x` and project the rest
    pub fn transform(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        let pca = self
            .search
            .best_estimator()
            .ok_or_else(|| RegimeError::NotFittedError("PcaDecomposer".to_string()))?;
        let rows = finite_rows(x);
        pca.transform(x.select(Axis(0), &rows).view())
    }

    pub fn fit_transform(&mut self, x: ArrayView2<'_, f64>, index: &RetainedIndex<D>) -> Result<Array2<f64>> {
        self.fit(x, index)?;
        self.transform(x)
    }

    /// Identifiers of the rows that survived the last fit, in row order
    pub fn retained_index(&self) -> Result<&RetainedIndex<D>> {
        self.retained
            .as_ref()
            .ok_or_else(|| RegimeError::NotFittedError("PcaDecomposer".to_string()))
    }

    pub fn n_components(&self) -> Option<usize> {
        self.search.best_value()
    }

    pub fn n_dropped(&self) -> usize {
        self.n_dropped
    }

    pub fn best_score(&self) -> Option<f64> {
        self.search.best_score()
    }

    pub fn pca(&self) -> Option<&Pca> {
        self.search.best_estimator()
    }

    pub fn results(&self) -> Option<&[CandidateResult]> {
        self.search.results()
    }
}

impl<D: Clone> Default for PcaDecomposer<D> {
    fn default() -> Self {
        Self::new(DecompositionConfig::default(), SearchConfig::default())
    }
}

/// Positions of rows whose values are all finite
pub(crate) fn finite_rows(x: ArrayView2<'_, f64>) -> Vec<usize> {
    x.outer_iter()
        .enumerate()
        .filter(|(_, row)| row.iter().all(|v| v.is_finite()))
        .map(|(i, _)| i)
        .collect()
}

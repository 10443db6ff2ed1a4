//! Gaussian mixture model with diagonal covariances
//!
//! Fit by expectation–maximization. Responsibilities are initialized from a
//! seeded k-means run; each component's mean vector is exposed as a center
//! for downstream refinement.

use crate::error::{RegimeError, Result};
use crate::training::clustering::KMeans;
use crate::training::models::Estimator;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::{debug, warn};

/// Gaussian mixture with one diagonal covariance per component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianMixture {
    pub n_components: usize,
    pub max_iter: usize,
    /// Convergence threshold on the change of the mean log-likelihood
    pub tol: f64,
    /// Non-negative regularization added to every variance
    pub reg_covar: f64,
    /// Number of initializations; the best lower bound wins
    pub n_init: usize,
    pub random_state: Option<u64>,
    weights: Option<Array1<f64>>,
    means: Option<Array2<f64>>,
    /// Per-component variances (n_components × n_features)
    covariances: Option<Array2<f64>>,
    pub converged: bool,
    pub n_iter: usize,
    /// Mean log-likelihood of the training data at the end of fit
    pub lower_bound: f64,
}

impl Default for GaussianMixture {
    fn default() -> Self {
        Self::new(1)
    }
}

impl GaussianMixture {
    pub fn new(n_components: usize) -> Self {
        Self {
            n_components,
            max_iter: 100,
            tol: 1e-3,
            reg_covar: 1e-6,
            n_init: 1,
            random_state: None,
            weights: None,
            means: None,
            covariances: None,
            converged: false,
            n_iter: 0,
            lower_bound: f64::NEG_INFINITY,
        }
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    pub fn with_reg_covar(mut self, reg_covar: f64) -> Self {
        self.reg_covar = reg_covar;
        self
    }

    pub fn with_n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init.max(1);
        self
    }

    pub fn with_random_state(mut self, seed: Option<u64>) -> Self {
        self.random_state = seed;
        self
    }

    pub fn is_fitted(&self) -> bool {
        self.means.is_some()
    }

    pub fn weights(&self) -> Option<&Array1<f64>> {
        self.weights.as_ref()
    }

    pub fn means(&self) -> Option<&Array2<f64>> {
        self.means.as_ref()
    }

    pub fn covariances(&self) -> Option<&Array2<f64>> {
        self.covariances.as_ref()
    }

    /// Fit the mixture on the rows of `x`
    pub fn fit(&mut self, x: ArrayView2<'_, f64>) -> Result<&mut Self> {
        let (n_samples, n_features) = x.dim();
        if self.n_components == 0 {
            return Err(RegimeError::InvalidParameter {
                name: "n_components".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if n_samples < self.n_components {
            return Err(RegimeError::TrainingError(format!(
                "n_samples ({}) < n_components ({})",
                n_samples, self.n_components
            )));
        }
        if n_features == 0 {
            return Err(RegimeError::DataError("input has no features".to_string()));
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(RegimeError::DataError("input contains non-finite values".to_string()));
        }

        let mut best: Option<(Params, bool, usize, f64)> = None;

        for init in 0..self.n_init.max(1) {
            let seed = self.random_state.unwrap_or(0).wrapping_add(init as u64);
            let resp = self.initial_responsibilities(&x, seed)?;
            let mut params = m_step(&x, &resp, self.reg_covar);

            let mut lower_bound = f64::NEG_INFINITY;
            let mut converged = false;
            let mut n_iter = 0;

            for iter in 0..self.max_iter {
                n_iter = iter + 1;
                let prev = lower_bound;
                let (log_norm, log_resp) = e_step(&x, &params);
                lower_bound = log_norm;
                params = m_step(&x, &log_resp.mapv(f64::exp), self.reg_covar);

                if (lower_bound - prev).abs() < self.tol {
                    converged = true;
                    break;
                }
            }

            if !converged {
                warn!(
                    n_components = self.n_components,
                    init,
                    max_iter = self.max_iter,
                    "Gaussian mixture did not converge; consider raising max_iter or tol"
                );
            }

            let better = best
                .as_ref()
                .map(|(_, _, _, lb)| lower_bound > *lb)
                .unwrap_or(true);
            if better {
                best = Some((params, converged, n_iter, lower_bound));
            }
        }

        let (params, converged, n_iter, _) = best.ok_or_else(|| {
            RegimeError::TrainingError("no initialization was run".to_string())
        })?;

        // Final E-step so the reported likelihood matches the stored parameters
        let (lower_bound, _) = e_step(&x, &params);
        debug!(
            n_components = self.n_components,
            n_iter,
            converged,
            lower_bound,
            "Gaussian mixture fitted"
        );

        self.weights = Some(params.weights);
        self.means = Some(params.means);
        self.covariances = Some(params.covariances);
        self.converged = converged;
        self.n_iter = n_iter;
        self.lower_bound = lower_bound;
        Ok(self)
    }

    fn initial_responsibilities(&self, x: &ArrayView2<f64>, seed: u64) -> Result<Array2<f64>> {
        let mut kmeans = KMeans::new(self.n_components).with_random_state(seed);
        kmeans.fit(x.view())?;
        let labels = kmeans
            .labels
            .as_ref()
            .ok_or_else(|| RegimeError::TrainingError("k-means init produced no labels".to_string()))?;

        let mut resp = Array2::zeros((x.nrows(), self.n_components));
        for (i, &label) in labels.iter().enumerate() {
            resp[[i, label]] = 1.0;
        }
        Ok(resp)
    }

    fn params(&self) -> Result<Params> {
        match (&self.weights, &self.means, &self.covariances) {
            (Some(weights), Some(means), Some(covariances)) => Ok(Params {
                weights: weights.clone(),
                means: means.clone(),
                covariances: covariances.clone(),
            }),
            _ => Err(RegimeError::NotFittedError("GaussianMixture".to_string())),
        }
    }

    fn check_features(&self, x: &ArrayView2<f64>) -> Result<Params> {
        let params = self.params()?;
        if params.means.ncols() != x.ncols() {
            return Err(RegimeError::ShapeError {
                expected: format!("{} features", params.means.ncols()),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(params)
    }

    /// Per-sample log-likelihood under the fitted mixture
    pub fn score_samples(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        let params = self.check_features(&x)?;
        let weighted = weighted_log_prob(&x, &params);
        Ok(weighted
            .axis_iter(Axis(0))
            .map(|row| log_sum_exp(row.iter().copied()))
            .collect())
    }

    /// Mean per-sample log-likelihood
    pub fn score(&self, x: ArrayView2<'_, f64>) -> Result<f64> {
        if x.nrows() == 0 {
            return Err(RegimeError::DataError("cannot score an empty matrix".to_string()));
        }
        let samples = self.score_samples(x)?;
        Ok(samples.sum() / samples.len() as f64)
    }

    /// Posterior component probabilities (n_samples × n_components)
    pub fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        let params = self.check_features(&x)?;
        let (_, log_resp) = e_step(&x, &params);
        Ok(log_resp.mapv(f64::exp))
    }

    /// Most probable component per row
    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Vec<usize>> {
        let params = self.check_features(&x)?;
        let weighted = weighted_log_prob(&x, &params);
        Ok(weighted
            .axis_iter(Axis(0))
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |best, (k, &v)| if v > best.1 { (k, v) } else { best })
                    .0
            })
            .collect())
    }

    /// Number of free parameters of the fitted model
    pub fn n_parameters(&self) -> Result<usize> {
        let params = self.params()?;
        let (k, d) = params.means.dim();
        Ok(2 * k * d + k - 1)
    }

    /// Bayesian information criterion on `x` (lower is better)
    pub fn bic(&self, x: ArrayView2<'_, f64>) -> Result<f64> {
        let n = x.nrows() as f64;
        let total = self.score(x)? * n;
        Ok(-2.0 * total + self.n_parameters()? as f64 * n.ln())
    }

    /// Akaike information criterion on `x` (lower is better)
    pub fn aic(&self, x: ArrayView2<'_, f64>) -> Result<f64> {
        let n = x.nrows() as f64;
        let total = self.score(x)? * n;
        Ok(-2.0 * total + 2.0 * self.n_parameters()? as f64)
    }
}

impl Estimator for GaussianMixture {
    fn set_param(&mut self, name: &str, value: usize) -> Result<()> {
        match name {
            "n_components" => self.n_components = value,
            "max_iter" => self.max_iter = value,
            "n_init" => self.n_init = value.max(1),
            _ => {
                return Err(RegimeError::InvalidParameter {
                    name: name.to_string(),
                    value: value.to_string(),
                    reason: "not a GaussianMixture integer parameter".to_string(),
                })
            }
        }
        Ok(())
    }

    fn fit(&mut self, x: ArrayView2<'_, f64>) -> Result<()> {
        GaussianMixture::fit(self, x).map(|_| ())
    }

    fn score(&self, x: ArrayView2<'_, f64>) -> Result<f64> {
        GaussianMixture::score(self, x)
    }

    fn centers(&self) -> Option<&Array2<f64>> {
        self.means.as_ref()
    }
}

#[derive(Debug, Clone)]
struct Params {
    weights: Array1<f64>,
    means: Array2<f64>,
    covariances: Array2<f64>,
}

/// Estimate weights, means and diagonal variances from responsibilities
fn m_step(x: &ArrayView2<f64>, resp: &Array2<f64>, reg_covar: f64) -> Params {
    let n_samples = x.nrows() as f64;
    let nk = resp.sum_axis(Axis(0)).mapv(|v| v + 10.0 * f64::EPSILON);

    let weighted_sum = resp.t().dot(x);
    let weighted_sq = resp.t().dot(&x.mapv(|v| v * v));

    let nk_col = nk.view().insert_axis(Axis(1));
    let means = &weighted_sum / &nk_col;
    let covariances = (&weighted_sq / &nk_col - means.mapv(|m| m * m))
        .mapv(|v| v.max(0.0) + reg_covar);

    Params {
        weights: nk / n_samples,
        means,
        covariances,
    }
}

/// log(weight_k) + log N(x_i | mean_k, diag(var_k)) for every (i, k)
fn weighted_log_prob(x: &ArrayView2<f64>, params: &Params) -> Array2<f64> {
    let (n_samples, n_features) = x.dim();
    let k = params.means.nrows();
    let log_2pi = n_features as f64 * (2.0 * PI).ln();
    let log_det: Vec<f64> = params
        .covariances
        .axis_iter(Axis(0))
        .map(|var| var.iter().map(|v| v.ln()).sum())
        .collect();
    let log_weights: Vec<f64> = params.weights.iter().map(|w| w.ln()).collect();

    let rows: Vec<f64> = (0..n_samples)
        .into_par_iter()
        .flat_map_iter(|i| {
            let row = x.row(i);
            let log_det = &log_det;
            let log_weights = &log_weights;
            (0..k).map(move |c| {
                let mahal: f64 = row
                    .iter()
                    .zip(params.means.row(c).iter())
                    .zip(params.covariances.row(c).iter())
                    .map(|((xv, m), var)| (xv - m).powi(2) / var)
                    .sum();
                -0.5 * (log_2pi + log_det[c] + mahal) + log_weights[c]
            })
        })
        .collect();

    Array2::from_shape_vec((n_samples, k), rows)
        .unwrap_or_else(|_| Array2::from_elem((n_samples, k), f64::NEG_INFINITY))
}

/// Mean log-likelihood and log-responsibilities
fn e_step(x: &ArrayView2<f64>, params: &Params) -> (f64, Array2<f64>) {
    let mut weighted = weighted_log_prob(x, params);
    let mut total = 0.0;
    for mut row in weighted.axis_iter_mut(Axis(0)) {
        let norm = log_sum_exp(row.iter().copied());
        total += norm;
        row.mapv_inplace(|v| v - norm);
    }
    (total / x.nrows() as f64, weighted)
}

fn log_sum_exp(values: impl Iterator<Item = f64> + Clone) -> f64 {
    let max = values.clone().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values.map(|v| (v - max).exp()).sum::<f64>().ln()
}

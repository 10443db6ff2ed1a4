//! Cross-validated choice of the mixture component count

use crate::error::{RegimeError, Result};
use crate::optimizer::adaptive_cv::{AdaptiveSearchCV, CandidateResult, SearchConfig};
use crate::optimizer::search_space::{SearchSpacePolicy, DEFAULT_MIXTURE_PROPORTION};
use crate::regime::CenterSet;
use crate::training::mixture::GaussianMixture;
use crate::training::models::CenterSource;
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

/// Mixture estimator settings and the component-count bound
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MixtureConfig {
    /// Upper bound on components as a fraction of rows
    pub proportion: f64,
    pub max_iter: usize,
    pub tol: f64,
    pub reg_covar: f64,
    pub n_init: usize,
}

impl Default for MixtureConfig {
    fn default() -> Self {
        Self {
            proportion: DEFAULT_MIXTURE_PROPORTION,
            max_iter: 100,
            tol: 1e-3,
            reg_covar: 1e-6,
            n_init: 1,
        }
    }
}

impl MixtureConfig {
    pub fn with_proportion(mut self, proportion: f64) -> Self {
        self.proportion = proportion;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.proportion > 0.0 && self.proportion <= 1.0) {
            return Err(RegimeError::ConfigError(format!(
                "mixture proportion must be in (0, 1], got {}",
                self.proportion
            )));
        }
        if self.max_iter == 0 {
            return Err(RegimeError::ConfigError("mixture max_iter must be at least 1".to_string()));
        }
        if self.reg_covar < 0.0 {
            return Err(RegimeError::ConfigError("reg_covar must be non-negative".to_string()));
        }
        Ok(())
    }
}

/// Adaptive search over `n_components` of a [`GaussianMixture`], bounded by
/// `floor(rows * proportion)`. The winning mixture's means become the center set.
#[derive(Debug)]
pub struct MixtureRegimeSelector {
    search: AdaptiveSearchCV<GaussianMixture, SearchSpacePolicy>,
}

impl MixtureRegimeSelector {
    pub fn new(mixture: MixtureConfig, search: SearchConfig) -> Self {
        let policy = SearchSpacePolicy::MixtureBound {
            proportion: mixture.proportion,
        };
        let factory = move |seed: Option<u64>| {
            GaussianMixture::new(1)
                .with_max_iter(mixture.max_iter)
                .with_tol(mixture.tol)
                .with_reg_covar(mixture.reg_covar)
                .with_n_init(mixture.n_init)
                .with_random_state(seed)
        };
        Self {
            search: AdaptiveSearchCV::new(factory, "n_components", policy, search),
        }
    }

    pub fn fit(&mut self, x: ArrayView2<'_, f64>) -> Result<&mut Self> {
        self.search.fit(x)?;
        Ok(self)
    }

    /// Identity pass-through; see [`AdaptiveSearchCV::transform`]
    pub fn transform<'a>(&self, x: ArrayView2<'a, f64>) -> ArrayView2<'a, f64> {
        self.search.transform(x)
    }

    /// Chosen component count
    pub fn is_fitted(&self) -> bool {
        self.search.is_fitted()
    }

    pub fn n_regimes(&self) -> Option<usize> {
        self.search.best_value()
    }

    pub fn best_score(&self) -> Option<f64> {
        self.search.best_score()
    }

    pub fn best_mixture(&self) -> Option<&GaussianMixture> {
        self.search.best_estimator()
    }

    pub fn centers(&self) -> Option<&CenterSet> {
        self.search.center_set()
    }

    pub fn results(&self) -> Option<&[CandidateResult]> {
        self.search.results()
    }

    pub fn search(&self) -> &AdaptiveSearchCV<GaussianMixture, SearchSpacePolicy> {
        &self.search
    }
}

impl Default for MixtureRegimeSelector {
    fn default() -> Self {
        Self::new(MixtureConfig::default(), SearchConfig::default())
    }
}

impl CenterSource for MixtureRegimeSelector {
    fn center_set(&self) -> Option<&Array2<f64>> {
        self.search.center_set()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    /// Three tight blobs in 2-D, rows interleaved so every fold sees all three
    fn blobs(n: usize) -> Array2<f64> {
        let centers = [[0.0, 0.0], [6.0, 6.0], [-6.0, 6.0]];
        Array2::from_shape_fn((n, 2), |(i, j)| {
            let c = centers[i % 3][j];
            let jitter = (((i * 7 + j * 13) % 11) as f64 - 5.0) * 0.05;
            c + jitter
        })
    }

    #[test]
    fn test_selector_exposes_centers() {
        let x = blobs(60);
        let mut selector = MixtureRegimeSelector::default();
        selector.fit(x.view()).unwrap();
        let k = selector.n_regimes().unwrap();
        assert!((1..=6).contains(&k));
        let centers = selector.centers().unwrap();
        assert_eq!(centers.dim(), (k, 2));
    }

    #[test]
    fn test_selector_is_deterministic() {
        let x = blobs(90);
        let mut a = MixtureRegimeSelector::default();
        let mut b = MixtureRegimeSelector::default();
        a.fit(x.view()).unwrap();
        b.fit(x.view()).unwrap();
        assert_eq!(a.n_regimes(), b.n_regimes());
        let (ca, cb) = (a.centers().unwrap(), b.centers().unwrap());
        for (u, v) in ca.iter().zip(cb.iter()) {
            assert!((u - v).abs() < 1e-9);
        }
    }

    #[test]
    fn test_selector_too_few_rows() {
        let x = blobs(5);
        let mut selector = MixtureRegimeSelector::default();
        assert!(matches!(
            selector.fit(x.view()),
            Err(RegimeError::InvalidSearchSpace { .. })
        ));
        assert!(selector.centers().is_none());
    }

    #[test]
    fn test_failed_refit_clears_previous_fit() {
        let mut selector = MixtureRegimeSelector::default();
        selector.fit(blobs(90).view()).unwrap();
        assert!(selector.is_fitted());

        assert!(selector.fit(blobs(5).view()).is_err());
        assert!(!selector.is_fitted());
        assert!(selector.n_regimes().is_none());
        assert!(selector.center_set().is_none());
        assert!(selector.results().is_none());
    }

    #[test]
    fn test_selector_transform_passes_through() {
        let x = blobs(30);
        let selector = MixtureRegimeSelector::default();
        assert_eq!(selector.transform(x.view()), x.view());
    }

    #[test]
    fn test_mixture_config_validation() {
        assert!(MixtureConfig::default().validate().is_ok());
        assert!(MixtureConfig::default().with_proportion(0.0).validate().is_err());
        assert!(MixtureConfig::default().with_max_iter(0).validate().is_err());
    }
}

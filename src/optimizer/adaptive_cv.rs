//! Cross-validated randomized search over one integer hyperparameter whose
//! candidate range is derived from the matrix being fit.
//!
//! The search distribution is not fixed at construction: every call to
//! [`AdaptiveSearchCV::fit`] asks its [`SearchSpaceBuilder`] for a fresh range
//! based on the current input, so a stage that follows a decomposition adapts
//! to the reduced shape. Candidate × fold fits run on a dedicated rayon pool;
//! each task reads its own row slices and returns its own score.

use crate::error::{RegimeError, Result};
use crate::optimizer::search_space::{SearchDistribution, SearchSpaceBuilder};
use crate::training::cross_validation::{CVResults, CVSplit, CVStrategy, CrossValidator};
use crate::training::models::{CenterSource, Estimator};
use ndarray::{Array2, ArrayView2, Axis};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::{debug, info};

/// Search settings shared by every adaptive stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Number of candidate values drawn from the distribution
    pub n_iter: usize,
    /// Fold strategy
    pub cv: CVStrategy,
    /// Worker threads for candidate × fold fits (None = 1, Some(0) = all cores)
    pub n_jobs: Option<usize>,
    /// Seed for candidate sampling and fold shuffling
    pub cv_random_state: Option<u64>,
    /// Seed handed to every estimator the search builds
    pub estimator_random_state: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            n_iter: 10,
            cv: CVStrategy::default(),
            n_jobs: None,
            cv_random_state: Some(0),
            estimator_random_state: Some(0),
        }
    }
}

impl SearchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_n_iter(mut self, n_iter: usize) -> Self {
        self.n_iter = n_iter;
        self
    }

    pub fn with_cv(mut self, cv: CVStrategy) -> Self {
        self.cv = cv;
        self
    }

    pub fn with_n_jobs(mut self, n_jobs: usize) -> Self {
        self.n_jobs = Some(n_jobs);
        self
    }

    pub fn with_cv_random_state(mut self, seed: u64) -> Self {
        self.cv_random_state = Some(seed);
        self
    }

    pub fn with_estimator_random_state(mut self, seed: u64) -> Self {
        self.estimator_random_state = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_iter == 0 {
            return Err(RegimeError::ConfigError("n_iter must be at least 1".to_string()));
        }
        Ok(())
    }

    fn num_threads(&self) -> usize {
        match self.n_jobs {
            None => 1,
            Some(0) => rayon::current_num_threads(),
            Some(n) => n,
        }
    }
}

/// Cross-validated outcome of one candidate value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateResult {
    pub value: usize,
    pub cv: CVResults,
    /// 1 = best mean score; ties share the lower rank
    pub rank: usize,
}

/// Artifacts retained by a completed fit
#[derive(Debug, Clone)]
pub struct FittedSearch<E> {
    pub best_estimator: E,
    pub best_value: usize,
    pub best_score: f64,
    pub distribution: SearchDistribution,
    pub results: Vec<CandidateResult>,
    /// Center set of the best estimator, if it has one
    pub centers: Option<Array2<f64>>,
}

type Factory<E> = Box<dyn Fn(Option<u64>) -> E + Send + Sync>;

/// Randomized cross-validated search whose distribution is rebuilt per fit
pub struct AdaptiveSearchCV<E, B> {
    factory: Factory<E>,
    param_name: String,
    builder: B,
    config: SearchConfig,
    fitted: Option<FittedSearch<E>>,
}

impl<E, B> fmt::Debug for AdaptiveSearchCV<E, B>
where
    B: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdaptiveSearchCV")
            .field("param_name", &self.param_name)
            .field("builder", &self.builder)
            .field("config", &self.config)
            .field("fitted", &self.fitted.is_some())
            .finish()
    }
}

impl<E, B> AdaptiveSearchCV<E, B>
where
    E: Estimator,
    B: SearchSpaceBuilder,
{
    /// `factory` receives the estimator seed and returns a fresh, unfitted estimator
    pub fn new<F>(factory: F, param_name: impl Into<String>, builder: B, config: SearchConfig) -> Self
    where
        F: Fn(Option<u64>) -> E + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            param_name: param_name.into(),
            builder,
            config,
            fitted: None,
        }
    }

    pub fn param_name(&self) -> &str {
        &self.param_name
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn builder(&self) -> &B {
        &self.builder
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Drop any previous fit
    pub fn reset(&mut self) {
        self.fitted = None;
    }

    pub fn fitted(&self) -> Option<&FittedSearch<E>> {
        self.fitted.as_ref()
    }

    pub fn best_estimator(&self) -> Option<&E> {
        self.fitted.as_ref().map(|f| &f.best_estimator)
    }

    pub fn best_value(&self) -> Option<usize> {
        self.fitted.as_ref().map(|f| f.best_value)
    }

    pub fn best_score(&self) -> Option<f64> {
        self.fitted.as_ref().map(|f| f.best_score)
    }

    pub fn results(&self) -> Option<&[CandidateResult]> {
        self.fitted.as_ref().map(|f| f.results.as_slice())
    }

    /// Build the distribution from `x`, cross-validate sampled candidates and
    /// refit the best one on all of `x`.
    pub fn fit(&mut self, x: ArrayView2<'_, f64>) -> Result<&mut Self> {
        // A failed fit must not leave an earlier result behind
        self.reset();
        self.config.validate()?;
        let start = Instant::now();

        // Fails before any estimator is built when the range collapses
        let distribution = self.builder.build(x)?;
        let candidates = self.sample_candidates(&distribution);
        let splits = CrossValidator::new(self.config.cv.clone())
            .with_optional_random_state(self.config.cv_random_state)
            .split(x.nrows())?;

        info!(
            param = %self.param_name,
            low = distribution.low(),
            high = distribution.high(),
            n_candidates = candidates.len(),
            n_splits = splits.len(),
            rows = x.nrows(),
            cols = x.ncols(),
            "Starting adaptive cross-validated search"
        );

        let fold_scores = self.evaluate_all(x, &candidates, &splits)?;

        let mut results: Vec<CandidateResult> = candidates
            .iter()
            .zip(fold_scores)
            .map(|(&value, scores)| CandidateResult {
                value,
                cv: CVResults::from_scores(scores),
                rank: 0,
            })
            .collect();
        assign_ranks(&mut results);

        let best = results
            .iter()
            .fold(None::<&CandidateResult>, |best, r| match best {
                Some(b) if b.cv.mean_score >= r.cv.mean_score => Some(b),
                _ => Some(r),
            })
            .ok_or_else(|| RegimeError::TrainingError("no candidates were evaluated".to_string()))?;
        let best_value = best.value;
        let best_score = best.cv.mean_score;

        for r in &results {
            debug!(
                param = %self.param_name,
                value = r.value,
                mean_score = r.cv.mean_score,
                std_score = r.cv.std_score,
                rank = r.rank,
                "Candidate evaluated"
            );
        }

        let mut best_estimator = self.build_estimator(best_value)?;
        best_estimator
            .fit(x)
            .map_err(|e| self.fit_error(best_value, "refit on full input".to_string(), e))?;
        let centers = best_estimator.centers().cloned();

        info!(
            param = %self.param_name,
            best_value,
            best_score,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Adaptive search complete"
        );

        self.fitted = Some(FittedSearch {
            best_estimator,
            best_value,
            best_score,
            distribution,
            results,
            centers,
        });
        Ok(self)
    }

    /// Identity pass-through.
    ///
    /// The stage exists to leave a fitted estimator behind for later stages,
    /// so the matrix flows on unchanged and no fit is required.
    pub fn transform<'a>(&self, x: ArrayView2<'a, f64>) -> ArrayView2<'a, f64> {
        x
    }

    pub fn fit_transform<'a>(&mut self, x: ArrayView2<'a, f64>) -> Result<ArrayView2<'a, f64>> {
        self.fit(x)?;
        Ok(self.transform(x))
    }

    /// Draw `n_iter` values; repeats are evaluated once, first draw order kept
    fn sample_candidates(&self, distribution: &SearchDistribution) -> Vec<usize> {
        let mut rng = match self.config.cv_random_state {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let capacity = self.config.n_iter.min(distribution.n_values());
        let mut candidates: Vec<usize> = Vec::with_capacity(capacity);
        for _ in 0..self.config.n_iter {
            let value = distribution.sample(&mut rng) as usize;
            if !candidates.contains(&value) {
                candidates.push(value);
            }
        }
        candidates
    }

    fn build_estimator(&self, value: usize) -> Result<E> {
        let mut estimator = (self.factory)(self.config.estimator_random_state);
        estimator.set_param(&self.param_name, value)?;
        Ok(estimator)
    }

    fn fit_error(&self, value: usize, split: String, err: RegimeError) -> RegimeError {
        RegimeError::EstimatorFitError {
            param: self.param_name.clone(),
            value,
            split,
            reason: err.to_string(),
        }
    }

    /// Fit and score one candidate on one split
    fn evaluate(&self, x: &ArrayView2<f64>, value: usize, split: &CVSplit) -> Result<f64> {
        let mut estimator = self.build_estimator(value)?;
        let train = x.select(Axis(0), &split.train_indices);
        let test = x.select(Axis(0), &split.test_indices);
        let label = format!("fold {}", split.fold_idx);

        estimator
            .fit(train.view())
            .map_err(|e| self.fit_error(value, label.clone(), e))?;
        let score = estimator
            .score(test.view())
            .map_err(|e| self.fit_error(value, label.clone(), e))?;
        if score.is_nan() {
            return Err(self.fit_error(
                value,
                label,
                RegimeError::TrainingError("held-out score is NaN".to_string()),
            ));
        }
        Ok(score)
    }

    /// Scores indexed `[candidate][split]`; the first failing task in
    /// candidate-major order is reported.
    fn evaluate_all(
        &self,
        x: ArrayView2<'_, f64>,
        candidates: &[usize],
        splits: &[CVSplit],
    ) -> Result<Vec<Vec<f64>>> {
        let tasks: Vec<(usize, usize)> = (0..candidates.len())
            .flat_map(|c| (0..splits.len()).map(move |s| (c, s)))
            .collect();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.num_threads())
            .build()
            .map_err(|e| RegimeError::ThreadPoolError(e.to_string()))?;

        let outcomes: Vec<Result<f64>> = pool.install(|| {
            tasks
                .par_iter()
                .map(|&(c, s)| self.evaluate(&x, candidates[c], &splits[s]))
                .collect()
        });

        let mut scores = vec![Vec::with_capacity(splits.len()); candidates.len()];
        for (&(c, _), outcome) in tasks.iter().zip(outcomes) {
            scores[c].push(outcome?);
        }
        Ok(scores)
    }
}

impl<E, B> CenterSource for AdaptiveSearchCV<E, B> {
    fn center_set(&self) -> Option<&Array2<f64>> {
        self.fitted.as_ref().and_then(|f| f.centers.as_ref())
    }
}

/// Rank by descending mean score; equal means share the lowest rank
fn assign_ranks(results: &mut [CandidateResult]) {
    let means: Vec<f64> = results.iter().map(|r| r.cv.mean_score).collect();
    for (i, r) in results.iter_mut().enumerate() {
        let better = means
            .iter()
            .filter(|&&m| m > means[i])
            .count();
        r.rank = better + 1;
    }
}

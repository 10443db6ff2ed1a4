//! Cross-validation splitters

use crate::error::{RegimeError, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// How rows are partitioned into folds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CVStrategy {
    /// Contiguous folds by count, optionally over a seeded permutation
    KFold { n_splits: usize, shuffle: bool },
    /// Caller-supplied (train, test) index pairs
    Predefined(Vec<CVSplit>),
}

impl Default for CVStrategy {
    fn default() -> Self {
        CVStrategy::folds(5)
    }
}

impl CVStrategy {
    /// K folds in row order
    pub fn folds(n_splits: usize) -> Self {
        CVStrategy::KFold { n_splits, shuffle: false }
    }

    pub fn from_pairs(pairs: Vec<(Vec<usize>, Vec<usize>)>) -> Self {
        CVStrategy::Predefined(
            pairs
                .into_iter()
                .enumerate()
                .map(|(fold_idx, (train_indices, test_indices))| CVSplit {
                    train_indices,
                    test_indices,
                    fold_idx,
                })
                .collect(),
        )
    }
}

/// Row indices of one fold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Turns a [`CVStrategy`] into concrete splits for a row count
#[derive(Debug, Clone)]
pub struct CrossValidator {
    strategy: CVStrategy,
    random_state: Option<u64>,
}

impl CrossValidator {
    pub fn new(strategy: CVStrategy) -> Self {
        Self {
            strategy,
            random_state: None,
        }
    }

    /// Seed for the shuffled permutation
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn with_optional_random_state(mut self, seed: Option<u64>) -> Self {
        self.random_state = seed;
        self
    }

    pub fn split(&self, n_samples: usize) -> Result<Vec<CVSplit>> {
        match &self.strategy {
            CVStrategy::KFold { n_splits, shuffle } => self.k_fold(n_samples, *n_splits, *shuffle),
            CVStrategy::Predefined(splits) => check_predefined(n_samples, splits),
        }
    }

    fn k_fold(&self, n_samples: usize, n_splits: usize, shuffle: bool) -> Result<Vec<CVSplit>> {
        if n_splits < 2 {
            return Err(RegimeError::ConfigError("n_splits must be at least 2".to_string()));
        }
        if n_samples < n_splits {
            return Err(RegimeError::DataError(format!(
                "cannot make {} folds from {} rows",
                n_splits, n_samples
            )));
        }

        let mut order: Vec<usize> = (0..n_samples).collect();
        if shuffle {
            let mut rng = match self.random_state {
                Some(seed) => ChaCha8Rng::seed_from_u64(seed),
                None => ChaCha8Rng::from_entropy(),
            };
            order.shuffle(&mut rng);
        }

        // The first n_samples % n_splits folds take one extra row
        let (base, extra) = (n_samples / n_splits, n_samples % n_splits);
        let mut bounds = Vec::with_capacity(n_splits + 1);
        bounds.push(0);
        for fold in 0..n_splits {
            let size = base + usize::from(fold < extra);
            bounds.push(bounds[fold] + size);
        }

        Ok(bounds
            .windows(2)
            .enumerate()
            .map(|(fold_idx, w)| {
                let (lo, hi) = (w[0], w[1]);
                CVSplit {
                    train_indices: order[..lo].iter().chain(&order[hi..]).copied().collect(),
                    test_indices: order[lo..hi].to_vec(),
                    fold_idx,
                }
            })
            .collect())
    }
}

fn check_predefined(n_samples: usize, splits: &[CVSplit]) -> Result<Vec<CVSplit>> {
    if splits.is_empty() {
        return Err(RegimeError::ConfigError(
            "predefined CV needs at least one split".to_string(),
        ));
    }
    for split in splits {
        if split.train_indices.is_empty() || split.test_indices.is_empty() {
            return Err(RegimeError::DataError(format!(
                "split {} has an empty train or test set",
                split.fold_idx
            )));
        }
        if let Some(&i) = split
            .train_indices
            .iter()
            .chain(&split.test_indices)
            .find(|&&i| i >= n_samples)
        {
            return Err(RegimeError::DataError(format!(
                "split {} references row {} but input has {} rows",
                split.fold_idx, i, n_samples
            )));
        }
    }
    Ok(splits.to_vec())
}

/// Per-fold scores of one candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CVResults {
    pub scores: Vec<f64>,
    pub mean_score: f64,
    /// Population standard deviation across folds
    pub std_score: f64,
    pub n_folds: usize,
}

impl CVResults {
    pub fn from_scores(scores: Vec<f64>) -> Self {
        let n_folds = scores.len();
        let n = n_folds as f64;
        let mean_score = scores.iter().sum::<f64>() / n;
        let std_score = (scores.iter().map(|s| (s - mean_score).powi(2)).sum::<f64>() / n).sqrt();
        Self {
            scores,
            mean_score,
            std_score,
            n_folds,
        }
    }
}

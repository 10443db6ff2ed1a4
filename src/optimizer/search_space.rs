//! Data-dependent search distributions for integer hyperparameters
//!
//! A [`SearchSpaceBuilder`] turns the matrix a stage is about to fit on into
//! the integer range a randomized search may draw from. The range is rebuilt
//! on every fit, so a stage placed after a decomposition sees the reduced
//! shape rather than the raw one.

use crate::error::{RegimeError, Result};
use ndarray::ArrayView2;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Default fraction of rows seen by a training fold (5-fold CV trains on 80%).
pub const DEFAULT_TRAINING_FRACTION: f64 = 0.8;

/// Default fraction of rows that bounds the mixture component count.
pub const DEFAULT_MIXTURE_PROPORTION: f64 = 0.1;

/// Inclusive integer range `[low, high]` with `low < high`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchDistribution {
    low: i64,
    high: i64,
}

impl SearchDistribution {
    /// Create a distribution, rejecting collapsed or inverted bounds
    pub fn new(low: i64, high: i64) -> Result<Self> {
        if high <= low {
            return Err(RegimeError::InvalidSearchSpace {
                low,
                high,
                reason: "upper bound must exceed lower bound".to_string(),
            });
        }
        Ok(Self { low, high })
    }

    pub fn low(&self) -> i64 {
        self.low
    }

    pub fn high(&self) -> i64 {
        self.high
    }

    /// Number of distinct values in the range
    pub fn n_values(&self) -> usize {
        (self.high - self.low + 1) as usize
    }

    /// Draw one value uniformly from `[low, high]`
    pub fn sample(&self, rng: &mut impl Rng) -> i64 {
        rng.gen_range(self.low..=self.high)
    }

    pub fn contains(&self, value: i64) -> bool {
        (self.low..=self.high).contains(&value)
    }
}

/// Builds a search distribution from the matrix a stage is fit on.
///
/// Implemented by [`SearchSpacePolicy`] and by any
/// `Fn(ArrayView2<f64>) -> Result<SearchDistribution>` closure.
pub trait SearchSpaceBuilder: Send + Sync {
    fn build(&self, x: ArrayView2<'_, f64>) -> Result<SearchDistribution>;
}

impl<F> SearchSpaceBuilder for F
where
    F: Fn(ArrayView2<'_, f64>) -> Result<SearchDistribution> + Send + Sync,
{
    fn build(&self, x: ArrayView2<'_, f64>) -> Result<SearchDistribution> {
        self(x)
    }
}

/// Built-in bound policies
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SearchSpacePolicy {
    /// `[1, floor(min(rows * proportion, columns))]`, for a decomposition's
    /// component count: no more components than features, and no more than
    /// the rows a training fold sees.
    DecompositionBound { proportion: f64 },
    /// `[1, floor(rows * proportion)]`, for a mixture's component count.
    MixtureBound { proportion: f64 },
}

impl SearchSpacePolicy {
    pub fn decomposition() -> Self {
        SearchSpacePolicy::DecompositionBound {
            proportion: DEFAULT_TRAINING_FRACTION,
        }
    }

    pub fn mixture() -> Self {
        SearchSpacePolicy::MixtureBound {
            proportion: DEFAULT_MIXTURE_PROPORTION,
        }
    }

    pub fn proportion(&self) -> f64 {
        match self {
            SearchSpacePolicy::DecompositionBound { proportion }
            | SearchSpacePolicy::MixtureBound { proportion } => *proportion,
        }
    }

    /// Build the distribution for a `(rows, cols)` shape
    pub fn build_for_shape(&self, rows: usize, cols: usize) -> Result<SearchDistribution> {
        let proportion = self.proportion();
        if !(proportion > 0.0 && proportion <= 1.0) {
            return Err(RegimeError::ConfigError(format!(
                "search space proportion must be in (0, 1], got {}",
                proportion
            )));
        }

        let scaled_rows = rows as f64 * proportion;
        let bound = match self {
            SearchSpacePolicy::DecompositionBound { .. } => scaled_rows.min(cols as f64),
            SearchSpacePolicy::MixtureBound { .. } => scaled_rows,
        };
        let high = bound.floor() as i64;

        SearchDistribution::new(1, high).map_err(|_| RegimeError::InvalidSearchSpace {
            low: 1,
            high,
            reason: format!(
                "{:?} collapses on a {}x{} input",
                self, rows, cols
            ),
        })
    }
}

impl SearchSpaceBuilder for SearchSpacePolicy {
    fn build(&self, x: ArrayView2<'_, f64>) -> Result<SearchDistribution> {
        self.build_for_shape(x.nrows(), x.ncols())
    }
}

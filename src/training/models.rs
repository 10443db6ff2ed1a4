//! Estimator traits shared by the search and refinement stages

use crate::error::Result;
use ndarray::{Array2, ArrayView2};

/// An unsupervised estimator with integer hyperparameters that the adaptive
/// search can vary, fit and score on held-out rows.
pub trait Estimator: Send + Sync {
    /// Set an integer hyperparameter by name
    fn set_param(&mut self, name: &str, value: usize) -> Result<()>;

    /// Fit on the rows of `x`
    fn fit(&mut self, x: ArrayView2<'_, f64>) -> Result<()>;

    /// Score held-out rows; higher is better
    fn score(&self, x: ArrayView2<'_, f64>) -> Result<f64>;

    /// Learned component centers (n_centers × n_features), if the model has them
    fn centers(&self) -> Option<&Array2<f64>> {
        None
    }
}

/// A fitted upstream stage that exposes a center set.
///
/// Downstream stages take this as an explicit handle at fit time instead of
/// looking the producer up by name.
pub trait CenterSource {
    /// `None` until the producing stage has been fit
    fn center_set(&self) -> Option<&Array2<f64>>;
}

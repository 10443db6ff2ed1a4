//! Model training module
//!
//! Unsupervised estimators used by the regime stages:
//! - Gaussian mixtures with diagonal covariances (EM)
//! - K-Means with k-means++ or explicit initial centers
//! - Cross-validation splitters shared by the searches

pub mod clustering;
pub mod cross_validation;
pub mod mixture;
pub mod models;

pub use clustering::{KMeans, KMeansInit};
pub use cross_validation::{CVResults, CVSplit, CVStrategy, CrossValidator};
pub use mixture::GaussianMixture;
pub use models::{CenterSource, Estimator};

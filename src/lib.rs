//! Market Regimes - cross-validated regime clustering of daily market returns
//!
//! Daily quotes are turned into dollar-volume weighted returns, optionally
//! reduced with PCA, and clustered in two steps: a Gaussian mixture whose
//! component count is chosen by cross-validation, then a k-means run seeded
//! with the mixture means. Labels are joined back to trading days.
//!
//! # Modules
//!
//! - [`optimizer`] - Data-dependent search spaces and adaptive CV search
//! - [`training`] - Gaussian mixture, K-Means, CV splitters
//! - [`preprocessing`] - Weighted returns and PCA decomposition
//! - [`regime`] - Mixture selection, seeded refinement, date joining
//! - [`pipeline`] - Configuration and end-to-end runner
//! - [`utils`] - Quote file loading
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Estimation
pub mod optimizer;
pub mod training;
pub mod preprocessing;
pub mod regime;

// Orchestration
pub mod pipeline;
pub mod utils;
pub mod cli;

pub use error::{RegimeError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{RegimeError, Result};

    // Search
    pub use crate::optimizer::{
        AdaptiveSearchCV, SearchConfig, SearchDistribution, SearchSpaceBuilder, SearchSpacePolicy,
    };

    // Estimators
    pub use crate::training::{CVStrategy, CenterSource, Estimator, GaussianMixture, KMeans};

    // Preprocessing
    pub use crate::preprocessing::{DecompositionConfig, PcaDecomposer, QuoteRecord, ReturnsTransform};

    // Regimes
    pub use crate::regime::{
        CenterSeededClusterer, ClusterAssignment, LabelDateJoiner, LabeledTimeline, MixtureConfig,
        MixtureRegimeSelector, RetainedIndex, SeededKMeansConfig,
    };

    // Pipeline
    pub use crate::pipeline::{PipelineConfig, RegimePipeline, RegimeReport};
}

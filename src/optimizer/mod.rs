//! Hyperparameter search module
//!
//! - [`search_space`] derives an integer search range from the input matrix
//! - [`adaptive_cv`] runs a randomized cross-validated search over that range

pub mod adaptive_cv;
pub mod search_space;

pub use adaptive_cv::{AdaptiveSearchCV, CandidateResult, FittedSearch, SearchConfig};
pub use search_space::{
    SearchDistribution, SearchSpaceBuilder, SearchSpacePolicy, DEFAULT_MIXTURE_PROPORTION,
    DEFAULT_TRAINING_FRACTION,
};

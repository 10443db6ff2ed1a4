//! Data preprocessing module
//!
//! - Dollar-volume weighted returns from stacked quotes
//! - PCA with a cross-validated component count

pub mod decomposition;
pub mod returns;

pub use decomposition::{DecompositionConfig, Pca, PcaDecomposer};
pub use returns::{QuoteRecord, ReturnsTransform, WeightedReturns};

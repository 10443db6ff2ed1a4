//! Regime pipeline configuration and runner

pub mod config;
pub mod runner;

pub use config::PipelineConfig;
pub use runner::{DecompositionSummary, RegimePipeline, RegimeReport};

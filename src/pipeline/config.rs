//! Pipeline configuration

use crate::error::{RegimeError, Result};
use crate::optimizer::adaptive_cv::SearchConfig;
use crate::preprocessing::decomposition::DecompositionConfig;
use crate::regime::{MixtureConfig, SeededKMeansConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings for a full regime run.
///
/// Every field has a default, so a JSON file only needs the keys it changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Run the PCA stage before mixture selection
    pub decompose: bool,
    /// Multiplier applied to weighted returns
    pub alpha: f64,
    /// Search settings shared by the decomposition and mixture stages
    pub search: SearchConfig,
    pub decomposition: DecompositionConfig,
    pub mixture: MixtureConfig,
    pub kmeans: SeededKMeansConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            decompose: true,
            alpha: 1.0,
            search: SearchConfig::default(),
            decomposition: DecompositionConfig::default(),
            mixture: MixtureConfig::default(),
            kmeans: SeededKMeansConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_decompose(mut self, decompose: bool) -> Self {
        self.decompose = decompose;
        self
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_search(mut self, search: SearchConfig) -> Self {
        self.search = search;
        self
    }

    pub fn with_decomposition(mut self, decomposition: DecompositionConfig) -> Self {
        self.decomposition = decomposition;
        self
    }

    pub fn with_mixture(mut self, mixture: MixtureConfig) -> Self {
        self.mixture = mixture;
        self
    }

    pub fn with_kmeans(mut self, kmeans: SeededKMeansConfig) -> Self {
        self.kmeans = kmeans;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.alpha.is_finite() {
            return Err(RegimeError::ConfigError(format!("alpha must be finite, got {}", self.alpha)));
        }
        self.search.validate()?;
        self.decomposition.validate()?;
        self.mixture.validate()?;
        self.kmeans.validate()?;
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load and validate a JSON config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

//! Regime discovery stages
//!
//! - [`MixtureRegimeSelector`] chooses the number of Gaussian mixture
//!   components by adaptive cross-validation and keeps the component means.
//! - [`CenterSeededClusterer`] refines those means with a single k-means run
//!   started exactly at them.
//! - [`LabelDateJoiner`] re-attaches the retained dates to the labels.

pub mod joiner;
pub mod seeded;
pub mod selector;

pub use joiner::{LabelDateJoiner, LabeledPoint, LabeledTimeline, RegimeTransition};
pub use seeded::{CenterSeededClusterer, SeededKMeansConfig};
pub use selector::{MixtureConfig, MixtureRegimeSelector};

use crate::error::{RegimeError, Result};
use chrono::NaiveDate;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One representative point per regime (n_regimes × n_features)
pub type CenterSet = Array2<f64>;

/// Sample identifiers of the rows a stage kept, in row order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RetainedIndex<D = NaiveDate>(Vec<D>);

impl<D> RetainedIndex<D> {
    pub fn new(ids: Vec<D>) -> Self {
        Self(ids)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&D> {
        self.0.get(position)
    }

    pub fn as_slice(&self) -> &[D] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, D> {
        self.0.iter()
    }

    pub fn into_inner(self) -> Vec<D> {
        self.0
    }
}

impl<D: Clone> RetainedIndex<D> {
    /// Keep the identifiers at `positions`, in the given order
    pub fn select(&self, positions: &[usize]) -> Result<Self> {
        positions
            .iter()
            .map(|&p| {
                self.0.get(p).cloned().ok_or_else(|| {
                    RegimeError::DataError(format!(
                        "position {} out of range for index of length {}",
                        p,
                        self.0.len()
                    ))
                })
            })
            .collect::<Result<Vec<D>>>()
            .map(Self)
    }
}

impl<D> From<Vec<D>> for RetainedIndex<D> {
    fn from(ids: Vec<D>) -> Self {
        Self(ids)
    }
}

impl<D> FromIterator<D> for RetainedIndex<D> {
    fn from_iter<I: IntoIterator<Item = D>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Hard cluster label per input row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    labels: Vec<usize>,
    n_clusters: usize,
}

impl ClusterAssignment {
    /// Every label must be below `n_clusters`
    pub fn new(labels: Vec<usize>, n_clusters: usize) -> Result<Self> {
        if let Some(&bad) = labels.iter().find(|&&l| l >= n_clusters) {
            return Err(RegimeError::DataError(format!(
                "label {} out of range for {} clusters",
                bad, n_clusters
            )));
        }
        Ok(Self { labels, n_clusters })
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Cluster count fixed at fit time
    pub fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    /// Number of clusters that actually received a row
    pub fn n_distinct(&self) -> usize {
        self.labels.iter().collect::<BTreeSet<_>>().len()
    }

    pub fn into_labels(self) -> Vec<usize> {
        self.labels
    }
}

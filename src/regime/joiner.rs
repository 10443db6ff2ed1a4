//! Re-attaching dates to cluster labels

use crate::error::{RegimeError, Result};
use crate::regime::RetainedIndex;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One labeled observation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledPoint<D = NaiveDate> {
    pub date: D,
    pub cluster: usize,
}

/// Position where the regime label changes from one row to the next
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegimeTransition<D = NaiveDate> {
    /// Row of the first observation in the new regime
    pub position: usize,
    pub date: D,
    pub from: usize,
    pub to: usize,
}

/// (date, cluster) pairs in input row order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabeledTimeline<D = NaiveDate> {
    points: Vec<LabeledPoint<D>>,
}

impl<D> LabeledTimeline<D> {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[LabeledPoint<D>] {
        &self.points
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LabeledPoint<D>> {
        self.points.iter()
    }

    pub fn labels(&self) -> Vec<usize> {
        self.points.iter().map(|p| p.cluster).collect()
    }

    /// Days per regime
    pub fn regime_counts(&self) -> BTreeMap<usize, usize> {
        let mut counts = BTreeMap::new();
        for p in &self.points {
            *counts.entry(p.cluster).or_insert(0) += 1;
        }
        counts
    }

    /// Split back into labels and index
    pub fn split(self) -> (Vec<usize>, RetainedIndex<D>) {
        let (labels, dates): (Vec<usize>, Vec<D>) = self
            .points
            .into_iter()
            .map(|p| (p.cluster, p.date))
            .unzip();
        (labels, RetainedIndex::new(dates))
    }
}

impl<D: Clone> LabeledTimeline<D> {
    pub fn dates(&self) -> Vec<D> {
        self.points.iter().map(|p| p.date.clone()).collect()
    }

    /// Every change of label between consecutive rows
    pub fn transitions(&self) -> Vec<RegimeTransition<D>> {
        self.points
            .windows(2)
            .enumerate()
            .filter(|(_, w)| w[0].cluster != w[1].cluster)
            .map(|(i, w)| RegimeTransition {
                position: i + 1,
                date: w[1].date.clone(),
                from: w[0].cluster,
                to: w[1].cluster,
            })
            .collect()
    }
}

impl<'a, D> IntoIterator for &'a LabeledTimeline<D> {
    type Item = &'a LabeledPoint<D>;
    type IntoIter = std::slice::Iter<'a, LabeledPoint<D>>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

/// Pairs cluster labels with the dates an upstream stage retained
#[derive(Debug, Clone, Copy, Default)]
pub struct LabelDateJoiner;

impl LabelDateJoiner {
    /// Zip `labels` with `index` position by position; no sorting, no dedup
    pub fn join<D: Clone>(labels: &[usize], index: &RetainedIndex<D>) -> Result<LabeledTimeline<D>> {
        if labels.len() != index.len() {
            return Err(RegimeError::AlignmentError {
                labels: labels.len(),
                index: index.len(),
            });
        }
        let points = labels
            .iter()
            .zip(index.iter())
            .map(|(&cluster, date)| LabeledPoint {
                date: date.clone(),
                cluster,
            })
            .collect();
        Ok(LabeledTimeline { points })
    }
}

//! K-Means clustering
//!
//! Lloyd iterations with either k-means++ seeding or caller-supplied initial
//! centers. The fit records whether it converged within `max_iter` instead of
//! failing, so callers decide whether an exhausted budget is fatal.

use crate::error::{RegimeError, Result};
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rand::RngCore;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// How initial centroids are chosen
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum KMeansInit {
    /// k-means++ seeding driven by `random_state`
    KMeansPlusPlus,
    /// Start exactly at these centers (n_clusters × n_features)
    Explicit(Array2<f64>),
}

/// K-Means clustering
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KMeans {
    pub n_clusters: usize,
    pub max_iter: usize,
    pub tol: f64,
    pub random_state: Option<u64>,
    pub init: KMeansInit,
    /// Fitted cluster centroids (n_clusters × n_features)
    centroids: Option<Array2<f64>>,
    /// Cluster labels assigned during fit
    pub labels: Option<Vec<usize>>,
    /// Sum of squared distances to nearest centroid (inertia)
    pub inertia: Option<f64>,
    /// Lloyd iterations run by the last fit
    pub n_iter: usize,
    pub converged: bool,
    /// Squared centroid shift of the last iteration
    pub last_shift: f64,
    pub is_fitted: bool,
}

impl Default for KMeans {
    fn default() -> Self {
        Self::new(3)
    }
}

impl KMeans {
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            max_iter: 300,
            tol: 1e-4,
            random_state: Some(42),
            init: KMeansInit::KMeansPlusPlus,
            centroids: None,
            labels: None,
            inertia: None,
            n_iter: 0,
            converged: false,
            last_shift: 0.0,
            is_fitted: false,
        }
    }

    /// Single run started at `centers`; the cluster count follows the center count
    pub fn from_centers(centers: Array2<f64>) -> Self {
        let mut model = Self::new(centers.nrows());
        model.init = KMeansInit::Explicit(centers);
        model
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// K-means++ initialization: pick centroids spread apart
    fn kmeans_pp_init(x: &ArrayView2<f64>, k: usize, rng: &mut ChaCha8Rng) -> Array2<f64> {
        let n_samples = x.nrows();
        let n_features = x.ncols();
        let mut centroids = Array2::zeros((k, n_features));

        // Pick first centroid uniformly at random
        let first = (rng.next_u64() as usize) % n_samples;
        centroids.row_mut(0).assign(&x.row(first));

        for c in 1..k {
            // Compute distances to nearest existing centroid
            let dists: Vec<f64> = (0..n_samples)
                .map(|i| {
                    let row = x.row(i);
                    (0..c)
                        .map(|j| euclidean_sq(&row, &centroids.row(j)))
                        .fold(f64::MAX, f64::min)
                })
                .collect();

            // Weighted random selection proportional to D²
            let total: f64 = dists.iter().sum();
            if total <= 0.0 {
                let idx = (rng.next_u64() as usize) % n_samples;
                centroids.row_mut(c).assign(&x.row(idx));
                continue;
            }

            let r = (rng.next_u64() as f64 / u64::MAX as f64) * total;
            let mut cumulative = 0.0;
            let mut chosen = n_samples - 1;
            for (i, &d) in dists.iter().enumerate() {
                cumulative += d;
                if cumulative >= r {
                    chosen = i;
                    break;
                }
            }
            centroids.row_mut(c).assign(&x.row(chosen));
        }

        centroids
    }

    fn initial_centroids(&self, x: &ArrayView2<f64>) -> Result<Array2<f64>> {
        match &self.init {
            KMeansInit::KMeansPlusPlus => {
                let mut rng = ChaCha8Rng::seed_from_u64(self.random_state.unwrap_or(42));
                Ok(Self::kmeans_pp_init(x, self.n_clusters, &mut rng))
            }
            KMeansInit::Explicit(centers) => {
                if centers.nrows() != self.n_clusters {
                    return Err(RegimeError::ShapeError {
                        expected: format!("{} initial centers", self.n_clusters),
                        actual: format!("{} initial centers", centers.nrows()),
                    });
                }
                if centers.ncols() != x.ncols() {
                    return Err(RegimeError::ShapeError {
                        expected: format!("centers with {} features", x.ncols()),
                        actual: format!("centers with {} features", centers.ncols()),
                    });
                }
                Ok(centers.clone())
            }
        }
    }

    /// Fit the model (unsupervised, no y needed)
    pub fn fit(&mut self, x: ArrayView2<'_, f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        if self.n_clusters == 0 {
            return Err(RegimeError::InvalidParameter {
                name: "n_clusters".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if n_samples < self.n_clusters {
            return Err(RegimeError::TrainingError(format!(
                "n_samples ({}) < n_clusters ({})", n_samples, self.n_clusters
            )));
        }

        let mut centroids = self.initial_centroids(&x)?;
        let tol = self.tol * mean_feature_variance(&x);
        let mut labels: Option<Vec<usize>> = None;
        let mut converged = false;
        let mut n_iter = 0;
        let mut shift = 0.0;

        for iter in 0..self.max_iter {
            n_iter = iter + 1;

            // Assignment step: assign each point to nearest centroid
            let new_labels = assign(&x, &centroids);

            if labels.as_ref() == Some(&new_labels) {
                converged = true;
                shift = 0.0;
                break;
            }

            // Update step: recompute centroids
            let new_centroids = Self::update_centroids(&x, &new_labels, &centroids, self.n_clusters);
            shift = centroids
                .iter()
                .zip(new_centroids.iter())
                .map(|(a, b)| (a - b).powi(2))
                .sum::<f64>();

            centroids = new_centroids;
            labels = Some(new_labels);

            if shift <= tol {
                converged = true;
                break;
            }
        }

        // Labels consistent with the final centroids
        let labels = assign(&x, &centroids);
        let inertia: f64 = labels
            .iter()
            .enumerate()
            .map(|(i, &c)| euclidean_sq(&x.row(i), &centroids.row(c)))
            .sum();

        self.centroids = Some(centroids);
        self.labels = Some(labels);
        self.inertia = Some(inertia);
        self.n_iter = n_iter;
        self.converged = converged;
        self.last_shift = shift;
        self.is_fitted = true;
        Ok(self)
    }

    /// Mean of assigned points per cluster; an empty cluster takes the point
    /// farthest from its own centroid.
    fn update_centroids(
        x: &ArrayView2<f64>,
        labels: &[usize],
        centroids: &Array2<f64>,
        k: usize,
    ) -> Array2<f64> {
        let mut new_centroids = Array2::zeros(centroids.dim());
        let mut counts = vec![0usize; k];

        for (i, &c) in labels.iter().enumerate() {
            counts[c] += 1;
            let mut row = new_centroids.row_mut(c);
            row += &x.row(i);
        }

        let mut taken: Vec<usize> = Vec::new();
        for c in 0..k {
            if counts[c] > 0 {
                new_centroids.row_mut(c).mapv_inplace(|v| v / counts[c] as f64);
                continue;
            }
            let farthest = labels
                .iter()
                .enumerate()
                .filter(|(i, _)| !taken.contains(i))
                .map(|(i, &l)| (i, euclidean_sq(&x.row(i), &centroids.row(l))))
                .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
                .map(|(i, _)| i)
                .unwrap_or(0);
            taken.push(farthest);
            new_centroids.row_mut(c).assign(&x.row(farthest));
        }

        new_centroids
    }

    /// Predict cluster labels for new data
    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Vec<usize>> {
        let centroids = self
            .centroids
            .as_ref()
            .ok_or_else(|| RegimeError::NotFittedError("KMeans".to_string()))?;
        if centroids.ncols() != x.ncols() {
            return Err(RegimeError::ShapeError {
                expected: format!("{} features", centroids.ncols()),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(assign(&x, centroids))
    }

    /// Get cluster centroids
    pub fn centroids(&self) -> Option<&Array2<f64>> {
        self.centroids.as_ref()
    }
}

pub(crate) fn euclidean_sq(a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Index of the nearest centroid for every row
fn assign(x: &ArrayView2<f64>, centroids: &Array2<f64>) -> Vec<usize> {
    (0..x.nrows())
        .into_par_iter()
        .map(|i| {
            let row = x.row(i);
            let mut best_c = 0;
            let mut best_dist = f64::MAX;
            for c in 0..centroids.nrows() {
                let d = euclidean_sq(&row, &centroids.row(c));
                if d < best_dist {
                    best_dist = d;
                    best_c = c;
                }
            }
            best_c
        })
        .collect()
}

/// Average per-feature variance, used to scale the convergence tolerance
fn mean_feature_variance(x: &ArrayView2<f64>) -> f64 {
    if x.nrows() == 0 || x.ncols() == 0 {
        return 0.0;
    }
    x.var_axis(Axis(0), 0.0).mean().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_kmeans_basic() {
        // Two clear clusters
        let x = array![
            [1.0, 1.0], [1.5, 1.5], [1.2, 1.3],
            [8.0, 8.0], [8.5, 8.5], [8.2, 8.3],
        ];
        let mut model = KMeans::new(2);
        model.fit(x.view()).unwrap();
        assert!(model.is_fitted);
        assert!(model.converged);
        let labels = model.labels.as_ref().unwrap();
        assert_eq!(labels.len(), 6);
        // First 3 should be in same cluster, last 3 in different cluster
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[0], labels[2]);
        assert_eq!(labels[3], labels[4]);
        assert_eq!(labels[3], labels[5]);
        assert_ne!(labels[0], labels[3]);
    }

    #[test]
    fn test_kmeans_explicit_centers_keep_order() {
        let x = array![
            [0.0, 0.0], [0.2, 0.1],
            [10.0, 10.0], [10.2, 9.9],
        ];
        // Second center sits near the first block, so cluster 1 must label rows 0..2
        let centers = array![[9.0, 9.0], [1.0, 1.0]];
        let mut model = KMeans::from_centers(centers);
        model.fit(x.view()).unwrap();
        assert_eq!(model.n_clusters, 2);
        assert_eq!(model.labels.as_ref().unwrap(), &vec![1, 1, 0, 0]);
    }

    #[test]
    fn test_kmeans_explicit_centers_is_deterministic() {
        let x = array![[0.0], [0.5], [4.0], [4.5], [9.0], [9.5]];
        let centers = array![[0.0], [4.0], [9.0]];
        let mut a = KMeans::from_centers(centers.clone()).with_random_state(1);
        let mut b = KMeans::from_centers(centers).with_random_state(99);
        a.fit(x.view()).unwrap();
        b.fit(x.view()).unwrap();
        assert_eq!(a.labels, b.labels);
        assert_eq!(a.centroids(), b.centroids());
    }

    #[test]
    fn test_kmeans_feature_mismatch() {
        let x = array![[0.0, 1.0], [1.0, 0.0]];
        let mut model = KMeans::from_centers(array![[0.0], [1.0]]);
        assert!(matches!(
            model.fit(x.view()),
            Err(RegimeError::ShapeError { .. })
        ));
    }

    #[test]
    fn test_kmeans_budget_exhausted() {
        let x = array![[0.0], [1.0], [2.0], [10.0], [11.0], [12.0]];
        let mut model = KMeans::from_centers(array![[0.0], [1.0]]).with_max_iter(1);
        model.fit(x.view()).unwrap();
        assert!(!model.converged);
        assert_eq!(model.n_iter, 1);
    }

    #[test]
    fn test_kmeans_empty_cluster_relocated() {
        let x = array![[0.0], [0.1], [5.0], [5.1]];
        // Third center is far from every point and starts empty
        let mut model = KMeans::from_centers(array![[0.0], [5.0], [100.0]]);
        model.fit(x.view()).unwrap();
        let labels = model.labels.as_ref().unwrap();
        assert_eq!(labels.len(), 4);
        assert!(labels.iter().all(|&l| l < 3));
    }

    #[test]
    fn test_kmeans_predict() {
        let x = array![
            [0.0, 0.0], [0.5, 0.5],
            [10.0, 10.0], [10.5, 10.5],
        ];
        let mut model = KMeans::new(2);
        model.fit(x.view()).unwrap();

        let new_x = array![[0.1, 0.1], [10.1, 10.1]];
        let labels = model.predict(new_x.view()).unwrap();
        assert_ne!(labels[0], labels[1]);
    }

    #[test]
    fn test_kmeans_predict_unfitted() {
        let model = KMeans::new(2);
        let x = array![[0.0, 0.0]];
        assert!(matches!(model.predict(x.view()), Err(RegimeError::NotFittedError(_))));
    }

    #[test]
    fn test_kmeans_inertia() {
        let x = array![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [10.0, 10.0]];
        let mut model = KMeans::new(2);
        model.fit(x.view()).unwrap();
        assert!(model.inertia.unwrap() > 0.0);
    }

    #[test]
    fn test_kmeans_too_few_samples() {
        let x = array![[0.0, 0.0]];
        let mut model = KMeans::new(2);
        assert!(model.fit(x.view()).is_err());
    }
}

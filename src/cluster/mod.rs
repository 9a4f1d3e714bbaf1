//! K-Means clustering and the persona-segmentation pipeline built on it.
//!
//! [`KMeans`] is the generic estimator: k-means++ seeding with
//! distance-squared proportional sampling, Lloyd's iterations until the
//! assignment stabilizes, and multi-restart selection by lowest inertia.
//! The [`persona`] module wraps it into the end-to-end user-segmentation
//! pipeline; [`elbow`] sweeps candidate cluster counts.

pub mod elbow;
pub mod persona;

pub use elbow::{compute_elbow_data, ElbowPoint};
pub use persona::{
    run_persona_clustering, ClusteringResult, PersonaAssignment, PersonaConfig,
};

use crate::error::{PerfilarError, Result};
use crate::metrics::inertia;
use crate::primitives::Matrix;
use crate::traits::UnsupervisedEstimator;
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::{thread_rng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// K-Means clustering with k-means++ initialization.
///
/// # Example
///
/// ```
/// use perfilar::prelude::*;
///
/// let data = Matrix::from_vec(6, 2, vec![
///     0.0, 0.0, 0.1, 0.1, 0.2, 0.0,
///     10.0, 10.0, 10.1, 10.1, 10.0, 10.2,
/// ]).unwrap();
///
/// let mut kmeans = KMeans::new(2).with_random_state(42);
/// kmeans.fit(&data).unwrap();
/// assert_eq!(kmeans.labels().len(), 6);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KMeans {
    /// Number of clusters.
    n_clusters: usize,
    /// Maximum Lloyd's iterations per restart.
    max_iter: usize,
    /// Number of independent restarts; the lowest-inertia run wins.
    n_init: usize,
    /// Seed for reproducible runs.
    random_state: Option<u64>,
    /// Fitted centroids `[n_clusters x n_features]`.
    centroids: Option<Matrix<f32>>,
    /// Assignment of each training sample.
    labels: Option<Vec<usize>>,
    /// Sum of squared distances to assigned centroids.
    inertia: Option<f32>,
    /// Iterations the winning restart took to converge.
    n_iter: Option<usize>,
    /// Inertia after each assignment step of the winning restart.
    #[serde(skip)]
    iteration_inertia: Vec<f32>,
}

impl KMeans {
    /// Creates a K-Means estimator for `n_clusters` clusters.
    #[must_use]
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            max_iter: 100,
            n_init: 10,
            random_state: None,
            centroids: None,
            labels: None,
            inertia: None,
            n_iter: None,
            iteration_inertia: Vec::new(),
        }
    }

    /// Sets the maximum number of Lloyd's iterations per restart.
    #[must_use]
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Sets the number of independent restarts.
    #[must_use]
    pub fn with_n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init;
        self
    }

    /// Sets the random seed for reproducible runs.
    #[must_use]
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Fitted centroids.
    ///
    /// # Panics
    ///
    /// Panics if the model is not fitted.
    #[must_use]
    pub fn centroids(&self) -> &Matrix<f32> {
        self.centroids
            .as_ref()
            .expect("Model not fitted. Call fit() first.")
    }

    /// Training-sample assignments.
    ///
    /// # Panics
    ///
    /// Panics if the model is not fitted.
    #[must_use]
    pub fn labels(&self) -> &[usize] {
        self.labels
            .as_ref()
            .expect("Model not fitted. Call fit() first.")
    }

    /// Sum of squared distances from each sample to its assigned centroid.
    ///
    /// # Panics
    ///
    /// Panics if the model is not fitted.
    #[must_use]
    pub fn inertia(&self) -> f32 {
        self.inertia.expect("Model not fitted. Call fit() first.")
    }

    /// Iterations the winning restart ran before converging.
    ///
    /// # Panics
    ///
    /// Panics if the model is not fitted.
    #[must_use]
    pub fn n_iter(&self) -> usize {
        self.n_iter.expect("Model not fitted. Call fit() first.")
    }

    /// Inertia recorded after each assignment step of the winning restart.
    /// Lloyd's iterations never increase this sequence. Empty before
    /// fitting and after deserializing a persisted model.
    #[must_use]
    pub fn iteration_inertia(&self) -> &[f32] {
        &self.iteration_inertia
    }

    /// k-means++ seeding: the first centroid is sampled uniformly, each
    /// subsequent one with probability proportional to its squared distance
    /// from the nearest centroid chosen so far.
    fn init_centroids<R: Rng>(&self, x: &Matrix<f32>, rng: &mut R) -> Matrix<f32> {
        let (n_samples, n_features) = x.shape();
        let mut chosen: Vec<usize> = Vec::with_capacity(self.n_clusters);

        let first = Uniform::new(0, n_samples).sample(rng);
        chosen.push(first);

        let mut min_dist_sq = vec![f32::INFINITY; n_samples];
        while chosen.len() < self.n_clusters {
            let latest = *chosen.last().unwrap_or(&first);
            for i in 0..n_samples {
                let d = squared_distance(x.row_slice(i), x.row_slice(latest));
                if d < min_dist_sq[i] {
                    min_dist_sq[i] = d;
                }
            }

            let total: f32 = min_dist_sq.iter().sum();
            let next = if total <= 0.0 {
                // All remaining points coincide with a centroid
                Uniform::new(0, n_samples).sample(rng)
            } else {
                let mut target = rng.gen::<f32>() * total;
                let mut pick = n_samples - 1;
                for (i, &d) in min_dist_sq.iter().enumerate() {
                    target -= d;
                    if target <= 0.0 {
                        pick = i;
                        break;
                    }
                }
                pick
            };
            chosen.push(next);
        }

        let mut data = Vec::with_capacity(self.n_clusters * n_features);
        for &idx in &chosen {
            data.extend_from_slice(x.row_slice(idx));
        }
        Matrix::from_vec(self.n_clusters, n_features, data)
            .unwrap_or_else(|_| Matrix::zeros(self.n_clusters, n_features))
    }

    /// One full run of Lloyd's algorithm from a fresh seeding.
    fn run_once<R: Rng>(
        &self,
        x: &Matrix<f32>,
        rng: &mut R,
    ) -> (Matrix<f32>, Vec<usize>, usize, Vec<f32>) {
        let (n_samples, n_features) = x.shape();
        let mut centroids = self.init_centroids(x, rng);
        let mut labels = vec![0usize; n_samples];
        let mut iterations = 0;
        let mut inertia_trace = Vec::new();

        for iter in 0..self.max_iter {
            iterations = iter + 1;

            let new_labels: Vec<usize> = (0..n_samples)
                .map(|i| nearest_centroid(x.row_slice(i), &centroids))
                .collect();

            let converged = iter > 0 && new_labels == labels;
            labels = new_labels;
            inertia_trace.push(inertia(x, &centroids, &labels));
            if converged {
                break;
            }

            // Recompute each centroid as the mean of its members; empty
            // clusters keep their previous position
            let mut sums = vec![0.0f32; self.n_clusters * n_features];
            let mut counts = vec![0usize; self.n_clusters];
            for (i, &label) in labels.iter().enumerate() {
                counts[label] += 1;
                let row = x.row_slice(i);
                for (j, &v) in row.iter().enumerate() {
                    sums[label * n_features + j] += v;
                }
            }
            for c in 0..self.n_clusters {
                if counts[c] == 0 {
                    continue;
                }
                for j in 0..n_features {
                    centroids.set(c, j, sums[c * n_features + j] / counts[c] as f32);
                }
            }
        }

        (centroids, labels, iterations, inertia_trace)
    }
}

impl UnsupervisedEstimator for KMeans {
    type Labels = Vec<usize>;

    /// Fits the estimator: `n_init` restarts, keeping the lowest-inertia run.
    ///
    /// # Errors
    ///
    /// Returns `EmptyDataset` on empty input and `InvalidConfig` when there
    /// are fewer samples than clusters or `n_clusters` is zero.
    fn fit(&mut self, x: &Matrix<f32>) -> Result<()> {
        let n_samples = x.n_rows();
        if n_samples == 0 {
            return Err(PerfilarError::empty_dataset("kmeans fit"));
        }
        if self.n_clusters == 0 {
            return Err(PerfilarError::invalid_config(
                "n_clusters",
                self.n_clusters,
                "must be at least 1",
            ));
        }
        if n_samples < self.n_clusters {
            return Err(PerfilarError::invalid_config(
                "n_clusters",
                self.n_clusters,
                "must not exceed the number of samples",
            ));
        }

        let mut best: Option<(f32, Matrix<f32>, Vec<usize>, usize, Vec<f32>)> = None;
        for restart in 0..self.n_init.max(1) {
            let (centroids, labels, iters, trace) = match self.random_state {
                Some(seed) => {
                    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(restart as u64));
                    self.run_once(x, &mut rng)
                }
                None => self.run_once(x, &mut thread_rng()),
            };
            let score = inertia(x, &centroids, &labels);
            debug!(restart, inertia = score, iterations = iters, "kmeans restart");

            if best.as_ref().map_or(true, |(s, ..)| score < *s) {
                best = Some((score, centroids, labels, iters, trace));
            }
        }

        // n_init >= 1, so best is always populated here
        if let Some((score, centroids, labels, iters, trace)) = best {
            self.inertia = Some(score);
            self.centroids = Some(centroids);
            self.labels = Some(labels);
            self.n_iter = Some(iters);
            self.iteration_inertia = trace;
        }
        Ok(())
    }

    /// Assigns each sample to its nearest fitted centroid.
    ///
    /// # Panics
    ///
    /// Panics if the model is not fitted.
    fn predict(&self, x: &Matrix<f32>) -> Vec<usize> {
        let centroids = self.centroids();
        (0..x.n_rows())
            .map(|i| nearest_centroid(x.row_slice(i), centroids))
            .collect()
    }
}

/// Squared Euclidean distance between two equal-length slices.
#[must_use]
pub fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Euclidean distance between two equal-length slices.
#[must_use]
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    squared_distance(a, b).sqrt()
}

fn nearest_centroid(sample: &[f32], centroids: &Matrix<f32>) -> usize {
    let mut best = 0;
    let mut best_dist = f32::INFINITY;
    for c in 0..centroids.n_rows() {
        let d = squared_distance(sample, centroids.row_slice(c));
        if d < best_dist {
            best_dist = d;
            best = c;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_blobs() -> Matrix<f32> {
        let mut data = Vec::new();
        for i in 0..10 {
            let jitter = i as f32 * 0.01;
            data.extend_from_slice(&[0.0 + jitter, 0.0 - jitter]);
        }
        for i in 0..10 {
            let jitter = i as f32 * 0.01;
            data.extend_from_slice(&[10.0 + jitter, 0.0 + jitter]);
        }
        for i in 0..10 {
            let jitter = i as f32 * 0.01;
            data.extend_from_slice(&[5.0 - jitter, 9.0 + jitter]);
        }
        Matrix::from_vec(30, 2, data).unwrap()
    }

    #[test]
    fn test_fit_three_blobs() {
        let data = three_blobs();
        let mut kmeans = KMeans::new(3).with_random_state(42);
        kmeans.fit(&data).unwrap();

        let labels = kmeans.labels();
        // Each blob maps to a single cluster
        for blob in 0..3 {
            let first = labels[blob * 10];
            for i in 0..10 {
                assert_eq!(labels[blob * 10 + i], first);
            }
        }
        // And distinct blobs map to distinct clusters
        assert_ne!(labels[0], labels[10]);
        assert_ne!(labels[10], labels[20]);
    }

    #[test]
    fn test_deterministic_under_seed() {
        let data = three_blobs();
        let mut a = KMeans::new(3).with_random_state(7);
        let mut b = KMeans::new(3).with_random_state(7);
        a.fit(&data).unwrap();
        b.fit(&data).unwrap();

        assert_eq!(a.labels(), b.labels());
        assert!((a.inertia() - b.inertia()).abs() < 1e-9);
    }

    #[test]
    fn test_within_run_inertia_non_increasing() {
        let data = three_blobs();
        let mut kmeans = KMeans::new(3).with_random_state(42).with_n_init(1);
        kmeans.fit(&data).unwrap();

        let trace = kmeans.iteration_inertia();
        assert_eq!(trace.len(), kmeans.n_iter());
        for pair in trace.windows(2) {
            assert!(pair[1] <= pair[0] + 1e-4, "trace {trace:?}");
        }
        // The reported inertia matches the final assignment
        assert!((kmeans.inertia() - trace.last().unwrap()).abs() < 1e-4);
    }

    #[test]
    fn test_inertia_decreases_with_k() {
        let data = three_blobs();
        let mut prev = f32::INFINITY;
        for k in 1..=4 {
            let mut kmeans = KMeans::new(k).with_random_state(42);
            kmeans.fit(&data).unwrap();
            assert!(kmeans.inertia() <= prev + 1e-3, "k={k}");
            prev = kmeans.inertia();
        }
    }

    #[test]
    fn test_predict_new_samples() {
        let data = three_blobs();
        let mut kmeans = KMeans::new(3).with_random_state(42);
        kmeans.fit(&data).unwrap();

        let queries = Matrix::from_vec(2, 2, vec![0.1, 0.1, 9.9, 0.1]).unwrap();
        let assigned = kmeans.predict(&queries);
        assert_eq!(assigned[0], kmeans.labels()[0]);
        assert_eq!(assigned[1], kmeans.labels()[10]);
    }

    #[test]
    fn test_k_exceeds_samples_error() {
        let data = Matrix::from_vec(2, 1, vec![1.0, 2.0]).unwrap();
        let mut kmeans = KMeans::new(5);
        assert!(kmeans.fit(&data).is_err());
    }

    #[test]
    fn test_empty_data_error() {
        let data = Matrix::from_vec(0, 2, vec![]).unwrap();
        let mut kmeans = KMeans::new(2);
        assert!(matches!(
            kmeans.fit(&data),
            Err(PerfilarError::EmptyDataset { .. })
        ));
    }

    #[test]
    fn test_duplicate_points_do_not_panic() {
        // More clusters than distinct points
        let data = Matrix::from_vec(6, 1, vec![1.0, 1.0, 1.0, 1.0, 5.0, 5.0]).unwrap();
        let mut kmeans = KMeans::new(3).with_random_state(1);
        kmeans.fit(&data).unwrap();
        assert_eq!(kmeans.labels().len(), 6);
        assert!(kmeans.inertia().is_finite());
    }

    #[test]
    fn test_k_one_single_cluster() {
        let data = three_blobs();
        let mut kmeans = KMeans::new(1).with_random_state(42);
        kmeans.fit(&data).unwrap();
        assert!(kmeans.labels().iter().all(|&l| l == 0));
    }
}

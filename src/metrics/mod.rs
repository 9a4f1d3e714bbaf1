//! Evaluation metrics.
//!
//! Clustering metrics (inertia, silhouette) live here; classification
//! metrics are in the [`classification`] submodule.

pub mod classification;

use crate::primitives::Matrix;

/// Sum of squared distances from each point to its assigned centroid.
///
/// # Examples
///
/// ```
/// use perfilar::metrics::inertia;
/// use perfilar::primitives::Matrix;
///
/// let data = Matrix::from_vec(2, 1, vec![0.0, 2.0]).unwrap();
/// let centroids = Matrix::from_vec(1, 1, vec![1.0]).unwrap();
/// let total = inertia(&data, &centroids, &[0, 0]);
/// assert!((total - 2.0).abs() < 1e-6);
/// ```
#[must_use]
pub fn inertia(data: &Matrix<f32>, centroids: &Matrix<f32>, labels: &[usize]) -> f32 {
    let mut total = 0.0;

    for (i, &label) in labels.iter().enumerate() {
        let point = data.row(i);
        let centroid = centroids.row(label);
        let diff = &point - &centroid;
        total += diff.norm_squared();
    }

    total
}

/// Computes the mean distance from a point to other points in the same cluster.
fn mean_intra_cluster_distance(
    data: &Matrix<f32>,
    point_idx: usize,
    cluster: usize,
    labels: &[usize],
) -> f32 {
    let point = data.row(point_idx);
    let distances: Vec<f32> = labels
        .iter()
        .enumerate()
        .filter(|&(j, &label)| j != point_idx && label == cluster)
        .map(|(j, _)| {
            let other = data.row(j);
            (&point - &other).norm()
        })
        .collect();

    if distances.is_empty() {
        0.0
    } else {
        distances.iter().sum::<f32>() / distances.len() as f32
    }
}

/// Computes the minimum mean distance from a point to points in other clusters.
fn min_inter_cluster_distance(
    data: &Matrix<f32>,
    point_idx: usize,
    cluster: usize,
    labels: &[usize],
    n_clusters: usize,
) -> f32 {
    let point = data.row(point_idx);
    let mut min_mean = f32::INFINITY;

    for other_cluster in 0..n_clusters {
        if other_cluster == cluster {
            continue;
        }

        let distances: Vec<f32> = labels
            .iter()
            .enumerate()
            .filter(|&(_, &label)| label == other_cluster)
            .map(|(j, _)| {
                let other = data.row(j);
                (&point - &other).norm()
            })
            .collect();

        if !distances.is_empty() {
            let mean_dist = distances.iter().sum::<f32>() / distances.len() as f32;
            min_mean = min_mean.min(mean_dist);
        }
    }

    if min_mean == f32::INFINITY {
        0.0
    } else {
        min_mean
    }
}

/// Combines intra/inter distances into the per-point silhouette coefficient.
fn silhouette_coefficient(a_i: f32, b_i: f32) -> f32 {
    let max_ab = a_i.max(b_i);
    if max_ab == 0.0 {
        0.0
    } else {
        (b_i - a_i) / max_ab
    }
}

/// Computes the mean silhouette score for a clustering.
///
/// s(i) = (b(i) - a(i)) / max(a(i), b(i))
///
/// where a(i) is the mean distance to other points in the same cluster and
/// b(i) is the minimum mean distance to points in any other cluster. Values
/// range from -1 to 1; higher is better. Degenerate inputs (fewer than 2
/// points or fewer than 2 clusters) score 0.
///
/// # Examples
///
/// ```
/// use perfilar::metrics::silhouette_score;
/// use perfilar::primitives::Matrix;
///
/// let data = Matrix::from_vec(4, 2, vec![
///     0.0, 0.0,
///     0.1, 0.1,
///     5.0, 5.0,
///     5.1, 5.1,
/// ]).unwrap();
/// let labels = vec![0, 0, 1, 1];
/// assert!(silhouette_score(&data, &labels) > 0.5);
/// ```
#[must_use]
pub fn silhouette_score(data: &Matrix<f32>, labels: &[usize]) -> f32 {
    let n_samples = data.n_rows();

    if n_samples < 2 {
        return 0.0;
    }

    let n_clusters = labels.iter().max().map_or(0, |&m| m + 1);

    if n_clusters < 2 {
        return 0.0;
    }

    let silhouettes: Vec<f32> = (0..n_samples)
        .map(|i| {
            let cluster = labels[i];
            let a_i = mean_intra_cluster_distance(data, i, cluster, labels);
            let b_i = min_inter_cluster_distance(data, i, cluster, labels, n_clusters);
            silhouette_coefficient(a_i, b_i)
        })
        .collect();

    silhouettes.iter().sum::<f32>() / silhouettes.len() as f32
}

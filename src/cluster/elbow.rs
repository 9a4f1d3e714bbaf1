//! Elbow sweep for cluster-count selection.
//!
//! Repeats the standardize-and-cluster pipeline across a range of k values,
//! recording the inertia and the mean silhouette coefficient per k.

use super::{KMeans, PersonaConfig};
use crate::error::Result;
use crate::features::{to_matrix, FeatureRow};
use crate::metrics::silhouette_score;
use crate::preprocessing::StandardScaler;
use crate::traits::{Transformer, UnsupervisedEstimator};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use tracing::debug;

/// One point of the elbow curve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElbowPoint {
    /// Cluster count tested.
    pub k: usize,
    /// Best inertia at this k.
    pub inertia: f32,
    /// Mean silhouette coefficient at this k.
    pub silhouette: f32,
}

/// Runs the clustering pipeline for every k in `k_range` and reports inertia
/// and mean silhouette per k. Values of k exceeding the row count are
/// skipped.
///
/// # Errors
///
/// Returns `EmptyDataset` on no rows or `InvalidConfig` for bad feature
/// columns.
pub fn compute_elbow_data(
    rows: &[FeatureRow],
    k_range: RangeInclusive<usize>,
    config: &PersonaConfig,
) -> Result<Vec<ElbowPoint>> {
    let raw = to_matrix(rows, &config.features)?;
    let mut scaler = StandardScaler::new().with_log1p_columns(config.log1p_columns.clone());
    let scaled = scaler.fit_transform(&raw)?;

    let mut points = Vec::new();
    for k in k_range {
        if k == 0 || k > scaled.n_rows() {
            continue;
        }
        let mut kmeans = KMeans::new(k)
            .with_max_iter(config.max_iter)
            .with_n_init(config.n_restarts);
        if let Some(seed) = config.random_state {
            kmeans = kmeans.with_random_state(seed);
        }
        kmeans.fit(&scaled)?;

        let silhouette = silhouette_score(&scaled, kmeans.labels());
        debug!(k, inertia = kmeans.inertia(), silhouette, "elbow point");
        points.push(ElbowPoint {
            k,
            inertia: kmeans.inertia(),
            silhouette,
        });
    }

    Ok(points)
}

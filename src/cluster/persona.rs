//! Persona segmentation pipeline.
//!
//! Builds a standardized feature matrix from per-user rows, clusters it with
//! [`KMeans`], denormalizes the centroids back into human-interpretable
//! units, and labels each cluster against three archetype templates. Also
//! flags per-user edge cases and suggests an onboarding category per
//! archetype.

use super::{euclidean_distance, KMeans};
use crate::error::Result;
use crate::features::{to_matrix, FeatureRow};
use crate::preprocessing::StandardScaler;
use crate::primitives::Matrix;
use crate::traits::{Transformer, UnsupervisedEstimator};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Distance threshold multiplier for edge-case detection: a user is flagged
/// when its distance to the assigned centroid exceeds mean + 1.5 sigma.
const EDGE_CASE_SIGMA: f32 = 1.5;

/// Configuration for a persona clustering run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaConfig {
    /// Ordered feature column names to cluster on.
    pub features: Vec<String>,
    /// Indices into `features` of heavy-tailed columns to log1p-transform
    /// before standardization.
    pub log1p_columns: Vec<usize>,
    /// Independent K-Means restarts.
    pub n_restarts: usize,
    /// Lloyd's iteration cap per restart.
    pub max_iter: usize,
    /// Seed for reproducible runs.
    pub random_state: Option<u64>,
}

impl PersonaConfig {
    /// Creates a config with default run parameters.
    #[must_use]
    pub fn new(features: Vec<String>) -> Self {
        Self {
            features,
            log1p_columns: Vec::new(),
            n_restarts: 10,
            max_iter: 100,
            random_state: None,
        }
    }

    /// Sets the heavy-tailed columns to log1p-transform.
    #[must_use]
    pub fn with_log1p_columns(mut self, columns: Vec<usize>) -> Self {
        self.log1p_columns = columns;
        self
    }

    /// Sets the restart count.
    #[must_use]
    pub fn with_n_restarts(mut self, n: usize) -> Self {
        self.n_restarts = n;
        self
    }

    /// Sets the Lloyd's iteration cap.
    #[must_use]
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Sets the random seed.
    #[must_use]
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }
}

/// One user's cluster assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaAssignment {
    /// User identifier.
    pub user_id: String,
    /// Assigned cluster id.
    pub cluster: usize,
    /// Euclidean distance to the assigned centroid in standardized space.
    pub distance: f32,
    /// True when `distance` exceeds the dataset mean plus 1.5 sigma.
    pub is_edge_case: bool,
    /// Onboarding category suggested for the user's archetype.
    pub onboarding: String,
}

/// Result of a persona clustering run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringResult {
    /// Denormalized centroids `[k x features]`, in the original feature units.
    pub centroids: Matrix<f32>,
    /// Per-user assignments, in input-row order.
    pub assignments: Vec<PersonaAssignment>,
    /// Archetype label per cluster id.
    pub labels: Vec<String>,
    /// Sum of squared distances in standardized space.
    pub inertia: f32,
    /// Lloyd's iterations of the winning restart.
    pub n_iter: usize,
    /// Number of clusters.
    pub k: usize,
    /// Feature name order of the centroid columns.
    pub feature_names: Vec<String>,
}

/// An archetype template: a name, an onboarding category, and a score
/// function over a centroid's normalized per-feature positions.
struct Archetype {
    name: &'static str,
    onboarding: &'static str,
    score: fn(&dyn Fn(&str) -> f32) -> f32,
}

/// The three canned archetypes. Score functions read normalized per-feature
/// positions (0 = lowest centroid, 1 = highest) so the tuning is independent
/// of feature units; absent features read as 0.5 (uninformative).
fn archetypes() -> [Archetype; 3] {
    [
        Archetype {
            name: "casual",
            onboarding: "guided_tour",
            score: |f| {
                // Light, narrow, sporadic usage
                (1.0 - f("event_count")) * 0.4
                    + (1.0 - f("distinct_resource_names")) * 0.3
                    + (1.0 - f("span_hours")) * 0.3
            },
        },
        Archetype {
            name: "live-ops monitor",
            onboarding: "alerting_setup",
            score: |f| {
                // Heavy repeated hits on few resources, often mobile
                f("event_count") * 0.4
                    + (1.0 - f("distinct_resource_names")) * 0.3
                    + f("mobile_ratio") * 0.3
            },
        },
        Archetype {
            name: "exploratory analyst",
            onboarding: "advanced_features",
            score: |f| {
                // Broad coverage and export-heavy sessions
                f("distinct_resource_names") * 0.35
                    + f("distinct_resource_types") * 0.25
                    + f("export_count") * 0.4
            },
        },
    ]
}

/// Runs the full persona pipeline: log1p on configured heavy-tail columns,
/// standardize, K-Means, denormalize centroids, archetype labeling, and
/// per-user edge-case detection.
///
/// # Errors
///
/// Returns `EmptyDataset` on no rows, `InvalidConfig` when `k` exceeds the
/// row count or a feature column is missing/categorical.
pub fn run_persona_clustering(
    rows: &[FeatureRow],
    k: usize,
    config: &PersonaConfig,
) -> Result<ClusteringResult> {
    let raw = to_matrix(rows, &config.features)?;

    let mut scaler = StandardScaler::new().with_log1p_columns(config.log1p_columns.clone());
    let scaled = scaler.fit_transform(&raw)?;

    let mut kmeans = KMeans::new(k)
        .with_max_iter(config.max_iter)
        .with_n_init(config.n_restarts);
    if let Some(seed) = config.random_state {
        kmeans = kmeans.with_random_state(seed);
    }
    kmeans.fit(&scaled)?;

    let labels_idx = kmeans.labels().to_vec();
    let centroids_scaled = kmeans.centroids().clone();
    let centroids = scaler.inverse_transform(&centroids_scaled)?;

    let persona_labels = label_clusters(&centroids, &config.features);
    debug!(k, inertia = kmeans.inertia(), labels = ?persona_labels, "personas labeled");

    // Archetype -> onboarding category lookup
    let onboarding_for = |label: &str| -> String {
        archetypes()
            .iter()
            .find(|a| a.name == label)
            .map_or_else(|| "guided_tour".to_string(), |a| a.onboarding.to_string())
    };

    let distances: Vec<f32> = (0..scaled.n_rows())
        .map(|i| euclidean_distance(scaled.row_slice(i), centroids_scaled.row_slice(labels_idx[i])))
        .collect();
    let mean = distances.iter().sum::<f32>() / distances.len().max(1) as f32;
    let variance = distances.iter().map(|d| (d - mean) * (d - mean)).sum::<f32>()
        / distances.len().max(1) as f32;
    let threshold = mean + EDGE_CASE_SIGMA * variance.sqrt();

    let assignments = rows
        .iter()
        .zip(labels_idx.iter().zip(distances.iter()))
        .map(|(row, (&cluster, &distance))| PersonaAssignment {
            user_id: row.user_id.clone(),
            cluster,
            distance,
            is_edge_case: distance > threshold,
            onboarding: onboarding_for(&persona_labels[cluster]),
        })
        .collect();

    Ok(ClusteringResult {
        centroids,
        assignments,
        labels: persona_labels,
        inertia: kmeans.inertia(),
        n_iter: kmeans.n_iter(),
        k,
        feature_names: config.features.clone(),
    })
}

/// Normalized position of each centroid value within the per-feature range
/// across all centroids. 0.5 everywhere when the range collapses.
pub(crate) fn normalized_positions(centroids: &Matrix<f32>) -> Matrix<f32> {
    let (k, n_features) = centroids.shape();
    let mut positions = Matrix::zeros(k, n_features);
    for j in 0..n_features {
        let column: Vec<f32> = (0..k).map(|c| centroids.get(c, j)).collect();
        let min = column.iter().copied().fold(f32::INFINITY, f32::min);
        let max = column.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let range = max - min;
        for c in 0..k {
            let pos = if range <= 0.0 {
                0.5
            } else {
                (centroids.get(c, j) - min) / range
            };
            positions.set(c, j, pos);
        }
    }
    positions
}

/// Scores every centroid against every archetype and greedily matches
/// highest-score-first without template reuse. Leftover clusters take their
/// best-scoring template regardless of reuse.
fn label_clusters(centroids: &Matrix<f32>, feature_names: &[String]) -> Vec<String> {
    let k = centroids.n_rows();
    let positions = normalized_positions(centroids);
    let templates = archetypes();

    // scores[cluster][template]
    let scores: Vec<Vec<f32>> = (0..k)
        .map(|c| {
            let lookup = |name: &str| -> f32 {
                feature_names
                    .iter()
                    .position(|f| f == name)
                    .map_or(0.5, |j| positions.get(c, j))
            };
            templates.iter().map(|t| (t.score)(&lookup)).collect()
        })
        .collect();

    let mut pairs: Vec<(usize, usize, f32)> = Vec::new();
    for (c, row) in scores.iter().enumerate() {
        for (t, &score) in row.iter().enumerate() {
            pairs.push((c, t, score));
        }
    }
    pairs.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));

    let mut labels: Vec<Option<&'static str>> = vec![None; k];
    let mut used = vec![false; templates.len()];
    for &(c, t, _) in &pairs {
        if labels[c].is_none() && !used[t] {
            labels[c] = Some(templates[t].name);
            used[t] = true;
        }
    }

    // k > template count: leftovers get their best-scoring template anyway
    labels
        .iter()
        .enumerate()
        .map(|(c, label)| match label {
            Some(name) => (*name).to_string(),
            None => {
                let best = scores[c]
                    .iter()
                    .enumerate()
                    .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
                    .map_or(0, |(t, _)| t);
                templates[best].name.to_string()
            }
        })
        .collect()
}

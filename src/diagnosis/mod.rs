//! Clustering diagnosis.
//!
//! Consumes a persona clustering result and answers "is this segmentation
//! any good, and what would make it better": leave-one-out and add-one-in
//! silhouette deltas per feature, canned alternative feature combos,
//! business-readable cluster profiles, and a priority-ordered recommendation
//! list. Everything here is derived data; inputs are never mutated.
//!
//! This is the most expensive call in the crate: it re-runs the full
//! standardize-and-cluster pipeline once per candidate feature and once per
//! combo, so callers with wide feature sets should trim before diagnosing.

use crate::cluster::persona::normalized_positions;
use crate::cluster::{ClusteringResult, ElbowPoint, KMeans, PersonaConfig};
use crate::error::Result;
use crate::features::{numeric_columns, to_matrix, FeatureRow};
use crate::metrics::silhouette_score;
use crate::preprocessing::StandardScaler;
use crate::traits::{Transformer, UnsupervisedEstimator};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Silhouette-drop thresholds for the leave-one-out verdicts.
const CRITICAL_DROP: f32 = 0.05;
const HELPFUL_DROP: f32 = 0.01;
const HARMFUL_DROP: f32 = -0.03;

/// Minimum silhouette advantage before suggesting a different k or combo.
const MATERIAL_GAIN: f32 = 0.02;

/// Silhouette below which every tested k counts as weak separation.
const WEAK_SILHOUETTE: f32 = 0.5;

/// How much a single feature matters to the clustering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureVerdict {
    /// Removing it costs more than 0.05 silhouette.
    Critical,
    /// Removing it costs more than 0.01 silhouette.
    Helpful,
    /// No measurable effect either way.
    Neutral,
    /// The clustering is better off without it.
    Harmful,
}

impl FeatureVerdict {
    /// Classifies a silhouette delta: positive means the feature helps.
    #[must_use]
    pub fn from_delta(delta: f32) -> Self {
        if delta > CRITICAL_DROP {
            FeatureVerdict::Critical
        } else if delta > HELPFUL_DROP {
            FeatureVerdict::Helpful
        } else if delta < HARMFUL_DROP {
            FeatureVerdict::Harmful
        } else {
            FeatureVerdict::Neutral
        }
    }
}

/// Leave-one-out or add-one-in measurement for a single feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureImpact {
    /// Feature name.
    pub feature: String,
    /// Verdict from the silhouette delta.
    pub verdict: FeatureVerdict,
    /// Silhouette contribution: baseline minus leave-one-out silhouette for
    /// selected features, add-one-in minus baseline for candidates. Positive
    /// means the feature helps.
    pub silhouette_delta: f32,
}

/// One canned alternative feature subset, silhouette-scored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComboStrategy {
    /// Strategy name.
    pub name: String,
    /// Features in the subset.
    pub features: Vec<String>,
    /// Mean silhouette when clustering on this subset.
    pub silhouette: f32,
}

/// Business-readable profile of one cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterProfile {
    /// Cluster id.
    pub cluster: usize,
    /// Archetype label from the clustering result.
    pub label: String,
    /// Features where this centroid sits high relative to the others.
    pub high_features: Vec<String>,
    /// Features where this centroid sits low relative to the others.
    pub low_features: Vec<String>,
    /// Short textual summary.
    pub description: String,
}

/// A single actionable suggestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Recommendation {
    /// The elbow sweep found a materially better k.
    AdjustK {
        /// Suggested cluster count.
        suggested_k: usize,
        /// Silhouette at the suggested k.
        silhouette: f32,
    },
    /// A selected feature hurts separation.
    DropFeature {
        /// Feature to drop.
        feature: String,
        /// Silhouette delta attributed to it.
        silhouette_delta: f32,
    },
    /// An unselected feature would improve separation.
    AddFeature {
        /// Feature to add.
        feature: String,
        /// Silhouette gain from adding it.
        silhouette_delta: f32,
    },
    /// A canned combo beats the current selection.
    SwitchCombo {
        /// Combo name.
        name: String,
        /// Silhouette of the combo.
        silhouette: f32,
    },
    /// Separation is weak everywhere; hard assignment may be the wrong tool.
    ConsiderSoftClustering {
        /// Best silhouette seen across the sweep.
        best_silhouette: f32,
    },
    /// Nothing better was found; the current setup is fine to ship.
    AcceptAndProceed,
}

/// Overall quality band from the baseline silhouette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    /// Silhouette at least 0.7.
    Excellent,
    /// Silhouette at least 0.5.
    Good,
    /// Silhouette at least 0.25.
    Fair,
    /// Anything below.
    Poor,
}

impl QualityTier {
    /// Bands a silhouette value.
    #[must_use]
    pub fn from_silhouette(silhouette: f32) -> Self {
        if silhouette >= 0.7 {
            QualityTier::Excellent
        } else if silhouette >= 0.5 {
            QualityTier::Good
        } else if silhouette >= 0.25 {
            QualityTier::Fair
        } else {
            QualityTier::Poor
        }
    }
}

/// Full diagnosis of one clustering run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDiagnosis {
    /// Overall quality band.
    pub quality: QualityTier,
    /// Baseline silhouette of the diagnosed clustering.
    pub silhouette: f32,
    /// Best silhouette seen in the elbow sweep.
    pub best_sweep_silhouette: f32,
    /// Leave-one-out verdicts for the selected features.
    pub feature_verdicts: Vec<FeatureImpact>,
    /// Add-one-in measurements for unselected candidate features.
    pub candidate_features: Vec<FeatureImpact>,
    /// Canned combos, best silhouette first.
    pub combos: Vec<ComboStrategy>,
    /// Per-cluster profiles.
    pub profiles: Vec<ClusterProfile>,
    /// Priority-ordered suggestions.
    pub recommendations: Vec<Recommendation>,
}

/// Re-runs the standardize-and-cluster pipeline on a feature subset and
/// returns the mean silhouette. The log1p column set is carried over by
/// feature name.
fn silhouette_for_features(
    rows: &[FeatureRow],
    features: &[String],
    k: usize,
    config: &PersonaConfig,
) -> Result<f32> {
    let log1p_names: Vec<&String> = config
        .log1p_columns
        .iter()
        .filter_map(|&i| config.features.get(i))
        .collect();
    let log1p_columns: Vec<usize> = features
        .iter()
        .enumerate()
        .filter(|(_, name)| log1p_names.contains(name))
        .map(|(i, _)| i)
        .collect();

    let raw = to_matrix(rows, features)?;
    let mut scaler = StandardScaler::new().with_log1p_columns(log1p_columns);
    let scaled = scaler.fit_transform(&raw)?;

    let mut kmeans = KMeans::new(k)
        .with_max_iter(config.max_iter)
        .with_n_init(config.n_restarts);
    if let Some(seed) = config.random_state {
        kmeans = kmeans.with_random_state(seed);
    }
    kmeans.fit(&scaled)?;

    Ok(silhouette_score(&scaled, kmeans.labels()))
}

/// The four canned combos, filtered to columns actually present in the data.
fn canned_combos(available: &[String]) -> Vec<(String, Vec<String>)> {
    let behavioral = [
        "distinct_resource_types",
        "distinct_resource_names",
        "distinct_folders",
        "mean_hour",
        "span_hours",
    ];
    let volume = ["event_count", "export_count"];

    let pick = |pred: &dyn Fn(&str) -> bool| -> Vec<String> {
        available.iter().filter(|c| pred(c)).cloned().collect()
    };

    vec![
        ("all features".to_string(), available.to_vec()),
        (
            "ratios only".to_string(),
            pick(&|c| c.ends_with("_ratio")),
        ),
        (
            "behavioral only".to_string(),
            pick(&|c| behavioral.contains(&c)),
        ),
        ("volume only".to_string(), pick(&|c| volume.contains(&c))),
    ]
}

fn build_profiles(clustering: &ClusteringResult) -> Vec<ClusterProfile> {
    let positions = normalized_positions(&clustering.centroids);
    (0..clustering.k)
        .map(|c| {
            let mut high_features = Vec::new();
            let mut low_features = Vec::new();
            for (j, name) in clustering.feature_names.iter().enumerate() {
                let pos = positions.get(c, j);
                if pos > 0.7 {
                    high_features.push(name.clone());
                } else if pos < 0.3 {
                    low_features.push(name.clone());
                }
            }

            let label = clustering.labels[c].clone();
            let description = match (high_features.is_empty(), low_features.is_empty()) {
                (true, true) => format!("{label}: mid-range on every feature"),
                (false, true) => format!("{label}: high {}", high_features.join(", ")),
                (true, false) => format!("{label}: low {}", low_features.join(", ")),
                (false, false) => format!(
                    "{label}: high {}; low {}",
                    high_features.join(", "),
                    low_features.join(", ")
                ),
            };

            ClusterProfile {
                cluster: c,
                label,
                high_features,
                low_features,
                description,
            }
        })
        .collect()
}

/// Diagnoses a clustering run against its input rows and elbow sweep.
///
/// # Errors
///
/// Returns `EmptyDataset` on no rows or `InvalidConfig` if a selected
/// feature column is missing or categorical.
pub fn diagnose_model(
    rows: &[FeatureRow],
    clustering: &ClusteringResult,
    elbow: &[ElbowPoint],
    config: &PersonaConfig,
) -> Result<ModelDiagnosis> {
    let k = clustering.k;
    let baseline = silhouette_for_features(rows, &config.features, k, config)?;
    debug!(k, baseline, "diagnosis baseline");

    // Leave-one-out over the selected features
    let mut feature_verdicts = Vec::new();
    for feature in &config.features {
        if config.features.len() < 2 {
            break;
        }
        let subset: Vec<String> = config
            .features
            .iter()
            .filter(|f| *f != feature)
            .cloned()
            .collect();
        let without = silhouette_for_features(rows, &subset, k, config)?;
        let delta = baseline - without;
        feature_verdicts.push(FeatureImpact {
            feature: feature.clone(),
            verdict: FeatureVerdict::from_delta(delta),
            silhouette_delta: delta,
        });
    }

    // Add-one-in over every numeric column not already selected
    let available = numeric_columns(rows);
    let mut candidate_features = Vec::new();
    for feature in &available {
        if config.features.contains(feature) {
            continue;
        }
        let mut extended = config.features.clone();
        extended.push(feature.clone());
        let with = silhouette_for_features(rows, &extended, k, config)?;
        let delta = with - baseline;
        candidate_features.push(FeatureImpact {
            feature: feature.clone(),
            verdict: FeatureVerdict::from_delta(delta),
            silhouette_delta: delta,
        });
    }

    // Canned combos, best first
    let mut combos = Vec::new();
    for (name, features) in canned_combos(&available) {
        if features.is_empty() || features == config.features {
            continue;
        }
        let silhouette = silhouette_for_features(rows, &features, k, config)?;
        combos.push(ComboStrategy {
            name,
            features,
            silhouette,
        });
    }
    combos.sort_by(|a, b| {
        b.silhouette
            .partial_cmp(&a.silhouette)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let profiles = build_profiles(clustering);

    // Recommendations, highest priority first
    let mut recommendations = Vec::new();

    let best_elbow = elbow.iter().max_by(|a, b| {
        a.silhouette
            .partial_cmp(&b.silhouette)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let best_sweep_silhouette = best_elbow.map_or(baseline, |p| p.silhouette.max(baseline));

    if let Some(best) = best_elbow {
        if best.k != k && best.silhouette > baseline + MATERIAL_GAIN {
            recommendations.push(Recommendation::AdjustK {
                suggested_k: best.k,
                silhouette: best.silhouette,
            });
        }
    }

    for impact in &feature_verdicts {
        if impact.verdict == FeatureVerdict::Harmful {
            recommendations.push(Recommendation::DropFeature {
                feature: impact.feature.clone(),
                silhouette_delta: impact.silhouette_delta,
            });
        }
    }

    for impact in &candidate_features {
        if matches!(
            impact.verdict,
            FeatureVerdict::Critical | FeatureVerdict::Helpful
        ) {
            recommendations.push(Recommendation::AddFeature {
                feature: impact.feature.clone(),
                silhouette_delta: impact.silhouette_delta,
            });
        }
    }

    if let Some(best_combo) = combos.first() {
        if best_combo.silhouette > baseline + MATERIAL_GAIN {
            recommendations.push(Recommendation::SwitchCombo {
                name: best_combo.name.clone(),
                silhouette: best_combo.silhouette,
            });
        }
    }

    let all_weak = baseline < WEAK_SILHOUETTE
        && elbow.iter().all(|p| p.silhouette < WEAK_SILHOUETTE);
    if all_weak {
        recommendations.push(Recommendation::ConsiderSoftClustering {
            best_silhouette: best_sweep_silhouette,
        });
    }

    if recommendations.is_empty() {
        recommendations.push(Recommendation::AcceptAndProceed);
    }

    Ok(ModelDiagnosis {
        quality: QualityTier::from_silhouette(baseline),
        silhouette: baseline,
        best_sweep_silhouette,
        feature_verdicts,
        candidate_features,
        combos,
        profiles,
        recommendations,
    })
}

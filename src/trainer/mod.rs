//! Supervised training orchestration.
//!
//! Validates a [`TrainingConfig`], splits rows into train/test partitions,
//! standardizes features on the training rows only, fits either a softmax
//! regression or a decision tree, and evaluates on the held-out rows.
//! Training returns an explicit [`TrainedModel`] handle; there is no global
//! "current model" state, so independent runs never share anything.

use crate::classification::SoftmaxRegression;
use crate::error::{PerfilarError, Result};
use crate::features::{to_matrix, FeatureRow};
use crate::metrics::classification::{
    accuracy, approximate_log_loss, confusion_matrix, macro_f1, macro_precision, macro_recall,
    macro_specificity, matthews_corrcoef,
};
use crate::model_selection::train_test_split;
use crate::preprocessing::StandardScaler;
use crate::primitives::Matrix;
use crate::traits::Transformer;
use crate::tree::{DecisionTreeClassifier, TreeNode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Supported model families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    /// Multinomial logistic regression (softmax/sigmoid output).
    LogisticRegression,
    /// Gini-impurity binary-split decision tree.
    DecisionTree,
}

/// Configuration for one training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Target column name.
    pub target: String,
    /// Ordered feature column names; non-empty and disjoint from the target.
    pub features: Vec<String>,
    /// Which model family to train.
    pub family: ModelFamily,
    /// Held-out fraction in (0, 1).
    pub test_fraction: f32,
    /// Gradient-descent learning rate (logistic only).
    pub learning_rate: f32,
    /// Gradient-descent epoch count (logistic only).
    pub epochs: usize,
    /// Maximum tree depth (tree only).
    pub max_depth: usize,
    /// Seed for the shuffle split and weight initialization.
    pub random_state: Option<u64>,
}

impl TrainingConfig {
    /// Creates a config with default hyperparameters.
    #[must_use]
    pub fn new(target: &str, features: Vec<String>, family: ModelFamily) -> Self {
        Self {
            target: target.to_string(),
            features,
            family,
            test_fraction: 0.2,
            learning_rate: 0.1,
            epochs: 300,
            max_depth: 5,
            random_state: None,
        }
    }

    /// Sets the held-out fraction.
    #[must_use]
    pub fn with_test_fraction(mut self, fraction: f32) -> Self {
        self.test_fraction = fraction;
        self
    }

    /// Sets the learning rate.
    #[must_use]
    pub fn with_learning_rate(mut self, lr: f32) -> Self {
        self.learning_rate = lr;
        self
    }

    /// Sets the epoch count.
    #[must_use]
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    /// Sets the maximum tree depth.
    #[must_use]
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Sets the random seed for reproducible runs.
    #[must_use]
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    fn validate(&self, rows: &[FeatureRow]) -> Result<()> {
        if rows.is_empty() {
            return Err(PerfilarError::empty_dataset("training"));
        }
        if self.features.is_empty() {
            return Err(PerfilarError::invalid_config(
                "features",
                "[]",
                "must be non-empty",
            ));
        }
        if self.features.contains(&self.target) {
            return Err(PerfilarError::invalid_config(
                "target",
                &self.target,
                "must be disjoint from the feature list",
            ));
        }
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(PerfilarError::invalid_config(
                "test_fraction",
                self.test_fraction,
                "must be in (0, 1)",
            ));
        }
        if rows.iter().any(|r| !r.values.contains_key(&self.target)) {
            return Err(PerfilarError::invalid_config(
                "target",
                &self.target,
                "must be present in every row",
            ));
        }
        Ok(())
    }
}

/// Trained logistic regression model with its fit-time scaling statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticModel {
    /// The fitted classifier (weights `[classes x features]`, biases).
    pub classifier: SoftmaxRegression,
    /// Sorted class-label list; row c of the weight matrix scores classes[c].
    pub classes: Vec<String>,
    /// Scaler holding the per-feature mean/std computed on the train rows.
    pub scaler: StandardScaler,
    /// Feature name order the model was fit with.
    pub feature_names: Vec<String>,
}

/// Trained decision tree model with its fit-time scaling statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTreeModel {
    /// The fitted tree.
    pub classifier: DecisionTreeClassifier,
    /// Sorted class-label list.
    pub classes: Vec<String>,
    /// Scaler holding the per-feature mean/std computed on the train rows.
    pub scaler: StandardScaler,
    /// Feature name order the model was fit with.
    pub feature_names: Vec<String>,
}

/// A trained model handle.
///
/// The stored scaler statistics are part of the model's identity: every
/// prediction re-applies them verbatim and nothing is recomputed per call.
/// All variants serialize as plain nested records, so a handle round-trips
/// through a flat persistence layer (see [`TrainedModel::to_json`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum TrainedModel {
    /// Logistic regression variant.
    LogisticRegression(LogisticModel),
    /// Decision tree variant.
    DecisionTree(DecisionTreeModel),
}

/// A single prediction: class label plus per-class probabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    /// Predicted class label.
    pub label: String,
    /// Per-class probabilities, in class-label order; sums to 1.
    pub probabilities: Vec<(String, f32)>,
}

/// Evaluation record for one training run. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingResult {
    /// Test-set accuracy.
    pub accuracy: f32,
    /// Train-set accuracy; a large gap above `accuracy` signals overfitting.
    pub train_accuracy: f32,
    /// Macro-averaged precision.
    pub precision: f32,
    /// Macro-averaged recall.
    pub recall: f32,
    /// Macro-averaged specificity.
    pub specificity: f32,
    /// Macro-averaged F1.
    pub f1: f32,
    /// Approximate log-loss from confusion-matrix proportions.
    pub log_loss: f32,
    /// Matthews correlation coefficient.
    pub mcc: f32,
    /// Confusion matrix over the sorted class list (rows actual, cols predicted).
    pub confusion: Matrix<usize>,
    /// Sorted class labels indexing the confusion matrix.
    pub classes: Vec<String>,
    /// Per-feature importance; sums to 1 when any importance is nonzero.
    pub feature_importance: Vec<(String, f32)>,
    /// Per-epoch training loss (empty for trees).
    pub loss_history: Vec<f32>,
    /// Number of training rows.
    pub n_train: usize,
    /// Number of held-out rows.
    pub n_test: usize,
    /// User ids of the training rows.
    pub train_members: Vec<String>,
    /// User ids of the held-out rows.
    pub test_members: Vec<String>,
    /// When the run finished.
    pub trained_at: DateTime<Utc>,
    /// The config used.
    pub config: TrainingConfig,
}

/// Extracts target labels and the sorted distinct class list.
fn extract_targets(rows: &[FeatureRow], target: &str) -> (Vec<String>, Vec<usize>) {
    let raw: Vec<String> = rows
        .iter()
        .map(|r| {
            r.values
                .get(target)
                .map(crate::features::FeatureValue::label_string)
                .unwrap_or_default()
        })
        .collect();

    let mut classes: Vec<String> = raw.clone();
    classes.sort();
    classes.dedup();

    let indices = raw
        .iter()
        .map(|label| classes.iter().position(|c| c == label).unwrap_or(0))
        .collect();

    (classes, indices)
}

/// Trains a model and evaluates it on a held-out split.
///
/// Returns the reusable model handle together with the evaluation record.
///
/// # Errors
///
/// Returns `EmptyDataset` for zero rows and `InvalidConfig` for a bad
/// config (empty feature list, target in features or absent from the data,
/// held-out fraction outside (0, 1), non-numeric feature columns).
pub fn train(rows: &[FeatureRow], config: &TrainingConfig) -> Result<(TrainedModel, TrainingResult)> {
    config.validate(rows)?;

    let x = to_matrix(rows, &config.features)?;
    let (classes, y) = extract_targets(rows, &config.target);

    if classes.len() < 2 {
        return Err(PerfilarError::invalid_config(
            "target",
            &config.target,
            "must have at least 2 distinct classes",
        ));
    }

    let split = train_test_split(rows.len(), config.test_fraction, config.random_state)?;
    debug!(
        n_train = split.train_indices.len(),
        n_test = split.test_indices.len(),
        n_classes = classes.len(),
        family = ?config.family,
        "training model"
    );

    let x_train = x.select_rows(&split.train_indices);
    let x_test = x.select_rows(&split.test_indices);
    let y_train: Vec<usize> = split.train_indices.iter().map(|&i| y[i]).collect();
    let y_test: Vec<usize> = split.test_indices.iter().map(|&i| y[i]).collect();

    // Normalization statistics come from the train rows only
    let mut scaler = StandardScaler::new();
    let x_train_scaled = scaler.fit_transform(&x_train)?;
    let x_test_scaled = scaler.transform(&x_test)?;

    let n_classes = classes.len();
    let (model, train_predictions, test_predictions, importance, loss_history) =
        match config.family {
            ModelFamily::LogisticRegression => {
                let mut classifier = SoftmaxRegression::new(n_classes)
                    .with_learning_rate(config.learning_rate)
                    .with_epochs(config.epochs);
                if let Some(seed) = config.random_state {
                    classifier = classifier.with_random_state(seed);
                }
                classifier.fit(&x_train_scaled, &y_train)?;

                let train_predictions = classifier.predict(&x_train_scaled);
                let test_predictions = classifier.predict(&x_test_scaled);
                let importance = logistic_importance(&classifier, config.features.len());
                let loss_history = classifier.loss_history().to_vec();

                let model = TrainedModel::LogisticRegression(LogisticModel {
                    classifier,
                    classes: classes.clone(),
                    scaler,
                    feature_names: config.features.clone(),
                });
                (
                    model,
                    train_predictions,
                    test_predictions,
                    importance,
                    loss_history,
                )
            }
            ModelFamily::DecisionTree => {
                let mut classifier =
                    DecisionTreeClassifier::new(n_classes).with_max_depth(config.max_depth);
                classifier.fit(&x_train_scaled, &y_train)?;

                let train_predictions = classifier.predict(&x_train_scaled);
                let test_predictions = classifier.predict(&x_test_scaled);
                let importance = classifier.feature_importances().to_vec();

                let model = TrainedModel::DecisionTree(DecisionTreeModel {
                    classifier,
                    classes: classes.clone(),
                    scaler,
                    feature_names: config.features.clone(),
                });
                (model, train_predictions, test_predictions, importance, Vec::new())
            }
        };

    let confusion = confusion_matrix(&test_predictions, &y_test, n_classes);
    let feature_importance = config
        .features
        .iter()
        .cloned()
        .zip(importance.iter().copied())
        .collect();

    let result = TrainingResult {
        accuracy: accuracy(&test_predictions, &y_test),
        train_accuracy: accuracy(&train_predictions, &y_train),
        precision: macro_precision(&confusion),
        recall: macro_recall(&confusion),
        specificity: macro_specificity(&confusion),
        f1: macro_f1(&confusion),
        log_loss: approximate_log_loss(&confusion),
        mcc: matthews_corrcoef(&confusion),
        confusion,
        classes,
        feature_importance,
        loss_history,
        n_train: split.train_indices.len(),
        n_test: split.test_indices.len(),
        train_members: split
            .train_indices
            .iter()
            .map(|&i| rows[i].user_id.clone())
            .collect(),
        test_members: split
            .test_indices
            .iter()
            .map(|&i| rows[i].user_id.clone())
            .collect(),
        trained_at: Utc::now(),
        config: config.clone(),
    };

    Ok((model, result))
}

/// Mean absolute weight per feature across classes, normalized to sum to 1.
fn logistic_importance(classifier: &SoftmaxRegression, n_features: usize) -> Vec<f32> {
    let weights = classifier.weights();
    let (n_classes, _) = weights.shape();

    let mut importance: Vec<f32> = (0..n_features)
        .map(|j| {
            (0..n_classes)
                .map(|c| weights.get(c, j).abs())
                .sum::<f32>()
                / n_classes as f32
        })
        .collect();

    let total: f32 = importance.iter().sum();
    if total > 0.0 {
        for v in &mut importance {
            *v /= total;
        }
    }
    importance
}

impl TrainedModel {
    /// Sorted class labels of this model.
    #[must_use]
    pub fn classes(&self) -> &[String] {
        match self {
            TrainedModel::LogisticRegression(m) => &m.classes,
            TrainedModel::DecisionTree(m) => &m.classes,
        }
    }

    /// Feature name order this model was fit with.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        match self {
            TrainedModel::LogisticRegression(m) => &m.feature_names,
            TrainedModel::DecisionTree(m) => &m.feature_names,
        }
    }

    /// Root of the decision tree, if this is a tree model.
    #[must_use]
    pub fn tree_root(&self) -> Option<&TreeNode> {
        match self {
            TrainedModel::DecisionTree(m) => Some(m.classifier.root()),
            TrainedModel::LogisticRegression(_) => None,
        }
    }

    /// Predicts a class label and per-class probabilities for one row.
    ///
    /// The row must carry every feature the model was fit with; the model's
    /// stored scaling statistics are re-applied before evaluation.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if a required feature is missing or
    /// categorical.
    pub fn predict(&self, row: &FeatureRow) -> Result<Prediction> {
        let (scaler, feature_names, classes) = match self {
            TrainedModel::LogisticRegression(m) => (&m.scaler, &m.feature_names, &m.classes),
            TrainedModel::DecisionTree(m) => (&m.scaler, &m.feature_names, &m.classes),
        };

        let x = to_matrix(std::slice::from_ref(row), feature_names)?;
        let scaled = scaler.transform(&x)?;
        let sample = scaled.row_slice(0);

        let probs = match self {
            TrainedModel::LogisticRegression(m) => m.classifier.predict_proba_one(sample),
            TrainedModel::DecisionTree(m) => m.classifier.predict_proba_one(sample),
        };

        let best = probs
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .map_or(0, |(c, _)| c);

        Ok(Prediction {
            label: classes[best].clone(),
            probabilities: classes.iter().cloned().zip(probs).collect(),
        })
    }

    /// Serializes the model to a JSON blob for persistence.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if encoding fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| PerfilarError::Serialization(e.to_string()))
    }

    /// Restores a model from a JSON blob.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the blob is invalid.
    pub fn from_json(blob: &str) -> Result<Self> {
        serde_json::from_str(blob).map_err(|e| PerfilarError::Serialization(e.to_string()))
    }
}

/// Thin holder for collaborators that restore persisted models.
///
/// Wraps an optional [`TrainedModel`] handle; predicting with nothing
/// loaded is a `ModelNotLoaded` error instead of a panic.
#[derive(Debug, Default)]
pub struct ModelSession {
    model: Option<TrainedModel>,
}

impl ModelSession {
    /// Creates an empty session.
    #[must_use]
    pub fn new() -> Self {
        Self { model: None }
    }

    /// Loads a model handle into the session.
    pub fn load(&mut self, model: TrainedModel) {
        self.model = Some(model);
    }

    /// Clears the session.
    pub fn clear(&mut self) {
        self.model = None;
    }

    /// Returns true if a model is loaded.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    /// Predicts with the loaded model.
    ///
    /// # Errors
    ///
    /// Returns `ModelNotLoaded` if no model is loaded, or any prediction
    /// error from the model itself.
    pub fn predict(&self, row: &FeatureRow) -> Result<Prediction> {
        let model = self.model.as_ref().ok_or(PerfilarError::ModelNotLoaded)?;
        model.predict(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureValue;
    use std::collections::BTreeMap;

    fn make_rows(n: usize) -> Vec<FeatureRow> {
        // Feature x separates the two labels perfectly at x = 5
        (0..n)
            .map(|i| {
                let x = if i % 2 == 0 {
                    (i % 10) as f32 * 0.4 // 0..4
                } else {
                    6.0 + (i % 10) as f32 * 0.3 // 6..9
                };
                let noise = ((i * 37) % 11) as f32 / 11.0;
                let mut values = BTreeMap::new();
                values.insert("x".to_string(), FeatureValue::Numeric(x));
                values.insert("noise".to_string(), FeatureValue::Numeric(noise));
                values.insert(
                    "label".to_string(),
                    FeatureValue::Numeric(if x > 5.0 { 1.0 } else { 0.0 }),
                );
                FeatureRow {
                    user_id: format!("u{i}"),
                    values,
                }
            })
            .collect()
    }

    fn base_config(family: ModelFamily) -> TrainingConfig {
        TrainingConfig::new(
            "label",
            vec!["x".to_string(), "noise".to_string()],
            family,
        )
        .with_random_state(42)
    }

    #[test]
    fn test_tree_perfect_separation() {
        let rows = make_rows(100);
        let config = base_config(ModelFamily::DecisionTree);
        let (model, result) = train(&rows, &config).unwrap();

        assert!((result.accuracy - 1.0).abs() < 1e-6);
        assert_eq!(model.tree_root().unwrap().depth(), 1);
    }

    #[test]
    fn test_logistic_learns_separation() {
        let rows = make_rows(100);
        let config = base_config(ModelFamily::LogisticRegression)
            .with_learning_rate(0.5)
            .with_epochs(500);
        let (_, result) = train(&rows, &config).unwrap();

        assert!(result.accuracy > 0.9, "accuracy {}", result.accuracy);
        assert_eq!(result.loss_history.len(), 500);
    }

    #[test]
    fn test_confusion_matrix_sums_to_test_size() {
        let rows = make_rows(100);
        let config = base_config(ModelFamily::DecisionTree);
        let (_, result) = train(&rows, &config).unwrap();

        let total: usize = result.confusion.as_slice().iter().sum();
        assert_eq!(total, result.n_test);
        assert_eq!(result.test_members.len(), result.n_test);
        assert_eq!(result.train_members.len(), result.n_train);
    }

    #[test]
    fn test_accuracy_recomputable_from_confusion() {
        let rows = make_rows(80);
        let config = base_config(ModelFamily::LogisticRegression);
        let (_, result) = train(&rows, &config).unwrap();

        let n = result.confusion.n_rows();
        let trace: usize = (0..n).map(|i| result.confusion.get(i, i)).sum();
        let total: usize = result.confusion.as_slice().iter().sum();
        let recomputed = trace as f32 / total as f32;
        assert!((recomputed - result.accuracy).abs() < 1e-6);
    }

    #[test]
    fn test_feature_importance_sums_to_one() {
        let rows = make_rows(100);
        for family in [ModelFamily::DecisionTree, ModelFamily::LogisticRegression] {
            let config = base_config(family);
            let (_, result) = train(&rows, &config).unwrap();
            let total: f32 = result.feature_importance.iter().map(|(_, v)| v).sum();
            assert!((total - 1.0).abs() < 1e-5, "{family:?} importance {total}");
        }
    }

    #[test]
    fn test_prediction_probabilities_sum_to_one() {
        let rows = make_rows(60);
        for family in [ModelFamily::DecisionTree, ModelFamily::LogisticRegression] {
            let config = base_config(family);
            let (model, _) = train(&rows, &config).unwrap();

            let prediction = model.predict(&rows[0]).unwrap();
            let total: f32 = prediction.probabilities.iter().map(|(_, p)| p).sum();
            assert!((total - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_zero_variance_feature_trains_without_nan() {
        let mut rows = make_rows(60);
        for row in &mut rows {
            row.values
                .insert("flat".to_string(), FeatureValue::Numeric(3.0));
        }
        let config = TrainingConfig::new(
            "label",
            vec!["x".to_string(), "flat".to_string()],
            ModelFamily::LogisticRegression,
        )
        .with_random_state(42);

        let (_, result) = train(&rows, &config).unwrap();
        assert!(result.loss_history.iter().all(|l| l.is_finite()));
        let flat_importance = result
            .feature_importance
            .iter()
            .find(|(name, _)| name == "flat")
            .map(|(_, v)| *v)
            .unwrap();
        assert!(flat_importance < 0.05, "flat importance {flat_importance}");
    }

    #[test]
    fn test_deterministic_under_seed() {
        let rows = make_rows(100);
        let config = base_config(ModelFamily::LogisticRegression);
        let (_, a) = train(&rows, &config).unwrap();
        let (_, b) = train(&rows, &config).unwrap();
        assert_eq!(a.accuracy, b.accuracy);
        assert_eq!(a.train_members, b.train_members);
        assert_eq!(a.loss_history, b.loss_history);
    }

    #[test]
    fn test_invalid_configs() {
        let rows = make_rows(20);

        let empty_features =
            TrainingConfig::new("label", vec![], ModelFamily::DecisionTree);
        assert!(train(&rows, &empty_features).is_err());

        let target_in_features = TrainingConfig::new(
            "label",
            vec!["label".to_string()],
            ModelFamily::DecisionTree,
        );
        assert!(train(&rows, &target_in_features).is_err());

        let bad_fraction = base_config(ModelFamily::DecisionTree).with_test_fraction(1.5);
        assert!(train(&rows, &bad_fraction).is_err());

        let missing_target =
            TrainingConfig::new("absent", vec!["x".to_string()], ModelFamily::DecisionTree);
        assert!(train(&rows, &missing_target).is_err());
    }

    #[test]
    fn test_empty_rows_error() {
        let config = base_config(ModelFamily::DecisionTree);
        assert!(matches!(
            train(&[], &config),
            Err(PerfilarError::EmptyDataset { .. })
        ));
    }

    #[test]
    fn test_model_blob_round_trip() {
        let rows = make_rows(60);
        let config = base_config(ModelFamily::DecisionTree);
        let (model, _) = train(&rows, &config).unwrap();

        let blob = model.to_json().unwrap();
        let restored = TrainedModel::from_json(&blob).unwrap();

        let a = model.predict(&rows[3]).unwrap();
        let b = restored.predict(&rows[3]).unwrap();
        assert_eq!(a.label, b.label);
        assert_eq!(a.probabilities, b.probabilities);
    }

    #[test]
    fn test_session_not_loaded() {
        let session = ModelSession::new();
        let rows = make_rows(4);
        assert!(matches!(
            session.predict(&rows[0]),
            Err(PerfilarError::ModelNotLoaded)
        ));
    }

    #[test]
    fn test_session_load_and_predict() {
        let rows = make_rows(60);
        let config = base_config(ModelFamily::DecisionTree);
        let (model, _) = train(&rows, &config).unwrap();

        let mut session = ModelSession::new();
        session.load(model);
        assert!(session.is_loaded());
        assert!(session.predict(&rows[0]).is_ok());
    }
}

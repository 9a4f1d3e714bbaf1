//! Convenience re-exports for common usage.
//!
//! # Usage
//!
//! ```
//! use perfilar::prelude::*;
//! ```

pub use crate::cluster::{
    compute_elbow_data, run_persona_clustering, ClusteringResult, ElbowPoint, KMeans,
    PersonaAssignment, PersonaConfig,
};
pub use crate::diagnosis::{
    diagnose_model, FeatureVerdict, ModelDiagnosis, QualityTier, Recommendation,
};
pub use crate::error::{PerfilarError, Result};
pub use crate::features::{
    assign_percentile_labels, build_user_features, FeatureRow, FeatureValue, RawEvent,
};
pub use crate::metrics::{inertia, silhouette_score};
pub use crate::model_selection::train_test_split;
pub use crate::preprocessing::StandardScaler;
pub use crate::primitives::{Matrix, Vector};
pub use crate::trainer::{
    train, ModelFamily, ModelSession, Prediction, TrainedModel, TrainingConfig, TrainingResult,
};
pub use crate::traits::{Transformer, UnsupervisedEstimator};
pub use crate::tree::DecisionTreeClassifier;

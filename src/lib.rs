//! Perfilar: behavioral segmentation and model training engine in pure Rust.
//!
//! Perfilar turns raw per-event usage logs into per-user feature rows, trains
//! supervised classifiers (softmax regression, decision trees) with held-out
//! evaluation, clusters users into labeled personas with K-Means++, and
//! diagnoses clustering quality with actionable recommendations.
//!
//! # Quick Start
//!
//! ```
//! use perfilar::prelude::*;
//!
//! // Two clear behavioral groups
//! let data = Matrix::from_vec(6, 2, vec![
//!     1.0, 0.1, 2.0, 0.2, 1.5, 0.1,
//!     40.0, 0.9, 45.0, 0.8, 42.0, 0.9,
//! ]).unwrap();
//!
//! let mut kmeans = KMeans::new(2).with_random_state(42);
//! kmeans.fit(&data).unwrap();
//! assert_eq!(kmeans.labels().len(), 6);
//! ```
//!
//! # Modules
//!
//! - [`primitives`]: Core Vector and Matrix types
//! - [`features`]: Feature building from raw event logs
//! - [`preprocessing`]: Data transformers (standard scaler with log1p support)
//! - [`model_selection`]: Train/test splitting
//! - [`classification`]: Softmax regression
//! - [`tree`]: Decision tree classifiers
//! - [`trainer`]: Training orchestration, model handles, prediction sessions
//! - [`cluster`]: K-Means, persona segmentation, elbow sweep
//! - [`diagnosis`]: Clustering quality diagnosis and recommendations
//! - [`metrics`]: Evaluation metrics
//!
//! Data flows strictly downward: features feed the trainer and the cluster
//! pipeline; the diagnosis layer consumes clustering output and never
//! mutates it.

pub mod classification;
pub mod cluster;
pub mod diagnosis;
pub mod error;
pub mod features;
pub mod metrics;
pub mod model_selection;
pub mod prelude;
pub mod preprocessing;
pub mod primitives;
pub mod trainer;
pub mod traits;
pub mod tree;

pub use error::{PerfilarError, Result};

//! Error types for Perfilar operations.
//!
//! Provides rich error context for library consumers.

use std::fmt;

/// Main error type for Perfilar operations.
///
/// Covers dataset problems, invalid training/clustering configuration,
/// missing model handles, and dimension mismatches.
///
/// # Examples
///
/// ```
/// use perfilar::error::PerfilarError;
///
/// let err = PerfilarError::InvalidConfig {
///     param: "test_fraction".to_string(),
///     value: "1.5".to_string(),
///     constraint: "must be in (0, 1)".to_string(),
/// };
/// assert!(err.to_string().contains("test_fraction"));
/// ```
#[derive(Debug)]
pub enum PerfilarError {
    /// Zero rows supplied to feature building, training, or clustering.
    EmptyDataset {
        /// Which operation received the empty input
        context: String,
    },

    /// Invalid training or clustering configuration.
    InvalidConfig {
        /// Parameter name
        param: String,
        /// Provided value
        value: String,
        /// Constraint description
        constraint: String,
    },

    /// Prediction requested with no trained model handle loaded.
    ModelNotLoaded,

    /// Matrix/vector dimensions don't match for the operation.
    DimensionMismatch {
        /// Expected dimensions description
        expected: String,
        /// Actual dimensions found
        actual: String,
    },

    /// Serialization/deserialization error.
    Serialization(String),

    /// Generic error with string message.
    Other(String),
}

impl fmt::Display for PerfilarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PerfilarError::EmptyDataset { context } => {
                write!(f, "Empty dataset: {context}")
            }
            PerfilarError::InvalidConfig {
                param,
                value,
                constraint,
            } => {
                write!(f, "Invalid config: {param} = {value}, {constraint}")
            }
            PerfilarError::ModelNotLoaded => {
                write!(f, "No trained model loaded. Train or load a model first.")
            }
            PerfilarError::DimensionMismatch { expected, actual } => {
                write!(f, "Dimension mismatch: expected {expected}, got {actual}")
            }
            PerfilarError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            PerfilarError::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for PerfilarError {}

impl From<&str> for PerfilarError {
    fn from(msg: &str) -> Self {
        PerfilarError::Other(msg.to_string())
    }
}

impl From<String> for PerfilarError {
    fn from(msg: String) -> Self {
        PerfilarError::Other(msg)
    }
}

impl PerfilarError {
    /// Create an empty-dataset error with context.
    #[must_use]
    pub fn empty_dataset(context: &str) -> Self {
        Self::EmptyDataset {
            context: context.to_string(),
        }
    }

    /// Create an invalid-config error with descriptive context.
    #[must_use]
    pub fn invalid_config(param: &str, value: impl fmt::Display, constraint: &str) -> Self {
        Self::InvalidConfig {
            param: param.to_string(),
            value: value.to_string(),
            constraint: constraint.to_string(),
        }
    }

    /// Create a dimension mismatch error with descriptive context.
    #[must_use]
    pub fn dimension_mismatch(context: &str, expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch {
            expected: format!("{context}={expected}"),
            actual: format!("{actual}"),
        }
    }
}

/// Convenience type alias for Results.
pub type Result<T> = std::result::Result<T, PerfilarError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_dataset_display() {
        let err = PerfilarError::empty_dataset("feature building");
        assert!(err.to_string().contains("Empty dataset"));
        assert!(err.to_string().contains("feature building"));
    }

    #[test]
    fn test_invalid_config_display() {
        let err = PerfilarError::invalid_config("features", "[]", "must be non-empty");
        assert!(err.to_string().contains("features"));
        assert!(err.to_string().contains("non-empty"));
    }

    #[test]
    fn test_model_not_loaded_display() {
        let err = PerfilarError::ModelNotLoaded;
        assert!(err.to_string().contains("No trained model"));
    }

    #[test]
    fn test_from_str() {
        let err: PerfilarError = "something went wrong".into();
        assert_eq!(err.to_string(), "something went wrong");
    }

    #[test]
    fn test_dimension_mismatch_helper() {
        let err = PerfilarError::dimension_mismatch("n_features", 8, 5);
        assert!(err.to_string().contains("n_features=8"));
        assert!(err.to_string().contains('5'));
    }
}

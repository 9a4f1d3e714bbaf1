//! Data transformers.
//!
//! Includes a `StandardScaler` with optional log1p pre-transform for
//! heavy-tailed columns. Fit-time statistics are stored on the scaler and
//! reused verbatim for every later transform; they are part of the identity
//! of any model trained on the scaled data.

use crate::error::{PerfilarError, Result};
use crate::primitives::Matrix;
use crate::traits::Transformer;
use serde::{Deserialize, Serialize};

/// Standardizes features to zero mean and unit variance.
///
/// Columns listed in `log1p_columns` are transformed with `ln(1 + x)` before
/// the mean/std are computed, which tames heavy-tailed count distributions.
/// Zero-variance columns get a standard deviation of 1 so transforming them
/// never divides by zero.
///
/// # Examples
///
/// ```
/// use perfilar::preprocessing::StandardScaler;
/// use perfilar::prelude::*;
///
/// let x = Matrix::from_vec(3, 1, vec![1.0, 2.0, 3.0]).unwrap();
/// let mut scaler = StandardScaler::new();
/// let scaled = scaler.fit_transform(&x).unwrap();
/// let mean: f32 = (0..3).map(|i| scaled.get(i, 0)).sum::<f32>() / 3.0;
/// assert!(mean.abs() < 1e-6);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    /// Mean of each feature (computed during fit).
    mean: Option<Vec<f32>>,
    /// Standard deviation of each feature (computed during fit).
    std: Option<Vec<f32>>,
    /// Column indices receiving a log1p transform before standardization.
    log1p_columns: Vec<usize>,
}

impl Default for StandardScaler {
    fn default() -> Self {
        Self::new()
    }
}

impl StandardScaler {
    /// Creates a new `StandardScaler`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            mean: None,
            std: None,
            log1p_columns: Vec::new(),
        }
    }

    /// Sets the columns that get a log1p transform before standardization.
    #[must_use]
    pub fn with_log1p_columns(mut self, columns: Vec<usize>) -> Self {
        self.log1p_columns = columns;
        self
    }

    /// Returns the mean of each feature.
    ///
    /// # Panics
    ///
    /// Panics if the scaler is not fitted.
    #[must_use]
    pub fn mean(&self) -> &[f32] {
        self.mean
            .as_ref()
            .expect("Scaler not fitted. Call fit() first.")
    }

    /// Returns the standard deviation of each feature.
    ///
    /// # Panics
    ///
    /// Panics if the scaler is not fitted.
    #[must_use]
    pub fn std(&self) -> &[f32] {
        self.std
            .as_ref()
            .expect("Scaler not fitted. Call fit() first.")
    }

    /// Returns true if the scaler has been fitted.
    #[must_use]
    pub fn is_fitted(&self) -> bool {
        self.mean.is_some()
    }

    fn is_log1p(&self, col: usize) -> bool {
        self.log1p_columns.contains(&col)
    }

    /// Applies the pre-transform (log1p where configured) to one value.
    fn pre_transform(&self, col: usize, val: f32) -> f32 {
        if self.is_log1p(col) {
            val.ln_1p()
        } else {
            val
        }
    }

    /// Transforms data back to original units, reversing standardization and
    /// any log1p pre-transform.
    ///
    /// # Errors
    ///
    /// Returns an error if the scaler is not fitted or dimensions mismatch.
    pub fn inverse_transform(&self, x: &Matrix<f32>) -> Result<Matrix<f32>> {
        let mean = self
            .mean
            .as_ref()
            .ok_or_else(|| PerfilarError::from("Scaler not fitted"))?;
        let std = self
            .std
            .as_ref()
            .ok_or_else(|| PerfilarError::from("Scaler not fitted"))?;

        let (n_samples, n_features) = x.shape();
        if n_features != mean.len() {
            return Err(PerfilarError::dimension_mismatch(
                "n_features",
                mean.len(),
                n_features,
            ));
        }

        let mut result = vec![0.0; n_samples * n_features];

        for i in 0..n_samples {
            for j in 0..n_features {
                let mut val = x.get(i, j) * std[j] + mean[j];
                if self.is_log1p(j) {
                    val = val.exp_m1();
                }
                result[i * n_features + j] = val;
            }
        }

        Matrix::from_vec(n_samples, n_features, result).map_err(Into::into)
    }
}

impl Transformer for StandardScaler {
    /// Computes the mean and standard deviation of each feature.
    fn fit(&mut self, x: &Matrix<f32>) -> Result<()> {
        let (n_samples, n_features) = x.shape();

        if n_samples == 0 {
            return Err(PerfilarError::empty_dataset("scaler fit"));
        }

        let mut mean = vec![0.0; n_features];
        for (j, mean_j) in mean.iter_mut().enumerate() {
            let mut sum = 0.0;
            for i in 0..n_samples {
                sum += self.pre_transform(j, x.get(i, j));
            }
            *mean_j = sum / n_samples as f32;
        }

        let mut std = vec![0.0; n_features];
        for (j, std_j) in std.iter_mut().enumerate() {
            let mut sum_sq = 0.0;
            for i in 0..n_samples {
                let diff = self.pre_transform(j, x.get(i, j)) - mean[j];
                sum_sq += diff * diff;
            }
            // Population std; zero-variance columns get std 1
            let raw = (sum_sq / n_samples as f32).sqrt();
            *std_j = if raw > 1e-10 { raw } else { 1.0 };
        }

        self.mean = Some(mean);
        self.std = Some(std);

        Ok(())
    }

    /// Standardizes the data using fitted mean and std.
    fn transform(&self, x: &Matrix<f32>) -> Result<Matrix<f32>> {
        let mean = self
            .mean
            .as_ref()
            .ok_or_else(|| PerfilarError::from("Scaler not fitted"))?;
        let std = self
            .std
            .as_ref()
            .ok_or_else(|| PerfilarError::from("Scaler not fitted"))?;

        let (n_samples, n_features) = x.shape();
        if n_features != mean.len() {
            return Err(PerfilarError::dimension_mismatch(
                "n_features",
                mean.len(),
                n_features,
            ));
        }

        let mut result = vec![0.0; n_samples * n_features];

        for i in 0..n_samples {
            for j in 0..n_features {
                let val = self.pre_transform(j, x.get(i, j));
                result[i * n_features + j] = (val - mean[j]) / std[j];
            }
        }

        Matrix::from_vec(n_samples, n_features, result).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_transform_zero_mean() {
        let x = Matrix::from_vec(4, 2, vec![1.0, 10.0, 2.0, 20.0, 3.0, 30.0, 4.0, 40.0]).unwrap();
        let mut scaler = StandardScaler::new();
        let scaled = scaler.fit_transform(&x).unwrap();

        for j in 0..2 {
            let mean: f32 = (0..4).map(|i| scaled.get(i, j)).sum::<f32>() / 4.0;
            assert!(mean.abs() < 1e-5, "Column {j} mean should be ~0");
        }
    }

    #[test]
    fn test_zero_variance_column_no_nan() {
        let x = Matrix::from_vec(3, 1, vec![5.0, 5.0, 5.0]).unwrap();
        let mut scaler = StandardScaler::new();
        let scaled = scaler.fit_transform(&x).unwrap();

        for i in 0..3 {
            assert!(scaled.get(i, 0).is_finite());
            assert!(scaled.get(i, 0).abs() < 1e-6);
        }
        assert_eq!(scaler.std()[0], 1.0);
    }

    #[test]
    fn test_transform_unfitted_errors() {
        let x = Matrix::from_vec(1, 1, vec![1.0]).unwrap();
        let scaler = StandardScaler::new();
        assert!(scaler.transform(&x).is_err());
    }

    #[test]
    fn test_inverse_transform_round_trip() {
        let x = Matrix::from_vec(3, 2, vec![1.0, 100.0, 2.0, 200.0, 3.0, 300.0]).unwrap();
        let mut scaler = StandardScaler::new();
        let scaled = scaler.fit_transform(&x).unwrap();
        let back = scaler.inverse_transform(&scaled).unwrap();

        for i in 0..3 {
            for j in 0..2 {
                assert!((back.get(i, j) - x.get(i, j)).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn test_log1p_round_trip() {
        let x = Matrix::from_vec(3, 1, vec![0.0, 10.0, 1000.0]).unwrap();
        let mut scaler = StandardScaler::new().with_log1p_columns(vec![0]);
        let scaled = scaler.fit_transform(&x).unwrap();
        let back = scaler.inverse_transform(&scaled).unwrap();

        for i in 0..3 {
            let rel = (back.get(i, 0) - x.get(i, 0)).abs() / (1.0 + x.get(i, 0));
            assert!(rel < 1e-3, "round trip failed at row {i}");
        }
    }

    #[test]
    fn test_empty_fit_errors() {
        let x = Matrix::from_vec(0, 2, vec![]).unwrap();
        let mut scaler = StandardScaler::new();
        assert!(scaler.fit(&x).is_err());
    }
}

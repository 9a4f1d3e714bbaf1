//! Classification algorithms.
//!
//! Implements multinomial logistic regression (softmax output, sigmoid for
//! the binary case) trained with full-batch gradient descent and an L2
//! penalty on the weight matrix.
//!
//! # Example
//!
//! ```
//! use perfilar::classification::SoftmaxRegression;
//! use perfilar::prelude::*;
//!
//! let x = Matrix::from_vec(4, 2, vec![
//!     0.0, 0.0,
//!     0.0, 1.0,
//!     1.0, 0.0,
//!     1.0, 1.0,
//! ]).unwrap();
//! let y = vec![0, 0, 1, 1];
//!
//! let mut model = SoftmaxRegression::new(2)
//!     .with_learning_rate(0.5)
//!     .with_epochs(500)
//!     .with_random_state(42);
//! model.fit(&x, &y).unwrap();
//!
//! let probs = model.predict_proba_one(&[1.0, 0.0]);
//! let total: f32 = probs.iter().sum();
//! assert!((total - 1.0).abs() < 1e-5);
//! ```

use crate::error::{PerfilarError, Result};
use crate::primitives::Matrix;
use rand::distributions::{Distribution, Uniform};
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default L2 penalty strength on the weight matrix.
pub const DEFAULT_L2_LAMBDA: f32 = 0.1;

/// Multinomial logistic regression classifier.
///
/// Holds a `[n_classes x n_features]` weight matrix and per-class biases.
/// Two classes are evaluated through a sigmoid on the class-0 logit (class-1
/// probability is `1 - sigmoid`); three or more use softmax. Loss is
/// cross-entropy plus `lambda * ||W||^2 / n`; biases are unregularized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftmaxRegression {
    /// Number of target classes.
    n_classes: usize,
    /// Weight matrix after fitting, `[n_classes x n_features]`.
    weights: Option<Matrix<f32>>,
    /// Per-class bias terms after fitting.
    biases: Option<Vec<f32>>,
    /// Learning rate for gradient descent.
    learning_rate: f32,
    /// Number of full-batch epochs.
    epochs: usize,
    /// L2 penalty strength.
    l2_lambda: f32,
    /// Random seed for weight initialization.
    random_state: Option<u64>,
    /// Per-epoch training loss.
    loss_history: Vec<f32>,
}

impl SoftmaxRegression {
    /// Creates a classifier for `n_classes` classes with default parameters.
    #[must_use]
    pub fn new(n_classes: usize) -> Self {
        Self {
            n_classes,
            weights: None,
            biases: None,
            learning_rate: 0.1,
            epochs: 300,
            l2_lambda: DEFAULT_L2_LAMBDA,
            random_state: None,
            loss_history: Vec::new(),
        }
    }

    /// Sets the learning rate.
    #[must_use]
    pub fn with_learning_rate(mut self, lr: f32) -> Self {
        self.learning_rate = lr;
        self
    }

    /// Sets the number of epochs.
    #[must_use]
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    /// Sets the L2 penalty strength.
    #[must_use]
    pub fn with_l2_lambda(mut self, lambda: f32) -> Self {
        self.l2_lambda = lambda;
        self
    }

    /// Sets the random seed for reproducible weight initialization.
    #[must_use]
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Returns the fitted weight matrix.
    ///
    /// # Panics
    ///
    /// Panics if the model is not fitted.
    #[must_use]
    pub fn weights(&self) -> &Matrix<f32> {
        self.weights
            .as_ref()
            .expect("Model not fitted. Call fit() first.")
    }

    /// Returns the fitted bias vector.
    ///
    /// # Panics
    ///
    /// Panics if the model is not fitted.
    #[must_use]
    pub fn biases(&self) -> &[f32] {
        self.biases
            .as_ref()
            .expect("Model not fitted. Call fit() first.")
    }

    /// Returns the per-epoch training loss from the last fit.
    #[must_use]
    pub fn loss_history(&self) -> &[f32] {
        &self.loss_history
    }

    /// Returns true if the model has been fitted.
    #[must_use]
    pub fn is_fitted(&self) -> bool {
        self.weights.is_some()
    }

    fn sigmoid(z: f32) -> f32 {
        1.0 / (1.0 + (-z).exp())
    }

    /// Per-class probabilities for one (already scaled) sample, given
    /// explicit weights. Used during training before the fit is stored.
    fn proba_with(weights: &Matrix<f32>, biases: &[f32], n_classes: usize, x: &[f32]) -> Vec<f32> {
        let logits: Vec<f32> = (0..n_classes)
            .map(|c| {
                let mut z = biases[c];
                for (j, &xj) in x.iter().enumerate() {
                    z += weights.get(c, j) * xj;
                }
                z
            })
            .collect();

        if n_classes == 2 {
            // Binary path: sigmoid on the class-0 logit
            let p0 = Self::sigmoid(logits[0] - logits[1]);
            return vec![p0, 1.0 - p0];
        }

        // Softmax with max subtraction for numeric stability
        let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let exps: Vec<f32> = logits.iter().map(|z| (z - max).exp()).collect();
        let sum: f32 = exps.iter().sum();
        exps.iter().map(|e| e / sum).collect()
    }

    /// Fits the model with full-batch gradient descent.
    ///
    /// # Arguments
    ///
    /// * `x` - Feature matrix (`n_samples` x `n_features`), already scaled
    /// * `y` - Class indices in `0..n_classes`
    ///
    /// # Errors
    ///
    /// Returns an error on empty data, mismatched lengths, fewer than 2
    /// classes, or out-of-range labels.
    pub fn fit(&mut self, x: &Matrix<f32>, y: &[usize]) -> Result<()> {
        let (n_samples, n_features) = x.shape();

        if n_samples == 0 {
            return Err(PerfilarError::empty_dataset("classifier fit"));
        }
        if n_samples != y.len() {
            return Err(PerfilarError::dimension_mismatch(
                "n_samples",
                n_samples,
                y.len(),
            ));
        }
        if self.n_classes < 2 {
            return Err(PerfilarError::invalid_config(
                "n_classes",
                self.n_classes,
                "must be >= 2",
            ));
        }
        for &label in y {
            if label >= self.n_classes {
                return Err(PerfilarError::invalid_config(
                    "label",
                    label,
                    "must be < n_classes",
                ));
            }
        }

        // Small random initial weights, reproducible under a seed
        let init = Uniform::new(-0.01f32, 0.01);
        let mut weight_data = Vec::with_capacity(self.n_classes * n_features);
        if let Some(seed) = self.random_state {
            let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
            for _ in 0..self.n_classes * n_features {
                weight_data.push(init.sample(&mut rng));
            }
        } else {
            let mut rng = rand::thread_rng();
            for _ in 0..self.n_classes * n_features {
                weight_data.push(init.sample(&mut rng));
            }
        }
        let mut weights = Matrix::from_vec(self.n_classes, n_features, weight_data)
            .expect("weight matrix dimensions match data length");
        let mut biases = vec![0.0f32; self.n_classes];

        self.loss_history = Vec::with_capacity(self.epochs);
        let n = n_samples as f32;

        for epoch in 0..self.epochs {
            let mut grad_w = Matrix::zeros(self.n_classes, n_features);
            let mut grad_b = vec![0.0f32; self.n_classes];
            let mut ce_loss = 0.0f32;

            for i in 0..n_samples {
                let sample = x.row_slice(i);
                let probs = Self::proba_with(&weights, &biases, self.n_classes, sample);

                ce_loss -= probs[y[i]].max(1e-15).ln();

                for c in 0..self.n_classes {
                    let target = if c == y[i] { 1.0 } else { 0.0 };
                    let error = probs[c] - target;
                    grad_b[c] += error;
                    for (j, &xj) in sample.iter().enumerate() {
                        let g = grad_w.get(c, j) + error * xj;
                        grad_w.set(c, j, g);
                    }
                }
            }

            // L2 penalty on weights only
            let mut weight_sq = 0.0f32;
            for c in 0..self.n_classes {
                for j in 0..n_features {
                    weight_sq += weights.get(c, j) * weights.get(c, j);
                }
            }
            let loss = ce_loss / n + self.l2_lambda * weight_sq / n;
            self.loss_history.push(loss);

            for c in 0..self.n_classes {
                biases[c] -= self.learning_rate * grad_b[c] / n;
                for j in 0..n_features {
                    let grad = grad_w.get(c, j) / n + 2.0 * self.l2_lambda * weights.get(c, j) / n;
                    let w = weights.get(c, j) - self.learning_rate * grad;
                    weights.set(c, j, w);
                }
            }

            if epoch % 100 == 0 {
                debug!(epoch, loss, "gradient descent epoch");
            }
        }

        self.weights = Some(weights);
        self.biases = Some(biases);

        Ok(())
    }

    /// Per-class probabilities for one (already scaled) sample.
    ///
    /// # Panics
    ///
    /// Panics if the model is not fitted.
    #[must_use]
    pub fn predict_proba_one(&self, x: &[f32]) -> Vec<f32> {
        Self::proba_with(self.weights(), self.biases(), self.n_classes, x)
    }

    /// Predicted class indices for a batch of samples.
    ///
    /// # Panics
    ///
    /// Panics if the model is not fitted.
    #[must_use]
    pub fn predict(&self, x: &Matrix<f32>) -> Vec<usize> {
        (0..x.n_rows())
            .map(|i| {
                let probs = self.predict_proba_one(x.row_slice(i));
                probs
                    .iter()
                    .enumerate()
                    .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
                    .map_or(0, |(c, _)| c)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable_binary() -> (Matrix<f32>, Vec<usize>) {
        // Class 0 near origin, class 1 near (5, 5)
        let mut data = Vec::new();
        let mut labels = Vec::new();
        for i in 0..10 {
            let offset = i as f32 * 0.1;
            data.extend_from_slice(&[offset, offset]);
            labels.push(0);
            data.extend_from_slice(&[5.0 + offset, 5.0 + offset]);
            labels.push(1);
        }
        (Matrix::from_vec(20, 2, data).unwrap(), labels)
    }

    #[test]
    fn test_fit_separable() {
        let (x, y) = separable_binary();
        let mut model = SoftmaxRegression::new(2)
            .with_learning_rate(0.5)
            .with_epochs(500)
            .with_random_state(42);
        model.fit(&x, &y).unwrap();

        let predictions = model.predict(&x);
        let correct = predictions
            .iter()
            .zip(y.iter())
            .filter(|(p, t)| p == t)
            .count();
        assert!(correct >= 19, "expected near-perfect fit, got {correct}/20");
    }

    #[test]
    fn test_weight_matrix_shape() {
        let (x, y) = separable_binary();
        let mut model = SoftmaxRegression::new(2).with_random_state(1);
        model.fit(&x, &y).unwrap();
        assert_eq!(model.weights().shape(), (2, 2));
        assert_eq!(model.biases().len(), 2);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let (x, y) = separable_binary();
        let mut model = SoftmaxRegression::new(2).with_random_state(7);
        model.fit(&x, &y).unwrap();

        for i in 0..x.n_rows() {
            let probs = model.predict_proba_one(x.row_slice(i));
            let total: f32 = probs.iter().sum();
            assert!((total - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_three_class_softmax() {
        let mut data = Vec::new();
        let mut labels = Vec::new();
        for i in 0..8 {
            let offset = i as f32 * 0.05;
            data.extend_from_slice(&[offset, offset]);
            labels.push(0);
            data.extend_from_slice(&[4.0 + offset, 0.0]);
            labels.push(1);
            data.extend_from_slice(&[0.0, 4.0 + offset]);
            labels.push(2);
        }
        let x = Matrix::from_vec(24, 2, data).unwrap();

        let mut model = SoftmaxRegression::new(3)
            .with_learning_rate(0.5)
            .with_epochs(800)
            .with_random_state(3);
        model.fit(&x, &labels).unwrap();

        let predictions = model.predict(&x);
        let correct = predictions
            .iter()
            .zip(labels.iter())
            .filter(|(p, t)| p == t)
            .count();
        assert!(correct >= 22, "got {correct}/24");

        let probs = model.predict_proba_one(&[0.0, 0.0]);
        assert_eq!(probs.len(), 3);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_loss_trajectory_decreases() {
        let (x, y) = separable_binary();
        let mut model = SoftmaxRegression::new(2)
            .with_learning_rate(0.3)
            .with_epochs(200)
            .with_random_state(42);
        model.fit(&x, &y).unwrap();

        let history = model.loss_history();
        assert_eq!(history.len(), 200);
        assert!(history.last().unwrap() < history.first().unwrap());
        assert!(history.iter().all(|l| l.is_finite()));
    }

    #[test]
    fn test_deterministic_under_seed() {
        let (x, y) = separable_binary();
        let mut a = SoftmaxRegression::new(2).with_random_state(9);
        let mut b = SoftmaxRegression::new(2).with_random_state(9);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.weights().as_slice(), b.weights().as_slice());
        assert_eq!(a.biases(), b.biases());
    }

    #[test]
    fn test_empty_data_error() {
        let x = Matrix::from_vec(0, 2, vec![]).unwrap();
        let mut model = SoftmaxRegression::new(2);
        assert!(model.fit(&x, &[]).is_err());
    }

    #[test]
    fn test_out_of_range_label_error() {
        let x = Matrix::from_vec(2, 1, vec![1.0, 2.0]).unwrap();
        let mut model = SoftmaxRegression::new(2);
        assert!(model.fit(&x, &[0, 5]).is_err());
    }
}

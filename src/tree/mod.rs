//! Decision tree classifier.
//!
//! Binary-split trees grown by exhaustive threshold search minimizing the
//! sample-weighted Gini impurity of the children. Leaves carry their class
//! tallies as ordered `(label, count)` lists so trees serialize as plain
//! nested records.

mod helpers;

pub use helpers::{gini_impurity, gini_split, majority_class};

use crate::error::{PerfilarError, Result};
use crate::primitives::Matrix;
use helpers::build_tree;
use serde::{Deserialize, Serialize};

/// Internal node in a decision tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Index of the feature to split on
    pub feature_idx: usize,
    /// Threshold value for the split
    pub threshold: f32,
    /// Left subtree (samples where feature <= threshold)
    pub left: Box<TreeNode>,
    /// Right subtree (samples where feature > threshold)
    pub right: Box<TreeNode>,
}

/// Leaf node in a decision tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Leaf {
    /// Majority class label for this leaf
    pub class_label: usize,
    /// Number of training samples in this leaf
    pub n_samples: usize,
    /// Ordered (label, count) tally of the training samples in this subtree
    pub class_counts: Vec<(usize, usize)>,
}

/// A node in a decision tree (either internal node or leaf).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Internal decision node with split condition
    Node(Node),
    /// Leaf node with class prediction
    Leaf(Leaf),
}

impl TreeNode {
    /// Returns the depth of the tree rooted at this node.
    ///
    /// Leaf nodes have depth 0, internal nodes have depth 1 + max(left, right).
    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf(_) => 0,
            TreeNode::Node(node) => 1 + node.left.depth().max(node.right.depth()),
        }
    }
}

/// Probability mass assigned to the leaf's majority class by the prediction
/// heuristic. The remainder is split evenly across the other classes. This
/// is a fixed approximation, not a true posterior estimate; leaves keep
/// their class tallies so a frequency-based estimate stays possible.
pub const LEAF_MAJORITY_PROBABILITY: f32 = 0.85;

/// Decision tree classifier using Gini impurity.
///
/// # Example
///
/// ```
/// use perfilar::tree::DecisionTreeClassifier;
/// use perfilar::prelude::*;
///
/// let x = Matrix::from_vec(4, 1, vec![1.0, 2.0, 8.0, 9.0]).unwrap();
/// let y = vec![0, 0, 1, 1];
///
/// let mut tree = DecisionTreeClassifier::new(2).with_max_depth(3);
/// tree.fit(&x, &y).unwrap();
/// assert_eq!(tree.predict_one(&[1.5]), 0);
/// assert_eq!(tree.predict_one(&[8.5]), 1);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTreeClassifier {
    /// Number of target classes.
    n_classes: usize,
    /// Maximum tree depth.
    max_depth: usize,
    /// Root node after fitting.
    tree: Option<TreeNode>,
    /// Number of features seen at fit time.
    n_features: Option<usize>,
    /// Normalized per-feature importance after fitting.
    feature_importances: Option<Vec<f32>>,
}

impl DecisionTreeClassifier {
    /// Creates a classifier for `n_classes` classes with default depth 5.
    #[must_use]
    pub fn new(n_classes: usize) -> Self {
        Self {
            n_classes,
            max_depth: 5,
            tree: None,
            n_features: None,
            feature_importances: None,
        }
    }

    /// Sets the maximum tree depth.
    #[must_use]
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Returns the root node.
    ///
    /// # Panics
    ///
    /// Panics if the model is not fitted.
    #[must_use]
    pub fn root(&self) -> &TreeNode {
        self.tree
            .as_ref()
            .expect("Model not fitted. Call fit() first.")
    }

    /// Returns true if the model has been fitted.
    #[must_use]
    pub fn is_fitted(&self) -> bool {
        self.tree.is_some()
    }

    /// Per-feature importance: the fraction of training samples that passed
    /// through splits on each feature, normalized to sum to 1. All zeros if
    /// the tree is a single leaf.
    ///
    /// # Panics
    ///
    /// Panics if the model is not fitted.
    #[must_use]
    pub fn feature_importances(&self) -> &[f32] {
        self.feature_importances
            .as_ref()
            .expect("Model not fitted. Call fit() first.")
    }

    /// Fits the tree to training data.
    ///
    /// # Errors
    ///
    /// Returns an error on empty data or mismatched lengths.
    pub fn fit(&mut self, x: &Matrix<f32>, y: &[usize]) -> Result<()> {
        let (n_rows, n_cols) = x.shape();
        if n_rows == 0 {
            return Err(PerfilarError::empty_dataset("tree fit"));
        }
        if n_rows != y.len() {
            return Err(PerfilarError::dimension_mismatch("n_samples", n_rows, y.len()));
        }

        let mut split_samples = vec![0usize; n_cols];
        let tree = build_tree(x, y, 0, self.max_depth, &mut split_samples);

        let total: usize = split_samples.iter().sum();
        let importances = if total == 0 {
            vec![0.0; n_cols]
        } else {
            split_samples
                .iter()
                .map(|&s| s as f32 / total as f32)
                .collect()
        };

        self.n_features = Some(n_cols);
        self.feature_importances = Some(importances);
        self.tree = Some(tree);
        Ok(())
    }

    /// Predicts the class label for a single (already scaled) sample.
    ///
    /// # Panics
    ///
    /// Panics if the model is not fitted.
    #[must_use]
    pub fn predict_one(&self, x: &[f32]) -> usize {
        let mut node = self.root();
        loop {
            match node {
                TreeNode::Leaf(leaf) => return leaf.class_label,
                TreeNode::Node(internal) => {
                    if x[internal.feature_idx] <= internal.threshold {
                        node = &internal.left;
                    } else {
                        node = &internal.right;
                    }
                }
            }
        }
    }

    /// Heuristic per-class probabilities for a single sample.
    ///
    /// The majority class gets [`LEAF_MAJORITY_PROBABILITY`]; the remainder
    /// is split evenly across the other classes. Documented approximation,
    /// not a posterior.
    ///
    /// # Panics
    ///
    /// Panics if the model is not fitted.
    #[must_use]
    pub fn predict_proba_one(&self, x: &[f32]) -> Vec<f32> {
        let label = self.predict_one(x);
        if self.n_classes <= 1 {
            return vec![1.0];
        }
        let other = (1.0 - LEAF_MAJORITY_PROBABILITY) / (self.n_classes - 1) as f32;
        (0..self.n_classes)
            .map(|c| {
                if c == label {
                    LEAF_MAJORITY_PROBABILITY
                } else {
                    other
                }
            })
            .collect()
    }

    /// Predicted class labels for a batch of samples.
    ///
    /// # Panics
    ///
    /// Panics if the model is not fitted.
    #[must_use]
    pub fn predict(&self, x: &Matrix<f32>) -> Vec<usize> {
        (0..x.n_rows())
            .map(|i| self.predict_one(x.row_slice(i)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable() -> (Matrix<f32>, Vec<usize>) {
        let mut data = Vec::new();
        let mut labels = Vec::new();
        for i in 0..20 {
            let v = i as f32 * 0.2;
            data.push(v);
            labels.push(0);
            data.push(6.0 + v);
            labels.push(1);
        }
        (Matrix::from_vec(40, 1, data).unwrap(), labels)
    }

    #[test]
    fn test_fit_separable_single_split() {
        let (x, y) = separable();
        let mut tree = DecisionTreeClassifier::new(2).with_max_depth(5);
        tree.fit(&x, &y).unwrap();

        // Perfect separation needs exactly one split
        assert_eq!(tree.root().depth(), 1);
        let predictions = tree.predict(&x);
        assert_eq!(predictions, y);
    }

    #[test]
    fn test_depth_bound() {
        let (x, y) = separable();
        for max_depth in [1, 2, 3] {
            let mut tree = DecisionTreeClassifier::new(2).with_max_depth(max_depth);
            tree.fit(&x, &y).unwrap();
            assert!(tree.root().depth() <= max_depth);
        }
    }

    #[test]
    fn test_leaf_counts_cover_samples() {
        let (x, y) = separable();
        let mut tree = DecisionTreeClassifier::new(2).with_max_depth(4);
        tree.fit(&x, &y).unwrap();

        fn leaf_total(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf(leaf) => {
                    let tally: usize = leaf.class_counts.iter().map(|(_, c)| c).sum();
                    assert_eq!(tally, leaf.n_samples);
                    leaf.n_samples
                }
                TreeNode::Node(n) => leaf_total(&n.left) + leaf_total(&n.right),
            }
        }
        assert_eq!(leaf_total(tree.root()), 40);
    }

    #[test]
    fn test_importance_sums_to_one() {
        let (x, y) = separable();
        let mut tree = DecisionTreeClassifier::new(2).with_max_depth(5);
        tree.fit(&x, &y).unwrap();

        let total: f32 = tree.feature_importances().iter().sum();
        assert!((total - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_variance_feature_gets_no_importance() {
        let mut data = Vec::new();
        let mut labels = Vec::new();
        for i in 0..20 {
            data.push(if i < 10 { 0.0 } else { 10.0 });
            data.push(7.0); // constant column
            labels.push(usize::from(i >= 10));
        }
        let x = Matrix::from_vec(20, 2, data).unwrap();

        let mut tree = DecisionTreeClassifier::new(2).with_max_depth(4);
        tree.fit(&x, &labels).unwrap();

        let importances = tree.feature_importances();
        assert!(importances[1].abs() < 1e-6);
        assert!((importances[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_degenerate_split_falls_back_to_leaf() {
        // Identical samples with mixed labels: no split possible
        let x = Matrix::from_vec(4, 1, vec![3.0, 3.0, 3.0, 3.0]).unwrap();
        let y = vec![0, 1, 0, 0];
        let mut tree = DecisionTreeClassifier::new(2).with_max_depth(5);
        tree.fit(&x, &y).unwrap();

        assert_eq!(tree.root().depth(), 0);
        assert_eq!(tree.predict_one(&[3.0]), 0);
    }

    #[test]
    fn test_proba_heuristic() {
        let (x, y) = separable();
        let mut tree = DecisionTreeClassifier::new(2).with_max_depth(5);
        tree.fit(&x, &y).unwrap();

        let probs = tree.predict_proba_one(&[0.1]);
        assert!((probs[0] - 0.85).abs() < 1e-6);
        assert!((probs[1] - 0.15).abs() < 1e-6);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_serde_round_trip() {
        let (x, y) = separable();
        let mut tree = DecisionTreeClassifier::new(2).with_max_depth(5);
        tree.fit(&x, &y).unwrap();

        let json = serde_json::to_string(&tree).unwrap();
        let restored: DecisionTreeClassifier = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.predict(&x), tree.predict(&x));
    }

    #[test]
    fn test_empty_data_error() {
        let x = Matrix::from_vec(0, 1, vec![]).unwrap();
        let mut tree = DecisionTreeClassifier::new(2);
        assert!(tree.fit(&x, &[]).is_err());
    }
}

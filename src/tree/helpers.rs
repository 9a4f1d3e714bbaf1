//! Helper functions for decision tree building.

use super::{Leaf, Node, TreeNode};

/// Gini impurity of a label set: 1 - sum(p_i^2). Zero means pure.
#[must_use]
pub fn gini_impurity(labels: &[usize]) -> f32 {
    if labels.is_empty() {
        return 0.0;
    }

    // BTreeMap for deterministic iteration order
    let mut counts = std::collections::BTreeMap::new();
    for &label in labels {
        *counts.entry(label).or_insert(0usize) += 1;
    }

    let n = labels.len() as f32;
    let mut gini = 1.0;

    for count in counts.values() {
        let p = *count as f32 / n;
        gini -= p * p;
    }

    gini
}

/// Sample-weighted Gini impurity of a two-way split.
#[must_use]
pub fn gini_split(left_labels: &[usize], right_labels: &[usize]) -> f32 {
    let n_left = left_labels.len() as f32;
    let n_right = right_labels.len() as f32;
    let n_total = n_left + n_right;

    if n_total == 0.0 {
        return 0.0;
    }

    let weight_left = n_left / n_total;
    let weight_right = n_right / n_total;

    weight_left * gini_impurity(left_labels) + weight_right * gini_impurity(right_labels)
}

/// Ordered `(label, count)` tally for a label set.
///
/// An explicit list rather than a map so leaves stay plain nested records
/// that round-trip through flat persistence layers.
#[must_use]
pub fn class_counts(labels: &[usize]) -> Vec<(usize, usize)> {
    let mut counts = std::collections::BTreeMap::new();
    for &label in labels {
        *counts.entry(label).or_insert(0usize) += 1;
    }
    counts.into_iter().collect()
}

/// Majority class label, ties broken by the smallest label.
#[must_use]
pub fn majority_class(labels: &[usize]) -> usize {
    // Tallies are in ascending label order; replacing only on a strictly
    // greater count keeps the smallest tied label
    let mut best: Option<(usize, usize)> = None;
    for (label, count) in class_counts(labels) {
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((label, count));
        }
    }
    best.map_or(0, |(label, _)| label)
}

fn make_leaf(labels: &[usize]) -> TreeNode {
    TreeNode::Leaf(Leaf {
        class_label: majority_class(labels),
        n_samples: labels.len(),
        class_counts: class_counts(labels),
    })
}

/// Finds the `(feature_idx, threshold)` pair with the lowest sample-weighted
/// child Gini, testing the midpoint between every pair of consecutive sorted
/// distinct values on every feature. Returns `None` when no split improves
/// on the parent impurity.
fn find_best_split(
    x: &crate::primitives::Matrix<f32>,
    y: &[usize],
) -> Option<(usize, f32, f32)> {
    let (n_samples, n_features) = x.shape();
    let parent_gini = gini_impurity(y);

    let mut best: Option<(usize, f32, f32)> = None;

    for feature_idx in 0..n_features {
        let mut values: Vec<f32> = (0..n_samples).map(|i| x.get(i, feature_idx)).collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        values.dedup();

        for pair in values.windows(2) {
            let threshold = (pair[0] + pair[1]) / 2.0;

            let mut left_labels = Vec::new();
            let mut right_labels = Vec::new();
            for i in 0..n_samples {
                if x.get(i, feature_idx) <= threshold {
                    left_labels.push(y[i]);
                } else {
                    right_labels.push(y[i]);
                }
            }

            if left_labels.is_empty() || right_labels.is_empty() {
                continue;
            }

            let split_gini = gini_split(&left_labels, &right_labels);
            if split_gini < parent_gini
                && best.map_or(true, |(_, _, g)| split_gini < g)
            {
                best = Some((feature_idx, threshold, split_gini));
            }
        }
    }

    best
}

/// Recursively builds a tree, recording at each split how many samples
/// passed through it per feature (for importance).
pub(super) fn build_tree(
    x: &crate::primitives::Matrix<f32>,
    y: &[usize],
    depth: usize,
    max_depth: usize,
    split_samples: &mut [usize],
) -> TreeNode {
    let n_samples = y.len();

    // Stopping criteria: depth cap, tiny node, pure node
    if depth >= max_depth || n_samples <= 2 || gini_impurity(y) == 0.0 {
        return make_leaf(y);
    }

    // No split reduces impurity: majority-vote fallback
    let Some((feature_idx, threshold, _gini)) = find_best_split(x, y) else {
        return make_leaf(y);
    };

    split_samples[feature_idx] += n_samples;

    let mut left_indices = Vec::new();
    let mut right_indices = Vec::new();
    for i in 0..n_samples {
        if x.get(i, feature_idx) <= threshold {
            left_indices.push(i);
        } else {
            right_indices.push(i);
        }
    }

    let left_matrix = x.select_rows(&left_indices);
    let right_matrix = x.select_rows(&right_indices);
    let left_labels: Vec<usize> = left_indices.iter().map(|&i| y[i]).collect();
    let right_labels: Vec<usize> = right_indices.iter().map(|&i| y[i]).collect();

    let left_child = build_tree(&left_matrix, &left_labels, depth + 1, max_depth, split_samples);
    let right_child = build_tree(
        &right_matrix,
        &right_labels,
        depth + 1,
        max_depth,
        split_samples,
    );

    TreeNode::Node(Node {
        feature_idx,
        threshold,
        left: Box::new(left_child),
        right: Box::new(right_child),
    })
}

//! Classification metrics for evaluating trained models.
//!
//! Provides accuracy, the confusion matrix, macro-averaged
//! precision/recall/specificity/F1, an approximate log-loss derived from
//! confusion-matrix proportions, and the Matthews correlation coefficient.
//!
//! All functions take class labels as dense indices `0..n_classes`; the
//! trainer owns the mapping between raw label strings and indices.

use crate::primitives::Matrix;

/// Compute classification accuracy.
///
/// # Panics
///
/// Panics if vectors have different lengths or are empty.
///
/// # Examples
///
/// ```
/// use perfilar::metrics::classification::accuracy;
///
/// let y_true = vec![0, 1, 2, 0, 1, 2];
/// let y_pred = vec![0, 2, 1, 0, 0, 1];
/// let acc = accuracy(&y_pred, &y_true);
/// assert!((acc - 0.333333).abs() < 0.001);
/// ```
#[must_use]
pub fn accuracy(y_pred: &[usize], y_true: &[usize]) -> f32 {
    assert_eq!(y_pred.len(), y_true.len(), "Vectors must have same length");
    assert!(!y_true.is_empty(), "Vectors cannot be empty");

    let correct = y_pred
        .iter()
        .zip(y_true.iter())
        .filter(|(p, t)| p == t)
        .count();

    correct as f32 / y_true.len() as f32
}

/// Compute the confusion matrix over `n_classes` classes.
///
/// Element `[i, j]` is the count of samples with true label `i` and
/// predicted label `j`.
///
/// # Panics
///
/// Panics if vectors have different lengths, or any label >= `n_classes`.
#[must_use]
pub fn confusion_matrix(y_pred: &[usize], y_true: &[usize], n_classes: usize) -> Matrix<usize> {
    assert_eq!(y_pred.len(), y_true.len(), "Vectors must have same length");

    let mut cm = Matrix::zeros_usize(n_classes, n_classes);

    for (&true_label, &pred_label) in y_true.iter().zip(y_pred.iter()) {
        assert!(true_label < n_classes && pred_label < n_classes);
        let current = cm.get(true_label, pred_label);
        cm.set(true_label, pred_label, current + 1);
    }

    cm
}

/// Per-class TP/FP/FN/TN counts derived from a confusion matrix.
fn class_counts(cm: &Matrix<usize>, class: usize) -> (usize, usize, usize, usize) {
    let n_classes = cm.n_rows();
    let total: usize = cm.as_slice().iter().sum();

    let tp = cm.get(class, class);
    let fp: usize = (0..n_classes)
        .filter(|&i| i != class)
        .map(|i| cm.get(i, class))
        .sum();
    let fn_count: usize = (0..n_classes)
        .filter(|&j| j != class)
        .map(|j| cm.get(class, j))
        .sum();
    let tn = total - tp - fp - fn_count;

    (tp, fp, fn_count, tn)
}

fn safe_ratio(num: usize, den: usize) -> f32 {
    if den == 0 {
        0.0
    } else {
        num as f32 / den as f32
    }
}

/// Macro-averaged precision: mean over classes of TP / (TP + FP).
#[must_use]
pub fn macro_precision(cm: &Matrix<usize>) -> f32 {
    let n_classes = cm.n_rows();
    if n_classes == 0 {
        return 0.0;
    }
    (0..n_classes)
        .map(|c| {
            let (tp, fp, _, _) = class_counts(cm, c);
            safe_ratio(tp, tp + fp)
        })
        .sum::<f32>()
        / n_classes as f32
}

/// Macro-averaged recall: mean over classes of TP / (TP + FN).
#[must_use]
pub fn macro_recall(cm: &Matrix<usize>) -> f32 {
    let n_classes = cm.n_rows();
    if n_classes == 0 {
        return 0.0;
    }
    (0..n_classes)
        .map(|c| {
            let (tp, _, fn_count, _) = class_counts(cm, c);
            safe_ratio(tp, tp + fn_count)
        })
        .sum::<f32>()
        / n_classes as f32
}

/// Macro-averaged specificity: mean over classes of TN / (TN + FP).
#[must_use]
pub fn macro_specificity(cm: &Matrix<usize>) -> f32 {
    let n_classes = cm.n_rows();
    if n_classes == 0 {
        return 0.0;
    }
    (0..n_classes)
        .map(|c| {
            let (_, fp, _, tn) = class_counts(cm, c);
            safe_ratio(tn, tn + fp)
        })
        .sum::<f32>()
        / n_classes as f32
}

/// Macro-averaged F1: mean over classes of the harmonic mean of per-class
/// precision and recall.
#[must_use]
pub fn macro_f1(cm: &Matrix<usize>) -> f32 {
    let n_classes = cm.n_rows();
    if n_classes == 0 {
        return 0.0;
    }
    (0..n_classes)
        .map(|c| {
            let (tp, fp, fn_count, _) = class_counts(cm, c);
            let prec = safe_ratio(tp, tp + fp);
            let rec = safe_ratio(tp, tp + fn_count);
            if prec + rec == 0.0 {
                0.0
            } else {
                2.0 * prec * rec / (prec + rec)
            }
        })
        .sum::<f32>()
        / n_classes as f32
}

/// Approximate log-loss from per-class confusion-matrix proportions.
///
/// For each true class the diagonal proportion stands in for the predicted
/// probability of the correct label; proportions are clamped at 1e-15 so a
/// fully-confused class yields a large but finite penalty.
#[must_use]
pub fn approximate_log_loss(cm: &Matrix<usize>) -> f32 {
    let n_classes = cm.n_rows();
    let total: usize = cm.as_slice().iter().sum();
    if total == 0 {
        return 0.0;
    }

    let mut loss = 0.0;
    for c in 0..n_classes {
        let row_sum: usize = (0..n_classes).map(|j| cm.get(c, j)).sum();
        if row_sum == 0 {
            continue;
        }
        let p_correct = (cm.get(c, c) as f64 / row_sum as f64).max(1e-15);
        loss += -(p_correct.ln()) * row_sum as f64;
    }

    (loss / total as f64) as f32
}

/// Matthews correlation coefficient.
///
/// Uses the closed-form binary formula for 2 classes and the generalized
/// R_k statistic for 3 or more. Returns 0 when the denominator vanishes
/// (e.g. a single observed class).
#[must_use]
pub fn matthews_corrcoef(cm: &Matrix<usize>) -> f32 {
    let n_classes = cm.n_rows();

    if n_classes == 2 {
        let tp = cm.get(1, 1) as f64;
        let tn = cm.get(0, 0) as f64;
        let fp = cm.get(0, 1) as f64;
        let fn_count = cm.get(1, 0) as f64;

        let denom = ((tp + fp) * (tp + fn_count) * (tn + fp) * (tn + fn_count)).sqrt();
        if denom == 0.0 {
            return 0.0;
        }
        return ((tp * tn - fp * fn_count) / denom) as f32;
    }

    // Generalized MCC (R_k) from the confusion matrix
    let s: f64 = cm.as_slice().iter().map(|&v| v as f64).sum();
    if s == 0.0 {
        return 0.0;
    }
    let c: f64 = (0..n_classes).map(|k| cm.get(k, k) as f64).sum();

    let t: Vec<f64> = (0..n_classes)
        .map(|k| (0..n_classes).map(|j| cm.get(k, j) as f64).sum())
        .collect();
    let p: Vec<f64> = (0..n_classes)
        .map(|k| (0..n_classes).map(|i| cm.get(i, k) as f64).sum())
        .collect();

    let sum_pt: f64 = t.iter().zip(p.iter()).map(|(tk, pk)| tk * pk).sum();
    let sum_t2: f64 = t.iter().map(|tk| tk * tk).sum();
    let sum_p2: f64 = p.iter().map(|pk| pk * pk).sum();

    let denom = ((s * s - sum_p2) * (s * s - sum_t2)).sqrt();
    if denom == 0.0 {
        return 0.0;
    }

    ((c * s - sum_pt) / denom) as f32
}

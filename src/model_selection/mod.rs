//! Train/test splitting utilities.
//!
//! Splits are index-based so callers can keep track of which rows (users)
//! landed in each partition.

use crate::error::{PerfilarError, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Index partition produced by [`train_test_split`].
#[derive(Debug, Clone)]
pub struct TrainTestSplit {
    /// Row indices assigned to the training partition.
    pub train_indices: Vec<usize>,
    /// Row indices assigned to the held-out partition.
    pub test_indices: Vec<usize>,
}

/// Shuffles `0..n_samples`, seeded when `random_state` is given.
fn shuffle_indices(n_samples: usize, random_state: Option<u64>) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..n_samples).collect();

    if let Some(seed) = random_state {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        indices.shuffle(&mut rng);
    } else {
        let mut rng = rand::thread_rng();
        indices.shuffle(&mut rng);
    }

    indices
}

/// Splits `n_samples` row indices into shuffled train/test partitions.
///
/// The test partition holds `round(n_samples * test_size)` rows, clamped so
/// both partitions keep at least one row.
///
/// # Errors
///
/// Returns `InvalidConfig` if `test_size` is outside (0, 1), or
/// `EmptyDataset` if fewer than 2 samples are supplied.
///
/// # Examples
///
/// ```
/// use perfilar::model_selection::train_test_split;
///
/// let split = train_test_split(10, 0.2, Some(42)).unwrap();
/// assert_eq!(split.train_indices.len(), 8);
/// assert_eq!(split.test_indices.len(), 2);
/// ```
pub fn train_test_split(
    n_samples: usize,
    test_size: f32,
    random_state: Option<u64>,
) -> Result<TrainTestSplit> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(PerfilarError::invalid_config(
            "test_size",
            test_size,
            "must be in (0, 1)",
        ));
    }
    if n_samples < 2 {
        return Err(PerfilarError::empty_dataset(
            "train/test split needs at least 2 samples",
        ));
    }

    let n_test = ((n_samples as f32 * test_size).round() as usize).clamp(1, n_samples - 1);
    let n_train = n_samples - n_test;

    let indices = shuffle_indices(n_samples, random_state);
    let train_indices = indices[..n_train].to_vec();
    let test_indices = indices[n_train..].to_vec();

    Ok(TrainTestSplit {
        train_indices,
        test_indices,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_sizes() {
        let split = train_test_split(10, 0.2, Some(42)).unwrap();
        assert_eq!(split.train_indices.len(), 8);
        assert_eq!(split.test_indices.len(), 2);
    }

    #[test]
    fn test_split_covers_all_indices() {
        let split = train_test_split(20, 0.3, Some(7)).unwrap();
        let mut all: Vec<usize> = split
            .train_indices
            .iter()
            .chain(split.test_indices.iter())
            .copied()
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_reproducibility() {
        let a = train_test_split(50, 0.25, Some(42)).unwrap();
        let b = train_test_split(50, 0.25, Some(42)).unwrap();
        assert_eq!(a.train_indices, b.train_indices);
        assert_eq!(a.test_indices, b.test_indices);
    }

    #[test]
    fn test_different_seeds_differ() {
        let a = train_test_split(50, 0.25, Some(42)).unwrap();
        let b = train_test_split(50, 0.25, Some(123)).unwrap();
        assert_ne!(a.train_indices, b.train_indices);
    }

    #[test]
    fn test_invalid_test_size() {
        assert!(train_test_split(10, 0.0, None).is_err());
        assert!(train_test_split(10, 1.0, None).is_err());
        assert!(train_test_split(10, 1.5, None).is_err());
    }

    #[test]
    fn test_tiny_dataset_keeps_both_partitions() {
        let split = train_test_split(3, 0.1, Some(1)).unwrap();
        assert!(!split.train_indices.is_empty());
        assert!(!split.test_indices.is_empty());
    }

    #[test]
    fn test_too_few_samples() {
        assert!(train_test_split(1, 0.5, None).is_err());
    }
}

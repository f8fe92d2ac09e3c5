//! Dataset partitioning.

use std::ops::Range;

use rand::seq::SliceRandom;

use aqsol_core::Seed;

use crate::dataset::EmbeddingDataset;
use crate::error::{DataError, Result};

/// Split `0..n` into a leading and a trailing range at `floor(n * ratio)`.
///
/// This is the train/valid boundary used by the solubility datasets: rows
/// keep their file order, the first share trains and the rest validates.
///
/// # Errors
///
/// Returns an error if `ratio` is outside `[0, 1]`.
pub fn contiguous_partition(n: usize, ratio: f64) -> Result<(Range<usize>, Range<usize>)> {
    if !(0.0..=1.0).contains(&ratio) {
        return Err(DataError::SplitError(format!(
            "split ratio must be within [0, 1], got {ratio}"
        )));
    }
    let boundary = ((n as f64 * ratio).floor() as usize).min(n);
    Ok((0..boundary, boundary..n))
}

fn shuffled_indices(n: usize, seed: Seed) -> Vec<usize> {
    let mut rng = seed.to_rng();
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut rng);
    indices
}

/// Split an embedding dataset into train and test sets.
///
/// # Arguments
///
/// * `dataset` - The dataset to split
/// * `test_ratio` - Ratio for the test set (e.g., 0.1 for 10%)
/// * `seed` - Random seed for reproducibility
pub fn train_test_split(
    dataset: &EmbeddingDataset,
    test_ratio: f32,
    seed: Seed,
) -> Result<(EmbeddingDataset, EmbeddingDataset)> {
    if test_ratio <= 0.0 || test_ratio >= 1.0 {
        return Err(DataError::SplitError(format!(
            "test_ratio must be between 0 and 1, got {test_ratio}"
        )));
    }

    let n = dataset.len();
    if n < 2 {
        return Err(DataError::SplitError(format!(
            "need at least 2 samples to split, got {n}"
        )));
    }
    let n_test = ((n as f32 * test_ratio).round() as usize).clamp(1, n - 1);

    let indices = shuffled_indices(n, seed);
    let test = dataset.subset(&indices[..n_test])?;
    let train = dataset.subset(&indices[n_test..])?;

    Ok((train, test))
}

/// Split an embedding dataset into train, validation and test sets.
pub fn train_valid_test_split(
    dataset: &EmbeddingDataset,
    valid_ratio: f32,
    test_ratio: f32,
    seed: Seed,
) -> Result<(EmbeddingDataset, EmbeddingDataset, EmbeddingDataset)> {
    let total_ratio = valid_ratio + test_ratio;
    if valid_ratio <= 0.0 || test_ratio <= 0.0 || total_ratio >= 1.0 {
        return Err(DataError::SplitError(format!(
            "valid_ratio and test_ratio must be positive with a sum below 1, got {valid_ratio} + {test_ratio}"
        )));
    }

    let n = dataset.len();
    let n_valid = ((n as f32 * valid_ratio).round() as usize).max(1);
    let n_test = ((n as f32 * test_ratio).round() as usize).max(1);

    if n_valid + n_test >= n {
        return Err(DataError::SplitError(format!(
            "{n} samples cannot hold {n_valid} valid and {n_test} test samples plus a training set"
        )));
    }

    let indices = shuffled_indices(n, seed);
    let test = dataset.subset(&indices[..n_test])?;
    let valid = dataset.subset(&indices[n_test..n_test + n_valid])?;
    let train = dataset.subset(&indices[n_test + n_valid..])?;

    Ok((train, valid, test))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};

    fn dataset(n: usize) -> EmbeddingDataset {
        let x = Array2::from_shape_fn((n, 4), |(i, _)| i as f32);
        let y = Array1::from_shape_fn(n, |i| i as f32);
        EmbeddingDataset::from_arrays(x, Some(y)).unwrap()
    }

    #[test]
    fn test_contiguous_partition_floor() {
        assert_eq!(contiguous_partition(10, 0.9).unwrap(), (0..9, 9..10));
        assert_eq!(contiguous_partition(7, 0.5).unwrap(), (0..3, 3..7));
        assert_eq!(contiguous_partition(4, 1.0).unwrap(), (0..4, 4..4));
        assert_eq!(contiguous_partition(0, 0.9).unwrap(), (0..0, 0..0));
        assert!(contiguous_partition(4, 1.5).is_err());
        assert!(contiguous_partition(4, -0.1).is_err());
    }

    #[test]
    fn test_train_test_split_sizes() {
        let (train, test) = train_test_split(&dataset(50), 0.1, Seed::new(42)).unwrap();
        assert_eq!(train.len(), 45);
        assert_eq!(test.len(), 5);
    }

    #[test]
    fn test_train_test_split_is_deterministic_and_disjoint() {
        let ds = dataset(40);
        let (train1, test1) = train_test_split(&ds, 0.25, Seed::new(7)).unwrap();
        let (_, test2) = train_test_split(&ds, 0.25, Seed::new(7)).unwrap();

        assert_eq!(test1.y(), test2.y());

        let mut all: Vec<f32> = train1.y().unwrap().to_vec();
        all.extend(test1.y().unwrap().iter());
        all.sort_by(f32::total_cmp);
        let expected: Vec<f32> = (0..40).map(|i| i as f32).collect();
        assert_eq!(all, expected);
    }

    #[test]
    fn test_train_valid_test_split() {
        let (train, valid, test) =
            train_valid_test_split(&dataset(100), 0.1, 0.1, Seed::new(42)).unwrap();
        assert_eq!(train.len(), 80);
        assert_eq!(valid.len(), 10);
        assert_eq!(test.len(), 10);
    }

    #[test]
    fn test_split_invalid_ratio() {
        let ds = dataset(10);
        assert!(train_test_split(&ds, 0.0, Seed::new(1)).is_err());
        assert!(train_test_split(&ds, 1.0, Seed::new(1)).is_err());
        assert!(train_valid_test_split(&ds, 0.6, 0.5, Seed::new(1)).is_err());
    }
}

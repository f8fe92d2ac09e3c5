//! Feature-id selection and column masking.
//!
//! A head isolates the contribution of a few embedding dimensions by
//! zeroing every other column of a gradient (or activation) matrix. The
//! ids come from, in order of precedence:
//!
//! 1. the head's fixed `feature_ids` from its config,
//! 2. a per-call override,
//! 3. the ranking heuristic over the head's representative weight vector.
//!
//! Empty id lists count as not supplied. Nothing is cached on the head, so
//! concurrent calls with different overrides are independent.

use burn::prelude::*;

use aqsol_core::CoreError;

use crate::error::Result;

/// Number of ranked ids reported when the heuristic fallback is used.
const RANKING_PREVIEW: usize = 10;

/// Indices of `weights` ordered by descending absolute value.
///
/// The sort is stable: equal magnitudes keep their original order.
///
/// ```rust
/// use aqsol_models::rank_by_magnitude;
///
/// assert_eq!(rank_by_magnitude(&[0.1, -3.0, 2.0, -0.1]), vec![1, 2, 0, 3]);
/// ```
#[must_use]
pub fn rank_by_magnitude(weights: &[f32]) -> Vec<usize> {
    let mut ranked: Vec<usize> = (0..weights.len()).collect();
    ranked.sort_by(|&a, &b| weights[b].abs().total_cmp(&weights[a].abs()));
    ranked
}

/// Heuristic feature id: the second-from-last entry of
/// [`rank_by_magnitude`], i.e. the second smallest weight by magnitude.
///
/// # Errors
///
/// Returns [`CoreError::ShapeMismatch`] for fewer than two weights.
pub fn default_feature_id(weights: &[f32]) -> Result<usize> {
    if weights.len() < 2 {
        return Err(CoreError::shape(format!(
            "feature ranking needs at least 2 weights, got {}",
            weights.len()
        ))
        .into());
    }
    let ranked = rank_by_magnitude(weights);
    Ok(ranked[ranked.len() - 2])
}

/// Resolve the feature ids for one call.
///
/// `weights` is only consulted, and the choice logged, when neither `fixed`
/// nor `overrides` holds any id.
pub fn resolve_feature_ids(
    fixed: Option<&[usize]>,
    overrides: Option<&[usize]>,
    weights: &[f32],
) -> Result<Vec<usize>> {
    if let Some(ids) = fixed.filter(|ids| !ids.is_empty()) {
        return Ok(ids.to_vec());
    }
    if let Some(ids) = overrides.filter(|ids| !ids.is_empty()) {
        return Ok(ids.to_vec());
    }

    let id = default_feature_id(weights)?;
    let top: Vec<(usize, f32)> = rank_by_magnitude(weights)
        .into_iter()
        .take(RANKING_PREVIEW)
        .map(|i| (i, weights[i]))
        .collect();
    tracing::info!(feature_id = id, ?top, "no feature ids supplied, using weight ranking");
    Ok(vec![id])
}

/// 0/1 vector of length `dim` with ones at `ids`.
///
/// # Errors
///
/// Returns [`CoreError::InvalidFeatureIndex`] for any id `>= dim`.
pub fn feature_mask(ids: &[usize], dim: usize) -> Result<Vec<f32>> {
    let mut mask = vec![0.0f32; dim];
    for &index in ids {
        if index >= dim {
            return Err(CoreError::InvalidFeatureIndex { index, len: dim }.into());
        }
        mask[index] = 1.0;
    }
    Ok(mask)
}

/// Multiply every row of `x` by a per-column `mask`.
///
/// # Errors
///
/// Returns [`CoreError::ShapeMismatch`] if `mask` does not cover every column.
pub fn apply_column_mask<B: Backend>(x: Tensor<B, 2>, mask: &[f32]) -> Result<Tensor<B, 2>> {
    let [_, dim] = x.dims();
    if mask.len() != dim {
        return Err(CoreError::shape(format!(
            "mask covers {} columns, input has {dim}",
            mask.len()
        ))
        .into());
    }
    let mask = Tensor::<B, 1>::from_floats(mask, &x.device()).reshape([1, dim]);
    Ok(x * mask)
}

/// Zero every column of `x` except `ids`; kept columns are unchanged.
///
/// # Errors
///
/// Returns [`CoreError::InvalidFeatureIndex`] for ids outside `x`'s width.
pub fn mask_features<B: Backend>(x: Tensor<B, 2>, ids: &[usize]) -> Result<Tensor<B, 2>> {
    let [_, dim] = x.dims();
    let mask = feature_mask(ids, dim)?;
    apply_column_mask(x, &mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use aqsol_core::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_rank_is_stable_on_ties() {
        assert_eq!(rank_by_magnitude(&[1.0, -1.0, 0.5, 1.0]), vec![0, 1, 3, 2]);
    }

    #[test]
    fn test_default_feature_id_second_from_last() {
        // ranking: [1, 3, 0, 2] -> second from last is 0
        assert_eq!(default_feature_id(&[0.2, 5.0, -0.1, 3.0]).unwrap(), 0);
        assert!(default_feature_id(&[1.0]).is_err());
    }

    #[test]
    fn test_precedence() {
        let weights = [0.2, 5.0, -0.1, 3.0];
        let fixed = [4usize];
        let over = [2usize, 5];

        assert_eq!(
            resolve_feature_ids(Some(&fixed), Some(&over), &weights).unwrap(),
            vec![4]
        );
        assert_eq!(resolve_feature_ids(None, Some(&over), &weights).unwrap(), vec![2, 5]);
        assert_eq!(resolve_feature_ids(Some(&[]), Some(&[]), &weights).unwrap(), vec![0]);
    }

    #[test]
    fn test_mask_features_keeps_selected_columns() {
        let device = Default::default();
        let values: Vec<f32> = (1..=20).map(|v| v as f32).collect();
        let x = Tensor::<TestBackend, 1>::from_floats(values.as_slice(), &device).reshape([2, 10]);

        let masked = mask_features(x, &[3, 7]).unwrap();
        let out = aqsol_core::tensor_to_vec(masked).unwrap();

        for (i, (&got, &orig)) in out.iter().zip(&values).enumerate() {
            let col = i % 10;
            if col == 3 || col == 7 {
                assert_eq!(got, orig);
            } else {
                assert_eq!(got, 0.0);
            }
        }
    }

    #[test]
    fn test_mask_features_invalid_index() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 2>::ones([1, 10], &device);
        let err = mask_features(x, &[3, 10]).unwrap_err();
        assert!(matches!(
            err,
            ModelError::Core(CoreError::InvalidFeatureIndex { index: 10, len: 10 })
        ));
    }
}

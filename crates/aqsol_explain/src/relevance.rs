//! Gradient-weighted self-attention relevance propagation.
//!
//! For one molecule, given per-layer attention weights `A` and their
//! gradients `G`, both `(L, H, S, S)`, and the number of valid tokens `ml`:
//!
//! ```text
//! R_0 = I (ml x ml)
//! for l in 0..n_layers:
//!     Ā_l = mean_h( max(0, G[l,h]ᵀ ⊙ A[l,h]ᵀ) )     restricted to [:ml, :ml]
//!     R_l = R_(l-1) + Ā_l · R_(l-1)
//! weights = (R - I)[1..ml, 0]
//! ```
//!
//! Position 0 is the `<REG>` token whose final representation is pooled;
//! the weights give every remaining token's cumulative relevance to it.

use burn::prelude::*;
use ndarray::Array2;

use aqsol_core::CoreError;

use crate::config::ExplainConfig;
use crate::error::{ExplainError, Result};
use crate::observer::RelevanceObserver;

/// Number of valid positions in an attention mask.
///
/// Counts the non-zero entries, which equals the sum of a 0/1 mask.
///
/// ```rust
/// use aqsol_explain::mask_length;
///
/// assert_eq!(mask_length(&[1u8, 1, 1, 0, 0]), 3);
/// assert_eq!(mask_length(&[true, true, false]), 2);
/// ```
pub fn mask_length<T: Copy + PartialEq + Default>(mask: &[T]) -> usize {
    mask.iter().filter(|&&v| v != T::default()).count()
}

/// Per-layer attention map: transpose query/key axes of every head, weight
/// attention by its gradient, clamp negatives to zero and average the heads.
///
/// `attn` and `grad` are `(H, ml, ml)`; the result is `(ml, ml)`.
pub fn average_heads<B: Backend>(attn: Tensor<B, 3>, grad: Tensor<B, 3>) -> Tensor<B, 2> {
    (grad.swap_dims(1, 2) * attn.swap_dims(1, 2))
        .clamp_min(0.0)
        .mean_dim(0)
        .squeeze(0)
}

/// Relevance propagation over a fixed number of transformer layers.
///
/// ```rust,ignore
/// use aqsol_explain::{mask_length, AttentionRelevance};
///
/// let engine = AttentionRelevance::new(6);
/// let weights = engine.compute(attn, grad, mask_length(&mask))?;
/// assert_eq!(weights.len(), mask_length(&mask) - 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttentionRelevance {
    n_layers: usize,
}

impl Default for AttentionRelevance {
    fn default() -> Self {
        Self::new(6)
    }
}

impl AttentionRelevance {
    /// Propagate through the first `n_layers` layers.
    #[must_use]
    pub fn new(n_layers: usize) -> Self {
        Self { n_layers }
    }

    /// Engine matching `config.n_layers`.
    #[must_use]
    pub fn from_config(config: &ExplainConfig) -> Self {
        Self::new(config.n_layers)
    }

    /// Number of propagated layers.
    #[must_use]
    pub fn n_layers(&self) -> usize {
        self.n_layers
    }

    fn validate(&self, attn: [usize; 4], grad: [usize; 4], mask_len: usize) -> Result<()> {
        if attn != grad {
            return Err(CoreError::shape(format!(
                "attention {attn:?} and gradient {grad:?} differ"
            ))
            .into());
        }
        let [layers, _, queries, keys] = attn;
        if layers < self.n_layers {
            return Err(CoreError::shape(format!(
                "attention has {layers} layers, need {}",
                self.n_layers
            ))
            .into());
        }
        if queries != keys {
            return Err(CoreError::shape(format!(
                "attention maps must be square, got {queries}x{keys}"
            ))
            .into());
        }
        if mask_len == 0 {
            return Err(CoreError::EmptyTokenSequence.into());
        }
        if mask_len > queries {
            return Err(CoreError::shape(format!(
                "mask length {mask_len} exceeds sequence length {queries}"
            ))
            .into());
        }
        Ok(())
    }

    /// Accumulated relevance matrix `R`, `(ml, ml)`.
    ///
    /// # Errors
    ///
    /// - [`CoreError::ShapeMismatch`] if the shapes differ, fewer than
    ///   `n_layers` layers are present, maps are not square or `mask_len`
    ///   exceeds the sequence length
    /// - [`CoreError::EmptyTokenSequence`] if `mask_len` is zero
    pub fn aggregate<B: Backend>(
        &self,
        attn: Tensor<B, 4>,
        grad: Tensor<B, 4>,
        mask_len: usize,
    ) -> Result<Tensor<B, 2>> {
        self.aggregate_observed(attn, grad, mask_len, &[], &mut ())
    }

    /// [`AttentionRelevance::aggregate`], reporting every layer contribution
    /// `Ā_l · R_(l-1)` and the final `R - I` to `observer`.
    ///
    /// Observer failures are logged and never abort the propagation.
    pub fn aggregate_observed<B: Backend>(
        &self,
        attn: Tensor<B, 4>,
        grad: Tensor<B, 4>,
        mask_len: usize,
        tokens: &[String],
        observer: &mut dyn RelevanceObserver,
    ) -> Result<Tensor<B, 2>> {
        self.validate(attn.dims(), grad.dims(), mask_len)?;

        let [_, heads, _, _] = attn.dims();
        let device = attn.device();
        let ml = mask_len;
        let attn = attn.detach();
        let grad = grad.detach();

        let eye = Tensor::<B, 2>::eye(ml, &device);
        let mut rel = eye.clone();

        for layer in 0..self.n_layers {
            let ranges = [layer..layer + 1, 0..heads, 0..ml, 0..ml];
            let attn_l = attn.clone().slice(ranges.clone()).reshape([heads, ml, ml]);
            let grad_l = grad.clone().slice(ranges).reshape([heads, ml, ml]);

            let attn_map = average_heads(attn_l, grad_l);
            let a_bar = attn_map.matmul(rel.clone());
            tracing::debug!(layer, mask_len = ml, "relevance update");

            if observer.is_active() {
                notify(Some(layer), &a_bar, |m| observer.on_layer(layer, m, tokens));
            }
            rel = rel + a_bar;
        }

        if observer.is_active() {
            notify(None, &(rel.clone() - eye), |m| observer.on_complete(m, tokens));
        }

        Ok(rel)
    }

    /// Relevance of every token after `<REG>` to `<REG>`: `(R - I)[1..ml, 0]`.
    ///
    /// Returns an empty vector when `R` covers only the `<REG>` token.
    pub fn weights<B: Backend>(rel: Tensor<B, 2>) -> Result<Vec<f32>> {
        let [ml, cols] = rel.dims();
        if ml != cols {
            return Err(CoreError::shape(format!("relevance matrix is {ml}x{cols}")).into());
        }
        if ml < 2 {
            return Ok(Vec::new());
        }
        let eye = Tensor::<B, 2>::eye(ml, &rel.device());
        let column = (rel - eye).slice([1..ml, 0..1]);
        Ok(aqsol_core::tensor_to_vec(column)?)
    }

    /// Token relevance for one molecule: length `mask_len - 1`.
    pub fn compute<B: Backend>(
        &self,
        attn: Tensor<B, 4>,
        grad: Tensor<B, 4>,
        mask_len: usize,
    ) -> Result<Vec<f32>> {
        Self::weights(self.aggregate(attn, grad, mask_len)?)
    }

    /// [`AttentionRelevance::compute`] with an observer.
    pub fn compute_observed<B: Backend>(
        &self,
        attn: Tensor<B, 4>,
        grad: Tensor<B, 4>,
        mask_len: usize,
        tokens: &[String],
        observer: &mut dyn RelevanceObserver,
    ) -> Result<Vec<f32>> {
        Self::weights(self.aggregate_observed(attn, grad, mask_len, tokens, observer)?)
    }
}

/// Hand a host copy of `matrix` to `callback`, logging any failure.
/// `layer` is `None` for the final matrix.
fn notify<B, F>(layer: Option<usize>, matrix: &Tensor<B, 2>, callback: F)
where
    B: Backend,
    F: FnOnce(&Array2<f32>) -> Result<()>,
{
    let outcome = aqsol_core::tensor_to_array2(matrix.clone())
        .map_err(ExplainError::from)
        .and_then(|m| callback(&m));
    if let Err(err) = outcome {
        tracing::warn!(error = %err, ?layer, "relevance observer failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::HeatmapCollector;
    use aqsol_core::backend::NdArray;
    use aqsol_core::{array4_to_tensor, Seed};
    use ndarray::{s, Array4};
    use rand::Rng;

    type TestBackend = NdArray;

    fn tensor4(array: &Array4<f32>) -> Tensor<TestBackend, 4> {
        array4_to_tensor::<TestBackend>(array, &Default::default())
    }

    fn identity_heads(layers: usize, heads: usize, seq: usize) -> Array4<f32> {
        Array4::from_shape_fn((layers, heads, seq, seq), |(_, _, q, k)| {
            if q == k {
                1.0
            } else {
                0.0
            }
        })
    }

    #[test]
    fn test_mask_length() {
        assert_eq!(mask_length(&[1i64, 1, 0]), 2);
        assert_eq!(mask_length::<u8>(&[]), 0);
    }

    #[test]
    fn test_self_attention_only_gives_zero_weights() {
        let attn = identity_heads(1, 2, 4);
        let grad = Array4::<f32>::ones((1, 2, 4, 4));

        let weights = AttentionRelevance::new(1)
            .compute(tensor4(&attn), tensor4(&grad), 4)
            .unwrap();
        assert_eq!(weights, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_recurrence_matches_host_computation() {
        let (layers, seq) = (3, 5);
        let mut rng = Seed::new(11).to_rng();
        let attn = Array4::from_shape_fn((layers, 1, seq, seq), |_| rng.gen::<f32>());
        let grad = Array4::<f32>::ones((layers, 1, seq, seq));

        let mut collector = HeatmapCollector::default();
        let rel = AttentionRelevance::new(layers)
            .aggregate_observed(tensor4(&attn), tensor4(&grad), seq, &[], &mut collector)
            .unwrap();
        let rel = aqsol_core::tensor_to_array2(rel).unwrap();

        // One head, unit gradient: Ā_l is the transposed attention map.
        let mut expected = Array2::<f32>::eye(seq);
        for (l, contribution) in collector.layers().iter().enumerate() {
            let a: Array2<f32> = attn.slice(s![l, 0, .., ..]).t().to_owned();
            let step = a.dot(&expected);
            for (got, want) in contribution.iter().zip(step.iter()) {
                assert!((got - want).abs() < 1e-4);
            }
            expected = &expected + &step;
        }
        for (got, want) in rel.iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-3, "{got} vs {want}");
        }

        let full = collector.full().unwrap();
        let diff = &expected - &Array2::<f32>::eye(seq);
        for (got, want) in full.iter().zip(diff.iter()) {
            assert!((got - want).abs() < 1e-3);
        }
    }

    #[test]
    fn test_multi_head_signed_gradients_match_host_computation() {
        let (layers, heads, seq, ml) = (3, 4, 7, 6);
        let mut rng = Seed::new(23).to_rng();
        let attn = Array4::from_shape_fn((layers, heads, seq, seq), |_| rng.gen::<f32>());
        let grad = Array4::from_shape_fn((layers, heads, seq, seq), |_| rng.gen::<f32>() * 2.0 - 1.0);

        // R += mean_h(max(0, Gᵀ ⊙ Aᵀ)) · R over the first ml positions
        let mut expected = Array2::<f32>::eye(ml);
        for l in 0..layers {
            let a_bar = Array2::from_shape_fn((ml, ml), |(q, k)| {
                (0..heads)
                    .map(|h| (grad[[l, h, k, q]] * attn[[l, h, k, q]]).max(0.0))
                    .sum::<f32>()
                    / heads as f32
            });
            let step: Array2<f32> = a_bar.dot(&expected);
            expected = &expected + &step;
        }

        let engine = AttentionRelevance::new(layers);
        let rel = engine
            .aggregate(tensor4(&attn), tensor4(&grad), ml)
            .unwrap();
        let rel = aqsol_core::tensor_to_array2(rel).unwrap();
        assert_eq!(rel.dim(), (ml, ml));
        for (got, want) in rel.iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-4, "{got} vs {want}");
        }

        let weights = engine
            .compute(tensor4(&attn), tensor4(&grad), ml)
            .unwrap();
        assert_eq!(weights.len(), ml - 1);
        for (i, w) in weights.iter().enumerate() {
            assert!((w - expected[[i + 1, 0]]).abs() < 1e-4);
        }
    }

    #[test]
    fn test_negative_products_are_clamped() {
        let attn = Array4::<f32>::from_elem((1, 2, 3, 3), 0.5);
        let grad = Array4::<f32>::from_elem((1, 2, 3, 3), -1.0);
        let weights = AttentionRelevance::new(1)
            .compute(tensor4(&attn), tensor4(&grad), 3)
            .unwrap();
        assert_eq!(weights, vec![0.0, 0.0]);
    }

    #[test]
    fn test_end_to_end_shape() {
        let mut rng = Seed::new(3).to_rng();
        let attn = Array4::from_shape_fn((2, 4, 5, 5), |_| rng.gen::<f32>());
        let grad = Array4::<f32>::ones((2, 4, 5, 5));

        let weights = AttentionRelevance::new(2)
            .compute(tensor4(&attn), tensor4(&grad), 5)
            .unwrap();
        assert_eq!(weights.len(), 4);
        assert!(weights.iter().all(|w| w.is_finite()));
    }

    #[test]
    fn test_mask_restricts_sequence() {
        let mut rng = Seed::new(5).to_rng();
        let attn = Array4::from_shape_fn((2, 2, 6, 6), |_| rng.gen::<f32>());
        let grad = Array4::<f32>::ones((2, 2, 6, 6));

        let full = AttentionRelevance::new(2)
            .compute(tensor4(&attn), tensor4(&grad), 4)
            .unwrap();
        let cropped = attn.slice(s![.., .., ..4, ..4]).to_owned();
        let cropped_grad = grad.slice(s![.., .., ..4, ..4]).to_owned();
        let direct = AttentionRelevance::new(2)
            .compute(tensor4(&cropped), tensor4(&cropped_grad), 4)
            .unwrap();

        assert_eq!(full.len(), 3);
        for (a, b) in full.iter().zip(&direct) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_single_token_gives_empty_weights() {
        let attn = Array4::<f32>::ones((1, 1, 3, 3));
        let weights = AttentionRelevance::new(1)
            .compute(tensor4(&attn), tensor4(&attn), 1)
            .unwrap();
        assert!(weights.is_empty());
    }

    #[test]
    fn test_validation_errors() {
        let engine = AttentionRelevance::new(2);
        let attn = Array4::<f32>::ones((2, 1, 4, 4));

        let mismatched = Array4::<f32>::ones((2, 1, 5, 5));
        assert!(matches!(
            engine.compute(tensor4(&attn), tensor4(&mismatched), 3),
            Err(crate::ExplainError::Core(CoreError::ShapeMismatch(_)))
        ));

        let shallow = Array4::<f32>::ones((1, 1, 4, 4));
        assert!(matches!(
            engine.compute(tensor4(&shallow), tensor4(&shallow), 3),
            Err(crate::ExplainError::Core(CoreError::ShapeMismatch(_)))
        ));

        assert!(matches!(
            engine.compute(tensor4(&attn), tensor4(&attn), 0),
            Err(crate::ExplainError::Core(CoreError::EmptyTokenSequence))
        ));
        assert!(matches!(
            engine.compute(tensor4(&attn), tensor4(&attn), 5),
            Err(crate::ExplainError::Core(CoreError::ShapeMismatch(_)))
        ));
    }
}

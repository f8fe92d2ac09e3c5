//! Gradient isolation at a head's input boundary.
//!
//! Instead of a hook registered during the forward pass, a head exposes the
//! point where isolation happens (its *boundary*). [`MaskedHead::backward_with`]
//! runs the prediction from a detached copy of the boundary activation,
//! hands the boundary gradient to a caller-supplied transform, then pushes the
//! transformed gradient back to the embedding through a vector-Jacobian
//! product. The forward output is never altered by the transform.

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

use crate::error::{ModelError, Result};

/// Result of a masked backward pass. All tensors are detached.
#[derive(Debug, Clone)]
pub struct MaskedBackward<B: Backend> {
    /// Head output, `(N,)`.
    pub prediction: Tensor<B, 1>,
    /// Gradient of the summed prediction at the boundary, before the transform.
    pub boundary_grad: Tensor<B, 2>,
    /// Boundary gradient after the transform.
    pub masked_grad: Tensor<B, 2>,
    /// Transformed gradient propagated back to the embedding input.
    pub input_grad: Tensor<B, 2>,
}

/// A regression head whose backward pass can be filtered at its boundary.
pub trait MaskedHead<B: AutodiffBackend> {
    /// Map embeddings `(N, D)` to the boundary activation.
    fn boundary(&self, x: Tensor<B, 2>) -> Tensor<B, 2>;

    /// Predict `(N,)` from a boundary activation.
    fn predict_from_boundary(&self, h: Tensor<B, 2>) -> Tensor<B, 1>;

    /// The head's own gradient transform.
    ///
    /// `feature_ids` is a per-call override; heads that filter by another
    /// criterion may ignore it.
    fn transform_gradient(
        &self,
        grad: Tensor<B::InnerBackend, 2>,
        feature_ids: Option<&[usize]>,
    ) -> Result<Tensor<B::InnerBackend, 2>>;

    /// Forward pass, then backward with `transform` applied at the boundary.
    fn backward_with<F>(&self, x: Tensor<B, 2>, transform: F) -> Result<MaskedBackward<B::InnerBackend>>
    where
        F: FnOnce(Tensor<B::InnerBackend, 2>) -> Result<Tensor<B::InnerBackend, 2>>,
    {
        let x = x.detach().require_grad();
        let boundary = self.boundary(x.clone());

        let cut = boundary.clone().detach().require_grad();
        let prediction = self.predict_from_boundary(cut.clone());
        let grads = prediction.clone().sum().backward();
        let boundary_grad = cut
            .grad(&grads)
            .ok_or(ModelError::MissingGradient("head boundary"))?;

        let masked_grad = transform(boundary_grad.clone())?;

        let vjp = (boundary * Tensor::from_inner(masked_grad.clone())).sum();
        let grads = vjp.backward();
        let input_grad = x
            .grad(&grads)
            .ok_or(ModelError::MissingGradient("embedding input"))?;

        Ok(MaskedBackward {
            prediction: prediction.inner(),
            boundary_grad,
            masked_grad,
            input_grad,
        })
    }

    /// Masked backward pass using [`MaskedHead::transform_gradient`].
    fn attribute(
        &self,
        x: Tensor<B, 2>,
        feature_ids: Option<&[usize]>,
    ) -> Result<MaskedBackward<B::InnerBackend>> {
        self.backward_with(x, |grad| self.transform_gradient(grad, feature_ids))
    }
}

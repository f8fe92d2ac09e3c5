//! Feed-forward regression head over pooled embeddings.

use burn::nn::{LayerNorm, LayerNormConfig, Linear, LinearConfig};
use burn::module::Ignored;
use burn::prelude::*;
use burn::tensor::activation::relu;
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::features::{mask_features, resolve_feature_ids};
use crate::head::MaskedHead;

/// Configuration for [`MaskedRegressionHead`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskedRegressionHeadConfig {
    /// Embedding width.
    pub dim: usize,
    /// Width of both hidden layers.
    pub hidden: usize,
    /// Fixed feature ids; these win over any per-call override.
    #[serde(default)]
    pub feature_ids: Option<Vec<usize>>,
}

impl Default for MaskedRegressionHeadConfig {
    fn default() -> Self {
        Self {
            dim: 512,
            hidden: 64,
            feature_ids: None,
        }
    }
}

impl MaskedRegressionHeadConfig {
    /// Create a config for embeddings of width `dim`.
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            ..Default::default()
        }
    }

    /// Set the hidden width.
    #[must_use]
    pub fn with_hidden(mut self, hidden: usize) -> Self {
        self.hidden = hidden;
        self
    }

    /// Fix the feature ids used for isolation.
    #[must_use]
    pub fn with_feature_ids(mut self, ids: Vec<usize>) -> Self {
        self.feature_ids = Some(ids);
        self
    }

    /// Initialize the head.
    pub fn init<B: Backend>(&self, device: &B::Device) -> MaskedRegressionHead<B> {
        MaskedRegressionHead::new(self.clone(), device)
    }
}

/// LayerNorm followed by a three-layer perceptron producing one value per row.
///
/// ```text
/// x (N, dim) -> LayerNorm -> | boundary | -> Linear(dim, hidden) -> ReLU
///            -> Linear(hidden, hidden) -> ReLU -> Linear(hidden, 1) -> (N,)
/// ```
///
/// Gradient isolation happens on the normalised activation.
#[derive(Module, Debug)]
pub struct MaskedRegressionHead<B: Backend> {
    norm: LayerNorm<B>,
    fc1: Linear<B>,
    fc2: Linear<B>,
    fc3: Linear<B>,
    config: Ignored<MaskedRegressionHeadConfig>,
}

impl<B: Backend> MaskedRegressionHead<B> {
    /// Create a new head.
    pub fn new(config: MaskedRegressionHeadConfig, device: &B::Device) -> Self {
        Self {
            norm: LayerNormConfig::new(config.dim).init(device),
            fc1: LinearConfig::new(config.dim, config.hidden).init(device),
            fc2: LinearConfig::new(config.hidden, config.hidden).init(device),
            fc3: LinearConfig::new(config.hidden, 1).init(device),
            config: Ignored(config),
        }
    }

    /// Head configuration.
    pub fn config(&self) -> &MaskedRegressionHeadConfig {
        &self.config.0
    }

    /// Forward pass: `(N, dim)` embeddings to `(N,)` predictions.
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 1> {
        self.predict_normed(self.norm.forward(x))
    }

    fn predict_normed(&self, h: Tensor<B, 2>) -> Tensor<B, 1> {
        let h = relu(self.fc1.forward(h));
        let h = relu(self.fc2.forward(h));
        self.fc3.forward(h).squeeze(1)
    }

    /// Weights from every hidden unit into the first unit of the second
    /// layer, the vector ranked by the feature-id heuristic.
    pub fn representative_weights(&self) -> Result<Vec<f32>> {
        let weight = self.fc2.weight.val();
        let [d_in, _] = weight.dims();
        let column = weight.slice([0..d_in, 0..1]);
        Ok(aqsol_core::tensor_to_vec(column)?)
    }

    /// Feature ids for one call (fixed ids, then `overrides`, then the
    /// ranking heuristic).
    pub fn feature_ids(&self, overrides: Option<&[usize]>) -> Result<Vec<usize>> {
        let fixed = self.config.0.feature_ids.as_deref();
        let unset = |ids: Option<&[usize]>| ids.map_or(true, <[usize]>::is_empty);
        let weights = if unset(fixed) && unset(overrides) {
            self.representative_weights()?
        } else {
            Vec::new()
        };
        resolve_feature_ids(fixed, overrides, &weights)
    }

    /// Zero every column of `x` outside the resolved feature ids.
    pub fn mask_features<B2: Backend>(
        &self,
        x: Tensor<B2, 2>,
        overrides: Option<&[usize]>,
    ) -> Result<Tensor<B2, 2>> {
        let ids = self.feature_ids(overrides)?;
        mask_features(x, &ids)
    }
}

impl<B: AutodiffBackend> MaskedHead<B> for MaskedRegressionHead<B> {
    fn boundary(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        self.norm.forward(x)
    }

    fn predict_from_boundary(&self, h: Tensor<B, 2>) -> Tensor<B, 1> {
        self.predict_normed(h)
    }

    fn transform_gradient(
        &self,
        grad: Tensor<B::InnerBackend, 2>,
        feature_ids: Option<&[usize]>,
    ) -> Result<Tensor<B::InnerBackend, 2>> {
        self.mask_features(grad, feature_ids)
    }
}

//! Single-layer regression head with sign filtering.

use std::fmt;
use std::str::FromStr;

use burn::module::Ignored;
use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

use aqsol_core::CoreError;

use crate::error::Result;
use crate::features::{mask_features, resolve_feature_ids};
use crate::head::MaskedHead;

/// Which input features a [`MaskedLinearRegressionHead`] lets through,
/// judged by the sign of their weight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignFilter {
    /// Features with a positive weight.
    #[serde(alias = "pos")]
    Positive,
    /// Features with a negative weight.
    #[serde(alias = "neg")]
    Negative,
    /// No filtering.
    #[default]
    All,
}

impl SignFilter {
    /// Name used in configs and on the command line.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SignFilter::Positive => "positive",
            SignFilter::Negative => "negative",
            SignFilter::All => "all",
        }
    }

    /// 0/1 mask `(1, dim)` selecting the weights of this sign, or `None`
    /// for [`SignFilter::All`]. Zero weights are never selected.
    pub fn mask<B: Backend>(&self, weights: Tensor<B, 2>) -> Option<Tensor<B, 2>> {
        let [d_in, _] = weights.dims();
        let row = weights.slice([0..d_in, 0..1]).reshape([1, d_in]);
        match self {
            SignFilter::Positive => Some(row.greater_elem(0.0).float()),
            SignFilter::Negative => Some(row.lower_elem(0.0).float()),
            SignFilter::All => None,
        }
    }
}

impl fmt::Display for SignFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignFilter {
    type Err = CoreError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pos" | "positive" => Ok(SignFilter::Positive),
            "neg" | "negative" => Ok(SignFilter::Negative),
            "all" | "none" => Ok(SignFilter::All),
            other => Err(CoreError::InvalidConfig(format!(
                "unknown sign filter '{other}', expected pos, neg or all"
            ))),
        }
    }
}

/// Configuration for [`MaskedLinearRegressionHead`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskedLinearRegressionHeadConfig {
    /// Embedding width.
    pub dim: usize,
    /// Sign filter applied in the forward pass and to the input gradient.
    #[serde(default)]
    pub sign: SignFilter,
    /// Fixed feature ids for [`MaskedLinearRegressionHead::mask_features`].
    #[serde(default)]
    pub feature_ids: Option<Vec<usize>>,
}

impl Default for MaskedLinearRegressionHeadConfig {
    fn default() -> Self {
        Self {
            dim: 512,
            sign: SignFilter::All,
            feature_ids: None,
        }
    }
}

impl MaskedLinearRegressionHeadConfig {
    /// Create a config for embeddings of width `dim`.
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            ..Default::default()
        }
    }

    /// Set the sign filter.
    #[must_use]
    pub fn with_sign(mut self, sign: SignFilter) -> Self {
        self.sign = sign;
        self
    }

    /// Fix the feature ids.
    #[must_use]
    pub fn with_feature_ids(mut self, ids: Vec<usize>) -> Self {
        self.feature_ids = Some(ids);
        self
    }

    /// Initialize the head.
    pub fn init<B: Backend>(&self, device: &B::Device) -> MaskedLinearRegressionHead<B> {
        tracing::debug!(sign = %self.sign, dim = self.dim, "initializing linear masked head");
        MaskedLinearRegressionHead::new(self.clone(), device)
    }
}

/// `Linear(dim, 1)` whose inputs are filtered by the sign of their weight.
///
/// With a filter other than [`SignFilter::All`], inputs whose weight has the
/// other sign are zeroed before the linear layer, and the same mask is
/// applied to the gradient at the input.
#[derive(Module, Debug)]
pub struct MaskedLinearRegressionHead<B: Backend> {
    fc1: Linear<B>,
    config: Ignored<MaskedLinearRegressionHeadConfig>,
}

impl<B: Backend> MaskedLinearRegressionHead<B> {
    /// Create a new head.
    pub fn new(config: MaskedLinearRegressionHeadConfig, device: &B::Device) -> Self {
        Self {
            fc1: LinearConfig::new(config.dim, 1).init(device),
            config: Ignored(config),
        }
    }

    /// Head configuration.
    pub fn config(&self) -> &MaskedLinearRegressionHeadConfig {
        &self.config.0
    }

    /// Sign filter in use.
    pub fn sign(&self) -> SignFilter {
        self.config.0.sign
    }

    /// Zero the inputs rejected by the sign filter.
    pub fn mask_sign(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        match self.sign().mask(self.fc1.weight.val()) {
            Some(mask) => x * mask,
            None => x,
        }
    }

    /// Forward pass: `(N, dim)` embeddings to `(N,)` predictions.
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 1> {
        self.fc1.forward(self.mask_sign(x)).squeeze(1)
    }

    /// The weight vector, one entry per input feature.
    pub fn representative_weights(&self) -> Result<Vec<f32>> {
        let weight = self.fc1.weight.val();
        let [d_in, _] = weight.dims();
        Ok(aqsol_core::tensor_to_vec(weight.slice([0..d_in, 0..1]))?)
    }

    /// Feature ids for one call (fixed ids, then `overrides`, then the
    /// ranking heuristic over the weight vector).
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

impl<B: AutodiffBackend> MaskedHead<B> for MaskedLinearRegressionHead<B> {
    fn boundary(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        x
    }

    fn predict_from_boundary(&self, h: Tensor<B, 2>) -> Tensor<B, 1> {
        self.forward(h)
    }

    /// Applies the sign mask; `feature_ids` is not used by this head.
    fn transform_gradient(
        &self,
        grad: Tensor<B::InnerBackend, 2>,
        _feature_ids: Option<&[usize]>,
    ) -> Result<Tensor<B::InnerBackend, 2>> {
        Ok(match self.sign().mask(self.fc1.weight.val().inner()) {
            Some(mask) => grad * mask,
            None => grad,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aqsol_core::backend::{NdArray, NdArrayAutodiff};

    type TestBackend = NdArray;
    type TestAutodiffBackend = NdArrayAutodiff;

    #[test]
    fn test_sign_filter_parse() {
        assert_eq!("pos".parse::<SignFilter>().unwrap(), SignFilter::Positive);
        assert_eq!("Negative".parse::<SignFilter>().unwrap(), SignFilter::Negative);
        assert_eq!("all".parse::<SignFilter>().unwrap(), SignFilter::All);
        assert!("up".parse::<SignFilter>().is_err());
    }

    #[test]
    fn test_sign_filter_serde_aliases() {
        let sign: SignFilter = serde_json::from_str("\"neg\"").unwrap();
        assert_eq!(sign, SignFilter::Negative);
        assert_eq!(serde_json::to_string(&SignFilter::Positive).unwrap(), "\"positive\"");
    }

    #[test]
    fn test_forward_matches_manual_masking() {
        let device = Default::default();
        let head = MaskedLinearRegressionHeadConfig::new(6)
            .with_sign(SignFilter::Positive)
            .init::<TestBackend>(&device);

        let weights = head.representative_weights().unwrap();
        let bias: f32 = head.fc1.bias.as_ref().unwrap().val().into_scalar().elem();
        let x: Vec<f32> = vec![0.5, -1.0, 2.0, 0.25, -0.75, 1.5];
        let expected: f32 = bias
            + x.iter()
                .zip(&weights)
                .filter(|(_, w)| **w > 0.0)
                .map(|(v, w)| v * w)
                .sum::<f32>();

        let input = Tensor::<TestBackend, 1>::from_floats(x.as_slice(), &device).reshape([1, 6]);
        let out: f32 = head.forward(input).into_scalar().elem();
        assert!((out - expected).abs() < 1e-5);
    }

    #[test]
    fn test_input_gradient_follows_sign() {
        let device = Default::default();
        let head = MaskedLinearRegressionHeadConfig::new(8)
            .with_sign(SignFilter::Negative)
            .init::<TestAutodiffBackend>(&device);
        let weights = head.representative_weights().unwrap();

        let x = Tensor::<TestAutodiffBackend, 2>::ones([2, 8], &device);
        let out = head.attribute(x, None).unwrap();
        let grad = aqsol_core::tensor_to_vec(out.input_grad).unwrap();

        for (i, g) in grad.iter().enumerate() {
            let w = weights[i % 8];
            let expected = if w < 0.0 { w } else { 0.0 };
            assert!((g - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn test_feature_id_precedence() {
        let device = Default::default();
        let head = MaskedLinearRegressionHeadConfig::new(6).init::<TestBackend>(&device);
        let weights = head.representative_weights().unwrap();
        let heuristic = crate::features::default_feature_id(&weights).unwrap();

        assert_eq!(head.feature_ids(None).unwrap(), vec![heuristic]);
        assert_eq!(head.feature_ids(Some(&[])).unwrap(), vec![heuristic]);
        assert_eq!(head.feature_ids(Some(&[2, 4])).unwrap(), vec![2, 4]);

        let fixed = MaskedLinearRegressionHeadConfig::new(6)
            .with_feature_ids(vec![1])
            .init::<TestBackend>(&device);
        assert_eq!(fixed.feature_ids(Some(&[2, 4])).unwrap(), vec![1]);

        let x = Tensor::<TestBackend, 2>::ones([2, 6], &device);
        let masked = aqsol_core::tensor_to_vec(fixed.mask_features(x, None).unwrap()).unwrap();
        for (i, v) in masked.iter().enumerate() {
            let expected = if i % 6 == 1 { 1.0 } else { 0.0 };
            assert_eq!(*v, expected);
        }
    }

    #[test]
    fn test_all_filter_is_identity() {
        let device = Default::default();
        let head = MaskedLinearRegressionHeadConfig::new(4).init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 2>::ones([3, 4], &device);
        let masked = aqsol_core::tensor_to_vec(head.mask_sign(x)).unwrap();
        assert!(masked.iter().all(|&v| v == 1.0));
    }
}

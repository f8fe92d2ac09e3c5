//! # aqsol_models
//!
//! Regression heads mapping pooled molecule embeddings to logS.
//!
//! - [`MaskedRegressionHead`]: LayerNorm and a three-layer perceptron
//! - [`MaskedLinearRegressionHead`]: one linear layer with a [`SignFilter`]
//!
//! Both implement [`MaskedHead`], which runs a backward pass with a
//! gradient transform applied at the head's input boundary. This isolates
//! the contribution of selected embedding features without changing the
//! prediction.
//!
//! ## Example
//!
//! ```rust,ignore
//! use aqsol_core::backend::NdArrayAutodiff;
//! use aqsol_models::{MaskedHead, MaskedRegressionHeadConfig};
//!
//! let head = MaskedRegressionHeadConfig::new(512).init::<NdArrayAutodiff>(&device);
//! let out = head.attribute(embeddings, Some(&[3, 7]))?;
//! // out.input_grad: gradient w.r.t. the embeddings, restricted to features 3 and 7
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
mod error;
mod features;
mod head;
mod linear;
mod mlp;

pub use checkpoint::{
    load_head_record, save_head, CheckpointMetadata, HeadCheckpoint, HeadConfig,
};
pub use error::{ModelError, Result};
pub use features::{
    apply_column_mask, default_feature_id, feature_mask, mask_features, rank_by_magnitude,
    resolve_feature_ids,
};
pub use head::{MaskedBackward, MaskedHead};
pub use linear::{MaskedLinearRegressionHead, MaskedLinearRegressionHeadConfig, SignFilter};
pub use mlp::{MaskedRegressionHead, MaskedRegressionHeadConfig};

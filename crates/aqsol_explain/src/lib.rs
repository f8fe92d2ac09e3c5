//! # aqsol_explain
//!
//! Token-level attribution for the solubility model.
//!
//! This crate provides:
//! - [`AttentionRelevance`]: gradient-weighted relevance propagation over
//!   self-attention maps, scoring each token against the pooled `<REG>` token
//! - [`RelevanceObserver`] with [`HeatmapCollector`] and [`NpyHeatmapWriter`]
//!   for the intermediate matrices
//! - [`ColorMapper`] and [`MoleculeHighlight`] for turning atom-token scores
//!   into colours for a drawing tool
//!
//! ## Example
//!
//! ```rust,ignore
//! use aqsol_explain::{mask_length, AttentionRelevance, ExplainConfig, MoleculeHighlight};
//!
//! let config = ExplainConfig::default();
//! let weights = AttentionRelevance::from_config(&config)
//!     .compute(attn, grad, mask_length(&mask))?;
//! let highlight = MoleculeHighlight::new(
//!     &config.color_mapper()?, smiles, tokens, &weights, log_s, pred,
//! )?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod color;
mod config;
mod error;
mod observer;
mod relevance;

pub use color::{
    highlight_label, is_atom_token, palette, ColorMapper, MoleculeHighlight, Rgba, ATOM_TOKENS,
    NON_ATOM_TOKENS, PALETTE_HIGH, PALETTE_LOW,
};
pub use config::ExplainConfig;
pub use error::{ExplainError, Result};
pub use observer::{HeatmapCollector, NpyHeatmapWriter, RelevanceObserver, REG_TOKEN};
pub use relevance::{average_heads, mask_length, AttentionRelevance};

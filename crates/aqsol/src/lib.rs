//! # aqsol
//!
//! Explainability tooling for transformer solubility models in Rust.
//!
//! - **Relevance**: attention-gradient propagation to per-token weights
//! - **Colouring**: atom-level highlights from relevance weights
//! - **Heads**: regression heads whose input gradients can be isolated to
//!   selected embedding features
//! - **Analysis**: PCA and k-means over embedding spaces
//! - **Training**: fitting and scoring heads on precomputed embeddings
//!
//! The encoder itself is external: attention/gradient stacks and embeddings
//! are read from `.npz`/`.npy` files.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use aqsol::prelude::*;
//!
//! let (attn, grad) = read_attention_npz("mol0.npz")?;
//! let tokens = SmilesTokenizer::new().tokenize("CC(=O)O")?;
//!
//! let device = Default::default();
//! let weights = AttentionRelevance::new(6).compute::<NdArray>(
//!     array4_to_tensor(&attn, &device),
//!     array4_to_tensor(&grad, &device),
//!     tokens.len() + 1,
//! )?;
//!
//! let mapper = ColorMapper::new(0.0, 1.0)?;
//! let highlight = MoleculeHighlight::new(&mapper, "CC(=O)O", tokens, &weights, -0.2, -0.3)?;
//! ```
//!
//! ## Feature Flags
//!
//! - `backend-ndarray` (default): CPU backend using ndarray

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

// Re-export all crates
pub use aqsol_analysis as analysis;
pub use aqsol_core as core;
pub use aqsol_data as data;
pub use aqsol_explain as explain;
pub use aqsol_models as models;
pub use aqsol_train as train;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use aqsol::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use aqsol_core::{
        array1_to_tensor, array2_to_tensor, array4_to_tensor, tensor_to_array2, tensor_to_vec,
        CoreError, Seed, Split,
    };

    #[cfg(feature = "backend-ndarray")]
    pub use aqsol_core::backend::{NdArray, NdArrayAutodiff};

    // Data
    pub use aqsol_data::{
        read_attention_npz, read_embeddings_npy, read_labels_npy, read_tokens_json,
        train_test_split, AqSolDataset, CombiSoluDataset, EmbeddingDataset, EmbeddingLoaders,
        SmilesTokenizer,
    };

    // Models
    pub use aqsol_models::{
        HeadCheckpoint, MaskedHead, MaskedLinearRegressionHead, MaskedLinearRegressionHeadConfig,
        MaskedRegressionHead, MaskedRegressionHeadConfig, SignFilter,
    };

    // Explain
    pub use aqsol_explain::{
        AttentionRelevance, ColorMapper, ExplainConfig, HeatmapCollector, MoleculeHighlight,
        NpyHeatmapWriter, RelevanceObserver,
    };

    // Analysis
    pub use aqsol_analysis::{ClusterConfig, EmbeddingReport, KMeans, Pca};

    // Training
    pub use aqsol_train::{HeadTrainer, HeadTrainerConfig, RegressionMetrics};
}

//! # aqsol_core
//!
//! Core types shared by the aqsol-rs crates.
//!
//! This crate provides:
//! - [`CoreError`] with the input-validation error kinds used across the workspace
//! - [`Seed`] for deterministic random number generation
//! - [`Split`] for train/valid/test subset selection
//! - Conversions between `ndarray` host arrays and Burn tensors
//!
//! ## Tensor Conventions
//!
//! - Embeddings are `(N, D)`: molecules by embedding features.
//! - Attention and gradient stacks are `(L, H, S, S)`: layers, heads,
//!   query positions, key positions.
//!
//! ## Example
//!
//! ```rust,ignore
//! use aqsol_core::{Seed, Split};
//!
//! let seed = Seed::new(42);
//! let split: Split = "valid".parse()?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod seed;
mod split;
mod tensor;

pub use error::{CoreError, Result};
pub use seed::Seed;
pub use split::Split;
pub use tensor::{
    array1_to_tensor, array2_to_tensor, array4_to_tensor, tensor_to_array2, tensor_to_vec,
};

/// Backend type aliases for convenience
pub mod backend {
    pub use burn_autodiff::Autodiff;

    #[cfg(feature = "backend-ndarray")]
    pub use burn_ndarray::NdArray;

    /// CPU backend with reverse-mode autodiff, used to fit and attribute heads.
    #[cfg(feature = "backend-ndarray")]
    pub type NdArrayAutodiff = Autodiff<NdArray>;
}

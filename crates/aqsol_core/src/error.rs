//! Error types for aqsol_core.

use thiserror::Error;

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

/// Input-validation errors shared by every aqsol crate.
///
/// All variants describe deterministic problems with the caller's input and
/// are surfaced as-is; nothing in the workspace retries on them.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Tensor or array shapes do not line up.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A token sequence (or mask) contained no usable positions.
    #[error("Token sequence is empty")]
    EmptyTokenSequence,

    /// A feature id does not address a column of the embedding.
    #[error("Invalid feature index {index} for {len} features")]
    InvalidFeatureIndex {
        /// The offending feature id.
        index: usize,
        /// Number of addressable features.
        len: usize,
    },

    /// Colour normalisation bounds are inverted.
    #[error("Invalid normalisation bounds: vmin {vmin} > vmax {vmax}")]
    InvalidBounds {
        /// Lower bound.
        vmin: f32,
        /// Upper bound.
        vmax: f32,
    },

    /// Configuration value out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CoreError {
    /// Shorthand for a [`CoreError::ShapeMismatch`] with a formatted message.
    pub fn shape(msg: impl Into<String>) -> Self {
        Self::ShapeMismatch(msg.into())
    }
}

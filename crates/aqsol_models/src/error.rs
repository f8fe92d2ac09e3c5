//! Error types for aqsol_models.

use aqsol_core::CoreError;
use thiserror::Error;

/// Result type alias using [`ModelError`].
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors raised by the regression heads and their checkpoints.
#[derive(Error, Debug)]
pub enum ModelError {
    /// Input validation failed (shapes, feature ids).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A tensor expected to carry a gradient had none after backward.
    #[error("No gradient recorded for {0}")]
    MissingGradient(&'static str),

    /// Error saving checkpoint.
    #[error("Failed to save checkpoint: {0}")]
    Save(String),

    /// Error loading checkpoint.
    #[error("Failed to load checkpoint: {0}")]
    Load(String),

    /// Checkpoint holds a different head than requested.
    #[error("Checkpoint head mismatch: expected {expected}, found {found}")]
    HeadMismatch {
        /// Head kind the caller asked for.
        expected: &'static str,
        /// Head kind stored in the metadata.
        found: &'static str,
    },
}

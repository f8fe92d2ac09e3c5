//! Error types for aqsol_explain.

use aqsol_core::CoreError;
use aqsol_data::DataError;
use thiserror::Error;

/// Result type alias using [`ExplainError`].
pub type Result<T> = std::result::Result<T, ExplainError>;

/// Errors raised while computing or exporting relevance.
#[derive(Error, Debug)]
pub enum ExplainError {
    /// Invalid input shapes, mask length or colour bounds.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Failure writing heatmap arrays.
    #[error(transparent)]
    Data(#[from] DataError),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

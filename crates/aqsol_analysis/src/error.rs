//! Error types for aqsol_analysis.

use aqsol_core::CoreError;
use thiserror::Error;

/// Result type alias using [`AnalysisError`].
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Errors raised by the embedding analyses.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Too few samples or components for the requested fit.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Shared validation error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// JSON encoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

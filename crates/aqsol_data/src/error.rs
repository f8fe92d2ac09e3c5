//! Error types for aqsol_data.

use thiserror::Error;

/// Result type alias using [`DataError`].
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors that can occur while loading, splitting or batching data.
#[derive(Error, Debug)]
pub enum DataError {
    /// Invalid data shape.
    #[error("Invalid shape: {0}")]
    InvalidShape(String),

    /// Empty dataset.
    #[error("Dataset is empty")]
    EmptyDataset,

    /// Index out of bounds.
    #[error("Index {index} out of bounds for length {length}")]
    IndexOutOfBounds {
        /// The requested index.
        index: usize,
        /// The length of the collection.
        length: usize,
    },

    /// Batch size error.
    #[error("Invalid batch size: {0}")]
    InvalidBatchSize(String),

    /// Split error.
    #[error("Split error: {0}")]
    SplitError(String),

    /// Array file could not be read or written.
    #[error("Array file error: {0}")]
    Npy(String),

    /// SMILES string could not be tokenised.
    #[error("Parse error: {0}")]
    Parse(String),

    /// CSV error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Core error.
    #[error(transparent)]
    Core(#[from] aqsol_core::CoreError),
}

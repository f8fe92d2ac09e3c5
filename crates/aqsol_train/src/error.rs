//! Error types for training.

use thiserror::Error;

/// Result type alias for training operations.
pub type Result<T> = std::result::Result<T, TrainError>;

/// Errors that can occur during training and evaluation.
#[derive(Error, Debug)]
pub enum TrainError {
    /// A loader yielded a batch without labels.
    #[error("Batch has no targets")]
    MissingTargets,

    /// An epoch produced no batches.
    #[error("Loader produced no batches")]
    EmptyEpoch,

    /// Metric inputs are empty or misaligned.
    #[error("Invalid metric input: {0}")]
    InvalidMetricInput(String),

    /// Data error.
    #[error("Data error: {0}")]
    DataError(#[from] aqsol_data::DataError),

    /// Model error.
    #[error("Model error: {0}")]
    ModelError(#[from] aqsol_models::ModelError),

    /// Core error.
    #[error("Core error: {0}")]
    CoreError(#[from] aqsol_core::CoreError),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

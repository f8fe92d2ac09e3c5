//! # aqsol_data
//!
//! Data handling for aqsol-rs.
//!
//! This crate provides:
//! - [`AqSolDataset`] and [`CombiSoluDataset`] for the solubility CSV files
//! - [`LabelScaler`] for min-max scaling of logS labels
//! - [`SmilesTokenizer`] for splitting SMILES into atom/bond tokens
//! - [`EmbeddingDataset`] and [`EmbeddingLoaders`] for batched head training
//! - Seeded train/valid/test splitting of embedding datasets
//! - I/O for `.npy`/`.npz` arrays produced by the embedding model
//!
//! ## Example
//!
//! ```rust,ignore
//! use aqsol_core::Split;
//! use aqsol_data::{AqSolDataset, SmilesTokenizer};
//!
//! let train = AqSolDataset::from_csv("data/AqueousSolu.csv", Split::Train, 0.9)?;
//! let tokens = SmilesTokenizer::new().tokenize(train.smiles()[0].as_str())?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod dataset;
mod error;
mod io;
mod loader;
mod solubility;
mod splits;
mod tokenizer;

pub use dataset::EmbeddingDataset;
pub use error::{DataError, Result};
pub use io::{
    read_attention_npz, read_embeddings_npy, read_labels_npy, read_tokens_json, write_array1_npy,
    write_array2_npy,
};
pub use loader::{
    EmbeddingBatch, EmbeddingLoader, EmbeddingLoaderBuilder, EmbeddingLoaders,
    EmbeddingLoadersBuilder,
};
pub use solubility::{
    AqSolDataset, AqSolRecord, CombiSoluDataset, CombiSoluRecord, CombiSoluSample, LabelScaler,
    AQSOL_OUTLIER_LOGS,
};
pub use splits::{contiguous_partition, train_test_split, train_valid_test_split};
pub use tokenizer::SmilesTokenizer;

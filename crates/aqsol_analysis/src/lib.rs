//! # aqsol_analysis
//!
//! Analysis of learned embedding spaces.
//!
//! This crate provides:
//! - [`Pca`]: seeded power-iteration PCA with explained variance
//! - [`KMeans`]: k-means++ seeding and Lloyd iterations, parallel over rows
//! - [`cluster_neighbors`]: molecules nearest to each centroid
//! - [`EmbeddingReport`]: the whole validation/test pipeline as a JSON report

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod kmeans;
mod pca;
mod report;

pub use error::{AnalysisError, Result};
pub use kmeans::{cluster_neighbors, KMeans, KMeansConfig};
pub use pca::{Pca, PcaConfig};
pub use report::{ClusterConfig, EmbeddingReport};

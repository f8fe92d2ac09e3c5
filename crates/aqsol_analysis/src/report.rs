//! Latent-space report over validation and test embeddings.

use std::path::Path;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use aqsol_core::{CoreError, Seed};

use crate::error::Result;
use crate::kmeans::{cluster_neighbors, KMeans, KMeansConfig};
use crate::pca::{Pca, PcaConfig};

/// Settings for [`EmbeddingReport::build`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// PCA components.
    pub n_components: usize,
    /// K-means clusters, fitted in PCA space.
    pub n_clusters: usize,
    /// Test points reported per cluster.
    pub n_neighbors: usize,
    /// Seed for PCA and k-means.
    pub seed: Seed,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            n_components: 2,
            n_clusters: 4,
            n_neighbors: 10,
            seed: Seed::DEFAULT,
        }
    }
}

/// PCA projection of validation and test embeddings, k-means clusters
/// fitted on the validation projection, and the test molecules nearest to
/// each centroid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingReport {
    /// Fraction of variance per component.
    pub explained_variance_ratio: Vec<f32>,
    /// Validation coordinates, one row per molecule.
    pub valid_latent: Vec<Vec<f32>>,
    /// Validation labels, if known.
    pub valid_labels: Option<Vec<f32>>,
    /// Test coordinates.
    pub test_latent: Vec<Vec<f32>>,
    /// Test labels, if known.
    pub test_labels: Option<Vec<f32>>,
    /// Cluster of each test molecule.
    pub test_clusters: Vec<usize>,
    /// Centroids in PCA space.
    pub centroids: Vec<Vec<f32>>,
    /// Per cluster, test indices nearest to the centroid.
    pub neighbors: Vec<Vec<usize>>,
}

fn rows(a: &Array2<f32>) -> Vec<Vec<f32>> {
    a.outer_iter().map(|r| r.to_vec()).collect()
}

fn check_labels(x: &Array2<f32>, y: Option<&Array1<f32>>, what: &str) -> Result<()> {
    match y {
        Some(y) if y.len() != x.nrows() => Err(CoreError::shape(format!(
            "{what}: {} embeddings but {} labels",
            x.nrows(),
            y.len()
        ))
        .into()),
        _ => Ok(()),
    }
}

impl EmbeddingReport {
    /// Fit PCA and k-means on `valid`, then place `test` in the same space.
    pub fn build(
        valid: &Array2<f32>,
        valid_labels: Option<&Array1<f32>>,
        test: &Array2<f32>,
        test_labels: Option<&Array1<f32>>,
        config: &ClusterConfig,
    ) -> Result<Self> {
        check_labels(valid, valid_labels, "valid")?;
        check_labels(test, test_labels, "test")?;

        let pca = Pca::fit(
            valid,
            &PcaConfig::new(config.n_components).with_seed(config.seed.derive("pca")),
        )?;
        let valid_latent = pca.transform(valid)?;
        let test_latent = pca.transform(test)?;

        let kmeans = KMeans::fit(
            &valid_latent,
            &KMeansConfig::new(config.n_clusters).with_seed(config.seed.derive("kmeans")),
        )?;
        let test_clusters = kmeans.predict(&test_latent)?;
        let distances = kmeans.transform(&test_latent)?;
        let neighbors = cluster_neighbors(&distances, config.n_neighbors);

        tracing::info!(
            n_valid = valid.nrows(),
            n_test = test.nrows(),
            inertia = kmeans.inertia(),
            "built embedding report"
        );

        Ok(Self {
            explained_variance_ratio: pca
                .explained_variance_ratio()
                .iter()
                .map(|&r| r as f32)
                .collect(),
            valid_latent: rows(&valid_latent),
            valid_labels: valid_labels.map(|y| y.to_vec()),
            test_latent: rows(&test_latent),
            test_labels: test_labels.map(|y| y.to_vec()),
            test_clusters,
            centroids: rows(kmeans.centroids()),
            neighbors,
        })
    }

    /// Axis captions with explained variance in percent.
    pub fn axis_labels(&self) -> Vec<String> {
        self.explained_variance_ratio
            .iter()
            .enumerate()
            .map(|(i, r)| format!("PCA Dimension {} ({:.2}% explained variance)", i + 1, r * 100.0))
            .collect()
    }

    /// Write as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

//! Observers for intermediate relevance matrices.
//!
//! Saving heatmaps is a side channel: an observer sees every layer
//! contribution and the final `R - I`, and a failing observer never stops
//! the propagation (see [`crate::AttentionRelevance::aggregate_observed`]).

use std::path::{Path, PathBuf};

use ndarray::Array2;

use crate::error::Result;

/// Token prepended to heatmap labels for the pooled position 0.
pub const REG_TOKEN: &str = "<REG>";

/// Receives the matrices produced during relevance propagation.
pub trait RelevanceObserver {
    /// Whether the engine should bother materialising matrices.
    fn is_active(&self) -> bool {
        true
    }

    /// Contribution `Ā_l · R_(l-1)` of layer `layer`, `(ml, ml)`.
    fn on_layer(&mut self, layer: usize, contribution: &Array2<f32>, tokens: &[String]) -> Result<()>;

    /// Final relevance with the identity removed, `(ml, ml)`.
    fn on_complete(&mut self, relevance: &Array2<f32>, tokens: &[String]) -> Result<()>;
}

/// No-op observer.
impl RelevanceObserver for () {
    fn is_active(&self) -> bool {
        false
    }

    fn on_layer(&mut self, _: usize, _: &Array2<f32>, _: &[String]) -> Result<()> {
        Ok(())
    }

    fn on_complete(&mut self, _: &Array2<f32>, _: &[String]) -> Result<()> {
        Ok(())
    }
}

/// Keeps every matrix in memory.
#[derive(Debug, Clone, Default)]
pub struct HeatmapCollector {
    layers: Vec<Array2<f32>>,
    full: Option<Array2<f32>>,
}

impl HeatmapCollector {
    /// Per-layer contributions in propagation order.
    pub fn layers(&self) -> &[Array2<f32>] {
        &self.layers
    }

    /// Final `R - I`, once propagation finished.
    pub fn full(&self) -> Option<&Array2<f32>> {
        self.full.as_ref()
    }

    /// Drop everything collected so far.
    pub fn clear(&mut self) {
        self.layers.clear();
        self.full = None;
    }
}

impl RelevanceObserver for HeatmapCollector {
    fn on_layer(&mut self, _layer: usize, contribution: &Array2<f32>, _: &[String]) -> Result<()> {
        self.layers.push(contribution.clone());
        Ok(())
    }

    fn on_complete(&mut self, relevance: &Array2<f32>, _: &[String]) -> Result<()> {
        self.full = Some(relevance.clone());
        Ok(())
    }
}

/// Writes every matrix as `.npy` into one directory.
///
/// Files:
/// - `a_bar_l{layer}_{tag}_heatmap.npy` per layer
/// - `full_rel_{tag}_heatmap.npy` for the final matrix
/// - `{tag}_tokens.json` with the axis labels, `<REG>` first
#[derive(Debug, Clone)]
pub struct NpyHeatmapWriter {
    dir: PathBuf,
    tag: String,
}

impl NpyHeatmapWriter {
    /// Writer into `dir`, naming files with `tag`.
    pub fn new(dir: impl Into<PathBuf>, tag: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            tag: tag.into(),
        }
    }

    /// Output directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the contribution file for `layer`.
    pub fn layer_path(&self, layer: usize) -> PathBuf {
        self.dir
            .join(format!("a_bar_l{layer}_{}_heatmap.npy", self.tag))
    }

    /// Path of the final relevance file.
    pub fn full_path(&self) -> PathBuf {
        self.dir.join(format!("full_rel_{}_heatmap.npy", self.tag))
    }

    /// Path of the token label file.
    pub fn tokens_path(&self) -> PathBuf {
        self.dir.join(format!("{}_tokens.json", self.tag))
    }
}

impl RelevanceObserver for NpyHeatmapWriter {
    fn on_layer(&mut self, layer: usize, contribution: &Array2<f32>, _: &[String]) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        aqsol_data::write_array2_npy(self.layer_path(layer), contribution)?;
        Ok(())
    }

    fn on_complete(&mut self, relevance: &Array2<f32>, tokens: &[String]) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        aqsol_data::write_array2_npy(self.full_path(), relevance)?;

        let labels: Vec<&str> = std::iter::once(REG_TOKEN)
            .chain(tokens.iter().map(String::as_str))
            .collect();
        std::fs::write(self.tokens_path(), serde_json::to_string(&labels)?)?;
        tracing::debug!(dir = %self.dir.display(), tag = %self.tag, "wrote relevance heatmaps");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AttentionRelevance;
    use aqsol_core::array4_to_tensor;
    use aqsol_core::backend::NdArray;
    use ndarray::Array4;

    type TestBackend = NdArray;

    #[test]
    fn test_writer_paths() {
        let writer = NpyHeatmapWriter::new("/tmp/out", "Aqueous");
        assert_eq!(
            writer.layer_path(2),
            PathBuf::from("/tmp/out/a_bar_l2_Aqueous_heatmap.npy")
        );
        assert_eq!(writer.full_path(), PathBuf::from("/tmp/out/full_rel_Aqueous_heatmap.npy"));
        assert_eq!(writer.tokens_path(), PathBuf::from("/tmp/out/Aqueous_tokens.json"));
    }

    #[test]
    fn test_writer_outputs() {
        let dir = std::env::temp_dir().join(format!("aqsol-heatmaps-{}", std::process::id()));
        let device = Default::default();
        let attn = array4_to_tensor::<TestBackend>(&Array4::from_elem((2, 1, 3, 3), 0.3), &device);
        let grad = array4_to_tensor::<TestBackend>(&Array4::ones((2, 1, 3, 3)), &device);
        let tokens = vec!["C".to_string(), "O".to_string()];

        let mut writer = NpyHeatmapWriter::new(&dir, "test");
        let weights = AttentionRelevance::new(2)
            .compute_observed(attn, grad, 3, &tokens, &mut writer)
            .unwrap();
        assert_eq!(weights.len(), 2);

        assert!(writer.layer_path(0).exists());
        assert!(writer.layer_path(1).exists());
        let full = aqsol_data::read_embeddings_npy(writer.full_path()).unwrap();
        assert_eq!(full.dim(), (3, 3));

        let labels = aqsol_data::read_tokens_json(writer.tokens_path()).unwrap();
        assert_eq!(labels, vec!["<REG>", "C", "O"]);
    }

    struct Failing;

    impl RelevanceObserver for Failing {
        fn on_layer(&mut self, _: usize, _: &Array2<f32>, _: &[String]) -> Result<()> {
            Err(std::io::Error::other("disk full").into())
        }

        fn on_complete(&mut self, _: &Array2<f32>, _: &[String]) -> Result<()> {
            Err(std::io::Error::other("disk full").into())
        }
    }

    #[test]
    fn test_failing_observer_does_not_abort() {
        let device = Default::default();
        let attn = array4_to_tensor::<TestBackend>(&Array4::from_elem((1, 2, 4, 4), 0.25), &device);
        let grad = array4_to_tensor::<TestBackend>(&Array4::ones((1, 2, 4, 4)), &device);

        let observed = AttentionRelevance::new(1)
            .compute_observed(attn.clone(), grad.clone(), 4, &[], &mut Failing)
            .unwrap();
        let plain = AttentionRelevance::new(1).compute(attn, grad, 4).unwrap();
        assert_eq!(observed, plain);
    }
}

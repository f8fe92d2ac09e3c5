//! Configuration of the relevance and colouring steps.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use aqsol_core::CoreError;

use crate::color::ColorMapper;
use crate::error::Result;
use crate::observer::NpyHeatmapWriter;

/// Settings for attributing one model's predictions to tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplainConfig {
    /// Transformer layers to propagate through.
    pub n_layers: usize,
    /// Write per-layer and final relevance matrices.
    pub save_heatmap: bool,
    /// Colour scale lower bound.
    pub vmin: f32,
    /// Colour scale upper bound.
    pub vmax: f32,
    /// Directory for heatmap files.
    pub heatmap_dir: PathBuf,
    /// Tag used in heatmap file names.
    pub tag: String,
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            n_layers: 6,
            save_heatmap: false,
            vmin: 0.0,
            vmax: 1.0,
            heatmap_dir: PathBuf::from("heatmaps"),
            tag: "Aqueous".to_string(),
        }
    }
}

impl ExplainConfig {
    /// Set the layer count.
    #[must_use]
    pub fn with_n_layers(mut self, n_layers: usize) -> Self {
        self.n_layers = n_layers;
        self
    }

    /// Set the colour bounds.
    #[must_use]
    pub fn with_bounds(mut self, vmin: f32, vmax: f32) -> Self {
        self.vmin = vmin;
        self.vmax = vmax;
        self
    }

    /// Enable heatmap output into `dir`.
    #[must_use]
    pub fn with_heatmaps(mut self, dir: impl Into<PathBuf>) -> Self {
        self.save_heatmap = true;
        self.heatmap_dir = dir.into();
        self
    }

    /// Set the file tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.n_layers == 0 {
            return Err(CoreError::InvalidConfig("n_layers must be at least 1".into()).into());
        }
        if self.tag.is_empty() {
            return Err(CoreError::InvalidConfig("tag must not be empty".into()).into());
        }
        ColorMapper::new(self.vmin, self.vmax)?;
        Ok(())
    }

    /// Colour mapper for the configured bounds.
    pub fn color_mapper(&self) -> Result<ColorMapper> {
        ColorMapper::new(self.vmin, self.vmax)
    }

    /// Heatmap writer when heatmaps are enabled.
    pub fn heatmap_writer(&self) -> Option<NpyHeatmapWriter> {
        self.save_heatmap
            .then(|| NpyHeatmapWriter::new(&self.heatmap_dir, &self.tag))
    }

    /// Load and validate a JSON config. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExplainConfig::default();
        assert_eq!(config.n_layers, 6);
        assert!(!config.save_heatmap);
        assert!(config.heatmap_writer().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config: ExplainConfig =
            serde_json::from_str(r#"{"n_layers": 4, "vmin": -0.5, "save_heatmap": true}"#).unwrap();
        assert_eq!(config.n_layers, 4);
        assert_eq!(config.vmin, -0.5);
        assert_eq!(config.vmax, 1.0);
        let writer = config.heatmap_writer().unwrap();
        assert_eq!(writer.dir(), Path::new("heatmaps"));
    }

    #[test]
    fn test_validate() {
        assert!(ExplainConfig::default().with_n_layers(0).validate().is_err());
        assert!(ExplainConfig::default().with_bounds(2.0, 1.0).validate().is_err());
        assert!(ExplainConfig::default().with_tag("").validate().is_err());
    }
}

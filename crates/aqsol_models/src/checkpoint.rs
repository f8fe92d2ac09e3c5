//! Head checkpoints: burn records plus JSON metadata.
//!
//! Weights are written with `NamedMpkFileRecorder` at full precision
//! (`<path>.mpk`); the metadata file stores the head config so the head can
//! be rebuilt before its record is loaded.
//!
//! ```rust,ignore
//! use aqsol_models::{CheckpointMetadata, HeadCheckpoint, HeadConfig};
//!
//! head.save_checkpoint("out/head")?;
//! CheckpointMetadata::new(HeadConfig::Mlp(config))
//!     .with_epoch(12)
//!     .save("out/head.json")?;
//!
//! let meta = CheckpointMetadata::load("out/head.json")?;
//! let head = meta.head.mlp()?.init::<B>(&device).load_checkpoint("out/head", &device)?;
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use burn::module::Module;
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::linear::MaskedLinearRegressionHeadConfig;
use crate::mlp::MaskedRegressionHeadConfig;

/// Config of whichever head a checkpoint holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum HeadConfig {
    /// [`crate::MaskedRegressionHead`].
    Mlp(MaskedRegressionHeadConfig),
    /// [`crate::MaskedLinearRegressionHead`].
    Linear(MaskedLinearRegressionHeadConfig),
}

impl HeadConfig {
    /// Short kind name.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            HeadConfig::Mlp(_) => "mlp",
            HeadConfig::Linear(_) => "linear",
        }
    }

    /// Embedding width the head expects.
    #[must_use]
    pub fn dim(&self) -> usize {
        match self {
            HeadConfig::Mlp(c) => c.dim,
            HeadConfig::Linear(c) => c.dim,
        }
    }

    /// The MLP config, or [`ModelError::HeadMismatch`].
    pub fn mlp(&self) -> Result<&MaskedRegressionHeadConfig> {
        match self {
            HeadConfig::Mlp(c) => Ok(c),
            other => Err(ModelError::HeadMismatch {
                expected: "mlp",
                found: other.kind(),
            }),
        }
    }

    /// The linear config, or [`ModelError::HeadMismatch`].
    pub fn linear(&self) -> Result<&MaskedLinearRegressionHeadConfig> {
        match self {
            HeadConfig::Linear(c) => Ok(c),
            other => Err(ModelError::HeadMismatch {
                expected: "linear",
                found: other.kind(),
            }),
        }
    }
}

/// Save a module's record with the named MessagePack recorder.
pub fn save_head<B, M>(head: &M, path: impl AsRef<Path>) -> Result<()>
where
    B: Backend,
    M: Module<B>,
{
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    Recorder::<B>::record(&recorder, head.clone().into_record(), path.as_ref().to_path_buf())
        .map_err(|e| ModelError::Save(e.to_string()))
}

/// Load a module record written by [`save_head`].
pub fn load_head_record<B, M>(path: impl AsRef<Path>, device: &B::Device) -> Result<M::Record>
where
    B: Backend,
    M: Module<B>,
{
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    recorder
        .load(path.as_ref().to_path_buf(), device)
        .map_err(|e| ModelError::Load(e.to_string()))
}

/// Metadata stored next to a head checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// Head architecture and config.
    pub head: HeadConfig,
    /// Epoch of the saved weights.
    pub epoch: Option<usize>,
    /// Validation loss of the saved weights.
    pub val_loss: Option<f32>,
    /// Free-form extras (dataset name, seed, ...).
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl CheckpointMetadata {
    /// Metadata for a head.
    pub fn new(head: HeadConfig) -> Self {
        Self {
            head,
            epoch: None,
            val_loss: None,
            extra: BTreeMap::new(),
        }
    }

    /// Set the epoch.
    #[must_use]
    pub fn with_epoch(mut self, epoch: usize) -> Self {
        self.epoch = Some(epoch);
        self
    }

    /// Set the validation loss.
    #[must_use]
    pub fn with_val_loss(mut self, loss: f32) -> Self {
        self.val_loss = Some(loss);
        self
    }

    /// Add an extra entry.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Write as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json =
            serde_json::to_string_pretty(self).map_err(|e| ModelError::Save(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| ModelError::Save(e.to_string()))
    }

    /// Read from JSON.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json =
            std::fs::read_to_string(path).map_err(|e| ModelError::Load(e.to_string()))?;
        serde_json::from_str(&json).map_err(|e| ModelError::Load(e.to_string()))
    }
}

/// Checkpoint methods for every module.
pub trait HeadCheckpoint<B: Backend>: Module<B> {
    /// Save the weights to `path`.
    fn save_checkpoint(&self, path: impl AsRef<Path>) -> Result<()> {
        save_head::<B, Self>(self, path)
    }

    /// Load weights from `path` into a copy of this module.
    fn load_checkpoint(&self, path: impl AsRef<Path>, device: &B::Device) -> Result<Self>
    where
        Self: Sized,
    {
        let record = load_head_record::<B, Self>(path, device)?;
        Ok(self.clone().load_record(record))
    }
}

impl<B: Backend, M: Module<B>> HeadCheckpoint<B> for M {}

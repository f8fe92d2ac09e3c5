//! Training loop for regression heads on precomputed embeddings.

use std::time::Instant;

use burn::module::AutodiffModule;
use burn::optim::decay::WeightDecayConfig;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

use aqsol_core::tensor_to_vec;
use aqsol_data::{EmbeddingLoader, EmbeddingLoaders};

use crate::error::{Result, TrainError};
use crate::metrics::RegressionMetrics;

/// Configuration for [`HeadTrainer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadTrainerConfig {
    /// Number of epochs.
    pub n_epochs: usize,
    /// Learning rate.
    pub lr: f64,
    /// Weight decay.
    pub weight_decay: f32,
    /// Early stopping patience (0 = disabled).
    pub early_stopping_patience: usize,
    /// Minimum delta for early stopping improvement.
    pub early_stopping_min_delta: f32,
}

impl Default for HeadTrainerConfig {
    fn default() -> Self {
        Self {
            n_epochs: 25,
            lr: 1e-3,
            weight_decay: 0.01,
            early_stopping_patience: 0,
            early_stopping_min_delta: 1e-4,
        }
    }
}

impl HeadTrainerConfig {
    /// Set the number of epochs.
    #[must_use]
    pub fn with_n_epochs(mut self, n_epochs: usize) -> Self {
        self.n_epochs = n_epochs;
        self
    }

    /// Set the learning rate.
    #[must_use]
    pub fn with_lr(mut self, lr: f64) -> Self {
        self.lr = lr;
        self
    }

    /// Set the early stopping patience.
    #[must_use]
    pub fn with_early_stopping(mut self, patience: usize) -> Self {
        self.early_stopping_patience = patience;
        self
    }
}

/// Result of [`HeadTrainer::fit_with_forward`].
#[derive(Debug)]
pub struct TrainOutput<M> {
    /// Model from the epoch with the lowest validation loss.
    pub model: M,
    /// Mean training MSE per epoch.
    pub train_losses: Vec<f32>,
    /// Mean validation MSE per epoch.
    pub valid_losses: Vec<f32>,
    /// Best validation loss.
    pub best_valid_loss: f32,
    /// Zero-based epoch of the best validation loss.
    pub best_epoch: usize,
    /// Wall time in seconds.
    pub training_time_secs: f64,
}

/// Fits a regression head with Adam and MSE.
pub struct HeadTrainer<B: AutodiffBackend> {
    config: HeadTrainerConfig,
    device: B::Device,
}

impl<B: AutodiffBackend> HeadTrainer<B> {
    /// Create a new trainer.
    pub fn new(config: HeadTrainerConfig, device: B::Device) -> Self {
        Self { config, device }
    }

    /// Trainer configuration.
    pub fn config(&self) -> &HeadTrainerConfig {
        &self.config
    }

    /// Train `model`, keeping the weights of the best validation epoch.
    pub fn fit_with_forward<M, F, G>(
        &self,
        model: M,
        dls: &EmbeddingLoaders,
        forward_fn: F,
        valid_forward_fn: G,
    ) -> Result<TrainOutput<M>>
    where
        M: AutodiffModule<B> + Clone,
        F: Fn(&M, Tensor<B, 2>) -> Tensor<B, 1>,
        G: Fn(&M::InnerModule, Tensor<B::InnerBackend, 2>) -> Tensor<B::InnerBackend, 1>,
    {
        let start_time = Instant::now();

        let optimizer_config = AdamConfig::new()
            .with_weight_decay(Some(WeightDecayConfig::new(self.config.weight_decay)));
        let mut optim = optimizer_config.init::<B, M>();

        let mut best_model = model.clone();
        let mut best_valid_loss = f32::INFINITY;
        let mut best_epoch = 0;

        let mut train_losses = Vec::with_capacity(self.config.n_epochs);
        let mut valid_losses = Vec::with_capacity(self.config.n_epochs);

        let mut current_model = model;
        let mut epochs_without_improvement = 0;
        let early_stopping_enabled = self.config.early_stopping_patience > 0;

        for epoch in 0..self.config.n_epochs {
            let train_loss = self.train_epoch(&mut current_model, &mut optim, dls, &forward_fn)?;
            train_losses.push(train_loss);

            let valid_loss = self.valid_epoch(&current_model, dls, &valid_forward_fn)?;
            valid_losses.push(valid_loss);

            let improved = valid_loss < best_valid_loss - self.config.early_stopping_min_delta;
            if improved {
                best_valid_loss = valid_loss;
                best_epoch = epoch;
                best_model = current_model.clone();
                epochs_without_improvement = 0;
            } else {
                epochs_without_improvement += 1;
            }

            tracing::info!(
                epoch = epoch + 1,
                n_epochs = self.config.n_epochs,
                train_loss,
                valid_loss,
                improved,
                "epoch complete"
            );

            if early_stopping_enabled
                && epochs_without_improvement >= self.config.early_stopping_patience
            {
                tracing::info!(
                    patience = self.config.early_stopping_patience,
                    "early stopping"
                );
                break;
            }
        }

        let training_time_secs = start_time.elapsed().as_secs_f64();
        tracing::info!(
            best_valid_loss,
            best_epoch = best_epoch + 1,
            secs = training_time_secs,
            "training complete"
        );

        Ok(TrainOutput {
            model: best_model,
            train_losses,
            valid_losses,
            best_valid_loss,
            best_epoch,
            training_time_secs,
        })
    }

    fn train_epoch<M, O, F>(
        &self,
        model: &mut M,
        optim: &mut O,
        dls: &EmbeddingLoaders,
        forward_fn: &F,
    ) -> Result<f32>
    where
        M: AutodiffModule<B> + Clone,
        O: Optimizer<M, B>,
        F: Fn(&M, Tensor<B, 2>) -> Tensor<B, 1>,
    {
        let mut total_loss = 0.0f32;
        let mut n_batches = 0;

        for batch_result in dls.train().iter::<B>(&self.device) {
            let batch = batch_result?;
            let y = batch.y.ok_or(TrainError::MissingTargets)?;

            let preds = forward_fn(model, batch.x);
            let diff = preds - y;
            let loss = (diff.clone() * diff).mean();
            total_loss += loss.clone().into_scalar().elem::<f32>();

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, model);
            *model = optim.step(self.config.lr, model.clone(), grads);

            n_batches += 1;
        }

        if n_batches == 0 {
            return Err(TrainError::EmptyEpoch);
        }
        Ok(total_loss / n_batches as f32)
    }

    fn valid_epoch<M, G>(&self, model: &M, dls: &EmbeddingLoaders, valid_forward_fn: &G) -> Result<f32>
    where
        M: AutodiffModule<B>,
        G: Fn(&M::InnerModule, Tensor<B::InnerBackend, 2>) -> Tensor<B::InnerBackend, 1>,
    {
        let inner_model = model.clone().valid();
        let inner_device: <B::InnerBackend as Backend>::Device = self.device.clone().into();

        let mut total_loss = 0.0f32;
        let mut n_batches = 0;

        for batch_result in dls.valid().iter::<B::InnerBackend>(&inner_device) {
            let batch = batch_result?;
            let y = batch.y.ok_or(TrainError::MissingTargets)?;

            let preds = valid_forward_fn(&inner_model, batch.x);
            let diff = preds - y;
            let loss = (diff.clone() * diff).mean();
            total_loss += loss.into_scalar().elem::<f32>();
            n_batches += 1;
        }

        if n_batches == 0 {
            return Err(TrainError::EmptyEpoch);
        }
        Ok(total_loss / n_batches as f32)
    }
}

/// Predictions for every molecule of `loader`, in loader order, with the
/// matching targets when the dataset carries labels.
pub fn predict<B, F>(
    loader: &EmbeddingLoader,
    device: &B::Device,
    forward_fn: F,
) -> Result<(Vec<f32>, Option<Vec<f32>>)>
where
    B: Backend,
    F: Fn(Tensor<B, 2>) -> Tensor<B, 1>,
{
    let mut preds = Vec::with_capacity(loader.len());
    let mut targets = Vec::with_capacity(loader.len());
    let mut has_targets = true;

    for batch_result in loader.iter::<B>(device) {
        let batch = batch_result?;
        preds.extend(tensor_to_vec(forward_fn(batch.x))?);
        match batch.y {
            Some(y) => targets.extend(tensor_to_vec(y)?),
            None => has_targets = false,
        }
    }

    Ok((preds, has_targets.then_some(targets)))
}

/// Predict over `loader` and score against its labels.
pub fn evaluate<B, F>(
    loader: &EmbeddingLoader,
    device: &B::Device,
    forward_fn: F,
) -> Result<RegressionMetrics>
where
    B: Backend,
    F: Fn(Tensor<B, 2>) -> Tensor<B, 1>,
{
    let (preds, targets) = predict(loader, device, forward_fn)?;
    let targets = targets.ok_or(TrainError::MissingTargets)?;
    RegressionMetrics::compute(&preds, &targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aqsol_core::backend::NdArrayAutodiff;
    use aqsol_core::Seed;
    use aqsol_data::EmbeddingDataset;
    use aqsol_models::{MaskedLinearRegressionHead, MaskedLinearRegressionHeadConfig};
    use ndarray::{Array1, Array2};

    type TestBackend = NdArrayAutodiff;

    fn synthetic(n: usize, offset: usize) -> EmbeddingDataset {
        let x = Array2::from_shape_fn((n, 4), |(i, j)| {
            (((i + offset) * 7 + j * 3) % 11) as f32 / 11.0 - 0.5
        });
        let y = Array1::from_shape_fn(n, |i| 2.0 * x[[i, 0]] - x[[i, 1]] + 0.5 * x[[i, 3]]);
        EmbeddingDataset::from_arrays(x, Some(y)).unwrap()
    }

    fn loaders() -> EmbeddingLoaders {
        EmbeddingLoaders::builder(synthetic(64, 0), synthetic(16, 5))
            .batch_size(16)
            .seed(Seed::new(7))
            .build()
            .unwrap()
    }

    #[test]
    fn test_config_default() {
        let config = HeadTrainerConfig::default();
        assert_eq!(config.n_epochs, 25);
        assert_eq!(config.lr, 1e-3);
        assert_eq!(config.early_stopping_patience, 0);
    }

    #[test]
    fn test_linear_head_loss_decreases() {
        let device = Default::default();
        let dls = loaders();
        let model: MaskedLinearRegressionHead<TestBackend> =
            MaskedLinearRegressionHeadConfig::new(4).init(&device);

        let config = HeadTrainerConfig::default().with_n_epochs(20).with_lr(5e-2);
        let trainer = HeadTrainer::<TestBackend>::new(config, device);
        let output = trainer
            .fit_with_forward(model, &dls, |m, x| m.forward(x), |m, x| m.forward(x))
            .unwrap();

        assert_eq!(output.train_losses.len(), 20);
        let first = output.train_losses[0];
        let last = *output.train_losses.last().unwrap();
        assert!(last < first, "loss did not decrease: {first} -> {last}");
        assert!(output.best_valid_loss <= output.valid_losses[0]);
    }

    #[test]
    fn test_early_stopping_truncates_history() {
        let device = Default::default();
        let dls = loaders();
        let model: MaskedLinearRegressionHead<TestBackend> =
            MaskedLinearRegressionHeadConfig::new(4).init(&device);

        // A zero learning rate never improves after the first epoch.
        let config = HeadTrainerConfig::default()
            .with_n_epochs(10)
            .with_lr(0.0)
            .with_early_stopping(2);
        let trainer = HeadTrainer::<TestBackend>::new(config, device);
        let output = trainer
            .fit_with_forward(model, &dls, |m, x| m.forward(x), |m, x| m.forward(x))
            .unwrap();

        assert_eq!(output.train_losses.len(), 3);
        assert_eq!(output.best_epoch, 0);
    }

    #[test]
    fn test_predict_and_evaluate() {
        let device = Default::default();
        let dls = loaders();
        let model: MaskedLinearRegressionHead<TestBackend> =
            MaskedLinearRegressionHeadConfig::new(4).init(&device);
        let inner = model.valid();

        let (preds, targets) = predict(dls.valid(), &device, |x| inner.forward(x)).unwrap();
        assert_eq!(preds.len(), 16);
        assert_eq!(targets.map(|t| t.len()), Some(16));

        let metrics = evaluate(dls.valid(), &device, |x| inner.forward(x)).unwrap();
        assert_eq!(metrics.n, 16);
        assert!(metrics.rmse >= metrics.mae);
    }
}

//! # aqsol_train
//!
//! Fitting and scoring regression heads on precomputed embeddings.
//!
//! ## Example
//!
//! ```rust,ignore
//! use aqsol_train::{HeadTrainer, HeadTrainerConfig};
//!
//! let trainer = HeadTrainer::<NdArrayAutodiff>::new(HeadTrainerConfig::default(), device);
//! let output = trainer.fit_with_forward(head, &dls, |m, x| m.forward(x), |m, x| m.forward(x))?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
pub mod metrics;
mod training;

pub use error::{Result, TrainError};
pub use metrics::{mae, mse, r2, rmse, RegressionMetrics};
pub use training::{evaluate, predict, HeadTrainer, HeadTrainerConfig, TrainOutput};

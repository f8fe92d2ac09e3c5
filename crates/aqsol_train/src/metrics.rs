//! Regression metrics.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainError};

fn check(preds: &[f32], targets: &[f32]) -> Result<()> {
    if preds.is_empty() {
        return Err(TrainError::InvalidMetricInput("no predictions".into()));
    }
    if preds.len() != targets.len() {
        return Err(TrainError::InvalidMetricInput(format!(
            "{} predictions for {} targets",
            preds.len(),
            targets.len()
        )));
    }
    Ok(())
}

/// Mean absolute error.
pub fn mae(preds: &[f32], targets: &[f32]) -> Result<f32> {
    check(preds, targets)?;
    let sum: f64 = preds
        .iter()
        .zip(targets)
        .map(|(&p, &t)| f64::from((p - t).abs()))
        .sum();
    Ok((sum / preds.len() as f64) as f32)
}

/// Mean squared error.
pub fn mse(preds: &[f32], targets: &[f32]) -> Result<f32> {
    check(preds, targets)?;
    let sum: f64 = preds
        .iter()
        .zip(targets)
        .map(|(&p, &t)| f64::from(p - t).powi(2))
        .sum();
    Ok((sum / preds.len() as f64) as f32)
}

/// Root mean squared error.
pub fn rmse(preds: &[f32], targets: &[f32]) -> Result<f32> {
    Ok(mse(preds, targets)?.sqrt())
}

/// Coefficient of determination.
///
/// Constant targets give 1.0 for a perfect fit and 0.0 otherwise.
pub fn r2(preds: &[f32], targets: &[f32]) -> Result<f32> {
    check(preds, targets)?;
    let n = targets.len() as f64;
    let mean = targets.iter().map(|&t| f64::from(t)).sum::<f64>() / n;
    let ss_tot: f64 = targets.iter().map(|&t| (f64::from(t) - mean).powi(2)).sum();
    let ss_res: f64 = preds
        .iter()
        .zip(targets)
        .map(|(&p, &t)| f64::from(t - p).powi(2))
        .sum();

    if ss_tot == 0.0 {
        return Ok(if ss_res == 0.0 { 1.0 } else { 0.0 });
    }
    Ok((1.0 - ss_res / ss_tot) as f32)
}

/// Summary of a head on one split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    /// Number of molecules.
    pub n: usize,
    /// Mean absolute error.
    pub mae: f32,
    /// Root mean squared error.
    pub rmse: f32,
    /// Coefficient of determination.
    pub r2: f32,
}

impl RegressionMetrics {
    /// Compute all metrics.
    pub fn compute(preds: &[f32], targets: &[f32]) -> Result<Self> {
        Ok(Self {
            n: preds.len(),
            mae: mae(preds, targets)?,
            rmse: rmse(preds, targets)?,
            r2: r2(preds, targets)?,
        })
    }

    /// Write as pretty JSON (`metrics.json`).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_known_values() {
        let targets = [1.0, 2.0, 3.0, 4.0];
        let preds = [1.5, 2.0, 2.5, 4.0];

        assert!((mae(&preds, &targets).unwrap() - 0.25).abs() < 1e-6);
        assert!((rmse(&preds, &targets).unwrap() - 0.125f32.sqrt()).abs() < 1e-6);
        // ss_res = 0.5, ss_tot = 5.0
        assert!((r2(&preds, &targets).unwrap() - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_constant_targets() {
        assert_eq!(r2(&[2.0, 2.0], &[2.0, 2.0]).unwrap(), 1.0);
        assert_eq!(r2(&[1.0, 3.0], &[2.0, 2.0]).unwrap(), 0.0);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(mae(&[], &[]).is_err());
        assert!(RegressionMetrics::compute(&[1.0], &[1.0, 2.0]).is_err());
    }
}

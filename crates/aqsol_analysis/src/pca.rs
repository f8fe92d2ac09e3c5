//! Principal component analysis by power iteration.

use ndarray::{Array1, Array2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

use aqsol_core::{CoreError, Seed};

use crate::error::{AnalysisError, Result};

/// Settings for [`Pca::fit`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PcaConfig {
    /// Number of components to keep.
    pub n_components: usize,
    /// Power iterations per component.
    pub max_iter: usize,
    /// Convergence threshold on the change of the unit eigenvector.
    pub tol: f64,
    /// Seed for the starting vectors.
    pub seed: Seed,
}

impl Default for PcaConfig {
    fn default() -> Self {
        Self {
            n_components: 2,
            max_iter: 1000,
            tol: 1e-9,
            seed: Seed::DEFAULT,
        }
    }
}

impl PcaConfig {
    /// Config keeping `n_components` components.
    pub fn new(n_components: usize) -> Self {
        Self {
            n_components,
            ..Default::default()
        }
    }

    /// Set the seed.
    #[must_use]
    pub fn with_seed(mut self, seed: Seed) -> Self {
        self.seed = seed;
        self
    }
}

/// Fitted PCA projection.
///
/// Components are the leading eigenvectors of the sample covariance,
/// found one at a time by power iteration with deflation. Each component is
/// sign-normalised so that its largest-magnitude entry is positive.
#[derive(Debug, Clone)]
pub struct Pca {
    mean: Array1<f64>,
    components: Array2<f64>,
    explained_variance: Array1<f64>,
    explained_variance_ratio: Array1<f64>,
}

impl Pca {
    /// Fit on the rows of `x`.
    ///
    /// # Errors
    ///
    /// Returns an error for fewer than two rows or a component count outside
    /// `1..=min(rows, cols)`.
    pub fn fit(x: &Array2<f32>, config: &PcaConfig) -> Result<Self> {
        let (n, d) = x.dim();
        if n < 2 {
            return Err(AnalysisError::InvalidInput(format!(
                "PCA needs at least 2 samples, got {n}"
            )));
        }
        let k = config.n_components;
        if k == 0 || k > n.min(d) {
            return Err(AnalysisError::InvalidInput(format!(
                "n_components {k} must be in 1..={}",
                n.min(d)
            )));
        }

        let x = x.mapv(f64::from);
        let mean = x.mean_axis(Axis(0)).ok_or_else(|| {
            AnalysisError::InvalidInput("cannot average an empty matrix".into())
        })?;
        let centered = &x - &mean;
        let mut cov = centered.t().dot(&centered) / (n as f64 - 1.0);
        let total_variance = cov.diag().sum();

        let mut rng = config.seed.to_rng();
        let mut components = Array2::<f64>::zeros((k, d));
        let mut explained_variance = Array1::<f64>::zeros(k);

        for c in 0..k {
            let mut v = Array1::from_shape_fn(d, |_| rng.gen::<f64>() - 0.5);
            normalize(&mut v);

            for _ in 0..config.max_iter {
                let mut next = cov.dot(&v);
                if normalize(&mut next) == 0.0 {
                    break;
                }
                let delta = (&next - &v).mapv(f64::abs).sum();
                v = next;
                if delta < config.tol {
                    break;
                }
            }

            flip_sign(&mut v);
            let lambda = v.dot(&cov.dot(&v)).max(0.0);

            // deflate: C <- C - λ v vᵀ
            let vv = v
                .view()
                .insert_axis(Axis(1))
                .dot(&v.view().insert_axis(Axis(0)));
            cov = cov - vv * lambda;

            components.row_mut(c).assign(&v);
            explained_variance[c] = lambda;
        }

        let explained_variance_ratio = if total_variance > 0.0 {
            &explained_variance / total_variance
        } else {
            Array1::zeros(k)
        };

        tracing::debug!(
            n_samples = n,
            n_features = d,
            ratio = ?explained_variance_ratio.to_vec(),
            "fitted PCA"
        );

        Ok(Self {
            mean,
            components,
            explained_variance,
            explained_variance_ratio,
        })
    }

    /// Project rows of `x` onto the components: `(N, n_components)`.
    pub fn transform(&self, x: &Array2<f32>) -> Result<Array2<f32>> {
        if x.ncols() != self.mean.len() {
            return Err(CoreError::shape(format!(
                "PCA fitted on {} features, got {}",
                self.mean.len(),
                x.ncols()
            ))
            .into());
        }
        let centered = &x.mapv(f64::from) - &self.mean;
        Ok(centered.dot(&self.components.t()).mapv(|v| v as f32))
    }

    /// Number of components.
    pub fn n_components(&self) -> usize {
        self.components.nrows()
    }

    /// Components as rows, `(n_components, D)`.
    pub fn components(&self) -> &Array2<f64> {
        &self.components
    }

    /// Variance along each component.
    pub fn explained_variance(&self) -> &Array1<f64> {
        &self.explained_variance
    }

    /// Fraction of total variance along each component.
    pub fn explained_variance_ratio(&self) -> &Array1<f64> {
        &self.explained_variance_ratio
    }
}

/// Scale `v` to unit length, returning the original norm.
fn normalize(v: &mut Array1<f64>) -> f64 {
    let norm = v.dot(v).sqrt();
    if norm > f64::EPSILON {
        v.mapv_inplace(|x| x / norm);
        norm
    } else {
        0.0
    }
}

fn flip_sign(v: &mut Array1<f64>) {
    let pivot = v
        .iter()
        .copied()
        .fold(0.0f64, |best, x| if x.abs() > best.abs() { x } else { best });
    if pivot < 0.0 {
        v.mapv_inplace(|x| -x);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn line_data() -> Array2<f32> {
        // points along (1, 2) with a small orthogonal wobble; the +--+
        // pattern keeps the wobble uncorrelated with t
        Array2::from_shape_fn((20, 2), |(i, j)| {
            let t = i as f32 - 10.0;
            let wobble = if matches!(i % 4, 0 | 3) { 0.05 } else { -0.05 };
            if j == 0 {
                t - 2.0 * wobble
            } else {
                2.0 * t + wobble
            }
        })
    }

    #[test]
    fn test_first_component_follows_main_axis() {
        let pca = Pca::fit(&line_data(), &PcaConfig::new(2)).unwrap();
        let c = pca.components().row(0).to_owned();
        let expected = array![1.0, 2.0] / 5f64.sqrt();
        assert!((c[0] - expected[0]).abs() < 1e-4);
        assert!((c[1] - expected[1]).abs() < 1e-4);

        let ratio = pca.explained_variance_ratio();
        assert!(ratio[0] > 0.99);
        assert!((ratio.sum() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_transform_shape_and_centering() {
        let data = line_data();
        let pca = Pca::fit(&data, &PcaConfig::new(1)).unwrap();
        let latent = pca.transform(&data).unwrap();
        assert_eq!(latent.dim(), (20, 1));
        assert!(latent.sum().abs() < 1e-3);
    }

    #[test]
    fn test_deterministic_for_seed() {
        let data = line_data();
        let a = Pca::fit(&data, &PcaConfig::new(2).with_seed(Seed::new(1))).unwrap();
        let b = Pca::fit(&data, &PcaConfig::new(2).with_seed(Seed::new(2))).unwrap();
        for (x, y) in a.components().iter().zip(b.components().iter()) {
            assert!((x - y).abs() < 1e-5);
        }
    }

    #[test]
    fn test_invalid_inputs() {
        let one = Array2::<f32>::zeros((1, 3));
        assert!(Pca::fit(&one, &PcaConfig::new(1)).is_err());

        let data = line_data();
        assert!(Pca::fit(&data, &PcaConfig::new(3)).is_err());

        let pca = Pca::fit(&data, &PcaConfig::new(1)).unwrap();
        assert!(pca.transform(&Array2::zeros((2, 5))).is_err());
    }

    #[test]
    fn test_constant_data_has_zero_ratio() {
        let data = Array2::<f32>::from_elem((5, 3), 2.0);
        let pca = Pca::fit(&data, &PcaConfig::new(2)).unwrap();
        assert!(pca.explained_variance_ratio().iter().all(|&r| r == 0.0));
    }
}

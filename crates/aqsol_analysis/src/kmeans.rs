//! K-means clustering with k-means++ seeding.

use ndarray::{Array2, ArrayView1, Axis};
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use aqsol_core::{CoreError, Seed};

use crate::error::{AnalysisError, Result};

/// Settings for [`KMeans::fit`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KMeansConfig {
    /// Number of clusters.
    pub n_clusters: usize,
    /// Independent restarts; the lowest inertia wins.
    pub n_init: usize,
    /// Lloyd iterations per restart.
    pub max_iter: usize,
    /// Stop when the summed squared centroid shift drops below this.
    pub tol: f64,
    /// Seed for the restarts.
    pub seed: Seed,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            n_clusters: 4,
            n_init: 10,
            max_iter: 300,
            tol: 1e-4,
            seed: Seed::DEFAULT,
        }
    }
}

impl KMeansConfig {
    /// Config for `n_clusters` clusters.
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            ..Default::default()
        }
    }

    /// Set the seed.
    #[must_use]
    pub fn with_seed(mut self, seed: Seed) -> Self {
        self.seed = seed;
        self
    }

    /// Set the number of restarts.
    #[must_use]
    pub fn with_n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init;
        self
    }
}

/// Fitted k-means model.
#[derive(Debug, Clone)]
pub struct KMeans {
    centroids: Array2<f32>,
    inertia: f64,
    n_iter: usize,
}

fn squared_distance(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = f64::from(x) - f64::from(y);
            d * d
        })
        .sum()
}

/// Nearest centroid and its squared distance for every row.
fn assign(x: &Array2<f32>, centroids: &Array2<f32>) -> Vec<(usize, f64)> {
    (0..x.nrows())
        .into_par_iter()
        .map(|i| {
            let row = x.row(i);
            centroids
                .outer_iter()
                .enumerate()
                .map(|(c, centroid)| (c, squared_distance(row, centroid)))
                .fold((0, f64::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best })
        })
        .collect()
}

/// k-means++: each new centroid is drawn with probability proportional to
/// the squared distance to the closest centroid chosen so far.
fn init_plus_plus<R: Rng>(x: &Array2<f32>, k: usize, rng: &mut R) -> Array2<f32> {
    let n = x.nrows();
    let mut centroids = Array2::<f32>::zeros((k, x.ncols()));
    centroids.row_mut(0).assign(&x.row(rng.gen_range(0..n)));

    let mut closest: Vec<f64> = (0..n)
        .map(|i| squared_distance(x.row(i), centroids.row(0)))
        .collect();

    for c in 1..k {
        let total: f64 = closest.iter().sum();
        let pick = if total > 0.0 {
            let mut target = rng.gen::<f64>() * total;
            closest
                .iter()
                .position(|&d| {
                    target -= d;
                    target <= 0.0
                })
                .unwrap_or(n - 1)
        } else {
            rng.gen_range(0..n)
        };
        centroids.row_mut(c).assign(&x.row(pick));

        for (i, d) in closest.iter_mut().enumerate() {
            *d = d.min(squared_distance(x.row(i), centroids.row(c)));
        }
    }
    centroids
}

impl KMeans {
    /// Cluster the rows of `x`.
    ///
    /// # Errors
    ///
    /// Returns an error if there are fewer rows than clusters or no
    /// clusters/restarts are requested.
    pub fn fit(x: &Array2<f32>, config: &KMeansConfig) -> Result<Self> {
        let (n, d) = x.dim();
        let k = config.n_clusters;
        if k == 0 || config.n_init == 0 {
            return Err(AnalysisError::InvalidInput(
                "n_clusters and n_init must be at least 1".into(),
            ));
        }
        if n < k {
            return Err(AnalysisError::InvalidInput(format!(
                "{n} samples cannot form {k} clusters"
            )));
        }

        let mut rng = config.seed.to_rng();
        let mut best: Option<KMeans> = None;

        for run in 0..config.n_init {
            let mut centroids = init_plus_plus(x, k, &mut rng);
            let mut n_iter = 0;

            for _ in 0..config.max_iter {
                n_iter += 1;
                let labels = assign(x, &centroids);

                let mut sums = Array2::<f64>::zeros((k, d));
                let mut counts = vec![0usize; k];
                for (i, &(c, _)) in labels.iter().enumerate() {
                    counts[c] += 1;
                    let mut acc = sums.row_mut(c);
                    acc.zip_mut_with(&x.row(i), |s, &v| *s += f64::from(v));
                }

                let mut shift = 0.0;
                for c in 0..k {
                    // empty clusters keep their centroid
                    if counts[c] == 0 {
                        continue;
                    }
                    let updated = sums.row(c).mapv(|s| (s / counts[c] as f64) as f32);
                    shift += squared_distance(updated.view(), centroids.row(c));
                    centroids.row_mut(c).assign(&updated);
                }

                if shift <= config.tol {
                    break;
                }
            }

            let inertia: f64 = assign(x, &centroids).iter().map(|&(_, dist)| dist).sum();
            tracing::debug!(run, n_iter, inertia, "k-means restart finished");

            if best.as_ref().map_or(true, |b| inertia < b.inertia) {
                best = Some(KMeans {
                    centroids,
                    inertia,
                    n_iter,
                });
            }
        }

        best.ok_or_else(|| AnalysisError::InvalidInput("no k-means restart ran".into()))
    }

    fn check_width(&self, x: &Array2<f32>) -> Result<()> {
        if x.ncols() != self.centroids.ncols() {
            return Err(CoreError::shape(format!(
                "k-means fitted on {} features, got {}",
                self.centroids.ncols(),
                x.ncols()
            ))
            .into());
        }
        Ok(())
    }

    /// Closest cluster for every row.
    pub fn predict(&self, x: &Array2<f32>) -> Result<Vec<usize>> {
        self.check_width(x)?;
        Ok(assign(x, &self.centroids).into_iter().map(|(c, _)| c).collect())
    }

    /// Euclidean distance from every row to every centroid: `(N, k)`.
    pub fn transform(&self, x: &Array2<f32>) -> Result<Array2<f32>> {
        self.check_width(x)?;
        let k = self.centroids.nrows();
        let rows: Vec<f32> = (0..x.nrows())
            .into_par_iter()
            .flat_map_iter(|i| {
                let row = x.row(i);
                self.centroids
                    .outer_iter()
                    .map(|c| squared_distance(row, c).sqrt() as f32)
                    .collect::<Vec<_>>()
            })
            .collect();
        Array2::from_shape_vec((x.nrows(), k), rows)
            .map_err(|e| AnalysisError::Core(CoreError::shape(e.to_string())))
    }

    /// Cluster centres, `(k, D)`.
    pub fn centroids(&self) -> &Array2<f32> {
        &self.centroids
    }

    /// Sum of squared distances to the closest centroid.
    pub fn inertia(&self) -> f64 {
        self.inertia
    }

    /// Lloyd iterations of the winning restart.
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }
}

/// For every cluster (column of `distances`), the indices of the `k` rows
/// closest to its centroid, nearest first. Ties keep row order.
pub fn cluster_neighbors(distances: &Array2<f32>, k: usize) -> Vec<Vec<usize>> {
    distances
        .axis_iter(Axis(1))
        .map(|column| {
            let mut order: Vec<usize> = (0..column.len()).collect();
            order.sort_by(|&a, &b| column[a].total_cmp(&column[b]));
            order.truncate(k);
            order
        })
        .collect()
}

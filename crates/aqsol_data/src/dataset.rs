//! In-memory embedding dataset.

use ndarray::{Array1, Array2, ArrayView1, Axis};

use crate::error::{DataError, Result};

/// Pooled molecule embeddings with optional logS labels.
///
/// Rows are molecules, columns are embedding features (`(N, D)`). The
/// embeddings come from the external encoder, one `<REG>` pooled vector per
/// molecule.
///
/// ```rust,ignore
/// use aqsol_data::EmbeddingDataset;
///
/// let x = read_embeddings_npy("out/valid_emb.npy")?;
/// let y = read_labels_npy("out/valid_logs.npy")?;
/// let ds = EmbeddingDataset::from_arrays(x, Some(y))?;
/// ```
#[derive(Debug, Clone)]
pub struct EmbeddingDataset {
    x: Array2<f32>,
    y: Option<Array1<f32>>,
}

impl EmbeddingDataset {
    /// Create a dataset from an embedding matrix and optional labels.
    ///
    /// # Errors
    ///
    /// Returns an error if the label count differs from the row count.
    pub fn from_arrays(x: Array2<f32>, y: Option<Array1<f32>>) -> Result<Self> {
        if let Some(ref labels) = y {
            if labels.len() != x.nrows() {
                return Err(DataError::InvalidShape(format!(
                    "{} embeddings but {} labels",
                    x.nrows(),
                    labels.len()
                )));
            }
        }
        Ok(Self { x, y })
    }

    /// Number of molecules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.x.nrows()
    }

    /// Whether the dataset holds no molecules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.x.nrows() == 0
    }

    /// Embedding width.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.x.ncols()
    }

    /// Embedding matrix.
    #[must_use]
    pub fn x(&self) -> &Array2<f32> {
        &self.x
    }

    /// Labels, if present.
    #[must_use]
    pub fn y(&self) -> Option<&Array1<f32>> {
        self.y.as_ref()
    }

    /// Whether labels are attached.
    #[must_use]
    pub fn has_targets(&self) -> bool {
        self.y.is_some()
    }

    /// One embedding row and its label.
    pub fn get(&self, index: usize) -> Result<(ArrayView1<'_, f32>, Option<f32>)> {
        if index >= self.len() {
            return Err(DataError::IndexOutOfBounds {
                index,
                length: self.len(),
            });
        }
        let row = self.x.row(index);
        let label = self.y.as_ref().map(|y| y[index]);
        Ok((row, label))
    }

    /// Rows at `indices`, in the given order.
    pub fn subset(&self, indices: &[usize]) -> Result<Self> {
        if let Some(&index) = indices.iter().find(|&&i| i >= self.len()) {
            return Err(DataError::IndexOutOfBounds {
                index,
                length: self.len(),
            });
        }

        let x = self.x.select(Axis(0), indices);
        let y = self.y.as_ref().map(|y| y.select(Axis(0), indices));
        Ok(Self { x, y })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(n: usize, d: usize) -> EmbeddingDataset {
        let x = Array2::from_shape_fn((n, d), |(i, j)| (i * d + j) as f32);
        let y = Array1::from_shape_fn(n, |i| -(i as f32));
        EmbeddingDataset::from_arrays(x, Some(y)).unwrap()
    }

    #[test]
    fn test_label_count_checked() {
        let x = Array2::<f32>::zeros((4, 3));
        let y = Array1::<f32>::zeros(5);
        assert!(EmbeddingDataset::from_arrays(x, Some(y)).is_err());
    }

    #[test]
    fn test_get_row_and_label() {
        let ds = dataset(5, 3);
        let (row, label) = ds.get(2).unwrap();
        assert_eq!(row.to_vec(), vec![6.0, 7.0, 8.0]);
        assert_eq!(label, Some(-2.0));
        assert!(ds.get(5).is_err());
    }

    #[test]
    fn test_subset_keeps_order() {
        let ds = dataset(6, 2);
        let sub = ds.subset(&[4, 1]).unwrap();
        assert_eq!(sub.len(), 2);
        assert_eq!(sub.dim(), 2);
        assert_eq!(sub.x().row(0).to_vec(), vec![8.0, 9.0]);
        assert_eq!(sub.y().unwrap().to_vec(), vec![-4.0, -1.0]);
        assert!(ds.subset(&[6]).is_err());
    }

    #[test]
    fn test_empty_subset() {
        let ds = dataset(3, 2);
        let sub = ds.subset(&[]).unwrap();
        assert!(sub.is_empty());
        assert_eq!(sub.dim(), 2);
    }
}

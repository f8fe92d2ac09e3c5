//! Batched iteration over embedding datasets.

use burn::prelude::*;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::dataset::EmbeddingDataset;
use crate::error::{DataError, Result};
use aqsol_core::{Seed, Split};

/// One mini-batch of embeddings on a Burn device.
#[derive(Debug, Clone)]
pub struct EmbeddingBatch<B: Backend> {
    /// Embeddings, `(batch, D)`.
    pub x: Tensor<B, 2>,
    /// Labels, `(batch,)`, when the dataset carries them.
    pub y: Option<Tensor<B, 1>>,
}

impl<B: Backend> EmbeddingBatch<B> {
    /// Number of molecules in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.x.dims()[0]
    }

    /// Whether the batch holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Loader yielding [`EmbeddingBatch`]es from an [`EmbeddingDataset`].
///
/// ```rust,ignore
/// use aqsol_core::Seed;
/// use aqsol_data::EmbeddingLoader;
///
/// let loader = EmbeddingLoader::builder(dataset)
///     .batch_size(64)
///     .shuffle(true)
///     .seed(Seed::new(42))
///     .build()?;
///
/// for batch in loader.iter::<B>(&device) {
///     let batch = batch?;
/// }
/// ```
pub struct EmbeddingLoader {
    dataset: EmbeddingDataset,
    batch_size: usize,
    shuffle: bool,
    drop_last: bool,
    seed: Option<Seed>,
    split: Split,
}

impl EmbeddingLoader {
    /// Start building a loader over `dataset`.
    #[must_use]
    pub fn builder(dataset: EmbeddingDataset) -> EmbeddingLoaderBuilder {
        EmbeddingLoaderBuilder::new(dataset)
    }

    /// Underlying dataset.
    #[must_use]
    pub fn dataset(&self) -> &EmbeddingDataset {
        &self.dataset
    }

    /// Batch size.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of batches per pass.
    #[must_use]
    pub fn n_batches(&self) -> usize {
        let n = self.dataset.len();
        if self.drop_last {
            n / self.batch_size
        } else {
            n.div_ceil(self.batch_size)
        }
    }

    /// Number of molecules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    /// Whether the dataset is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    /// Subset this loader serves.
    #[must_use]
    pub fn split(&self) -> Split {
        self.split
    }

    /// Row order for one pass. Seeded loaders repeat the same order.
    fn order(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.dataset.len()).collect();
        if self.shuffle {
            let mut rng = match self.seed {
                Some(seed) => seed.to_rng(),
                None => ChaCha8Rng::from_entropy(),
            };
            indices.shuffle(&mut rng);
        }
        indices
    }

    /// Iterate over batches on `device`.
    #[must_use]
    pub fn iter<B: Backend>(&self, device: &B::Device) -> EmbeddingLoaderIter<'_, B> {
        EmbeddingLoaderIter {
            loader: self,
            device: device.clone(),
            indices: self.order(),
            current: 0,
            n_batches: self.n_batches(),
        }
    }
}

/// Builder for [`EmbeddingLoader`].
pub struct EmbeddingLoaderBuilder {
    dataset: EmbeddingDataset,
    batch_size: usize,
    shuffle: bool,
    drop_last: bool,
    seed: Option<Seed>,
    split: Split,
}

impl EmbeddingLoaderBuilder {
    /// Defaults: batch size 32, no shuffling, keep the last partial batch.
    #[must_use]
    pub fn new(dataset: EmbeddingDataset) -> Self {
        Self {
            dataset,
            batch_size: 32,
            shuffle: false,
            drop_last: false,
            seed: None,
            split: Split::Train,
        }
    }

    /// Set the batch size.
    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Shuffle rows at the start of every pass.
    #[must_use]
    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Drop the trailing partial batch.
    #[must_use]
    pub fn drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }

    /// Seed for shuffling.
    #[must_use]
    pub fn seed(mut self, seed: Seed) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Tag the subset served by the loader.
    #[must_use]
    pub fn split(mut self, split: Split) -> Self {
        self.split = split;
        self
    }

    /// Build the loader.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero batch size or an empty dataset.
    pub fn build(self) -> Result<EmbeddingLoader> {
        if self.batch_size == 0 {
            return Err(DataError::InvalidBatchSize(
                "Batch size must be greater than 0".to_string(),
            ));
        }
        if self.dataset.is_empty() {
            return Err(DataError::EmptyDataset);
        }

        Ok(EmbeddingLoader {
            dataset: self.dataset,
            batch_size: self.batch_size,
            shuffle: self.shuffle,
            drop_last: self.drop_last,
            seed: self.seed,
            split: self.split,
        })
    }
}

/// Iterator over the batches of an [`EmbeddingLoader`].
pub struct EmbeddingLoaderIter<'a, B: Backend> {
    loader: &'a EmbeddingLoader,
    device: B::Device,
    indices: Vec<usize>,
    current: usize,
    n_batches: usize,
}

impl<B: Backend> EmbeddingLoaderIter<'_, B> {
    fn make_batch(&self, rows: &[usize]) -> Result<EmbeddingBatch<B>> {
        let dataset = self.loader.dataset.subset(rows)?;
        let x = aqsol_core::array2_to_tensor::<B>(dataset.x(), &self.device);
        let y = dataset
            .y()
            .map(|labels| aqsol_core::array1_to_tensor::<B>(labels, &self.device));
        Ok(EmbeddingBatch { x, y })
    }
}

impl<B: Backend> Iterator for EmbeddingLoaderIter<'_, B> {
    type Item = Result<EmbeddingBatch<B>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current >= self.n_batches {
            return None;
        }
        let start = self.current * self.loader.batch_size;
        let end = (start + self.loader.batch_size).min(self.indices.len());
        self.current += 1;
        Some(self.make_batch(&self.indices[start..end]))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.n_batches - self.current;
        (remaining, Some(remaining))
    }
}

impl<B: Backend> ExactSizeIterator for EmbeddingLoaderIter<'_, B> {}

/// Train and validation loaders sharing one batch size.
pub struct EmbeddingLoaders {
    train: EmbeddingLoader,
    valid: EmbeddingLoader,
}

impl EmbeddingLoaders {
    /// Start building the pair.
    #[must_use]
    pub fn builder(train: EmbeddingDataset, valid: EmbeddingDataset) -> EmbeddingLoadersBuilder {
        EmbeddingLoadersBuilder::new(train, valid)
    }

    /// Training loader.
    #[must_use]
    pub fn train(&self) -> &EmbeddingLoader {
        &self.train
    }

    /// Validation loader.
    #[must_use]
    pub fn valid(&self) -> &EmbeddingLoader {
        &self.valid
    }

    /// Embedding width.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.train.dataset().dim()
    }
}

/// Builder for [`EmbeddingLoaders`].
pub struct EmbeddingLoadersBuilder {
    train: EmbeddingDataset,
    valid: EmbeddingDataset,
    batch_size: usize,
    shuffle_train: bool,
    seed: Option<Seed>,
}

impl EmbeddingLoadersBuilder {
    /// Defaults: batch size 32, shuffled training loader.
    #[must_use]
    pub fn new(train: EmbeddingDataset, valid: EmbeddingDataset) -> Self {
        Self {
            train,
            valid,
            batch_size: 32,
            shuffle_train: true,
            seed: None,
        }
    }

    /// Batch size for both loaders.
    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Shuffle the training loader.
    #[must_use]
    pub fn shuffle_train(mut self, shuffle: bool) -> Self {
        self.shuffle_train = shuffle;
        self
    }

    /// Seed for the training order.
    #[must_use]
    pub fn seed(mut self, seed: Seed) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Build both loaders.
    ///
    /// # Errors
    ///
    /// Returns an error if the embedding widths differ or either loader is
    /// invalid.
    pub fn build(self) -> Result<EmbeddingLoaders> {
        if self.train.dim() != self.valid.dim() {
            return Err(DataError::InvalidShape(format!(
                "train width {} differs from valid width {}",
                self.train.dim(),
                self.valid.dim()
            )));
        }

        let mut train = EmbeddingLoader::builder(self.train)
            .batch_size(self.batch_size)
            .shuffle(self.shuffle_train)
            .split(Split::Train);
        if let Some(seed) = self.seed {
            train = train.seed(seed.derive("loader"));
        }

        let valid = EmbeddingLoader::builder(self.valid)
            .batch_size(self.batch_size)
            .split(Split::Valid);

        Ok(EmbeddingLoaders {
            train: train.build()?,
            valid: valid.build()?,
        })
    }
}

//! Batch iteration over a [`MayoDataset`].

use crate::dataset::MayoDataset;
use crate::types::{DatasetError, DatasetResult, ImageSample};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataModuleConfig {
    pub batch_size: usize,
    pub shuffle: bool,
    /// Drop the last partial batch of every epoch.
    pub drop_last: bool,
    /// Base seed for shuffling and augmentation.
    pub seed: u64,
    /// Size of the loader thread pool; `None` uses the global rayon pool.
    pub num_workers: Option<usize>,
}

impl Default for DataModuleConfig {
    fn default() -> Self {
        Self {
            batch_size: 4,
            shuffle: true,
            drop_last: true,
            seed: 0,
            num_workers: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageBatch<B: Backend> {
    /// `[N, C, H, W]`.
    pub images: Tensor<B, 4>,
    pub paths: Vec<PathBuf>,
}

pub struct DataModule {
    dataset: MayoDataset,
    cfg: DataModuleConfig,
    pool: Option<rayon::ThreadPool>,
}

/// Deterministic per-(seed, a, b) RNG seed (splitmix64 finaliser).
pub fn mix_seed(seed: u64, a: u64, b: u64) -> u64 {
    let mut z = seed
        .wrapping_add(a.wrapping_mul(0x9E37_79B9_7F4A_7C15))
        .wrapping_add(b.wrapping_mul(0xD1B5_4A32_D192_ED03));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

impl DataModule {
    pub fn new(dataset: MayoDataset, cfg: DataModuleConfig) -> DatasetResult<Self> {
        if cfg.batch_size == 0 {
            return Err(DatasetError::Other("batch_size must be >= 1".to_string()));
        }
        let pool = match cfg.num_workers {
            Some(n) if n > 0 => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .build()
                    .map_err(|e| DatasetError::Other(format!("failed to build loader pool: {e}")))?,
            ),
            _ => None,
        };
        Ok(Self { dataset, cfg, pool })
    }

    pub fn dataset(&self) -> &MayoDataset {
        &self.dataset
    }

    pub fn config(&self) -> &DataModuleConfig {
        &self.cfg
    }

    /// Number of batches one epoch yields.
    pub fn batches_per_epoch(&self) -> usize {
        let n = self.dataset.len();
        let bs = self.cfg.batch_size;
        if self.cfg.drop_last {
            n / bs
        } else {
            n.div_ceil(bs)
        }
    }

    /// Sample order for `epoch`; identical for identical `(seed, epoch)`.
    pub fn epoch_order(&self, epoch: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        if self.cfg.shuffle {
            let mut rng = StdRng::seed_from_u64(mix_seed(self.cfg.seed, epoch as u64, 0));
            order.shuffle(&mut rng);
        }
        order
    }

    pub fn train_iter(&self, epoch: usize) -> BatchIter<'_> {
        BatchIter {
            module: self,
            order: self.epoch_order(epoch),
            cursor: 0,
            epoch,
        }
    }

    fn load_many(&self, indices: &[usize], epoch: usize) -> DatasetResult<Vec<ImageSample>> {
        let load = || {
            indices
                .par_iter()
                .map(|&idx| {
                    let mut rng =
                        StdRng::seed_from_u64(mix_seed(self.cfg.seed, epoch as u64, idx as u64 + 1));
                    self.dataset.get_augmented(idx, &mut rng)
                })
                .collect::<DatasetResult<Vec<_>>>()
        };
        match &self.pool {
            Some(pool) => pool.install(load),
            None => load(),
        }
    }
}

pub struct BatchIter<'a> {
    module: &'a DataModule,
    order: Vec<usize>,
    cursor: usize,
    epoch: usize,
}

impl BatchIter<'_> {
    pub fn next_batch<B: Backend>(
        &mut self,
        device: &B::Device,
    ) -> DatasetResult<Option<ImageBatch<B>>> {
        let batch_size = self.module.cfg.batch_size;
        if self.cursor >= self.order.len() {
            return Ok(None);
        }
        let end = (self.cursor + batch_size).min(self.order.len());
        if self.module.cfg.drop_last && end - self.cursor < batch_size {
            self.cursor = self.order.len();
            return Ok(None);
        }
        let slice = &self.order[self.cursor..end];
        self.cursor = end;

        let started = Instant::now();
        let samples = self.module.load_many(slice, self.epoch)?;
        let Some(first) = samples.first() else {
            return Ok(None);
        };
        let expected = first.shape();
        let [c, h, w] = expected;
        let mut buf = Vec::with_capacity(samples.len() * c * h * w);
        let mut paths = Vec::with_capacity(samples.len());
        for sample in samples {
            let actual = sample.shape();
            if actual != expected {
                return Err(DatasetError::Mismatch {
                    path: sample.path,
                    expected,
                    actual,
                });
            }
            buf.extend_from_slice(&sample.pixels);
            paths.push(sample.path);
        }
        let n = paths.len();
        let images = Tensor::<B, 1>::from_floats(buf.as_slice(), device).reshape([n, c, h, w]);
        tracing::trace!(
            epoch = self.epoch,
            batch = n,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "assembled batch"
        );
        Ok(Some(ImageBatch { images, paths }))
    }
}

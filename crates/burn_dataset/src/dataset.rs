//! Mayo-style slice dataset: a directory tree of single-channel `.npy` arrays.

use crate::aug::FlipAugment;
use crate::crawler::crawl;
use crate::npy::load_slice;
use crate::types::{DatasetError, DatasetResult, ImageSample, Normalization};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MayoDatasetConfig {
    /// Root directory crawled recursively for slices.
    pub root: PathBuf,
    /// File extension to pick up (without the dot).
    pub extension: String,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
    pub normalization: Normalization,
}

impl Default for MayoDatasetConfig {
    fn default() -> Self {
        Self {
            root: Path::new("..").join("..").join("data").join("ori_dataset"),
            extension: "npy".to_string(),
            flip_horizontal: false,
            flip_vertical: false,
            normalization: Normalization::MinMax,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MayoDataset {
    cfg: MayoDatasetConfig,
    paths: Vec<PathBuf>,
}

impl MayoDataset {
    /// Crawl `cfg.root`; fails when no matching file exists.
    pub fn open(cfg: MayoDatasetConfig) -> DatasetResult<Self> {
        let paths = crawl(&cfg.root, &cfg.extension)?;
        if paths.is_empty() {
            return Err(DatasetError::Empty {
                root: cfg.root.clone(),
                extension: cfg.extension.clone(),
            });
        }
        tracing::info!(
            root = %cfg.root.display(),
            files = paths.len(),
            "indexed slice dataset"
        );
        Ok(Self { cfg, paths })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn config(&self) -> &MayoDatasetConfig {
        &self.cfg
    }

    pub fn augment(&self) -> FlipAugment {
        FlipAugment {
            horizontal: self.cfg.flip_horizontal,
            vertical: self.cfg.flip_vertical,
        }
    }

    /// Load slice `index` without augmentation.
    pub fn get(&self, index: usize) -> DatasetResult<ImageSample> {
        let path = self.paths.get(index).ok_or_else(|| {
            DatasetError::Other(format!(
                "index {index} out of range for dataset of {}",
                self.paths.len()
            ))
        })?;
        load_slice(path, self.cfg.normalization)
    }

    /// Load slice `index` and apply the configured flips.
    pub fn get_augmented<R: Rng>(&self, index: usize, rng: &mut R) -> DatasetResult<ImageSample> {
        let mut sample = self.get(index)?;
        self.augment().apply(&mut sample, rng);
        Ok(sample)
    }
}

//! Core types and error definitions for burn_dataset.

use ndarray_npy::ReadNpyError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub type DatasetResult<T> = Result<T, DatasetError>;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("npy read error at {path}: {source}")]
    Npy {
        path: PathBuf,
        #[source]
        source: ReadNpyError,
    },
    #[error("unsupported array dtype at {path}")]
    UnsupportedDType { path: PathBuf },
    #[error("unsupported array shape {shape:?} at {path}; expected [H, W], [1, H, W] or [H, W, 1]")]
    Shape { path: PathBuf, shape: Vec<usize> },
    #[error("non-finite values in {path}")]
    NonFinite { path: PathBuf },
    #[error("no *.{extension} files found under {root}")]
    Empty { root: PathBuf, extension: String },
    #[error("slice {path} is {actual:?} (CxHxW), batch expects {expected:?}")]
    Mismatch {
        path: PathBuf,
        expected: [usize; 3],
        actual: [usize; 3],
    },
    #[error("{0}")]
    Other(String),
}

/// One 2-D slice in CHW layout.
#[derive(Debug, Clone)]
pub struct ImageSample {
    pub path: PathBuf,
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    pub pixels: Vec<f32>,
}

impl ImageSample {
    pub fn shape(&self) -> [usize; 3] {
        [self.channels, self.height, self.width]
    }
}

/// Intensity normalisation applied after loading a slice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// Keep raw values.
    None,
    /// Per-slice min/max mapped to [-1, 1].
    #[default]
    MinMax,
}

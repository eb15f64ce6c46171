//! Slice dataset loading and Burn-compatible batching for the latent embedder.
//!
//! This crate provides utilities for:
//! - Crawling a dataset root for `.npy` slices
//! - Decoding and normalising single-channel arrays
//! - Flip augmentation
//! - Seeded, parallel batch iteration

pub mod aug;
pub mod batch;
pub mod crawler;
pub mod dataset;
pub mod npy;
pub mod types;

pub use aug::FlipAugment;
pub use batch::{BatchIter, DataModule, DataModuleConfig, ImageBatch};
pub use crawler::crawl;
pub use dataset::{MayoDataset, MayoDatasetConfig};
pub use npy::load_slice;
pub use types::*;

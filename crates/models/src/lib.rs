//! Burn modules for the medical-imaging latent embedder.
//!
//! - `Vae`: convolutional variational autoencoder with a diagonal Gaussian
//!   bottleneck and optional deep-supervision heads.
//! - `loss`: reconstruction criteria and the combined VAE objective.
//! - `metrics`: L1 / L2 / SSIM used for logging and checkpoint monitoring.
//!
//! These are pure Burn modules; the `training` crate owns the optimiser,
//! the data pipeline and checkpointing.

pub mod blocks;
pub mod loss;
pub mod metrics;
pub mod vae;

pub use loss::{deep_supervised_loss, vae_loss, ReconstructionLoss, VaeLoss};
pub use vae::{sample_diagonal_gaussian, ModelConfigError, Vae, VaeConfig, VaeOutput};

//! Training configuration: built-in defaults, optional TOML file, CLI overrides.
//!
//! Defaults reproduce the reference Mayo run, so `train` with no flags and no
//! config file trains the 4-stage VAE on `../../data/ori_dataset`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{ensure, Context};
use burn::grad_clipping::GradientClippingConfig;
use burn::optim::decay::WeightDecayConfig;
use burn::optim::AdamConfig;
use burn_dataset::{DataModuleConfig, MayoDatasetConfig};
use models::VaeConfig;
use serde::{Deserialize, Serialize};

use crate::callbacks::{CheckpointConfig, EarlyStoppingConfig};

pub const DEFAULT_CONFIG_NAME: &str = "latent_embedder.toml";
pub const CONFIG_ENV: &str = "LATENT_EMBEDDER_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunSection {
    pub runs_root: PathBuf,
    /// Run directory name is `<name_prefix>_<timestamp>`.
    pub name_prefix: String,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            runs_root: PathBuf::from("runs"),
            name_prefix: "VAE".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptimSection {
    pub lr: f64,
    pub beta_1: f32,
    pub beta_2: f32,
    pub epsilon: f32,
    pub weight_decay: Option<f32>,
    /// Clip gradients to this global L2 norm.
    pub grad_clip_norm: Option<f32>,
}

impl Default for OptimSection {
    fn default() -> Self {
        Self {
            lr: 1e-4,
            beta_1: 0.9,
            beta_2: 0.999,
            epsilon: 1e-8,
            weight_decay: None,
            grad_clip_norm: None,
        }
    }
}

impl OptimSection {
    pub fn adam(&self) -> AdamConfig {
        AdamConfig::new()
            .with_beta_1(self.beta_1)
            .with_beta_2(self.beta_2)
            .with_epsilon(self.epsilon)
            .with_weight_decay(self.weight_decay.map(WeightDecayConfig::new))
            .with_grad_clipping(self.grad_clip_norm.map(GradientClippingConfig::Norm))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainerSection {
    /// Early stopping is ignored before this many epochs have run.
    pub min_epochs: usize,
    pub max_epochs: usize,
    pub log_every_n_steps: usize,
    pub limit_train_batches: Option<usize>,
    /// Write an input | reconstruction PNG every N steps.
    pub sample_every_n_steps: Option<usize>,
}

impl Default for TrainerSection {
    fn default() -> Self {
        Self {
            min_epochs: 200,
            max_epochs: 1001,
            log_every_n_steps: 50,
            limit_train_batches: None,
            sample_every_n_steps: Some(1000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainConfig {
    pub run: RunSection,
    pub data: MayoDatasetConfig,
    pub loader: DataModuleConfig,
    pub model: VaeConfig,
    pub optim: OptimSection,
    pub trainer: TrainerSection,
    pub checkpoint: CheckpointConfig,
    pub early_stopping: EarlyStoppingConfig,
    pub logging: LoggingSection,
}

impl TrainConfig {
    /// Resolve the config file: explicit path, then `$LATENT_EMBEDDER_CONFIG`,
    /// then `latent_embedder.toml` in the working directory, else defaults.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            return Self::from_path(path);
        }
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            if !path.trim().is_empty() {
                return Self::from_path(Path::new(&path));
            }
        }
        let fallback = Path::new(DEFAULT_CONFIG_NAME);
        if fallback.exists() {
            return Self::from_path(fallback);
        }
        Ok(Self::default())
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.model.validate()?;
        ensure!(self.loader.batch_size > 0, "loader.batch_size must be >= 1");
        ensure!(
            self.checkpoint.every_n_train_steps > 0,
            "checkpoint.every_n_train_steps must be >= 1"
        );
        ensure!(
            self.trainer.log_every_n_steps > 0,
            "trainer.log_every_n_steps must be >= 1"
        );
        ensure!(
            self.trainer.min_epochs <= self.trainer.max_epochs,
            "trainer.min_epochs ({}) exceeds trainer.max_epochs ({})",
            self.trainer.min_epochs,
            self.trainer.max_epochs
        );
        ensure!(
            self.optim.lr.is_finite() && self.optim.lr > 0.0,
            "optim.lr must be positive"
        );
        ensure!(
            !self.checkpoint.monitor.trim().is_empty(),
            "checkpoint.monitor must not be empty"
        );
        if self.trainer.sample_every_n_steps == Some(0) {
            anyhow::bail!("trainer.sample_every_n_steps must be >= 1 when set");
        }
        Ok(())
    }
}

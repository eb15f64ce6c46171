//! Periodic top-k checkpointing on a monitored metric.
//!
//! Every `every_n_train_steps` optimiser steps the latest value of `monitor`
//! is compared against the files already kept. Better values are written as
//! `epoch={E}-step={S}.bin`; once more than `save_top_k` files exist the worst
//! one is deleted. `last.bin` is refreshed at each check when `save_last` is set.
//! The optimiser state of each checkpoint lives next to it as `<name>.optim.bin`
//! and is deleted with it.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use super::MonitorMode;
use crate::metrics::StepMetrics;

pub const CHECKPOINT_EXT: &str = "bin";
pub const LAST_NAME: &str = "last";
pub const BEST_RECORD_NAME: &str = "best_checkpoint.json";
pub const OPTIM_EXT: &str = "optim.bin";

/// Companion optimiser-state file of a model checkpoint.
pub fn optimizer_state_path(checkpoint: &Path) -> PathBuf {
    checkpoint.with_extension(OPTIM_EXT)
}

fn remove_if_present(path: &Path) -> anyhow::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("failed to remove checkpoint {}", path.display())),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CheckpointConfig {
    pub monitor: String,
    pub mode: MonitorMode,
    pub every_n_train_steps: usize,
    /// `> 0` keeps that many files, `0` keeps none, `< 0` keeps all.
    pub save_top_k: i64,
    pub save_last: bool,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            monitor: "train/L1".to_string(),
            mode: MonitorMode::Min,
            every_n_train_steps: 50,
            save_top_k: 5,
            save_last: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeptCheckpoint {
    pub score: f64,
    pub path: PathBuf,
}

/// Contents of `best_checkpoint.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestCheckpointRecord {
    /// File name of the best checkpoint inside the run directory.
    pub best_model_epoch: String,
    pub best_model_path: PathBuf,
    pub best_model_score: Option<f64>,
}

#[derive(Debug)]
pub struct ModelCheckpoint {
    cfg: CheckpointConfig,
    dirpath: PathBuf,
    kept: Vec<KeptCheckpoint>,
    last_model_path: Option<PathBuf>,
}

impl ModelCheckpoint {
    pub fn new(cfg: CheckpointConfig, dirpath: impl Into<PathBuf>) -> Self {
        Self {
            cfg,
            dirpath: dirpath.into(),
            kept: Vec::new(),
            last_model_path: None,
        }
    }

    pub fn config(&self) -> &CheckpointConfig {
        &self.cfg
    }

    pub fn kept(&self) -> &[KeptCheckpoint] {
        &self.kept
    }

    pub fn should_check(&self, global_step: usize) -> bool {
        let every = self.cfg.every_n_train_steps;
        every > 0 && global_step > 0 && global_step % every == 0
    }

    pub fn checkpoint_path(&self, epoch: usize, global_step: usize) -> PathBuf {
        self.dirpath
            .join(format!("epoch={epoch}-step={global_step}.{CHECKPOINT_EXT}"))
    }

    pub fn last_path(&self) -> PathBuf {
        self.dirpath.join(format!("{LAST_NAME}.{CHECKPOINT_EXT}"))
    }

    pub fn best(&self) -> Option<&KeptCheckpoint> {
        let mode = self.cfg.mode;
        self.kept.iter().fold(None, |best, c| match best {
            Some(b) if !mode.improves(c.score, b.score, 0.0) => Some(b),
            _ => Some(c),
        })
    }

    pub fn best_model_path(&self) -> Option<&Path> {
        self.best().map(|c| c.path.as_path())
    }

    pub fn best_model_score(&self) -> Option<f64> {
        self.best().map(|c| c.score)
    }

    pub fn last_model_path(&self) -> Option<&Path> {
        self.last_model_path.as_deref()
    }

    fn worst_index(&self) -> Option<usize> {
        let mode = self.cfg.mode;
        self.kept
            .iter()
            .enumerate()
            .fold(None, |worst: Option<(usize, f64)>, (i, c)| match worst {
                Some((_, w)) if !mode.improves(w, c.score, 0.0) => worst,
                _ => Some((i, c.score)),
            })
            .map(|(i, _)| i)
    }

    fn admits(&self, score: f64) -> bool {
        match self.cfg.save_top_k {
            0 => false,
            k if k < 0 => true,
            k if self.kept.len() < k as usize => true,
            _ => self
                .worst_index()
                .is_some_and(|i| self.cfg.mode.improves(score, self.kept[i].score, 0.0)),
        }
    }

    /// Run the periodic check after optimiser step `global_step`.
    ///
    /// `save` writes the current model to the given path. Returns the path of
    /// a newly kept top-k checkpoint, if any.
    pub fn on_train_step<F>(
        &mut self,
        epoch: usize,
        global_step: usize,
        metrics: &StepMetrics,
        mut save: F,
    ) -> anyhow::Result<Option<PathBuf>>
    where
        F: FnMut(&Path) -> anyhow::Result<()>,
    {
        if !self.should_check(global_step) {
            return Ok(None);
        }
        let mut saved = None;
        match metrics.get(&self.cfg.monitor) {
            Some(score) if score.is_finite() => {
                if self.admits(score) {
                    let path = self.checkpoint_path(epoch, global_step);
                    save(&path)?;
                    self.kept.push(KeptCheckpoint {
                        score,
                        path: path.clone(),
                    });
                    self.evict_overflow()?;
                    tracing::info!(
                        monitor = %self.cfg.monitor,
                        score,
                        path = %path.display(),
                        "saved top-k checkpoint"
                    );
                    saved = Some(path);
                }
            }
            Some(score) => {
                tracing::warn!(monitor = %self.cfg.monitor, score, "monitored metric is not finite; skipping top-k");
            }
            None => {
                tracing::warn!(monitor = %self.cfg.monitor, "monitored metric missing; skipping top-k");
            }
        }
        if self.cfg.save_last {
            self.save_last(&mut save)?;
        }
        Ok(saved)
    }

    /// Final `last.bin` refresh at the end of training.
    pub fn on_fit_end<F>(&mut self, mut save: F) -> anyhow::Result<()>
    where
        F: FnMut(&Path) -> anyhow::Result<()>,
    {
        if self.cfg.save_last {
            self.save_last(&mut save)?;
        }
        Ok(())
    }

    fn save_last<F>(&mut self, save: &mut F) -> anyhow::Result<()>
    where
        F: FnMut(&Path) -> anyhow::Result<()>,
    {
        let path = self.last_path();
        save(&path)?;
        self.last_model_path = Some(path);
        Ok(())
    }

    fn evict_overflow(&mut self) -> anyhow::Result<()> {
        let Ok(limit) = usize::try_from(self.cfg.save_top_k) else {
            return Ok(());
        };
        while self.kept.len() > limit {
            let Some(i) = self.worst_index() else {
                break;
            };
            let evicted = self.kept.remove(i);
            remove_if_present(&evicted.path)?;
            remove_if_present(&optimizer_state_path(&evicted.path))?;
            tracing::debug!(path = %evicted.path.display(), score = evicted.score, "evicted checkpoint");
        }
        Ok(())
    }

    /// Record describing the best checkpoint, falling back to `last.bin`
    /// when no top-k file was kept.
    pub fn best_record(&self) -> Option<BestCheckpointRecord> {
        let (path, score) = match self.best() {
            Some(best) => (best.path.clone(), Some(best.score)),
            None => (self.last_model_path.clone()?, None),
        };
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Some(BestCheckpointRecord {
            best_model_epoch: name,
            best_model_path: path,
            best_model_score: score,
        })
    }

    /// Write `best_checkpoint.json` into `log_dir`.
    pub fn save_best_record(&self, log_dir: &Path) -> anyhow::Result<PathBuf> {
        let record = self
            .best_record()
            .context("no checkpoint was written during training")?;
        fs::create_dir_all(log_dir)
            .with_context(|| format!("failed to create {}", log_dir.display()))?;
        let path = log_dir.join(BEST_RECORD_NAME);
        let json = serde_json::to_string_pretty(&record)?;
        fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}

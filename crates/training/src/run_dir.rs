//! Timestamped run directory layout.
//!
//! ```text
//! <runs_root>/<prefix>_<YYYYmmdd_HHMMSS>/   checkpoints, config.json
//!     logs/version_<N>/                      metrics.jsonl, best_checkpoint.json, samples/
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Local};

pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Clone)]
pub struct RunDirs {
    /// Checkpoints land here.
    pub root: PathBuf,
    pub log_dir: PathBuf,
    pub version: usize,
}

impl RunDirs {
    pub fn run_name(prefix: &str, now: DateTime<Local>) -> String {
        format!("{prefix}_{}", now.format(TIMESTAMP_FORMAT))
    }

    /// Create (or reuse) the run directory and a fresh `logs/version_N`.
    pub fn create(runs_root: &Path, prefix: &str, now: DateTime<Local>) -> anyhow::Result<Self> {
        let root = runs_root.join(Self::run_name(prefix, now));
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create run dir {}", root.display()))?;
        let logs = root.join("logs");
        fs::create_dir_all(&logs)?;
        let version = next_version(&logs)?;
        let log_dir = logs.join(format!("version_{version}"));
        fs::create_dir_all(&log_dir)
            .with_context(|| format!("failed to create log dir {}", log_dir.display()))?;
        Ok(Self {
            root,
            log_dir,
            version,
        })
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.log_dir.join("metrics.jsonl")
    }

    pub fn samples_dir(&self) -> PathBuf {
        self.log_dir.join("samples")
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.json")
    }
}

fn next_version(logs: &Path) -> anyhow::Result<usize> {
    let mut next = 0;
    for entry in fs::read_dir(logs)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let parsed = name
            .to_str()
            .and_then(|n| n.strip_prefix("version_"))
            .and_then(|v| v.parse::<usize>().ok());
        if let Some(v) = parsed {
            next = next.max(v + 1);
        }
    }
    Ok(next)
}

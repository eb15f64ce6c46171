//! Named scalar metrics and the JSONL metrics log.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct StepMetrics(BTreeMap<String, f64>);

impl StepMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `name=value` pairs for log lines.
    pub fn describe(&self) -> String {
        self.iter()
            .map(|(k, v)| format!("{k}={v:.5}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for StepMetrics {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Running per-epoch means. Non-finite values are excluded.
#[derive(Debug, Default)]
pub struct EpochAccumulator {
    sums: BTreeMap<String, (f64, usize)>,
}

impl EpochAccumulator {
    pub fn add(&mut self, metrics: &StepMetrics) {
        for (name, value) in metrics.iter() {
            if !value.is_finite() {
                continue;
            }
            let entry = self.sums.entry(name.to_string()).or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += 1;
        }
    }

    pub fn means(&self) -> StepMetrics {
        self.sums
            .iter()
            .filter(|(_, (_, n))| *n > 0)
            .map(|(k, (sum, n))| (k.clone(), sum / *n as f64))
            .collect()
    }
}

#[derive(Serialize)]
struct MetricsLine<'a> {
    scope: &'a str,
    epoch: usize,
    step: usize,
    metrics: &'a StepMetrics,
}

/// Appends one JSON object per line.
pub struct MetricsLogger {
    path: PathBuf,
    out: BufWriter<File>,
}

impl MetricsLogger {
    pub fn create(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path)
            .with_context(|| format!("failed to create metrics log {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            out: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn log(
        &mut self,
        scope: &str,
        epoch: usize,
        step: usize,
        metrics: &StepMetrics,
    ) -> anyhow::Result<()> {
        let line = MetricsLine {
            scope,
            epoch,
            step,
            metrics,
        };
        serde_json::to_writer(&mut self.out, &line)?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{EpochAccumulator, StepMetrics};

    #[test]
    fn epoch_means_skip_non_finite() {
        let mut acc = EpochAccumulator::default();
        acc.add(&[("train/L1", 1.0)].into_iter().collect());
        acc.add(&[("train/L1", 3.0)].into_iter().collect());
        acc.add(&[("train/L1", f64::NAN)].into_iter().collect::<StepMetrics>());
        assert_eq!(acc.means().get("train/L1"), Some(2.0));
    }
}

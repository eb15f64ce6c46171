use serde::{Deserialize, Serialize};

use super::MonitorMode;
use crate::metrics::StepMetrics;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EarlyStoppingConfig {
    /// Off by default: the reference run trains without validation.
    pub enabled: bool,
    pub monitor: String,
    pub min_delta: f64,
    /// Number of epoch-end checks with no improvement before stopping.
    pub patience: usize,
    pub mode: MonitorMode,
    /// Stop as soon as the monitored value becomes NaN or infinite.
    pub check_finite: bool,
}

impl Default for EarlyStoppingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            monitor: "train/L1".to_string(),
            min_delta: 0.0,
            patience: 10,
            mode: MonitorMode::Min,
            check_finite: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EarlyStopping {
    cfg: EarlyStoppingConfig,
    best: f64,
    wait: usize,
    stopped_epoch: Option<usize>,
}

impl EarlyStopping {
    pub fn new(cfg: EarlyStoppingConfig) -> Self {
        let best = cfg.mode.worst_value();
        Self {
            cfg,
            best,
            wait: 0,
            stopped_epoch: None,
        }
    }

    pub fn best(&self) -> f64 {
        self.best
    }

    pub fn wait_count(&self) -> usize {
        self.wait
    }

    pub fn stopped_epoch(&self) -> Option<usize> {
        self.stopped_epoch
    }

    /// Returns `true` when training should stop after `epoch`.
    pub fn on_epoch_end(&mut self, epoch: usize, metrics: &StepMetrics) -> bool {
        let Some(current) = metrics.get(&self.cfg.monitor) else {
            tracing::warn!(monitor = %self.cfg.monitor, "early stopping metric missing");
            return false;
        };
        let should_stop = if !current.is_finite() {
            if self.cfg.check_finite {
                tracing::warn!(monitor = %self.cfg.monitor, current, "monitored metric is not finite");
                true
            } else {
                self.register_stall()
            }
        } else if self.cfg.mode.improves(current, self.best, self.cfg.min_delta) {
            self.best = current;
            self.wait = 0;
            false
        } else {
            self.register_stall()
        };
        if should_stop {
            self.stopped_epoch = Some(epoch);
            tracing::info!(
                epoch,
                monitor = %self.cfg.monitor,
                best = self.best,
                wait = self.wait,
                "early stopping triggered"
            );
        }
        should_stop
    }

    fn register_stall(&mut self) -> bool {
        self.wait += 1;
        self.wait >= self.cfg.patience
    }
}

//! Training callbacks driven by monitored metrics.

pub mod checkpoint;
pub mod early_stopping;

pub use checkpoint::{optimizer_state_path, BestCheckpointRecord, CheckpointConfig, ModelCheckpoint};
pub use early_stopping::{EarlyStopping, EarlyStoppingConfig};

use serde::{Deserialize, Serialize};

/// Whether a lower or a higher monitored value is better.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorMode {
    #[default]
    Min,
    Max,
}

impl MonitorMode {
    /// Strict improvement of `candidate` over `reference` by more than `min_delta`.
    pub fn improves(&self, candidate: f64, reference: f64, min_delta: f64) -> bool {
        match self {
            MonitorMode::Min => candidate < reference - min_delta,
            MonitorMode::Max => candidate > reference + min_delta,
        }
    }

    /// Starting reference that any finite value improves on.
    pub fn worst_value(&self) -> f64 {
        match self {
            MonitorMode::Min => f64::INFINITY,
            MonitorMode::Max => f64::NEG_INFINITY,
        }
    }
}

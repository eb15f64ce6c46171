#![recursion_limit = "256"]

pub mod callbacks;
pub mod config;
pub mod evaluate;
pub mod logging;
pub mod metrics;
pub mod run_dir;
pub mod samples;
pub mod trainer;
pub mod util;

pub use callbacks::{CheckpointConfig, EarlyStopping, EarlyStoppingConfig, ModelCheckpoint};
pub use config::TrainConfig;
pub use models::{Vae, VaeConfig};
pub use run_dir::RunDirs;
pub use trainer::{fit, FitOutcome};
pub use util::{run_train, run_training, TrainArgs};
/// Backend alias for training/eval (NdArray by default; WGPU if enabled).
#[cfg(feature = "backend-wgpu")]
pub type TrainBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type TrainBackend = burn_ndarray::NdArray<f32>;

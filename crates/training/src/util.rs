use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use burn::backend::Autodiff;
use burn::module::{AutodiffModule, Module};
use burn::optim::Optimizer;
use burn::record::{BinFileRecorder, FullPrecisionSettings, Recorder, RecorderError};
use burn::tensor::backend::AutodiffBackend;
use burn_dataset::{DataModule, MayoDataset};
use chrono::Local;
use clap::{Parser, ValueEnum};
use models::{Vae, VaeConfig};

use crate::callbacks::optimizer_state_path;
use crate::config::TrainConfig;
use crate::run_dir::RunDirs;
use crate::trainer::fit;
use crate::TrainBackend;

pub fn load_vae_from_checkpoint<P: AsRef<Path>>(
    path: P,
    cfg: &VaeConfig,
    device: &<TrainBackend as burn::tensor::backend::Backend>::Device,
) -> anyhow::Result<Vae<TrainBackend>> {
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    let model = cfg.init::<TrainBackend>(device)?;
    model
        .load_file(path.as_ref().to_path_buf(), &recorder, device)
        .map_err(|e: RecorderError| {
            anyhow::anyhow!(
                "failed to load checkpoint {}: {e}",
                path.as_ref().display()
            )
        })
}

/// Restore the optimiser state saved beside the model checkpoint at `checkpoint`.
pub fn load_optimizer_state<B, M, O>(
    optim: O,
    checkpoint: &Path,
    device: &B::Device,
) -> anyhow::Result<O>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    let path = optimizer_state_path(checkpoint);
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    let record = Recorder::<B>::load::<O::Record>(&recorder, path.clone(), device)
        .map_err(|e| anyhow::anyhow!("failed to load optimizer state {}: {e}", path.display()))?;
    Ok(optim.load_record(record))
}

#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackendKind {
    #[default]
    NdArray,
    Wgpu,
}

#[derive(Parser, Debug, Default)]
#[command(
    name = "train",
    about = "Train the VAE latent embedder on .npy slices (defaults reproduce the Mayo run)"
)]
pub struct TrainArgs {
    /// TOML config file (falls back to $LATENT_EMBEDDER_CONFIG, then ./latent_embedder.toml).
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Backend to use (ndarray or wgpu if enabled).
    #[arg(long, value_enum, default_value_t = BackendKind::NdArray)]
    pub backend: BackendKind,
    /// Dataset root crawled for slices.
    #[arg(long)]
    pub data_root: Option<PathBuf>,
    /// Parent directory of timestamped run directories.
    #[arg(long)]
    pub runs_root: Option<PathBuf>,
    #[arg(long)]
    pub batch_size: Option<usize>,
    #[arg(long)]
    pub min_epochs: Option<usize>,
    #[arg(long)]
    pub max_epochs: Option<usize>,
    /// Learning rate.
    #[arg(long)]
    pub lr: Option<f64>,
    /// Cap on batches per epoch.
    #[arg(long)]
    pub limit_train_batches: Option<usize>,
    /// Seed for shuffling and augmentation.
    #[arg(long)]
    pub seed: Option<u64>,
    /// Loader thread count.
    #[arg(long)]
    pub num_workers: Option<usize>,
    /// Default log filter when RUST_LOG is unset.
    #[arg(long)]
    pub log_level: Option<String>,
}

impl TrainArgs {
    /// Layer explicit flags over `cfg`.
    pub fn apply(&self, cfg: &mut TrainConfig) {
        if let Some(root) = &self.data_root {
            cfg.data.root = root.clone();
        }
        if let Some(root) = &self.runs_root {
            cfg.run.runs_root = root.clone();
        }
        if let Some(bs) = self.batch_size {
            cfg.loader.batch_size = bs;
        }
        if let Some(n) = self.min_epochs {
            cfg.trainer.min_epochs = n;
        }
        if let Some(n) = self.max_epochs {
            cfg.trainer.max_epochs = n;
        }
        if let Some(lr) = self.lr {
            cfg.optim.lr = lr;
        }
        if let Some(limit) = self.limit_train_batches {
            cfg.trainer.limit_train_batches = Some(limit);
        }
        if let Some(seed) = self.seed {
            cfg.loader.seed = seed;
        }
        if let Some(n) = self.num_workers {
            cfg.loader.num_workers = Some(n);
        }
        if let Some(level) = &self.log_level {
            cfg.logging.level = level.clone();
        }
    }

    pub fn resolve_config(&self) -> anyhow::Result<TrainConfig> {
        let mut cfg = TrainConfig::load(self.config.as_deref())?;
        self.apply(&mut cfg);
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Summary of a finished run, as reported by [`run_training`].
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run: RunDirs,
    pub best_record: PathBuf,
    pub best_model_path: Option<PathBuf>,
    pub epochs_run: usize,
    pub global_step: usize,
    pub stopped_early: bool,
}

pub fn run_train(args: TrainArgs) -> anyhow::Result<()> {
    validate_backend_choice(args.backend)?;
    let cfg = args.resolve_config()?;
    crate::logging::init_tracing(&cfg.logging.level)?;
    let report = run_training(&cfg)?;
    println!(
        "Saved best checkpoint record to {}",
        report.best_record.display()
    );
    Ok(())
}

/// Create the run directory, train, and record the best checkpoint.
pub fn run_training(cfg: &TrainConfig) -> anyhow::Result<RunReport> {
    let run = RunDirs::create(&cfg.run.runs_root, &cfg.run.name_prefix, Local::now())?;
    fs::write(run.config_path(), serde_json::to_string_pretty(cfg)?)
        .with_context(|| format!("failed to write {}", run.config_path().display()))?;
    tracing::info!(run_dir = %run.root.display(), log_dir = %run.log_dir.display(), "created run directory");

    let dataset = MayoDataset::open(cfg.data.clone()).with_context(|| {
        format!("failed to load dataset from {}", cfg.data.root.display())
    })?;
    let datamodule = DataModule::new(dataset, cfg.loader.clone())?;

    let device = <ADBackend as burn::tensor::backend::Backend>::Device::default();
    let model = cfg.model.init::<ADBackend>(&device)?;
    let outcome = fit(model, &datamodule, cfg, &run, &device)?;

    let best_record = outcome.checkpoint.save_best_record(&run.log_dir)?;
    Ok(RunReport {
        best_model_path: outcome.checkpoint.best_model_path().map(Path::to_path_buf),
        best_record,
        epochs_run: outcome.epochs_run,
        global_step: outcome.global_step,
        stopped_early: outcome.stopped_early,
        run,
    })
}

type ADBackend = Autodiff<TrainBackend>;

pub fn validate_backend_choice(kind: BackendKind) -> anyhow::Result<()> {
    let built_wgpu = cfg!(feature = "backend-wgpu");
    match (kind, built_wgpu) {
        (BackendKind::Wgpu, false) => {
            anyhow::bail!("backend-wgpu feature not enabled; rebuild with --features backend-wgpu or choose ndarray backend")
        }
        (BackendKind::NdArray, true) => {
            println!("note: built with backend-wgpu; training will still use the WGPU backend despite --backend ndarray");
        }
        _ => {}
    }
    Ok(())
}

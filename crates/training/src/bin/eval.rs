use std::path::PathBuf;

use clap::Parser;
use training::evaluate::{eval_datamodule, evaluate};
use training::util::{load_vae_from_checkpoint, validate_backend_choice, BackendKind};
use training::{TrainBackend, TrainConfig};

#[derive(Parser, Debug)]
#[command(
    name = "eval",
    about = "Measure reconstruction quality (L1/L2/SSIM) of a VAE checkpoint on a slice dataset"
)]
struct Args {
    /// Backend to use (ndarray or wgpu if enabled).
    #[arg(long, value_enum, default_value_t = BackendKind::NdArray)]
    backend: BackendKind,
    /// TOML config used for training (model hyper-parameters must match the checkpoint).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Checkpoint path to load.
    #[arg(long)]
    checkpoint: PathBuf,
    /// Dataset root (defaults to the configured one).
    #[arg(long)]
    data_root: Option<PathBuf>,
    #[arg(long, default_value_t = 4)]
    batch_size: usize,
    /// Stop after this many batches.
    #[arg(long)]
    limit_batches: Option<usize>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    validate_backend_choice(args.backend)?;

    let mut cfg = TrainConfig::load(args.config.as_deref())?;
    if let Some(root) = &args.data_root {
        cfg.data.root = root.clone();
    }
    cfg.validate()?;
    training::logging::init_tracing(&cfg.logging.level)?;

    let datamodule = eval_datamodule(&cfg, args.batch_size)?;
    let device = <TrainBackend as burn::tensor::backend::Backend>::Device::default();
    let model = load_vae_from_checkpoint(&args.checkpoint, &cfg.model, &device)?;

    let summary = evaluate(&model, &cfg.model, &datamodule, args.limit_batches, &device)?;
    println!("{}", serde_json::to_string_pretty(&summary.metrics)?);
    Ok(())
}

//! The fit loop: Adam on the deep-supervised VAE objective, with step logging,
//! periodic samples, top-k checkpointing and optional early stopping.

use std::path::Path;

use anyhow::Context;
use burn::module::{AutodiffModule, Module};
use burn::optim::{GradientsParams, Optimizer};
use burn::record::{BinFileRecorder, FullPrecisionSettings, Recorder};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::Tensor;
use burn_dataset::DataModule;
use models::{metrics, vae_loss, Vae, VaeLoss, VaeOutput};

use crate::callbacks::{optimizer_state_path, EarlyStopping, ModelCheckpoint};
use crate::config::TrainConfig;
use crate::metrics::{EpochAccumulator, MetricsLogger, StepMetrics};
use crate::run_dir::RunDirs;
use crate::samples::save_reconstruction_png;

pub struct FitOutcome<B: AutodiffBackend> {
    pub model: Vae<B>,
    pub checkpoint: ModelCheckpoint,
    pub epochs_run: usize,
    pub global_step: usize,
    pub stopped_early: bool,
    pub last_epoch_metrics: StepMetrics,
}

pub fn scalar<B: Backend>(tensor: Tensor<B, 1>) -> f64 {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .unwrap_or_default()
        .first()
        .copied()
        .map(f64::from)
        .unwrap_or(f64::NAN)
}

/// `train/*` metrics for one step, computed off the autodiff graph.
pub fn step_metrics<B: AutodiffBackend>(
    output: &VaeOutput<B>,
    loss: &VaeLoss<B>,
    target: Tensor<B, 4>,
) -> StepMetrics {
    let pred = output.pred.clone().inner();
    let target = target.inner();
    let mut m = StepMetrics::new();
    m.insert("train/loss", scalar(loss.total.clone().inner()));
    m.insert("train/emb_loss", scalar(loss.embedding.clone().inner()));
    m.insert("train/L1", scalar(metrics::l1(pred.clone(), target.clone())));
    m.insert("train/L2", scalar(metrics::l2(pred.clone(), target.clone())));
    m.insert("train/ssim", scalar(metrics::ssim(pred, target)));
    m
}

pub fn save_model<B: Backend>(model: &Vae<B>, path: &Path) -> anyhow::Result<()> {
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    model
        .clone()
        .save_file(path.to_path_buf(), &recorder)
        .map_err(|e| anyhow::anyhow!("failed to save checkpoint {}: {e}", path.display()))
}

pub fn save_optimizer<B, M, O>(optim: &O, path: &Path) -> anyhow::Result<()>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    Recorder::<B>::record(&recorder, optim.to_record(), path.to_path_buf())
        .map_err(|e| anyhow::anyhow!("failed to save optimizer state {}: {e}", path.display()))
}

/// Model weights at `path` plus the optimiser state beside them.
pub fn save_checkpoint<B, O>(model: &Vae<B>, optim: &O, path: &Path) -> anyhow::Result<()>
where
    B: AutodiffBackend,
    O: Optimizer<Vae<B>, B>,
{
    save_model(model, path)?;
    save_optimizer::<B, Vae<B>, O>(optim, &optimizer_state_path(path))
}

fn save_sample<B: AutodiffBackend>(
    input: &Tensor<B, 4>,
    pred: &Tensor<B, 4>,
    path: &Path,
) -> anyhow::Result<()> {
    let [_, _, h, w] = input.dims();
    let first = |t: &Tensor<B, 4>| {
        t.clone()
            .inner()
            .slice([0..1, 0..1, 0..h, 0..w])
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .unwrap_or_default()
    };
    save_reconstruction_png(&first(input), &first(pred), h, w, path)
}

pub fn fit<B: AutodiffBackend>(
    model: Vae<B>,
    datamodule: &DataModule,
    cfg: &TrainConfig,
    run: &RunDirs,
    device: &B::Device,
) -> anyhow::Result<FitOutcome<B>> {
    let batches = datamodule.batches_per_epoch();
    if batches == 0 {
        anyhow::bail!(
            "dataset of {} slices yields no full batch of {}",
            datamodule.dataset().len(),
            datamodule.config().batch_size
        );
    }

    let trainer_cfg = &cfg.trainer;
    let mut model = model;
    let mut optim = cfg.optim.adam().init::<B, Vae<B>>();
    let mut metrics_log = MetricsLogger::create(&run.metrics_path())?;
    let mut checkpoint = ModelCheckpoint::new(cfg.checkpoint.clone(), run.root.clone());
    let mut early_stopping = cfg
        .early_stopping
        .enabled
        .then(|| EarlyStopping::new(cfg.early_stopping.clone()));

    tracing::info!(
        params = model.num_params(),
        slices = datamodule.dataset().len(),
        batches_per_epoch = batches,
        max_epochs = trainer_cfg.max_epochs,
        augment = %datamodule.dataset().augment().describe(),
        "starting training"
    );

    let mut global_step = 0usize;
    let mut epochs_run = 0usize;
    let mut stopped_early = false;
    let mut last_epoch_metrics = StepMetrics::new();

    for epoch in 0..trainer_cfg.max_epochs {
        let mut acc = EpochAccumulator::default();
        let mut iter = datamodule.train_iter(epoch);
        let mut batch_idx = 0usize;
        loop {
            if trainer_cfg
                .limit_train_batches
                .is_some_and(|limit| batch_idx >= limit)
            {
                break;
            }
            let Some(batch) = iter.next_batch::<B>(device)? else {
                break;
            };
            let x = batch.images;
            let [_, _, height, width] = x.dims();
            cfg.model.check_input_size(height, width).with_context(|| {
                format!(
                    "slice {} cannot be reconstructed at full size",
                    batch.paths.first().map(|p| p.display().to_string()).unwrap_or_default()
                )
            })?;
            let output = model.forward(x.clone());
            let loss = vae_loss(
                cfg.model.loss,
                cfg.model.embedding_loss_weight,
                &output,
                x.clone(),
            );
            let step = step_metrics(&output, &loss, x.clone());

            let grads = GradientsParams::from_grads(loss.total.backward(), &model);
            model = optim.step(cfg.optim.lr, model, grads);
            global_step += 1;
            batch_idx += 1;
            acc.add(&step);

            if global_step % trainer_cfg.log_every_n_steps == 0 {
                metrics_log.log("step", epoch, global_step, &step)?;
                tracing::info!(epoch, step = global_step, "{}", step.describe());
            }
            if trainer_cfg
                .sample_every_n_steps
                .is_some_and(|n| n > 0 && global_step % n == 0)
            {
                let path = run.samples_dir().join(format!("step_{global_step}.png"));
                save_sample(&x, &output.pred, &path)?;
            }
            checkpoint.on_train_step(epoch, global_step, &step, |path| {
                save_checkpoint(&model, &optim, path)
            })?;
        }

        epochs_run = epoch + 1;
        last_epoch_metrics = acc.means();
        metrics_log.log("epoch", epoch, global_step, &last_epoch_metrics)?;
        tracing::info!(epoch, step = global_step, "epoch end: {}", last_epoch_metrics.describe());

        if let Some(es) = early_stopping.as_mut() {
            if es.on_epoch_end(epoch, &last_epoch_metrics) {
                if epochs_run >= trainer_cfg.min_epochs {
                    stopped_early = true;
                    break;
                }
                tracing::info!(
                    epoch,
                    min_epochs = trainer_cfg.min_epochs,
                    "early stopping deferred until min_epochs"
                );
            }
        }
    }

    checkpoint.on_fit_end(|path| save_checkpoint(&model, &optim, path))?;
    tracing::info!(
        epochs = epochs_run,
        steps = global_step,
        stopped_early,
        best = ?checkpoint.best_model_path(),
        "training finished"
    );

    Ok(FitOutcome {
        model,
        checkpoint,
        epochs_run,
        global_step,
        stopped_early,
        last_epoch_metrics,
    })
}

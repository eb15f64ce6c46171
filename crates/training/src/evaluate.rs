//! Reconstruction quality of a trained model over a dataset.

use anyhow::Context;
use burn::tensor::backend::Backend;
use burn_dataset::{DataModule, DataModuleConfig, MayoDataset};
use models::{metrics, Vae, VaeConfig};

use crate::config::TrainConfig;
use crate::metrics::{EpochAccumulator, StepMetrics};
use crate::trainer::scalar;

/// Ordered, unaugmented loader over `cfg.data` that keeps the final partial batch.
pub fn eval_datamodule(cfg: &TrainConfig, batch_size: usize) -> anyhow::Result<DataModule> {
    let mut data = cfg.data.clone();
    data.flip_horizontal = false;
    data.flip_vertical = false;
    let dataset = MayoDataset::open(data)
        .with_context(|| format!("failed to load dataset from {}", cfg.data.root.display()))?;
    let loader = DataModuleConfig {
        batch_size,
        shuffle: false,
        drop_last: false,
        ..cfg.loader.clone()
    };
    Ok(DataModule::new(dataset, loader)?)
}

#[derive(Debug, Clone)]
pub struct EvalSummary {
    /// Per-batch means of `eval/L1`, `eval/L2` and `eval/ssim`.
    pub metrics: StepMetrics,
    pub batches: usize,
}

/// Decode the posterior mean of every batch (at most `limit_batches`) and
/// average the reconstruction metrics.
pub fn evaluate<B: Backend>(
    model: &Vae<B>,
    model_cfg: &VaeConfig,
    datamodule: &DataModule,
    limit_batches: Option<usize>,
    device: &B::Device,
) -> anyhow::Result<EvalSummary> {
    let mut acc = EpochAccumulator::default();
    let mut iter = datamodule.train_iter(0);
    let mut batches = 0usize;
    loop {
        if limit_batches.is_some_and(|limit| batches >= limit) {
            break;
        }
        let Some(batch) = iter.next_batch::<B>(device)? else {
            break;
        };
        let x = batch.images;
        let [_, _, height, width] = x.dims();
        model_cfg.check_input_size(height, width)?;
        let pred = model.decode(model.encode_mean(x.clone()));
        let mut m = StepMetrics::new();
        m.insert("eval/L1", scalar(metrics::l1(pred.clone(), x.clone())));
        m.insert("eval/L2", scalar(metrics::l2(pred.clone(), x.clone())));
        m.insert("eval/ssim", scalar(metrics::ssim(pred, x)));
        acc.add(&m);
        batches += 1;
    }
    tracing::info!(batches, "evaluation finished");
    Ok(EvalSummary {
        metrics: acc.means(),
        batches,
    })
}

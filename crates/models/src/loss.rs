use burn::tensor::backend::Backend;
use burn::tensor::module::interpolate;
use burn::tensor::ops::{InterpolateMode, InterpolateOptions};
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

use crate::vae::VaeOutput;

/// Element-wise reconstruction criterion, reduced with a mean.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconstructionLoss {
    L1,
    #[default]
    Mse,
}

impl ReconstructionLoss {
    pub fn forward<B: Backend>(&self, pred: Tensor<B, 4>, target: Tensor<B, 4>) -> Tensor<B, 1> {
        let diff = pred - target;
        match self {
            ReconstructionLoss::L1 => diff.abs().mean(),
            ReconstructionLoss::Mse => diff.powf_scalar(2.0).mean(),
        }
    }
}

/// Normalised `1 / 2^i` weights for the main output and `side_outputs` heads.
pub fn deep_supervision_weights(side_outputs: usize) -> Vec<f32> {
    let raw: Vec<f32> = (0..=side_outputs).map(|i| 0.5f32.powi(i as i32)).collect();
    let total: f32 = raw.iter().sum();
    raw.into_iter().map(|w| w / total).collect()
}

/// Weighted reconstruction loss over the main prediction and its side heads.
///
/// Each side head is compared to the target resized (nearest) to its resolution.
pub fn deep_supervised_loss<B: Backend>(
    criterion: ReconstructionLoss,
    pred: Tensor<B, 4>,
    pred_vertical: &[Tensor<B, 4>],
    target: Tensor<B, 4>,
) -> Tensor<B, 1> {
    let weights = deep_supervision_weights(pred_vertical.len());
    let mut loss = criterion
        .forward(pred, target.clone())
        .mul_scalar(weights[0]);
    for (side, weight) in pred_vertical.iter().zip(weights.iter().skip(1)) {
        let [_, _, h, w] = side.dims();
        let target_i = interpolate(
            target.clone(),
            [h, w],
            InterpolateOptions::new(InterpolateMode::Nearest),
        );
        loss = loss + criterion.forward(side.clone(), target_i).mul_scalar(*weight);
    }
    loss
}

#[derive(Debug, Clone)]
pub struct VaeLoss<B: Backend> {
    /// Value to backpropagate.
    pub total: Tensor<B, 1>,
    pub reconstruction: Tensor<B, 1>,
    pub embedding: Tensor<B, 1>,
}

/// `rec_loss + emb_loss * embedding_loss_weight`.
pub fn vae_loss<B: Backend>(
    criterion: ReconstructionLoss,
    embedding_loss_weight: f64,
    output: &VaeOutput<B>,
    target: Tensor<B, 4>,
) -> VaeLoss<B> {
    let reconstruction = deep_supervised_loss(
        criterion,
        output.pred.clone(),
        &output.pred_vertical,
        target,
    );
    let embedding = output.emb_loss.clone();
    let total = reconstruction.clone() + embedding.clone().mul_scalar(embedding_loss_weight);
    VaeLoss {
        total,
        reconstruction,
        embedding,
    }
}

#[cfg(test)]
mod tests {
    use super::deep_supervision_weights;

    #[test]
    fn weights_halve_and_sum_to_one() {
        let w = deep_supervision_weights(2);
        assert_eq!(w.len(), 3);
        assert!((w.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!((w[0] - 4.0 / 7.0).abs() < 1e-6);
        assert!((w[1] - 2.0 * w[2]).abs() < 1e-6);
    }

    #[test]
    fn no_side_outputs_is_full_weight() {
        assert_eq!(deep_supervision_weights(0), vec![1.0]);
    }
}

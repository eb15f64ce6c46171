//! Image similarity metrics logged during training. Inputs are expected in `[-1, 1]`.

use burn::tensor::backend::Backend;
use burn::tensor::module::conv2d;
use burn::tensor::ops::ConvOptions;
use burn::tensor::Tensor;

const SSIM_WINDOW: usize = 11;
const SSIM_SIGMA: f32 = 1.5;
const SSIM_K1: f32 = 0.01;
const SSIM_K2: f32 = 0.03;

pub fn l1<B: Backend>(pred: Tensor<B, 4>, target: Tensor<B, 4>) -> Tensor<B, 1> {
    (pred - target).abs().mean()
}

pub fn l2<B: Backend>(pred: Tensor<B, 4>, target: Tensor<B, 4>) -> Tensor<B, 1> {
    (pred - target).powf_scalar(2.0).mean()
}

/// Normalised 1-D Gaussian of odd length `size`.
pub fn gaussian_kernel(size: usize, sigma: f32) -> Vec<f32> {
    let center = (size / 2) as f32;
    let raw: Vec<f32> = (0..size)
        .map(|i| {
            let d = i as f32 - center;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let total: f32 = raw.iter().sum();
    raw.into_iter().map(|v| v / total).collect()
}

/// Mean structural similarity with a Gaussian window (data range 1 after rescaling).
///
/// The window shrinks to the largest odd size that fits small images.
pub fn ssim<B: Backend>(pred: Tensor<B, 4>, target: Tensor<B, 4>) -> Tensor<B, 1> {
    let [_, channels, height, width] = pred.dims();
    let mut window = SSIM_WINDOW.min(height).min(width);
    if window % 2 == 0 {
        window -= 1;
    }
    let window = window.max(1);
    let device = pred.device();

    let g = gaussian_kernel(window, SSIM_SIGMA);
    let mut weights = Vec::with_capacity(channels * window * window);
    for _ in 0..channels {
        for a in &g {
            for b in &g {
                weights.push(a * b);
            }
        }
    }
    let kernel = Tensor::<B, 1>::from_floats(weights.as_slice(), &device)
        .reshape([channels, 1, window, window]);
    let options = || ConvOptions::new([1, 1], [0, 0], [1, 1], channels);
    let filter = |t: Tensor<B, 4>| conv2d(t, kernel.clone(), None, options());

    let x = pred.add_scalar(1.0).div_scalar(2.0);
    let y = target.add_scalar(1.0).div_scalar(2.0);

    let mu_x = filter(x.clone());
    let mu_y = filter(y.clone());
    let mu_xx = mu_x.clone() * mu_x.clone();
    let mu_yy = mu_y.clone() * mu_y.clone();
    let mu_xy = mu_x * mu_y;
    let sigma_x = filter(x.clone() * x.clone()) - mu_xx.clone();
    let sigma_y = filter(y.clone() * y.clone()) - mu_yy.clone();
    let sigma_xy = filter(x * y) - mu_xy.clone();

    let c1 = SSIM_K1 * SSIM_K1;
    let c2 = SSIM_K2 * SSIM_K2;
    let numerator = mu_xy.mul_scalar(2.0).add_scalar(c1) * sigma_xy.mul_scalar(2.0).add_scalar(c2);
    let denominator = (mu_xx + mu_yy).add_scalar(c1) * (sigma_x + sigma_y).add_scalar(c2);
    (numerator / denominator).mean()
}

#[cfg(test)]
mod tests {
    use super::gaussian_kernel;

    #[test]
    fn kernel_is_normalised_and_symmetric() {
        let k = gaussian_kernel(11, 1.5);
        assert_eq!(k.len(), 11);
        assert!((k.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!((k[0] - k[10]).abs() < 1e-7);
        assert!(k[5] > k[4]);
    }
}

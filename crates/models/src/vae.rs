//! Convolutional VAE used as the latent embedder.
//!
//! The encoder downsamples with strided [`BasicBlock`]s and projects to
//! `2 * emb_channels` moments (mean and log-variance). A diagonal Gaussian
//! bottleneck samples the latent and reports the KL term as the embedding
//! loss. The decoder mirrors the encoder with [`UpBlock`]s and can emit
//! lower-resolution side outputs for deep supervision.

use burn::module::Module;
use burn::nn::conv::Conv2d;
use burn::tensor::backend::Backend;
use burn::tensor::{Distribution, Tensor};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::blocks::{projection, BasicBlock, ConvBlock, UpBlock};
use crate::loss::ReconstructionLoss;

const LOGVAR_MIN: f64 = -30.0;
const LOGVAR_MAX: f64 = 20.0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelConfigError {
    #[error("hid_chs must not be empty")]
    Empty,
    #[error("hid_chs ({hid}), kernel_sizes ({kernels}) and strides ({strides}) must have equal length")]
    LengthMismatch {
        hid: usize,
        kernels: usize,
        strides: usize,
    },
    #[error("kernel_sizes[{index}] = {size} must be odd")]
    EvenKernel { index: usize, size: usize },
    #[error("strides[{index}] must be >= 1")]
    ZeroStride { index: usize },
    #[error("deep_supervision {requested} exceeds available decoder stages ({max})")]
    DeepSupervision { requested: usize, max: usize },
    #[error("{channels} channels are not divisible by norm_groups {groups}")]
    GroupDivisibility { channels: usize, groups: usize },
    #[error("{0} must be >= 1")]
    ZeroChannels(&'static str),
    #[error("input {height}x{width} is not divisible by the encoder downsampling factor {factor}")]
    InputSize {
        height: usize,
        width: usize,
        factor: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VaeConfig {
    pub in_channels: usize,
    pub out_channels: usize,
    pub emb_channels: usize,
    pub hid_chs: Vec<usize>,
    pub kernel_sizes: Vec<usize>,
    pub strides: Vec<usize>,
    /// Number of decoder stages that get an extra reconstruction head.
    pub deep_supervision: usize,
    pub norm_groups: usize,
    pub loss: ReconstructionLoss,
    /// Weight of the KL term in the total loss.
    pub embedding_loss_weight: f64,
}

impl Default for VaeConfig {
    fn default() -> Self {
        Self {
            in_channels: 1,
            out_channels: 1,
            emb_channels: 4,
            hid_chs: vec![64, 128, 256, 512],
            kernel_sizes: vec![3, 3, 3, 3],
            strides: vec![1, 2, 2, 2],
            deep_supervision: 1,
            norm_groups: 8,
            loss: ReconstructionLoss::Mse,
            embedding_loss_weight: 1e-6,
        }
    }
}

impl VaeConfig {
    pub fn depth(&self) -> usize {
        self.hid_chs.len()
    }

    pub fn validate(&self) -> Result<(), ModelConfigError> {
        if self.in_channels == 0 {
            return Err(ModelConfigError::ZeroChannels("in_channels"));
        }
        if self.out_channels == 0 {
            return Err(ModelConfigError::ZeroChannels("out_channels"));
        }
        if self.emb_channels == 0 {
            return Err(ModelConfigError::ZeroChannels("emb_channels"));
        }
        if self.norm_groups == 0 {
            return Err(ModelConfigError::ZeroChannels("norm_groups"));
        }
        if self.hid_chs.is_empty() {
            return Err(ModelConfigError::Empty);
        }
        if self.hid_chs.len() != self.kernel_sizes.len() || self.hid_chs.len() != self.strides.len()
        {
            return Err(ModelConfigError::LengthMismatch {
                hid: self.hid_chs.len(),
                kernels: self.kernel_sizes.len(),
                strides: self.strides.len(),
            });
        }
        if let Some(index) = self.strides.iter().position(|s| *s == 0) {
            return Err(ModelConfigError::ZeroStride { index });
        }
        if let Some((index, size)) = self
            .kernel_sizes
            .iter()
            .enumerate()
            .find(|(_, k)| *k % 2 == 0)
        {
            return Err(ModelConfigError::EvenKernel { index, size: *size });
        }
        let max = self.depth() - 1;
        if self.deep_supervision > max {
            return Err(ModelConfigError::DeepSupervision {
                requested: self.deep_supervision,
                max,
            });
        }
        let normalized = self
            .hid_chs
            .iter()
            .copied()
            .chain(std::iter::once(2 * self.emb_channels));
        for channels in normalized {
            if channels == 0 {
                return Err(ModelConfigError::ZeroChannels("hid_chs"));
            }
            if channels % self.norm_groups != 0 {
                return Err(ModelConfigError::GroupDivisibility {
                    channels,
                    groups: self.norm_groups,
                });
            }
        }
        Ok(())
    }

    /// Spatial downsampling factor of the encoder along each axis.
    pub fn downsample_factor(&self) -> usize {
        self.strides.iter().product()
    }

    /// The decoder only restores the input size when both sides divide
    /// [`Self::downsample_factor`].
    pub fn check_input_size(&self, height: usize, width: usize) -> Result<(), ModelConfigError> {
        let factor = self.downsample_factor();
        if height % factor != 0 || width % factor != 0 {
            return Err(ModelConfigError::InputSize {
                height,
                width,
                factor,
            });
        }
        Ok(())
    }

    /// Latent shape `[emb_channels, h, w]` for an input of `height x width`.
    pub fn latent_shape(&self, height: usize, width: usize) -> [usize; 3] {
        let (h, w) = self
            .strides
            .iter()
            .fold((height, width), |(h, w), s| (h.div_ceil(*s), w.div_ceil(*s)));
        [self.emb_channels, h, w]
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<Vae<B>, ModelConfigError> {
        self.validate()?;
        Ok(Vae::new(self, device))
    }
}

/// Output of a full encode / sample / decode pass.
#[derive(Debug, Clone)]
pub struct VaeOutput<B: Backend> {
    /// Full-resolution reconstruction `[N, out, H, W]`.
    pub pred: Tensor<B, 4>,
    /// Deep-supervision heads, highest resolution first.
    pub pred_vertical: Vec<Tensor<B, 4>>,
    /// KL divergence of the posterior to N(0, I), averaged over the batch.
    pub emb_loss: Tensor<B, 1>,
}

#[derive(Debug, Module)]
pub struct Vae<B: Backend> {
    inc: BasicBlock<B>,
    down: Vec<BasicBlock<B>>,
    quant_in: ConvBlock<B>,
    quant_proj: ConvBlock<B>,
    inc_dec: ConvBlock<B>,
    up: Vec<UpBlock<B>>,
    outc_ver: Vec<Conv2d<B>>,
    outc: Conv2d<B>,
    emb_channels: usize,
}

impl<B: Backend> Vae<B> {
    /// Build the network. `cfg` is expected to be valid; see [`VaeConfig::init`].
    pub fn new(cfg: &VaeConfig, device: &B::Device) -> Self {
        let hid = &cfg.hid_chs;
        let ks = &cfg.kernel_sizes;
        let ss = &cfg.strides;
        let groups = cfg.norm_groups;
        let depth = hid.len();
        let moments = 2 * cfg.emb_channels;

        let inc = BasicBlock::new(cfg.in_channels, hid[0], ks[0], ss[0], groups, device);
        let down = (1..depth)
            .map(|i| BasicBlock::new(hid[i - 1], hid[i], ks[i], ss[i], groups, device))
            .collect();
        let quant_in = ConvBlock::new(hid[depth - 1], moments, 3, 1, groups, device);
        let quant_proj = ConvBlock::new(moments, moments, 1, 1, groups, device);

        let inc_dec = ConvBlock::new(cfg.emb_channels, hid[depth - 1], 3, 1, groups, device);
        let up = (0..depth - 1)
            .map(|i| UpBlock::new(hid[i + 1], hid[i], ks[i + 1], ss[i + 1], groups, device))
            .collect();
        let outc_ver = (1..=cfg.deep_supervision)
            .map(|i| projection(hid[i], cfg.out_channels, device))
            .collect();
        let outc = projection(hid[0], cfg.out_channels, device);

        Self {
            inc,
            down,
            quant_in,
            quant_proj,
            inc_dec,
            up,
            outc_ver,
            outc,
            emb_channels: cfg.emb_channels,
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> VaeOutput<B> {
        let moments = self.encode_moments(input);
        let (z, emb_loss) = sample_diagonal_gaussian(moments);
        let (pred, pred_vertical) = self.decode_with_side_outputs(z);
        VaeOutput {
            pred,
            pred_vertical,
            emb_loss,
        }
    }

    /// Concatenated `[mean, logvar]` moments, shape `[N, 2 * emb, h, w]`.
    pub fn encode_moments(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut h = self.inc.forward(input);
        for block in &self.down {
            h = block.forward(h);
        }
        self.quant_proj.forward(self.quant_in.forward(h))
    }

    /// Sampled latent.
    pub fn encode(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        sample_diagonal_gaussian(self.encode_moments(input)).0
    }

    /// Posterior mean; deterministic embedding for downstream diffusion.
    pub fn encode_mean(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.encode_moments(input).narrow(1, 0, self.emb_channels)
    }

    pub fn decode(&self, z: Tensor<B, 4>) -> Tensor<B, 4> {
        self.decode_with_side_outputs(z).0
    }

    pub fn decode_with_side_outputs(&self, z: Tensor<B, 4>) -> (Tensor<B, 4>, Vec<Tensor<B, 4>>) {
        let mut h = self.inc_dec.forward(z);
        let mut side = Vec::with_capacity(self.outc_ver.len());
        for i in (1..=self.up.len()).rev() {
            if let Some(head) = self.outc_ver.get(i - 1) {
                side.push(head.forward(h.clone()));
            }
            h = self.up[i - 1].forward(h);
        }
        side.reverse();
        (self.outc.forward(h), side)
    }
}

/// Reparameterised sample from `N(mean, exp(logvar))` plus the batch-averaged KL term.
pub fn sample_diagonal_gaussian<B: Backend>(moments: Tensor<B, 4>) -> (Tensor<B, 4>, Tensor<B, 1>) {
    let [batch, channels, _, _] = moments.dims();
    let emb = channels / 2;
    let mean = moments.clone().narrow(1, 0, emb);
    let logvar = moments.narrow(1, emb, emb).clamp(LOGVAR_MIN, LOGVAR_MAX);

    let std = logvar.clone().mul_scalar(0.5).exp();
    let eps = Tensor::random(mean.shape(), Distribution::Normal(0.0, 1.0), &mean.device());
    let z = mean.clone() + std * eps;

    let var = logvar.clone().exp();
    let kl = (mean.powf_scalar(2.0) + var - logvar)
        .sub_scalar(1.0)
        .sum()
        .mul_scalar(0.5)
        .div_scalar(batch.max(1) as f32);
    (z, kl)
}

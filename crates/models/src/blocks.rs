//! Convolutional building blocks shared by the encoder and decoder.

use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig};
use burn::nn::{GroupNorm, GroupNormConfig, PaddingConfig2d};
use burn::tensor::activation::silu;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// conv(k, stride) -> GroupNorm -> SiLU.
#[derive(Debug, Module)]
pub struct ConvBlock<B: Backend> {
    conv: Conv2d<B>,
    norm: GroupNorm<B>,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        norm_groups: usize,
        device: &B::Device,
    ) -> Self {
        let pad = kernel_size / 2;
        let conv = Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(pad, pad))
            .init(device);
        let norm = GroupNormConfig::new(norm_groups, out_channels).init(device);
        Self { conv, norm }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        silu(self.norm.forward(self.conv.forward(input)))
    }
}

/// Two stacked [`ConvBlock`]s; only the first one is strided.
#[derive(Debug, Module)]
pub struct BasicBlock<B: Backend> {
    first: ConvBlock<B>,
    second: ConvBlock<B>,
}

impl<B: Backend> BasicBlock<B> {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        norm_groups: usize,
        device: &B::Device,
    ) -> Self {
        Self {
            first: ConvBlock::new(
                in_channels,
                out_channels,
                kernel_size,
                stride,
                norm_groups,
                device,
            ),
            second: ConvBlock::new(out_channels, out_channels, kernel_size, 1, norm_groups, device),
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.second.forward(self.first.forward(input))
    }
}

/// Transposed-conv upsampling followed by a [`BasicBlock`] at the new resolution.
///
/// The transposed conv uses `kernel == stride` with no padding, so the spatial
/// size is multiplied by exactly `stride`.
#[derive(Debug, Module)]
pub struct UpBlock<B: Backend> {
    up: ConvTranspose2d<B>,
    block: BasicBlock<B>,
}

impl<B: Backend> UpBlock<B> {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        norm_groups: usize,
        device: &B::Device,
    ) -> Self {
        let stride = stride.max(1);
        let up = ConvTranspose2dConfig::new([in_channels, out_channels], [stride, stride])
            .with_stride([stride, stride])
            .init(device);
        let block = BasicBlock::new(out_channels, out_channels, kernel_size, 1, norm_groups, device);
        Self { up, block }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.block.forward(self.up.forward(input))
    }
}

/// Plain 1x1 projection used for the output heads (no norm, no activation).
pub fn projection<B: Backend>(in_channels: usize, out_channels: usize, device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new([in_channels, out_channels], [1, 1]).init(device)
}

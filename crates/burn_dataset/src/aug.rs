//! Flip augmentation for CHW slices.

use rand::Rng;

use crate::types::ImageSample;

pub const FLIP_PROB: f64 = 0.5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlipAugment {
    pub horizontal: bool,
    pub vertical: bool,
}

impl FlipAugment {
    /// Each enabled axis is flipped independently with probability [`FLIP_PROB`].
    pub fn apply<R: Rng>(&self, sample: &mut ImageSample, rng: &mut R) {
        let [c, h, w] = sample.shape();
        if self.horizontal && rng.random_bool(FLIP_PROB) {
            flip_horizontal(&mut sample.pixels, c, h, w);
        }
        if self.vertical && rng.random_bool(FLIP_PROB) {
            flip_vertical(&mut sample.pixels, c, h, w);
        }
    }

    pub fn describe(&self) -> String {
        format!("hflip={} vflip={}", self.horizontal, self.vertical)
    }
}

/// Mirror every row (left <-> right).
pub fn flip_horizontal(pixels: &mut [f32], channels: usize, height: usize, width: usize) {
    debug_assert_eq!(pixels.len(), channels * height * width);
    for row in pixels.chunks_exact_mut(width) {
        row.reverse();
    }
}

/// Swap rows top <-> bottom within each channel.
pub fn flip_vertical(pixels: &mut [f32], channels: usize, height: usize, width: usize) {
    debug_assert_eq!(pixels.len(), channels * height * width);
    for plane in pixels.chunks_exact_mut(height * width) {
        for y in 0..height / 2 {
            let (top, bottom) = plane.split_at_mut((height - 1 - y) * width);
            top[y * width..(y + 1) * width].swap_with_slice(&mut bottom[..width]);
        }
    }
}

//! Side-by-side input | reconstruction previews.

use std::path::Path;

use anyhow::Context;
use image::{GrayImage, Luma};

/// Map `[-1, 1]` to `0..=255`, clamping out-of-range values.
pub fn to_u8(value: f32) -> u8 {
    (((value.clamp(-1.0, 1.0) + 1.0) * 0.5) * 255.0).round() as u8
}

/// Write a `height x (2 * width)` grayscale PNG with `input` on the left.
///
/// Both buffers hold one channel in row-major order.
pub fn save_reconstruction_png(
    input: &[f32],
    reconstruction: &[f32],
    height: usize,
    width: usize,
    path: &Path,
) -> anyhow::Result<()> {
    let expected = height * width;
    anyhow::ensure!(
        input.len() >= expected && reconstruction.len() >= expected,
        "sample buffers smaller than {height}x{width}"
    );
    let img = GrayImage::from_fn((2 * width) as u32, height as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let v = if x < width {
            input[y * width + x]
        } else {
            reconstruction[y * width + (x - width)]
        };
        Luma([to_u8(v)])
    });
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    img.save(path)
        .with_context(|| format!("failed to save sample {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::to_u8;

    #[test]
    fn unit_range_maps_to_full_gray_scale() {
        assert_eq!(to_u8(-1.0), 0);
        assert_eq!(to_u8(1.0), 255);
        assert_eq!(to_u8(5.0), 255);
        assert_eq!(to_u8(0.0), 128);
    }
}

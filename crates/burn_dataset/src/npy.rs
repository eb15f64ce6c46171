//! `.npy` slice decoding.

use crate::types::{DatasetError, DatasetResult, ImageSample, Normalization};
use ndarray::ArrayD;
use ndarray_npy::{read_npy, ReadNpyError};
use std::path::Path;

/// Decode any supported element type into `(shape, f32 values)` in logical order.
fn read_as_f32(path: &Path) -> DatasetResult<(Vec<usize>, Vec<f32>)> {
    macro_rules! try_dtype {
        ($t:ty) => {
            match read_npy::<_, ArrayD<$t>>(path) {
                Ok(arr) => {
                    let shape = arr.shape().to_vec();
                    return Ok((shape, arr.iter().map(|v| *v as f32).collect()));
                }
                Err(ReadNpyError::WrongDescriptor(_)) => {}
                Err(source) => {
                    return Err(DatasetError::Npy {
                        path: path.to_path_buf(),
                        source,
                    })
                }
            }
        };
    }
    try_dtype!(f32);
    try_dtype!(f64);
    try_dtype!(i16);
    try_dtype!(u16);
    try_dtype!(i32);
    try_dtype!(u8);
    Err(DatasetError::UnsupportedDType {
        path: path.to_path_buf(),
    })
}

/// Load a single-channel slice and apply `normalization`.
pub fn load_slice(path: &Path, normalization: Normalization) -> DatasetResult<ImageSample> {
    let (shape, mut pixels) = read_as_f32(path)?;
    let (height, width) = match shape.as_slice() {
        [h, w] | [1, h, w] | [h, w, 1] => (*h, *w),
        _ => {
            return Err(DatasetError::Shape {
                path: path.to_path_buf(),
                shape,
            })
        }
    };
    if height == 0 || width == 0 {
        return Err(DatasetError::Shape {
            path: path.to_path_buf(),
            shape,
        });
    }
    if pixels.iter().any(|v| !v.is_finite()) {
        return Err(DatasetError::NonFinite {
            path: path.to_path_buf(),
        });
    }
    if normalization == Normalization::MinMax {
        min_max_to_unit_range(&mut pixels);
    }
    Ok(ImageSample {
        path: path.to_path_buf(),
        channels: 1,
        height,
        width,
        pixels,
    })
}

/// Map `[min, max]` to `[-1, 1]` in place. Constant input becomes zeros.
pub fn min_max_to_unit_range(values: &mut [f32]) {
    let (min, max) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(*v), hi.max(*v))
        });
    let span = max - min;
    if !span.is_finite() || span <= f32::EPSILON {
        values.iter_mut().for_each(|v| *v = 0.0);
        return;
    }
    for v in values.iter_mut() {
        *v = ((*v - min) / span) * 2.0 - 1.0;
    }
}

#[cfg(test)]
mod tests {
    use super::min_max_to_unit_range;

    #[test]
    fn maps_extremes_to_unit_range() {
        let mut v = vec![-1000.0, 0.0, 1000.0];
        min_max_to_unit_range(&mut v);
        assert_eq!(v, vec![-1.0, 0.0, 1.0]);
    }

    #[test]
    fn constant_slice_becomes_zeros() {
        let mut v = vec![7.0; 4];
        min_max_to_unit_range(&mut v);
        assert!(v.iter().all(|x| *x == 0.0));
    }
}

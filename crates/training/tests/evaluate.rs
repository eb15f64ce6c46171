use std::fs;
use std::path::Path;

use burn::tensor::backend::Backend;
use burn_dataset::FlipAugment;
use ndarray::Array2;
use ndarray_npy::write_npy;
use training::evaluate::{eval_datamodule, evaluate};
use training::{TrainBackend, TrainConfig, VaeConfig};

fn write_slices(dir: &Path, count: usize, side: usize) {
    fs::create_dir_all(dir).unwrap();
    for i in 0..count {
        let slice = Array2::from_shape_fn((side, side), |(y, x)| ((x + 2 * y + i) % 13) as f32);
        write_npy(dir.join(format!("slice_{i:03}.npy")), &slice).unwrap();
    }
}

fn eval_config(root: &Path) -> TrainConfig {
    let mut cfg = TrainConfig::default();
    cfg.data.root = root.to_path_buf();
    cfg.data.flip_horizontal = true;
    cfg.data.flip_vertical = true;
    cfg.model = VaeConfig {
        emb_channels: 2,
        hid_chs: vec![4, 8],
        kernel_sizes: vec![3, 3],
        strides: vec![1, 2],
        deep_supervision: 1,
        norm_groups: 4,
        ..Default::default()
    };
    cfg
}

#[test]
fn eval_loader_is_ordered_unaugmented_and_keeps_the_tail() {
    let tmp = tempfile::tempdir().unwrap();
    write_slices(tmp.path(), 5, 16);
    let cfg = eval_config(tmp.path());

    let dm = eval_datamodule(&cfg, 2).unwrap();
    assert_eq!(dm.dataset().augment(), FlipAugment::default());
    assert_eq!(dm.batches_per_epoch(), 3);
    assert_eq!(dm.epoch_order(0), vec![0, 1, 2, 3, 4]);
}

#[test]
fn evaluate_honours_the_batch_limit_and_is_deterministic() {
    let tmp = tempfile::tempdir().unwrap();
    write_slices(tmp.path(), 5, 16);
    let cfg = eval_config(tmp.path());
    let dm = eval_datamodule(&cfg, 2).unwrap();

    let device = <TrainBackend as Backend>::Device::default();
    let model = cfg.model.init::<TrainBackend>(&device).unwrap();

    let limited = evaluate(&model, &cfg.model, &dm, Some(1), &device).unwrap();
    assert_eq!(limited.batches, 1);

    let first = evaluate(&model, &cfg.model, &dm, None, &device).unwrap();
    let second = evaluate(&model, &cfg.model, &dm, None, &device).unwrap();
    assert_eq!(first.batches, 3);
    for name in ["eval/L1", "eval/L2", "eval/ssim"] {
        let a = first.metrics.get(name).unwrap();
        let b = second.metrics.get(name).unwrap();
        assert!(a.is_finite());
        assert!((a - b).abs() < 1e-6, "{name}: {a} vs {b}");
    }
}

#[test]
fn evaluate_rejects_sizes_the_decoder_cannot_restore() {
    let tmp = tempfile::tempdir().unwrap();
    write_slices(tmp.path(), 2, 15);
    let cfg = eval_config(tmp.path());
    let dm = eval_datamodule(&cfg, 2).unwrap();

    let device = <TrainBackend as Backend>::Device::default();
    let model = cfg.model.init::<TrainBackend>(&device).unwrap();
    assert!(evaluate(&model, &cfg.model, &dm, None, &device).is_err());
}

use burn_dataset::{
    crawl, load_slice, DataModule, DataModuleConfig, DatasetError, MayoDataset,
    MayoDatasetConfig, Normalization,
};
use burn_ndarray::NdArray;
use ndarray::{Array2, Array3};
use ndarray_npy::write_npy;
use std::fs;
use std::path::Path;

type B = NdArray<f32>;

fn write_slice(path: &Path, h: usize, w: usize, offset: f32) {
    let arr = Array2::from_shape_fn((h, w), |(y, x)| offset + (y * w + x) as f32);
    write_npy(path, &arr).expect("write npy");
}

fn dataset_cfg(root: &Path) -> MayoDatasetConfig {
    MayoDatasetConfig {
        root: root.to_path_buf(),
        ..Default::default()
    }
}

#[test]
fn crawl_is_recursive_sorted_and_filters_extension() {
    let tmp = tempfile::tempdir().unwrap();
    let nested = tmp.path().join("patient_b");
    fs::create_dir_all(&nested).unwrap();
    write_slice(&nested.join("slice_001.npy"), 2, 2, 0.0);
    write_slice(&tmp.path().join("a.NPY"), 2, 2, 0.0);
    fs::write(tmp.path().join("notes.txt"), "ignore me").unwrap();

    let found = crawl(tmp.path(), "npy").unwrap();
    assert_eq!(found.len(), 2);
    assert!(found[0] < found[1]);
    assert!(found.iter().all(|p| p.extension().unwrap().eq_ignore_ascii_case("npy")));
}

#[cfg(unix)]
#[test]
fn crawl_does_not_follow_directory_symlinks() {
    let tmp = tempfile::tempdir().unwrap();
    write_slice(&tmp.path().join("x.npy"), 2, 2, 0.0);
    fs::create_dir_all(tmp.path().join("a")).unwrap();
    std::os::unix::fs::symlink(tmp.path(), tmp.path().join("a").join("loop")).unwrap();

    let found = crawl(tmp.path(), "npy").unwrap();
    assert_eq!(found, vec![tmp.path().join("x.npy")]);
}

#[test]
fn missing_root_is_an_io_error() {
    let tmp = tempfile::tempdir().unwrap();
    let err = crawl(&tmp.path().join("absent"), "npy").unwrap_err();
    assert!(matches!(err, DatasetError::Io { .. }));
}

#[test]
fn empty_root_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let err = MayoDataset::open(dataset_cfg(tmp.path())).unwrap_err();
    assert!(matches!(err, DatasetError::Empty { .. }));
}

#[test]
fn slices_are_normalised_to_unit_range() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("s.npy");
    write_slice(&path, 4, 4, -1024.0);

    let sample = load_slice(&path, Normalization::MinMax).unwrap();
    assert_eq!(sample.shape(), [1, 4, 4]);
    let min = sample.pixels.iter().copied().fold(f32::INFINITY, f32::min);
    let max = sample.pixels.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    assert!((min + 1.0).abs() < 1e-6);
    assert!((max - 1.0).abs() < 1e-6);

    let raw = load_slice(&path, Normalization::None).unwrap();
    assert_eq!(raw.pixels[0], -1024.0);
}

#[test]
fn integer_and_channel_first_arrays_are_accepted() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("hu.npy");
    let arr = Array3::<i16>::from_shape_fn((1, 3, 5), |(_, y, x)| (y * 5 + x) as i16 - 7);
    write_npy(&path, &arr).unwrap();

    let sample = load_slice(&path, Normalization::None).unwrap();
    assert_eq!(sample.shape(), [1, 3, 5]);
    assert_eq!(sample.pixels[0], -7.0);
}

#[test]
fn multi_channel_arrays_are_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("rgb.npy");
    let arr = Array3::<f32>::zeros((3, 4, 4));
    write_npy(&path, &arr).unwrap();
    assert!(matches!(
        load_slice(&path, Normalization::MinMax),
        Err(DatasetError::Shape { .. })
    ));
}

#[test]
fn drop_last_skips_partial_batch() {
    let tmp = tempfile::tempdir().unwrap();
    for i in 0..5 {
        write_slice(&tmp.path().join(format!("s{i}.npy")), 8, 8, i as f32);
    }
    let ds = MayoDataset::open(dataset_cfg(tmp.path())).unwrap();
    let dm = DataModule::new(
        ds,
        DataModuleConfig {
            batch_size: 2,
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(dm.batches_per_epoch(), 2);

    let device = Default::default();
    let mut iter = dm.train_iter(0);
    let mut batches = 0;
    while let Some(batch) = iter.next_batch::<B>(&device).unwrap() {
        assert_eq!(batch.images.dims(), [2, 1, 8, 8]);
        assert_eq!(batch.paths.len(), 2);
        batches += 1;
    }
    assert_eq!(batches, 2);
}

#[test]
fn keep_last_yields_partial_batch() {
    let tmp = tempfile::tempdir().unwrap();
    for i in 0..3 {
        write_slice(&tmp.path().join(format!("s{i}.npy")), 4, 4, i as f32);
    }
    let ds = MayoDataset::open(dataset_cfg(tmp.path())).unwrap();
    let dm = DataModule::new(
        ds,
        DataModuleConfig {
            batch_size: 2,
            drop_last: false,
            shuffle: false,
            num_workers: Some(2),
            ..Default::default()
        },
    )
    .unwrap();
    let device = Default::default();
    let mut iter = dm.train_iter(0);
    let first = iter.next_batch::<B>(&device).unwrap().unwrap();
    let second = iter.next_batch::<B>(&device).unwrap().unwrap();
    assert_eq!(first.images.dims()[0], 2);
    assert_eq!(second.images.dims()[0], 1);
    assert!(iter.next_batch::<B>(&device).unwrap().is_none());
}

#[test]
fn shuffle_is_reproducible_per_seed_and_epoch() {
    let tmp = tempfile::tempdir().unwrap();
    for i in 0..16 {
        write_slice(&tmp.path().join(format!("s{i:02}.npy")), 2, 2, 0.0);
    }
    let build = |seed| {
        let ds = MayoDataset::open(dataset_cfg(tmp.path())).unwrap();
        DataModule::new(
            ds,
            DataModuleConfig {
                seed,
                ..Default::default()
            },
        )
        .unwrap()
    };
    let a = build(7);
    let b = build(7);
    assert_eq!(a.epoch_order(3), b.epoch_order(3));
    assert_ne!(a.epoch_order(0), a.epoch_order(1));

    let mut sorted = a.epoch_order(0);
    sorted.sort();
    assert_eq!(sorted, (0..16).collect::<Vec<_>>());
}

#[test]
fn mismatched_shapes_fail_the_batch() {
    let tmp = tempfile::tempdir().unwrap();
    write_slice(&tmp.path().join("a.npy"), 4, 4, 0.0);
    write_slice(&tmp.path().join("b.npy"), 8, 8, 0.0);
    let ds = MayoDataset::open(dataset_cfg(tmp.path())).unwrap();
    let dm = DataModule::new(
        ds,
        DataModuleConfig {
            batch_size: 2,
            shuffle: false,
            ..Default::default()
        },
    )
    .unwrap();
    let device = Default::default();
    let err = dm.train_iter(0).next_batch::<B>(&device).unwrap_err();
    match err {
        DatasetError::Mismatch {
            path,
            expected,
            actual,
        } => {
            assert!(path.ends_with("b.npy"));
            assert_eq!(expected, [1, 4, 4]);
            assert_eq!(actual, [1, 8, 8]);
        }
        other => panic!("unexpected error {other}"),
    }
}

use std::fs;
use std::path::Path;

use training::callbacks::{optimizer_state_path, CheckpointConfig, ModelCheckpoint, MonitorMode};
use training::metrics::StepMetrics;

fn metrics(l1: f64) -> StepMetrics {
    [("train/L1", l1), ("train/loss", l1 * 2.0)]
        .into_iter()
        .collect()
}

fn touch(path: &Path) -> anyhow::Result<()> {
    fs::write(path, b"ckpt")?;
    Ok(())
}

fn touch_with_optimizer(path: &Path) -> anyhow::Result<()> {
    touch(path)?;
    touch(&optimizer_state_path(path))
}

fn policy(dir: &Path, top_k: i64, mode: MonitorMode) -> ModelCheckpoint {
    ModelCheckpoint::new(
        CheckpointConfig {
            every_n_train_steps: 1,
            save_top_k: top_k,
            mode,
            ..Default::default()
        },
        dir,
    )
}

#[test]
fn keeps_only_the_k_best_and_deletes_evicted_files() {
    let tmp = tempfile::tempdir().unwrap();
    let mut ckpt = policy(tmp.path(), 2, MonitorMode::Min);

    for (step, l1) in [(1, 0.5), (2, 0.4), (3, 0.6), (4, 0.1)] {
        ckpt.on_train_step(0, step, &metrics(l1), touch).unwrap();
    }

    let mut scores: Vec<f64> = ckpt.kept().iter().map(|c| c.score).collect();
    scores.sort_by(|a, b| a.partial_cmp(b).unwrap());
    assert_eq!(scores, vec![0.1, 0.4]);

    assert!(!tmp.path().join("epoch=0-step=1.bin").exists());
    assert!(!tmp.path().join("epoch=0-step=3.bin").exists());
    assert!(tmp.path().join("epoch=0-step=2.bin").exists());
    assert!(tmp.path().join("epoch=0-step=4.bin").exists());
    assert!(tmp.path().join("last.bin").exists());

    assert_eq!(
        ckpt.best_model_path(),
        Some(tmp.path().join("epoch=0-step=4.bin").as_path())
    );
    assert_eq!(ckpt.best_model_score(), Some(0.1));
}

#[test]
fn optimizer_state_is_evicted_with_its_checkpoint() {
    let tmp = tempfile::tempdir().unwrap();
    let mut ckpt = policy(tmp.path(), 1, MonitorMode::Min);
    ckpt.on_train_step(0, 1, &metrics(0.5), touch_with_optimizer).unwrap();
    ckpt.on_train_step(0, 2, &metrics(0.2), touch_with_optimizer).unwrap();

    assert_eq!(
        optimizer_state_path(&tmp.path().join("epoch=0-step=2.bin")),
        tmp.path().join("epoch=0-step=2.optim.bin")
    );
    assert!(!tmp.path().join("epoch=0-step=1.bin").exists());
    assert!(!tmp.path().join("epoch=0-step=1.optim.bin").exists());
    assert!(tmp.path().join("epoch=0-step=2.optim.bin").exists());
    assert!(tmp.path().join("last.optim.bin").exists());
}

#[test]
fn max_mode_prefers_larger_scores() {
    let tmp = tempfile::tempdir().unwrap();
    let mut ckpt = policy(tmp.path(), 1, MonitorMode::Max);
    ckpt.on_train_step(0, 1, &metrics(0.2), touch).unwrap();
    ckpt.on_train_step(0, 2, &metrics(0.1), touch).unwrap();
    ckpt.on_train_step(1, 3, &metrics(0.9), touch).unwrap();
    assert_eq!(ckpt.kept().len(), 1);
    assert_eq!(ckpt.best_model_score(), Some(0.9));
    assert!(tmp.path().join("epoch=1-step=3.bin").exists());
    assert!(!tmp.path().join("epoch=0-step=1.bin").exists());
}

#[test]
fn only_checks_on_the_configured_interval() {
    let tmp = tempfile::tempdir().unwrap();
    let mut ckpt = ModelCheckpoint::new(
        CheckpointConfig {
            every_n_train_steps: 50,
            ..Default::default()
        },
        tmp.path(),
    );
    let mut saves = 0;
    for step in 1..=120 {
        ckpt.on_train_step(0, step, &metrics(1.0 / step as f64), |p| {
            saves += 1;
            touch(p)
        })
        .unwrap();
    }
    // steps 50 and 100: one top-k file plus last.bin each time
    assert_eq!(saves, 4);
    assert_eq!(ckpt.kept().len(), 2);
}

#[test]
fn missing_or_nan_metric_skips_top_k_but_refreshes_last() {
    let tmp = tempfile::tempdir().unwrap();
    let mut ckpt = policy(tmp.path(), 3, MonitorMode::Min);
    let saved = ckpt
        .on_train_step(0, 1, &metrics(f64::NAN), touch)
        .unwrap();
    assert!(saved.is_none());
    let saved = ckpt
        .on_train_step(0, 2, &StepMetrics::new(), touch)
        .unwrap();
    assert!(saved.is_none());
    assert!(ckpt.kept().is_empty());
    assert_eq!(ckpt.last_model_path(), Some(tmp.path().join("last.bin").as_path()));
}

#[test]
fn top_k_zero_keeps_nothing_and_negative_keeps_all() {
    let tmp = tempfile::tempdir().unwrap();
    let mut none = policy(tmp.path(), 0, MonitorMode::Min);
    none.on_train_step(0, 1, &metrics(0.3), touch).unwrap();
    assert!(none.kept().is_empty());

    let mut all = policy(tmp.path(), -1, MonitorMode::Min);
    for step in 1..=6 {
        all.on_train_step(0, step, &metrics(step as f64), touch).unwrap();
    }
    assert_eq!(all.kept().len(), 6);
}

#[test]
fn best_record_names_the_best_file() {
    let tmp = tempfile::tempdir().unwrap();
    let mut ckpt = policy(tmp.path(), 2, MonitorMode::Min);
    ckpt.on_train_step(3, 7, &metrics(0.25), touch).unwrap();

    let log_dir = tmp.path().join("logs").join("version_0");
    let path = ckpt.save_best_record(&log_dir).unwrap();
    let raw = fs::read_to_string(path).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["best_model_epoch"], "epoch=3-step=7.bin");
    assert_eq!(json["best_model_score"], 0.25);
}

#[test]
fn best_record_falls_back_to_last_and_errors_without_any_checkpoint() {
    let tmp = tempfile::tempdir().unwrap();
    let mut ckpt = policy(tmp.path(), 0, MonitorMode::Min);
    assert!(ckpt.save_best_record(tmp.path()).is_err());

    ckpt.on_fit_end(touch).unwrap();
    let record = ckpt.best_record().unwrap();
    assert_eq!(record.best_model_epoch, "last.bin");
    assert_eq!(record.best_model_score, None);
}

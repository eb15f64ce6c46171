use training::callbacks::{EarlyStopping, EarlyStoppingConfig, MonitorMode};
use training::metrics::StepMetrics;

fn epoch(l1: f64) -> StepMetrics {
    [("train/L1", l1)].into_iter().collect()
}

fn stopper(patience: usize, min_delta: f64) -> EarlyStopping {
    EarlyStopping::new(EarlyStoppingConfig {
        enabled: true,
        patience,
        min_delta,
        ..Default::default()
    })
}

#[test]
fn stops_after_patience_checks_without_improvement() {
    let mut es = stopper(3, 0.0);
    assert!(!es.on_epoch_end(0, &epoch(1.0)));
    assert!(!es.on_epoch_end(1, &epoch(1.0)));
    assert!(!es.on_epoch_end(2, &epoch(1.5)));
    assert!(es.on_epoch_end(3, &epoch(1.0)));
    assert_eq!(es.stopped_epoch(), Some(3));
    assert_eq!(es.best(), 1.0);
}

#[test]
fn improvement_resets_the_wait_counter() {
    let mut es = stopper(2, 0.0);
    es.on_epoch_end(0, &epoch(1.0));
    es.on_epoch_end(1, &epoch(1.1));
    assert_eq!(es.wait_count(), 1);
    assert!(!es.on_epoch_end(2, &epoch(0.5)));
    assert_eq!(es.wait_count(), 0);
}

#[test]
fn min_delta_requires_a_margin() {
    let mut es = stopper(1, 0.1);
    es.on_epoch_end(0, &epoch(1.0));
    assert!(es.on_epoch_end(1, &epoch(0.95)));
}

#[test]
fn max_mode_and_non_finite_values() {
    let mut es = EarlyStopping::new(EarlyStoppingConfig {
        enabled: true,
        patience: 5,
        mode: MonitorMode::Max,
        ..Default::default()
    });
    assert!(!es.on_epoch_end(0, &epoch(0.2)));
    assert!(!es.on_epoch_end(1, &epoch(0.3)));
    assert_eq!(es.best(), 0.3);
    assert!(es.on_epoch_end(2, &epoch(f64::NAN)));
}

#[test]
fn missing_metric_never_stops() {
    let mut es = stopper(1, 0.0);
    assert!(!es.on_epoch_end(0, &StepMetrics::new()));
    assert!(!es.on_epoch_end(1, &StepMetrics::new()));
}

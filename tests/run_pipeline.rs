//! End-to-end runs over synthetic clips with the stub detector.

use std::path::PathBuf;

use fishcount::config::{Defaults, RunConfig};
use fishcount::{run, ConfigError, StopSignal};

fn stub_config(source: &str, weights: &str) -> RunConfig {
    let mut cfg = RunConfig::from_defaults(&Defaults::default());
    cfg.source = PathBuf::from(source);
    cfg.weights = PathBuf::from(weights);
    cfg
}

#[test]
fn detection_run_without_logging() {
    let cfg = stub_config("stub://clip?frames=20&fps=10", "stub://school?fish=3");
    let summary = run(&cfg, &StopSignal::new()).unwrap();
    assert_eq!(summary.frames_processed, 20);
    assert!(!summary.logging_enabled);
    assert_eq!(summary.log_path, None);
    assert!(!summary.stopped_early);
}

#[test]
fn window_and_stride_limit_processed_frames() {
    let mut cfg = stub_config("stub://clip?frames=100&fps=10", "stub://school?fish=1");
    cfg.start_seconds = 1.0;
    cfg.end_seconds = Some(3.0);
    cfg.stride = 5;
    let summary = run(&cfg, &StopSignal::new()).unwrap();
    // frames 10, 15, 20, 25, 30
    assert_eq!(summary.frames_processed, 5);
}

#[test]
fn bad_window_fails_before_processing() {
    let mut cfg = stub_config("stub://clip", "stub://school");
    cfg.start_seconds = 2.0;
    cfg.end_seconds = Some(1.0);
    let err = run(&cfg, &StopSignal::new()).unwrap_err();
    assert_eq!(
        err.downcast_ref::<ConfigError>(),
        Some(&ConfigError::EndNotAfterStart { start: 2.0, end: 1.0 })
    );
}

#[test]
fn missing_weights_fail_with_not_found() {
    let cfg = stub_config("stub://clip", "/no/such/best.onnx");
    let err = run(&cfg, &StopSignal::new()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfigError>(),
        Some(ConfigError::WeightsNotFound(_))
    ));
}

#[test]
fn requested_stop_processes_nothing() {
    let cfg = stub_config("stub://clip", "stub://school");
    let stop = StopSignal::new();
    stop.request();
    let summary = run(&cfg, &stop).unwrap();
    assert_eq!(summary.frames_processed, 0);
    assert!(summary.stopped_early);
}

#[test]
fn enabled_logging_with_no_detections_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("logs");
    let mut cfg = stub_config("stub://clip?frames=5", "stub://empty");
    cfg.log_destination = Some(out.clone());
    let summary = run(&cfg, &StopSignal::new()).unwrap();
    assert!(summary.logging_enabled);
    assert_eq!(summary.log_path, None);
    assert!(!out.exists());
}

#[test]
fn display_writes_a_preview_image() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = stub_config("stub://clip?frames=3", "stub://school?fish=2");
    cfg.display = true;
    cfg.preview_dir = dir.path().join("preview");
    run(&cfg, &StopSignal::new()).unwrap();
    assert!(cfg.preview_dir.join("preview.jpg").exists());
}

#[cfg(feature = "parquet-log")]
mod logged {
    use super::*;
    use fishcount::analyze::load_and_analyze;
    use fishcount::parquet_log::read_records;

    #[test]
    fn tracking_run_logs_and_analyzes() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("run.parquet");
        let mut cfg = stub_config("stub://clip?frames=30&fps=10", "stub://school?fish=3");
        cfg.tracker = true;
        cfg.stride = 2;
        cfg.log_destination = Some(log.clone());

        let summary = run(&cfg, &StopSignal::new()).unwrap();
        assert_eq!(summary.frames_processed, 15);
        assert_eq!(summary.log_path.as_deref(), Some(log.as_path()));
        assert_eq!(summary.records_logged, 45);

        let records = read_records(&log).unwrap();
        assert_eq!(records.len(), 45);
        assert!(records.iter().all(|r| r.track_id.is_some()));
        assert!(records.windows(2).all(|w| w[0].frame <= w[1].frame));

        let report = load_and_analyze(&log, 3).unwrap().unwrap();
        assert_eq!(report.total_frames, 15);
        assert_eq!(report.complete_frames, 15);
        assert_eq!(format!("{:.2}", report.coverage_percent()), "100.00");
    }

    #[test]
    fn directory_destination_gets_a_timestamped_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("logs");
        let mut cfg = stub_config("stub://clip?frames=4", "stub://school?fish=2");
        cfg.log_destination = Some(out.clone());

        let summary = run(&cfg, &StopSignal::new()).unwrap();
        let path = summary.log_path.unwrap();
        assert_eq!(path.parent(), Some(out.as_path()));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("detections_") && name.ends_with(".parquet"));
        assert_eq!(std::fs::read_dir(&out).unwrap().count(), 1);
        assert_eq!(read_records(&path).unwrap().len(), 8);
    }
}

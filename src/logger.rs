//! Buffered detection logger.
//!
//! Records accumulate in memory for the whole run and are written to a single
//! Parquet file by [`DetectionLogger::flush`], which consumes the logger.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::detect::InferenceResult;
use crate::parquet_log::{self, LOG_EXTENSION};
use crate::records::{build_records, DetectionRecord};

/// Periodic progress notification emitted while records are added.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Progress {
    pub frame_idx: u64,
    pub total_records: usize,
}

/// Receives progress notifications from the logger.
pub trait ProgressSink {
    fn report(&mut self, progress: Progress);
}

/// Default sink: one `info` line per notification.
#[derive(Default)]
pub struct LogProgressSink;

impl ProgressSink for LogProgressSink {
    fn report(&mut self, progress: Progress) {
        log::info!(
            "processed frame {} ({} detections collected)",
            progress.frame_idx,
            progress.total_records
        );
    }
}

/// What a flush did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlushOutcome {
    /// No destination was configured.
    Disabled,
    /// Enabled, but nothing was collected; no file was written.
    Empty,
    Written { path: PathBuf, rows: usize },
}

impl FlushOutcome {
    pub fn path(&self) -> Option<&Path> {
        match self {
            FlushOutcome::Written { path, .. } => Some(path),
            _ => None,
        }
    }

    pub fn rows(&self) -> usize {
        match self {
            FlushOutcome::Written { rows, .. } => *rows,
            _ => 0,
        }
    }
}

pub struct DetectionLogger {
    path: Option<PathBuf>,
    records: Vec<DetectionRecord>,
    progress_interval: u64,
    sink: Box<dyn ProgressSink>,
}

impl DetectionLogger {
    /// A logger that writes nowhere.
    pub fn disabled() -> Self {
        Self {
            path: None,
            records: Vec::new(),
            progress_interval: 0,
            sink: Box::new(LogProgressSink),
        }
    }

    /// Build a logger for `destination`, resolved now so the file name
    /// reflects when the run started. `None` gives a disabled logger.
    pub fn new(destination: Option<&Path>, progress_interval: u64) -> Self {
        let stamp = crate::timestamp_now();
        Self::with_timestamp(destination, progress_interval, &stamp)
    }

    /// Like [`DetectionLogger::new`] with an explicit `YYYYMMDD_HHMMSS` stamp.
    pub fn with_timestamp(
        destination: Option<&Path>,
        progress_interval: u64,
        stamp: &str,
    ) -> Self {
        Self {
            path: destination.map(|dest| resolve_log_path(dest, stamp)),
            records: Vec::new(),
            progress_interval,
            sink: Box::new(LogProgressSink),
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn enabled(&self) -> bool {
        self.path.is_some()
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[DetectionRecord] {
        &self.records
    }

    /// Append the records of one frame. Returns the progress notification if
    /// one was emitted.
    pub fn add(&mut self, result: &InferenceResult, frame_idx: u64, fps: f64) -> Option<Progress> {
        if !self.enabled() {
            return None;
        }
        self.records.extend(build_records(result, frame_idx, fps));

        let interval = self.progress_interval;
        if interval > 0 && frame_idx > 0 && frame_idx % interval == 0 {
            let progress = Progress {
                frame_idx,
                total_records: self.records.len(),
            };
            self.sink.report(progress);
            return Some(progress);
        }
        None
    }

    /// Write everything collected so far. Zero records never produce a file.
    pub fn flush(self) -> Result<FlushOutcome> {
        let Some(path) = self.path else {
            return Ok(FlushOutcome::Disabled);
        };
        if self.records.is_empty() {
            log::info!("no detections collected; nothing to write");
            return Ok(FlushOutcome::Empty);
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        parquet_log::write_records(&path, &self.records)?;
        let rows = self.records.len();
        log::info!("saved {} detections to {}", rows, path.display());
        Ok(FlushOutcome::Written { path, rows })
    }
}

/// A `.parquet` path (any case) is taken verbatim; anything else is a
/// directory that gets `detections_<stamp>.parquet`.
pub fn resolve_log_path(destination: &Path, stamp: &str) -> PathBuf {
    let is_file = destination
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(LOG_EXTENSION))
        .unwrap_or(false);
    if is_file {
        destination.to_path_buf()
    } else {
        destination.join(format!("detections_{stamp}.{LOG_EXTENSION}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BBox, BoxDetection};
    use std::sync::{Arc, Mutex};

    struct Collect(Arc<Mutex<Vec<Progress>>>);

    impl ProgressSink for Collect {
        fn report(&mut self, progress: Progress) {
            self.0.lock().unwrap().push(progress);
        }
    }

    fn two_boxes() -> InferenceResult {
        InferenceResult::new(vec![
            BoxDetection::new(BBox::new(0.0, 0.0, 10.0, 10.0), 0, 0.9),
            BoxDetection::new(BBox::new(20.0, 0.0, 30.0, 10.0), 1, 0.8),
        ])
    }

    #[test]
    fn destination_resolution() {
        assert_eq!(
            resolve_log_path(Path::new("out/run.PARQUET"), "20240101_000000"),
            PathBuf::from("out/run.PARQUET")
        );
        assert_eq!(
            resolve_log_path(Path::new("out"), "20240101_000000"),
            PathBuf::from("out/detections_20240101_000000.parquet")
        );
        assert_eq!(
            resolve_log_path(Path::new("out/run.csv"), "20240101_000000"),
            PathBuf::from("out/run.csv/detections_20240101_000000.parquet")
        );
    }

    #[test]
    fn disabled_logger_ignores_everything() {
        let mut logger = DetectionLogger::disabled();
        assert!(logger.add(&two_boxes(), 10, 30.0).is_none());
        assert!(logger.is_empty());
        assert_eq!(logger.flush().unwrap(), FlushOutcome::Disabled);
    }

    #[test]
    fn empty_flush_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let logger = DetectionLogger::new(Some(&out), 0);
        assert_eq!(logger.flush().unwrap(), FlushOutcome::Empty);
        assert!(!out.exists());
    }

    #[test]
    fn progress_fires_on_positive_multiples() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut logger = DetectionLogger::with_timestamp(Some(Path::new("out")), 5, "x")
            .with_sink(Box::new(Collect(seen.clone())));
        for frame in 0..=10 {
            logger.add(&two_boxes(), frame, 30.0);
        }
        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                Progress { frame_idx: 5, total_records: 12 },
                Progress { frame_idx: 10, total_records: 22 },
            ]
        );
    }

    #[test]
    fn zero_interval_disables_progress() {
        let mut logger = DetectionLogger::with_timestamp(Some(Path::new("out")), 0, "x");
        assert!(logger.add(&two_boxes(), 100, 30.0).is_none());
        assert_eq!(logger.len(), 2);
    }

    #[cfg(feature = "parquet-log")]
    #[test]
    fn flush_into_directory_writes_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let mut logger = DetectionLogger::with_timestamp(Some(&out), 0, "20240115_093000");
        logger.add(&two_boxes(), 0, 30.0);
        logger.add(&two_boxes(), 3, 30.0);
        let expected = logger.records().to_vec();

        let outcome = logger.flush().unwrap();
        let path = out.join("detections_20240115_093000.parquet");
        assert_eq!(
            outcome,
            FlushOutcome::Written {
                path: path.clone(),
                rows: 4
            }
        );
        assert_eq!(std::fs::read_dir(&out).unwrap().count(), 1);
        assert_eq!(parquet_log::read_records(&path).unwrap(), expected);
    }

    #[cfg(not(feature = "parquet-log"))]
    #[test]
    fn flush_without_parquet_support_names_the_feature() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = DetectionLogger::new(Some(dir.path()), 0);
        logger.add(&two_boxes(), 0, 30.0);
        let err = logger.flush().unwrap_err();
        assert!(err.to_string().contains("parquet-log"));
    }
}

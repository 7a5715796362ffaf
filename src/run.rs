//! Run orchestration: validate, load, dispatch to a mode, flush once.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::bounds::compute_frame_bounds;
use crate::config::RunConfig;
use crate::detect::{load_backend, DetectorBackend};
use crate::display::{DisplaySurface, PreviewDisplay};
use crate::ingest::{effective_fps, open_source, FrameSource};
use crate::labels::Labeler;
use crate::logger::{DetectionLogger, FlushOutcome, LogProgressSink, ProgressSink};
use crate::stop::StopSignal;
use crate::track::{IouTracker, TrackStream, Tracker};

/// Frame window and sampling of a run, resolved against the source.
#[derive(Clone, Debug, PartialEq)]
pub struct RunPlan {
    pub fps: f64,
    pub start_frame: u64,
    pub end_frame: Option<u64>,
    pub stride: u64,
    pub confidence: f32,
    pub tracker: bool,
}

impl RunPlan {
    pub fn resolve(cfg: &RunConfig, fps: f64) -> Result<Self> {
        let (start_frame, end_frame) = compute_frame_bounds(fps, cfg.start_seconds, cfg.end_seconds)?;
        Ok(Self {
            fps,
            start_frame,
            end_frame,
            stride: cfg.stride.max(1),
            confidence: cfg.confidence,
            tracker: cfg.tracker,
        })
    }

    fn past_end(&self, frame_idx: u64) -> bool {
        matches!(self.end_frame, Some(end) if frame_idx > end)
    }
}

/// What a processing loop did before it returned.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ModeReport {
    pub frames_processed: u64,
    pub stopped_early: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    pub frames_processed: u64,
    pub records_logged: usize,
    /// Set only when a log file was written.
    pub log_path: Option<PathBuf>,
    pub logging_enabled: bool,
    pub stopped_early: bool,
}

/// Per-frame detection: seek to the window start, then read, detect, log and
/// show every `stride`-th frame.
pub fn run_detection_mode(
    source: &mut dyn FrameSource,
    detector: &mut dyn DetectorBackend,
    plan: &RunPlan,
    logger: &mut DetectionLogger,
    mut display: Option<&mut dyn DisplaySurface>,
    stop: &StopSignal,
) -> Result<ModeReport> {
    let mut report = ModeReport::default();
    if plan.start_frame > 0 {
        source
            .seek(plan.start_frame)
            .with_context(|| format!("failed to seek to frame {}", plan.start_frame))?;
    }

    let mut frame_idx = plan.start_frame;
    loop {
        if stop.is_requested() {
            report.stopped_early = true;
            break;
        }
        if plan.past_end(frame_idx) {
            break;
        }
        let Some(frame) = source.read()? else {
            break;
        };

        let mut result = detector.detect(&frame)?;
        result.retain_confident(plan.confidence);
        logger.add(&result, frame_idx, plan.fps);
        report.frames_processed += 1;

        if let Some(surface) = display.as_deref_mut() {
            if !surface.show(frame.image(), &result)? {
                report.stopped_early = true;
                break;
            }
        }

        frame_idx += plan.stride;
        if plan.stride > 1 {
            source
                .seek(frame_idx)
                .with_context(|| format!("failed to seek to frame {}", frame_idx))?;
        }
    }
    Ok(report)
}

/// Streaming tracking over the whole source. Frame indices are counted here;
/// results before the window start are dropped.
pub fn run_tracker_mode(
    source: &mut dyn FrameSource,
    detector: &mut dyn DetectorBackend,
    tracker: &mut dyn Tracker,
    plan: &RunPlan,
    logger: &mut DetectionLogger,
    mut display: Option<&mut dyn DisplaySurface>,
    stop: &StopSignal,
) -> Result<ModeReport> {
    let mut report = ModeReport::default();
    let mut stream = TrackStream::new(source, detector, tracker, plan.stride, plan.confidence);

    let mut counter = 0u64;
    loop {
        // Checked before pulling, so no frame is read or inferred after a stop.
        if stop.is_requested() {
            report.stopped_early = true;
            break;
        }
        let Some(item) = stream.next() else {
            break;
        };
        let tracked = item?;
        let current = counter;
        counter += plan.stride;
        if current < plan.start_frame {
            continue;
        }
        if plan.past_end(current) {
            break;
        }

        if let Some(surface) = display.as_deref_mut() {
            if !surface.show(tracked.frame.image(), &tracked.result)? {
                report.stopped_early = true;
                break;
            }
        }
        logger.add(&tracked.result, current, plan.fps);
        report.frames_processed += 1;
    }
    Ok(report)
}

/// Dispatch to the configured mode, close the display, then flush the
/// logger exactly once. A loop error is returned only after the flush.
pub fn execute(
    source: &mut dyn FrameSource,
    detector: &mut dyn DetectorBackend,
    plan: &RunPlan,
    mut logger: DetectionLogger,
    mut display: Option<&mut dyn DisplaySurface>,
    stop: &StopSignal,
) -> Result<RunSummary> {
    let outcome = if plan.tracker {
        let mut tracker = IouTracker::default();
        run_tracker_mode(
            source,
            detector,
            &mut tracker,
            plan,
            &mut logger,
            display.as_mut().map(|d| &mut **d as &mut dyn DisplaySurface),
            stop,
        )
    } else {
        run_detection_mode(
            source,
            detector,
            plan,
            &mut logger,
            display.as_mut().map(|d| &mut **d as &mut dyn DisplaySurface),
            stop,
        )
    };
    if let Some(surface) = display {
        surface.close();
    }

    let flushed = logger.flush();
    let report = match outcome {
        Ok(report) => report,
        Err(err) => {
            if let Err(flush_err) = &flushed {
                log::error!("flush after failed run also failed: {:#}", flush_err);
            }
            return Err(err);
        }
    };
    let flushed = flushed?;
    if report.stopped_early {
        log::info!("run stopped early after {} frames", report.frames_processed);
    }
    Ok(RunSummary {
        frames_processed: report.frames_processed,
        records_logged: flushed.rows(),
        logging_enabled: flushed != FlushOutcome::Disabled,
        log_path: match flushed {
            FlushOutcome::Written { path, .. } => Some(path),
            _ => None,
        },
        stopped_early: report.stopped_early,
    })
}

pub fn run(cfg: &RunConfig, stop: &StopSignal) -> Result<RunSummary> {
    run_with_progress(cfg, stop, Box::new(LogProgressSink))
}

/// Full run: validation happens before any file is opened.
pub fn run_with_progress(
    cfg: &RunConfig,
    stop: &StopSignal,
    progress: Box<dyn ProgressSink>,
) -> Result<RunSummary> {
    cfg.validate()?;

    let mut detector = load_backend(&cfg.weights, cfg.confidence)?;
    log::info!("detector backend: {}", detector.name());
    let mut source = open_source(&cfg.source)?;
    log::info!("reading frames from {}", source.describe());

    let fps = effective_fps(source.as_ref());
    let plan = RunPlan::resolve(cfg, fps)?;
    log::info!(
        "mode={} stride={} frames {}..{} at {:.2} fps",
        if plan.tracker { "tracking" } else { "detection" },
        plan.stride,
        plan.start_frame,
        plan.end_frame
            .map(|end| end.to_string())
            .unwrap_or_else(|| "end".to_string()),
        plan.fps
    );

    let logger =
        DetectionLogger::new(cfg.log_destination.as_deref(), cfg.progress_interval).with_sink(progress);
    let mut preview = if cfg.display {
        let labels = Labeler::from_config(cfg.font.as_deref());
        Some(PreviewDisplay::open(&cfg.preview_dir, stop.clone(), labels)?)
    } else {
        None
    };
    let display = preview
        .as_mut()
        .map(|preview| preview as &mut dyn DisplaySurface);

    execute(
        source.as_mut(),
        detector.as_mut(),
        &plan,
        logger,
        display,
        stop,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{InferenceResult, StubBackend};
    use crate::ingest::{SyntheticConfig, SyntheticSource};
    use image::RgbImage;
    use std::path::Path;

    fn source(frames: u64) -> SyntheticSource {
        SyntheticSource::new(SyntheticConfig {
            frames,
            ..SyntheticConfig::default()
        })
    }

    fn plan(start_frame: u64, end_frame: Option<u64>, stride: u64, tracker: bool) -> RunPlan {
        RunPlan {
            fps: 10.0,
            start_frame,
            end_frame,
            stride,
            confidence: 0.0,
            tracker,
        }
    }

    fn logged_frames(logger: &DetectionLogger) -> Vec<u64> {
        let mut frames: Vec<u64> = logger.records().iter().map(|r| r.frame).collect();
        frames.dedup();
        frames
    }

    struct CountingDisplay {
        shown: u32,
        stop_after: Option<u32>,
        /// Raise the shared stop signal on the n-th frame, as Ctrl-C would.
        signal_on: Option<(u32, StopSignal)>,
        fail: bool,
        closed: bool,
    }

    impl CountingDisplay {
        fn new() -> Self {
            Self {
                shown: 0,
                stop_after: None,
                signal_on: None,
                fail: false,
                closed: false,
            }
        }
    }

    impl DisplaySurface for CountingDisplay {
        fn show(&mut self, _image: &RgbImage, _result: &InferenceResult) -> Result<bool> {
            if self.fail {
                anyhow::bail!("surface went away");
            }
            self.shown += 1;
            if let Some((at, stop)) = &self.signal_on {
                if self.shown == *at {
                    stop.request();
                }
            }
            Ok(self.stop_after.map_or(true, |limit| self.shown < limit))
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    #[test]
    fn detection_mode_honors_bounds_and_stride() {
        let mut source = source(30);
        let mut detector = StubBackend::school(2);
        let mut logger = DetectionLogger::with_timestamp(Some(Path::new("unused")), 0, "x");
        let report = run_detection_mode(
            &mut source,
            &mut detector,
            &plan(2, Some(10), 3, false),
            &mut logger,
            None,
            &StopSignal::new(),
        )
        .unwrap();

        assert_eq!(report.frames_processed, 3);
        assert_eq!(logged_frames(&logger), vec![2, 5, 8]);
        assert!(logger.records().iter().all(|r| r.track_id.is_none()));
        assert_eq!(logger.records()[0].timestamp, Some(0.2));
    }

    #[test]
    fn detection_mode_stops_at_end_of_source() {
        let mut source = source(4);
        let mut detector = StubBackend::school(1);
        let mut logger = DetectionLogger::with_timestamp(Some(Path::new("unused")), 0, "x");
        let report = run_detection_mode(
            &mut source,
            &mut detector,
            &plan(0, None, 1, false),
            &mut logger,
            None,
            &StopSignal::new(),
        )
        .unwrap();
        assert_eq!(report.frames_processed, 4);
        assert!(!report.stopped_early);
    }

    #[test]
    fn stop_signal_ends_the_loop_before_reading() {
        let mut source = source(10);
        let mut detector = StubBackend::school(1);
        let mut logger = DetectionLogger::disabled();
        let stop = StopSignal::new();
        stop.request();
        let report = run_detection_mode(
            &mut source,
            &mut detector,
            &plan(0, None, 1, false),
            &mut logger,
            None,
            &stop,
        )
        .unwrap();
        assert_eq!(report.frames_processed, 0);
        assert!(report.stopped_early);
        assert_eq!(detector.calls(), 0);
    }

    #[test]
    fn display_can_request_a_stop() {
        let mut source = source(10);
        let mut detector = StubBackend::school(1);
        let mut logger = DetectionLogger::disabled();
        let mut display = CountingDisplay::new();
        display.stop_after = Some(2);
        let report = run_detection_mode(
            &mut source,
            &mut detector,
            &plan(0, None, 1, false),
            &mut logger,
            Some(&mut display),
            &StopSignal::new(),
        )
        .unwrap();
        assert_eq!(display.shown, 2);
        assert_eq!(report.frames_processed, 2);
        assert!(report.stopped_early);
    }

    #[test]
    fn tracking_mode_skips_results_before_start() {
        let mut source = source(12);
        let mut detector = StubBackend::school(2);
        let mut tracker = IouTracker::default();
        let mut logger = DetectionLogger::with_timestamp(Some(Path::new("unused")), 0, "x");
        let report = run_tracker_mode(
            &mut source,
            &mut detector,
            &mut tracker,
            &plan(4, Some(8), 2, true),
            &mut logger,
            None,
            &StopSignal::new(),
        )
        .unwrap();

        assert_eq!(report.frames_processed, 3);
        assert_eq!(logged_frames(&logger), vec![4, 6, 8]);
        assert!(logger.records().iter().all(|r| r.track_id.is_some()));
    }

    #[test]
    fn tracking_mode_stops_before_pulling_another_frame() {
        let mut source = source(10);
        let mut detector = StubBackend::school(1);
        let mut tracker = IouTracker::default();
        let mut logger = DetectionLogger::disabled();
        let stop = StopSignal::new();
        stop.request();
        let report = run_tracker_mode(
            &mut source,
            &mut detector,
            &mut tracker,
            &plan(0, None, 1, true),
            &mut logger,
            None,
            &stop,
        )
        .unwrap();
        assert_eq!(report.frames_processed, 0);
        assert!(report.stopped_early);
        assert_eq!(detector.calls(), 0);
    }

    #[test]
    fn tracking_mode_honors_a_stop_raised_mid_run() {
        let mut source = source(10);
        let mut detector = StubBackend::school(2);
        let mut tracker = IouTracker::default();
        let mut logger = DetectionLogger::with_timestamp(Some(Path::new("unused")), 0, "x");
        let stop = StopSignal::new();
        let mut display = CountingDisplay::new();
        display.signal_on = Some((3, stop.clone()));
        let report = run_tracker_mode(
            &mut source,
            &mut detector,
            &mut tracker,
            &plan(0, None, 1, true),
            &mut logger,
            Some(&mut display),
            &stop,
        )
        .unwrap();

        assert!(report.stopped_early);
        assert_eq!(report.frames_processed, 3);
        assert_eq!(logged_frames(&logger), vec![0, 1, 2]);
        assert_eq!(display.shown, 3);
        assert_eq!(detector.calls(), 3);
    }

    #[test]
    fn tracking_mode_display_stop_drops_the_current_frame() {
        let mut source = source(10);
        let mut detector = StubBackend::school(2);
        let mut tracker = IouTracker::default();
        let mut logger = DetectionLogger::with_timestamp(Some(Path::new("unused")), 0, "x");
        let mut display = CountingDisplay::new();
        display.stop_after = Some(2);
        let report = run_tracker_mode(
            &mut source,
            &mut detector,
            &mut tracker,
            &plan(0, None, 1, true),
            &mut logger,
            Some(&mut display),
            &StopSignal::new(),
        )
        .unwrap();

        // Shown before logging, so the frame the viewer stopped on is not kept.
        assert!(report.stopped_early);
        assert_eq!(display.shown, 2);
        assert_eq!(report.frames_processed, 1);
        assert_eq!(logged_frames(&logger), vec![0]);
        assert_eq!(logger.len(), 2);
    }

    #[test]
    fn execute_closes_display_and_reports_disabled_logging() {
        let mut source = source(5);
        let mut detector = StubBackend::school(1);
        let mut display = CountingDisplay::new();
        let summary = execute(
            &mut source,
            &mut detector,
            &plan(0, None, 1, true),
            DetectionLogger::disabled(),
            Some(&mut display),
            &StopSignal::new(),
        )
        .unwrap();
        assert!(display.closed);
        assert_eq!(display.shown, 5);
        assert_eq!(summary.frames_processed, 5);
        assert_eq!(summary.log_path, None);
        assert!(!summary.logging_enabled);
        assert_eq!(summary.records_logged, 0);
    }

    #[cfg(feature = "parquet-log")]
    #[test]
    fn flush_happens_even_when_display_fails() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("run.parquet");
        let mut source = source(5);
        let mut detector = StubBackend::school(2);
        let logger = DetectionLogger::with_timestamp(Some(&out), 0, "x");
        let mut display = CountingDisplay::new();
        display.fail = true;

        let err = execute(
            &mut source,
            &mut detector,
            &plan(0, None, 1, false),
            logger,
            Some(&mut display),
            &StopSignal::new(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("surface went away"));
        assert!(display.closed);
        assert!(out.exists());
    }

    #[test]
    fn invalid_config_fails_before_loading_anything() {
        let mut cfg = RunConfig::from_defaults(&crate::config::Defaults::default());
        cfg.source = PathBuf::from("/no/such/video.mp4");
        let err = run(&cfg, &StopSignal::new()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<crate::error::ConfigError>(),
            Some(crate::error::ConfigError::SourceNotFound(_))
        ));
    }
}

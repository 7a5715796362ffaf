//! Fish count runner
//!
//! Drives a YOLO-style object detector over recorded video to count fish.
//!
//! # Pipeline
//!
//! 1. **Ingest**: frames come from a `FrameSource` (video files, still images,
//!    synthetic `stub://` clips).
//! 2. **Detect**: a `DetectorBackend` turns each frame into boxes.
//! 3. **Track** (optional): `IouTracker` assigns persistent track ids.
//! 4. **Log**: `DetectionLogger` buffers one `DetectionRecord` per box and
//!    writes a single Parquet file at the end of the run.
//! 5. **Analyze**: `analyze` reports per-frame unique-fish coverage.
//!
//! # Module Structure
//!
//! - `run`: the orchestrator (detection and tracking modes, single flush)
//! - `config`: project defaults and per-run configuration
//! - `dataset`, `single_frame`: labeling helpers
//! - `web`: single-user HTML form that launches runs

pub mod analyze;
pub mod bounds;
pub mod config;
pub mod dataset;
pub mod detect;
pub mod display;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod labels;
pub mod logger;
pub mod parquet_log;
pub mod records;
pub mod run;
pub mod single_frame;
pub mod stop;
pub mod track;
pub mod web;

pub use bounds::compute_frame_bounds;
pub use config::{Defaults, RunConfig};
pub use detect::{BBox, BoxDetection, DetectorBackend, InferenceResult};
pub use error::ConfigError;
pub use frame::Frame;
pub use ingest::FrameSource;
pub use logger::{DetectionLogger, FlushOutcome, Progress, ProgressSink};
pub use records::{build_records, DetectionRecord};
pub use run::{run, RunSummary};
pub use stop::StopSignal;

/// Local-time stamp used in generated file names (`20240115_093000`).
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

pub fn timestamp_now() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

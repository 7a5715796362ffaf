//! Frame sources.
//!
//! This module provides the sources a run can read frames from:
//! - Local video files (feature: ingest-ffmpeg)
//! - Still images (jpg/png), exposed as a one-frame source without a frame rate
//! - Synthetic `stub://` clips (tests, demos)
//!
//! All sources implement `FrameSource`: sequential reads, absolute seeks by
//! frame index, and frame-rate metadata. Handles are released on drop.

mod file;
#[cfg(feature = "ingest-ffmpeg")]
pub(crate) mod file_ffmpeg;
pub mod still;
pub mod synthetic;

use anyhow::Result;

use crate::frame::Frame;

pub use file::{is_image_path, is_synthetic_path, open_source};
pub use still::StillImageSource;
pub use synthetic::{SyntheticConfig, SyntheticSource};

/// Frame rate assumed when the container does not report one.
pub const FALLBACK_FPS: f64 = 30.0;

/// Sequential frame reader with seek support.
pub trait FrameSource {
    /// Human readable description of where frames come from.
    fn describe(&self) -> String;

    /// Frame rate reported by the container. `0.0` when unknown.
    fn fps(&self) -> f64;

    /// Read the next frame. `Ok(None)` once the source is exhausted.
    fn read(&mut self) -> Result<Option<Frame>>;

    /// Position the source so that the next `read` returns frame `frame_idx`.
    fn seek(&mut self, frame_idx: u64) -> Result<()>;

    /// Discard up to `count` frames. Returns how many were actually skipped.
    fn skip(&mut self, count: u64) -> Result<u64> {
        let mut skipped = 0;
        while skipped < count {
            if self.read()?.is_none() {
                break;
            }
            skipped += 1;
        }
        Ok(skipped)
    }
}

/// Frame rate to use for bounds and timestamps.
///
/// Falls back to `FALLBACK_FPS` when the source reports none.
pub fn effective_fps(source: &dyn FrameSource) -> f64 {
    let fps = source.fps();
    if fps.is_finite() && fps > 0.0 {
        fps
    } else {
        log::warn!(
            "{} reports no frame rate; assuming {} fps",
            source.describe(),
            FALLBACK_FPS
        );
        FALLBACK_FPS
    }
}

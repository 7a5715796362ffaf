//! Source selection for local paths.
//!
//! `stub://` paths open a synthetic clip, image extensions open a still image,
//! and everything else is handed to the FFmpeg decoder. URL schemes other than
//! `stub://` are rejected; sources are local files only.

use std::path::Path;

use anyhow::{anyhow, Context, Result};

#[cfg(feature = "ingest-ffmpeg")]
use super::file_ffmpeg::FfmpegVideoSource;
use super::still::StillImageSource;
use super::synthetic::{SyntheticConfig, SyntheticSource};
use super::FrameSource;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

/// Open the frame source behind `path`.
pub fn open_source(path: &Path) -> Result<Box<dyn FrameSource>> {
    let raw = path.to_string_lossy();
    if is_synthetic_path(path) {
        let config = SyntheticConfig::from_url(&raw)?;
        log::debug!("opening synthetic source {}", raw);
        return Ok(Box::new(SyntheticSource::new(config)));
    }
    if !is_local_file_path(&raw) {
        return Err(anyhow!(
            "only local files are supported as sources (no URL schemes): {}",
            raw
        ));
    }
    if is_image_path(path) {
        let source = StillImageSource::open(path)
            .with_context(|| format!("could not open image: {}", path.display()))?;
        return Ok(Box::new(source));
    }
    open_video(path)
}

#[cfg(feature = "ingest-ffmpeg")]
fn open_video(path: &Path) -> Result<Box<dyn FrameSource>> {
    let source = FfmpegVideoSource::open(path)
        .with_context(|| format!("could not open video: {}", path.display()))?;
    Ok(Box::new(source))
}

#[cfg(not(feature = "ingest-ffmpeg"))]
fn open_video(path: &Path) -> Result<Box<dyn FrameSource>> {
    Err(anyhow!(
        "could not open video {}: video decoding requires the ingest-ffmpeg feature",
        path.display()
    ))
}

/// True for `stub://` synthetic sources.
pub fn is_synthetic_path(path: &Path) -> bool {
    path.to_string_lossy().starts_with("stub://")
}

/// True when the extension names a still image format.
pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    !path.contains("://")
}

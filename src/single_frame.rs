//! Detection on one image, or on the first frame of a video.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use crate::detect::{load_backend, BoxDetection, InferenceResult};
use crate::display::annotate;
use crate::error::ConfigError;
use crate::frame::Frame;
use crate::ingest::{is_image_path, is_synthetic_path, open_source};
use crate::labels::Labeler;

pub struct SingleFrameOutcome {
    pub result: InferenceResult,
    pub output: PathBuf,
}

/// Read an image, or the first frame of anything else.
pub fn load_first_frame(source: &Path) -> Result<Frame> {
    if !is_synthetic_path(source) && !source.exists() {
        return Err(ConfigError::SourceNotFound(source.to_path_buf()).into());
    }
    let mut frames = open_source(source)?;
    frames
        .read()?
        .ok_or_else(|| anyhow!("could not read first frame from {}", source.display()))
}

/// Annotated output keeps image extensions; anything else is saved as `.jpg`.
pub fn output_path(output: &Path) -> PathBuf {
    if is_image_path(output) {
        output.to_path_buf()
    } else {
        output.with_extension("jpg")
    }
}

pub fn describe_box(det: &BoxDetection) -> String {
    format!(
        "class {} conf {:.2} box [{:.1}, {:.1}, {:.1}, {:.1}]",
        det.class_id, det.confidence, det.bbox.x1, det.bbox.y1, det.bbox.x2, det.bbox.y2
    )
}

pub fn detect_single_frame(
    source: &Path,
    weights: &Path,
    output: &Path,
    confidence: f32,
    labels: &Labeler,
) -> Result<SingleFrameOutcome> {
    if !is_synthetic_path(weights) && !weights.exists() {
        return Err(ConfigError::WeightsNotFound(weights.to_path_buf()).into());
    }
    if !(0.0..=1.0).contains(&confidence) {
        return Err(ConfigError::InvalidConfidence(confidence).into());
    }
    let frame = load_first_frame(source)?;
    let mut detector = load_backend(weights, confidence)?;
    let mut result = detector.detect(&frame)?;
    result.retain_confident(confidence);

    let output = output_path(output);
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    annotate(frame.image(), &result, labels)
        .save(&output)
        .with_context(|| format!("failed to save {}", output.display()))?;
    Ok(SingleFrameOutcome { result, output })
}

//! Flat detection records.
//!
//! One `DetectionRecord` per detected box per frame. This is the row shape
//! of the Parquet detection log.

use crate::detect::InferenceResult;

#[derive(Clone, Debug, PartialEq)]
pub struct DetectionRecord {
    pub frame: u64,
    /// `frame / fps` in seconds; `None` when the frame rate is unknown.
    pub timestamp: Option<f64>,
    /// Tracker identifier; only present for tracking runs.
    pub track_id: Option<u64>,
    pub class_id: u32,
    pub confidence: f32,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

/// Build one record per box of `result`, in detector order.
pub fn build_records(result: &InferenceResult, frame_idx: u64, fps: f64) -> Vec<DetectionRecord> {
    let timestamp = if fps > 0.0 {
        Some(frame_idx as f64 / fps)
    } else {
        None
    };
    result
        .boxes
        .iter()
        .map(|det| DetectionRecord {
            frame: frame_idx,
            timestamp,
            track_id: det.track_id,
            class_id: det.class_id,
            confidence: det.confidence,
            x1: det.bbox.x1,
            y1: det.bbox.y1,
            x2: det.bbox.x2,
            y2: det.bbox.y2,
        })
        .collect()
}

//! Multi-object tracking.
//!
//! `IouTracker` assigns stable identifiers to detections across consecutive
//! frames. `TrackStream` runs decode, detect and track lazily, one sampled
//! frame per iteration.

mod iou;
mod stream;

use crate::detect::BoxDetection;

pub use iou::{IouTracker, TrackerConfig};
pub use stream::{TrackStream, TrackedFrame};

/// Assigns persistent identifiers to per-frame detections.
pub trait Tracker {
    /// Associate `boxes` with existing tracks. Returned boxes carry a track id
    /// and keep the relative order they had in `boxes`; boxes the tracker
    /// rejects are dropped.
    fn update(&mut self, boxes: &[BoxDetection]) -> Vec<BoxDetection>;
}

use anyhow::Result;

use crate::detect::result::InferenceResult;
use crate::frame::Frame;

/// Detector backend trait.
///
/// Backends receive one decoded frame at a time and return boxes in pixel
/// coordinates of that frame. They are driven from a single thread and may
/// keep state between calls.
pub trait DetectorBackend {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    fn detect(&mut self, frame: &Frame) -> Result<InferenceResult>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

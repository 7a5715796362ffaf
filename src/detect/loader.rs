use std::path::Path;

use anyhow::{anyhow, Result};

use super::backend::DetectorBackend;
use super::backends::StubBackend;

/// Square model input used for ONNX exports (`imgsz=640`).
pub const DEFAULT_INPUT_SIZE: u32 = 640;

/// Load the detector named by a weights path.
///
/// `stub://...` selects the stub backend; `.onnx` checkpoints load through
/// tract when the `backend-tract` feature is enabled.
pub fn load_backend(weights: &Path, confidence: f32) -> Result<Box<dyn DetectorBackend>> {
    let raw = weights.to_string_lossy();
    if raw.starts_with("stub://") {
        log::info!("using stub detector ({})", raw);
        return Ok(Box::new(StubBackend::from_url(&raw)?));
    }
    let is_onnx = weights
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("onnx"))
        .unwrap_or(false);
    if !is_onnx {
        return Err(anyhow!(
            "unsupported weights format {}: export the checkpoint to ONNX",
            weights.display()
        ));
    }
    load_onnx(weights, confidence)
}

#[cfg(feature = "backend-tract")]
fn load_onnx(weights: &Path, confidence: f32) -> Result<Box<dyn DetectorBackend>> {
    let mut backend =
        super::backends::TractBackend::new(weights, DEFAULT_INPUT_SIZE)?.with_threshold(confidence);
    backend.warm_up()?;
    log::info!("loaded ONNX detector from {}", weights.display());
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn load_onnx(weights: &Path, _confidence: f32) -> Result<Box<dyn DetectorBackend>> {
    Err(anyhow!(
        "cannot load {}: ONNX inference requires the backend-tract feature",
        weights.display()
    ))
}

#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::nms::non_max_suppression;
use crate::detect::result::{BBox, BoxDetection, InferenceResult};
use crate::frame::Frame;

const LETTERBOX_FILL: f32 = 114.0 / 255.0;
const DEFAULT_IOU_THRESHOLD: f32 = 0.7;

/// Tract-based backend for YOLOv8 ONNX exports.
///
/// Expects a single input `[1, 3, S, S]` and a single output
/// `[1, 4 + classes, anchors]` with `cx, cy, w, h` rows followed by class
/// scores. Frames are letterboxed to the model size and boxes are mapped back
/// to frame pixels.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    input_size: u32,
    confidence_threshold: f32,
    iou_threshold: f32,
}

struct Letterbox {
    ratio: f32,
    pad_x: f32,
    pad_y: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, input_size as usize, input_size as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_size,
            confidence_threshold: 0.25,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
        })
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    fn build_input(&self, frame: &Frame) -> Result<(Tensor, Letterbox)> {
        let size = self.input_size as f32;
        let (w0, h0) = (frame.width() as f32, frame.height() as f32);
        if w0 == 0.0 || h0 == 0.0 {
            return Err(anyhow!("cannot run inference on an empty frame"));
        }
        let ratio = (size / w0).min(size / h0);
        let new_w = ((w0 * ratio).round() as u32).max(1);
        let new_h = ((h0 * ratio).round() as u32).max(1);
        let resized = image::imageops::resize(frame.image(), new_w, new_h, FilterType::Triangle);
        let pad_x = (self.input_size.saturating_sub(new_w) / 2) as usize;
        let pad_y = (self.input_size.saturating_sub(new_h) / 2) as usize;

        let side = self.input_size as usize;
        let mut input = tract_ndarray::Array4::from_elem((1, 3, side, side), LETTERBOX_FILL);
        for (x, y, pixel) in resized.enumerate_pixels() {
            let (x, y) = (x as usize + pad_x, y as usize + pad_y);
            if x >= side || y >= side {
                continue;
            }
            for channel in 0..3 {
                input[[0, channel, y, x]] = pixel.0[channel] as f32 / 255.0;
            }
        }

        Ok((
            input.into_tensor(),
            Letterbox {
                ratio,
                pad_x: pad_x as f32,
                pad_y: pad_y as f32,
            },
        ))
    }

    fn decode(
        &self,
        outputs: TVec<TValue>,
        letterbox: &Letterbox,
        frame: &Frame,
    ) -> Result<Vec<BoxDetection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let preds = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = preds.shape();
        if shape.len() != 3 || shape[0] != 1 || shape[1] <= 4 {
            return Err(anyhow!("unexpected YOLO output shape {:?}", shape));
        }
        let classes = shape[1] - 4;
        let anchors = shape[2];
        let (max_x, max_y) = (frame.width() as f32, frame.height() as f32);

        let mut boxes = Vec::new();
        for a in 0..anchors {
            let (class_id, confidence) = (0..classes)
                .map(|c| (c, preds[[0, 4 + c, a]]))
                .fold((0, f32::NEG_INFINITY), |best, x| if x.1 > best.1 { x } else { best });
            if confidence < self.confidence_threshold {
                continue;
            }
            let cx = (preds[[0, 0, a]] - letterbox.pad_x) / letterbox.ratio;
            let cy = (preds[[0, 1, a]] - letterbox.pad_y) / letterbox.ratio;
            let w = preds[[0, 2, a]] / letterbox.ratio;
            let h = preds[[0, 3, a]] / letterbox.ratio;
            let bbox = BBox::new(
                (cx - w / 2.0).clamp(0.0, max_x),
                (cy - h / 2.0).clamp(0.0, max_y),
                (cx + w / 2.0).clamp(0.0, max_x),
                (cy + h / 2.0).clamp(0.0, max_y),
            );
            boxes.push(BoxDetection::new(bbox, class_id as u32, confidence));
        }

        non_max_suppression(&mut boxes, self.iou_threshold);
        Ok(boxes)
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &Frame) -> Result<InferenceResult> {
        let (input, letterbox) = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let boxes = self.decode(outputs, &letterbox, frame)?;
        Ok(InferenceResult::new(boxes))
    }
}

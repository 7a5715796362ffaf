/// Axis-aligned box in pixel coordinates (`x1 < x2`, `y1 < y2`).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn iou(&self, other: &BBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// One detected object.
#[derive(Clone, Debug, PartialEq)]
pub struct BoxDetection {
    pub bbox: BBox,
    pub class_id: u32,
    pub confidence: f32,
    /// Stable identifier assigned by a tracker. `None` for plain detection.
    pub track_id: Option<u64>,
}

impl BoxDetection {
    pub fn new(bbox: BBox, class_id: u32, confidence: f32) -> Self {
        Self {
            bbox,
            class_id,
            confidence,
            track_id: None,
        }
    }

    pub fn with_track_id(mut self, track_id: u64) -> Self {
        self.track_id = Some(track_id);
        self
    }
}

/// Result of running inference on one frame. Boxes keep detector order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InferenceResult {
    pub boxes: Vec<BoxDetection>,
}

impl InferenceResult {
    pub fn new(boxes: Vec<BoxDetection>) -> Self {
        Self { boxes }
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    /// True when boxes carry tracker identifiers.
    pub fn is_tracked(&self) -> bool {
        self.boxes.iter().any(|b| b.track_id.is_some())
    }

    /// Drop boxes below `min_confidence`, keeping the order of the rest.
    pub fn retain_confident(&mut self, min_confidence: f32) {
        self.boxes.retain(|b| b.confidence >= min_confidence);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_overlapping_boxes() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(5.0, 0.0, 15.0, 10.0);
        assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-6);
        assert_eq!(a.iou(&BBox::new(20.0, 20.0, 30.0, 30.0)), 0.0);
        assert_eq!(a.iou(&a), 1.0);
    }

    #[test]
    fn retain_confident_keeps_order() {
        let mut result = InferenceResult::new(vec![
            BoxDetection::new(BBox::new(0.0, 0.0, 1.0, 1.0), 0, 0.9),
            BoxDetection::new(BBox::new(0.0, 0.0, 1.0, 1.0), 1, 0.2),
            BoxDetection::new(BBox::new(0.0, 0.0, 1.0, 1.0), 2, 0.6),
        ]);
        result.retain_confident(0.5);
        let classes: Vec<u32> = result.boxes.iter().map(|b| b.class_id).collect();
        assert_eq!(classes, vec![0, 2]);
        assert!(!result.is_tracked());
    }
}

use std::cmp::Ordering;

use crate::detect::result::BoxDetection;

/// Greedy per-class non-maximum suppression: a box is only suppressed by a
/// higher-scoring kept box of the same class. Survivors are ordered by
/// descending confidence.
pub fn non_max_suppression(boxes: &mut Vec<BoxDetection>, iou_threshold: f32) {
    boxes.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });

    let mut kept = 0;
    for index in 0..boxes.len() {
        let candidate = &boxes[index];
        let suppressed = boxes[..kept].iter().any(|prev| {
            prev.class_id == candidate.class_id && prev.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !suppressed {
            boxes.swap(kept, index);
            kept += 1;
        }
    }
    boxes.truncate(kept);
}

//! Annotated frame rendering and the live preview surface.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::detect::{BoxDetection, InferenceResult};
use crate::labels::Labeler;
use crate::stop::StopSignal;

const PREVIEW_FILE: &str = "preview.jpg";
const LABEL_SCALE: f32 = 14.0;
const LABEL_PAD: u32 = 2;
const LABEL_TEXT: Rgb<u8> = Rgb([255, 255, 255]);

const PALETTE: [[u8; 3]; 8] = [
    [255, 56, 56],
    [255, 157, 151],
    [255, 112, 31],
    [255, 178, 29],
    [207, 210, 49],
    [72, 249, 10],
    [26, 147, 52],
    [0, 212, 187],
];

/// Somewhere annotated frames are shown while a run is in progress.
pub trait DisplaySurface {
    /// Present one frame with its detections. `Ok(false)` means the viewer
    /// asked to stop.
    fn show(&mut self, image: &RgbImage, result: &InferenceResult) -> Result<bool>;

    /// Release the surface. Called once on every exit path of a run.
    fn close(&mut self);
}

/// Rewrites a single JPEG in a directory for every shown frame, so any image
/// viewer that reloads on change acts as the live window.
pub struct PreviewDisplay {
    path: PathBuf,
    stop: StopSignal,
    labels: Labeler,
    shown: u64,
}

impl PreviewDisplay {
    pub fn open(dir: &Path, stop: StopSignal, labels: Labeler) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create preview dir {}", dir.display()))?;
        let path = dir.join(PREVIEW_FILE);
        log::info!("live preview at {} (type q + Enter to stop)", path.display());
        Ok(Self {
            path,
            stop,
            labels,
            shown: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames_shown(&self) -> u64 {
        self.shown
    }
}

impl DisplaySurface for PreviewDisplay {
    fn show(&mut self, image: &RgbImage, result: &InferenceResult) -> Result<bool> {
        let staging = self.path.with_extension("jpg.part");
        annotate(image, result, &self.labels)
            .save_with_format(&staging, ImageFormat::Jpeg)
            .with_context(|| format!("failed to write preview {}", staging.display()))?;
        std::fs::rename(&staging, &self.path)
            .with_context(|| format!("failed to publish preview {}", self.path.display()))?;
        self.shown += 1;
        Ok(!self.stop.is_requested())
    }

    fn close(&mut self) {
        log::debug!("preview closed after {} frames", self.shown);
    }
}

/// Colour for one box: by track id when tracked, else by class.
pub fn box_color(track_id: Option<u64>, class_id: u32) -> Rgb<u8> {
    let key = track_id.unwrap_or(class_id as u64) as usize;
    Rgb(PALETTE[key % PALETTE.len()])
}

/// `id:<track> <class> <conf>` for tracked boxes, `<class> <conf>` otherwise.
pub fn box_label(det: &BoxDetection) -> String {
    match det.track_id {
        Some(track) => format!("id:{} {} {:.2}", track, det.class_id, det.confidence),
        None => format!("{} {:.2}", det.class_id, det.confidence),
    }
}

/// Copy of `image` with every box outlined and, when `labels` has a font,
/// captioned with [`box_label`].
pub fn annotate(image: &RgbImage, result: &InferenceResult, labels: &Labeler) -> RgbImage {
    let mut canvas = image.clone();
    let (width, height) = canvas.dimensions();
    for det in &result.boxes {
        let color = box_color(det.track_id, det.class_id);
        let x1 = det.bbox.x1.clamp(0.0, width as f32) as i32;
        let y1 = det.bbox.y1.clamp(0.0, height as f32) as i32;
        let x2 = det.bbox.x2.clamp(0.0, width as f32) as i32;
        let y2 = det.bbox.y2.clamp(0.0, height as f32) as i32;
        // Two nested outlines for visibility.
        for inset in 0..2 {
            let w = (x2 - x1 - 2 * inset).max(1) as u32;
            let h = (y2 - y1 - 2 * inset).max(1) as u32;
            let rect = Rect::at(x1 + inset, y1 + inset).of_size(w, h);
            draw_hollow_rect_mut(&mut canvas, rect, color);
        }
        draw_caption(&mut canvas, labels, &box_label(det), color, x1, y1);
    }
    canvas
}

/// Filled tag above the box, or just inside it when the box touches the top.
fn draw_caption(canvas: &mut RgbImage, labels: &Labeler, text: &str, color: Rgb<u8>, x: i32, y: i32) {
    let (text_w, text_h) = labels.measure(LABEL_SCALE, text);
    if text_w == 0 {
        return;
    }
    let tag_w = text_w + 2 * LABEL_PAD;
    let tag_h = text_h + 2 * LABEL_PAD;
    let top = if y >= tag_h as i32 { y - tag_h as i32 } else { y };
    draw_filled_rect_mut(canvas, Rect::at(x, top).of_size(tag_w, tag_h), color);
    labels.draw(
        canvas,
        LABEL_TEXT,
        x + LABEL_PAD as i32,
        top + LABEL_PAD as i32,
        LABEL_SCALE,
        text,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BBox, BoxDetection};

    #[test]
    fn annotate_outlines_boxes_and_leaves_source_untouched() {
        let image = RgbImage::new(64, 48);
        let result = InferenceResult::new(vec![BoxDetection::new(
            BBox::new(10.0, 10.0, 30.0, 20.0),
            0,
            0.9,
        )]);
        let out = annotate(&image, &result, &Labeler::plain());
        assert_eq!(*out.get_pixel(10, 10), box_color(None, 0));
        assert_eq!(*out.get_pixel(20, 15), Rgb([0, 0, 0]));
        assert_eq!(*out.get_pixel(10, 5), Rgb([0, 0, 0]));
        assert_eq!(*image.get_pixel(10, 10), Rgb([0, 0, 0]));
    }

    #[test]
    fn labels_name_track_class_and_confidence() {
        let mut det = BoxDetection::new(BBox::new(0.0, 0.0, 1.0, 1.0), 2, 0.876);
        assert_eq!(box_label(&det), "2 0.88");
        det.track_id = Some(7);
        assert_eq!(box_label(&det), "id:7 2 0.88");
    }

    // Exercised only on hosts with one of the system fonts installed.
    #[test]
    fn captions_sit_above_the_box() {
        let Some(font) = crate::labels::find_font(None) else {
            return;
        };
        let image = RgbImage::new(120, 80);
        let result = InferenceResult::new(vec![BoxDetection::new(
            BBox::new(10.0, 40.0, 60.0, 70.0),
            1,
            0.9,
        )]);
        let out = annotate(&image, &result, &Labeler::new(Some(font)));
        let color = box_color(None, 1);
        let tagged = (10..60).any(|x| (20..40).any(|y| *out.get_pixel(x, y) == color));
        assert!(tagged);
    }

    #[test]
    fn tracked_boxes_are_coloured_by_track() {
        assert_eq!(box_color(Some(3), 0), box_color(None, 3));
        assert_ne!(box_color(Some(1), 0), box_color(Some(2), 0));
    }

    #[test]
    fn preview_reports_stop_requests() {
        let dir = tempfile::tempdir().unwrap();
        let stop = StopSignal::new();
        let mut display = PreviewDisplay::open(dir.path(), stop.clone(), Labeler::plain()).unwrap();
        let frame = RgbImage::new(16, 16);
        let empty = InferenceResult::new(Vec::new());
        assert!(display.show(&frame, &empty).unwrap());
        assert!(display.path().exists());
        stop.request();
        assert!(!display.show(&frame, &empty).unwrap());
        assert_eq!(display.frames_shown(), 2);
        display.close();
    }
}

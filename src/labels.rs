//! Text rendering for box labels and chart annotations.
//!
//! No font ships with the crate. The configured font (`font` in the defaults
//! file, or `FISHCOUNT_FONT`) is tried first, then a few common system
//! locations. Without a font every draw call is a no-op.

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use anyhow::{anyhow, Context, Result};
use image::{imageops, Rgb, RgbImage};
use imageproc::drawing::{draw_text_mut, text_size};

const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

pub fn load_font(path: &Path) -> Result<FontVec> {
    let data =
        std::fs::read(path).with_context(|| format!("failed to read font {}", path.display()))?;
    FontVec::try_from_vec(data)
        .map_err(|_| anyhow!("{} is not a TrueType or OpenType font", path.display()))
}

/// Configured font first, then the system fallbacks.
pub fn find_font(configured: Option<&Path>) -> Option<FontVec> {
    if let Some(path) = configured {
        match load_font(path) {
            Ok(font) => return Some(font),
            Err(err) => log::warn!("{:#}; trying system fonts", err),
        }
    }
    let found = SYSTEM_FONTS
        .iter()
        .map(Path::new)
        .filter(|path| path.exists())
        .find_map(|path| load_font(path).ok());
    if found.is_none() {
        log::warn!("no label font found (set FISHCOUNT_FONT); drawing without text");
    }
    found
}

#[derive(Default)]
pub struct Labeler {
    font: Option<FontVec>,
}

impl Labeler {
    pub fn new(font: Option<FontVec>) -> Self {
        Self { font }
    }

    /// A labeler without a font. Drawing does nothing.
    pub fn plain() -> Self {
        Self::default()
    }

    pub fn from_config(configured: Option<&Path>) -> Self {
        Self::new(find_font(configured))
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Width and height of `text` at `scale` pixels; `(0, 0)` without a font.
    pub fn measure(&self, scale: f32, text: &str) -> (u32, u32) {
        match &self.font {
            Some(font) => text_size(PxScale::from(scale), font, text),
            None => (0, 0),
        }
    }

    pub fn draw(&self, canvas: &mut RgbImage, color: Rgb<u8>, x: i32, y: i32, scale: f32, text: &str) {
        if let Some(font) = &self.font {
            draw_text_mut(canvas, color, x, y, PxScale::from(scale), font, text);
        }
    }

    /// Text centred horizontally on `center_x`.
    pub fn draw_centered(
        &self,
        canvas: &mut RgbImage,
        color: Rgb<u8>,
        center_x: i32,
        y: i32,
        scale: f32,
        text: &str,
    ) {
        let (width, _) = self.measure(scale, text);
        self.draw(canvas, color, center_x - width as i32 / 2, y, scale, text);
    }

    /// Text on white, rotated a quarter turn counter-clockwise so it reads
    /// bottom to top, centred vertically on `center_y` with its left edge at `x`.
    pub fn draw_vertical(
        &self,
        canvas: &mut RgbImage,
        color: Rgb<u8>,
        x: i32,
        center_y: i32,
        scale: f32,
        text: &str,
    ) {
        let (width, height) = self.measure(scale, text);
        if width == 0 || height == 0 {
            return;
        }
        let mut strip = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
        self.draw(&mut strip, color, 0, 0, scale, text);
        let rotated = imageops::rotate270(&strip);
        let top = center_y - width as i32 / 2;
        imageops::overlay(canvas, &rotated, x as i64, top as i64);
    }
}

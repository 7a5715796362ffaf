//! Evenly spaced frame sampling for labeling, split into train/val folders.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use image::ImageFormat;

use crate::ingest::{open_source, FrameSource};

#[derive(Clone, Debug, PartialEq)]
pub struct ExtractOptions {
    pub video: PathBuf,
    /// Root directory; images go under `images/train` and `images/val`.
    pub output: PathBuf,
    /// Seconds between sampled frames.
    pub frame_gap: f64,
    pub max_frames: usize,
    /// Fraction of frames routed to validation, clamped to 0..=1.
    pub val_ratio: f64,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            video: PathBuf::from("first_hour.mp4.webm"),
            output: PathBuf::from("dataset"),
            frame_gap: 3.0,
            max_frames: 60,
            val_ratio: 0.2,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExtractSummary {
    pub saved: usize,
    pub train: usize,
    pub val: usize,
    pub train_dir: PathBuf,
    pub val_dir: Option<PathBuf>,
}

impl fmt::Display for ExtractSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let val = self
            .val_dir
            .as_ref()
            .map(|dir| dir.display().to_string())
            .unwrap_or_else(|| "no val".to_string());
        write!(
            f,
            "Saved {} frames ({} / {})",
            self.saved,
            self.train_dir.display(),
            val
        )
    }
}

pub fn extract_frames(opts: &ExtractOptions) -> Result<ExtractSummary> {
    if !opts.video.exists() && !crate::ingest::is_synthetic_path(&opts.video) {
        return Err(anyhow!("video not found: {}", opts.video.display()));
    }
    let mut source = open_source(&opts.video)?;
    extract_from_source(source.as_mut(), opts)
}

/// Frames between samples: `fps * frame_gap`, at least one.
pub fn sample_step(fps: f64, frame_gap: f64) -> u64 {
    ((fps * frame_gap).floor() as u64).max(1)
}

/// Every n-th saved frame goes to validation; `None` when nothing does.
pub fn val_interval(val_ratio: f64) -> Option<u64> {
    let ratio = val_ratio.clamp(0.0, 1.0);
    if ratio > 0.0 {
        Some(((1.0 / ratio).round() as u64).max(1))
    } else {
        None
    }
}

pub fn extract_from_source(
    source: &mut dyn FrameSource,
    opts: &ExtractOptions,
) -> Result<ExtractSummary> {
    let fps = source.fps();
    if !(fps > 0.0) {
        return Err(anyhow!(
            "{} reports no frame rate; check the video file",
            source.describe()
        ));
    }
    let step = sample_step(fps, opts.frame_gap);
    let interval = val_interval(opts.val_ratio);

    let train_dir = opts.output.join("images").join("train");
    let val_dir = interval.map(|_| opts.output.join("images").join("val"));
    create_dir(&train_dir)?;
    if let Some(dir) = &val_dir {
        create_dir(dir)?;
    }

    let mut summary = ExtractSummary {
        saved: 0,
        train: 0,
        val: 0,
        train_dir: train_dir.clone(),
        val_dir: val_dir.clone(),
    };
    let mut frame_idx = 0u64;
    while summary.saved < opts.max_frames {
        source.seek(frame_idx)?;
        let Some(frame) = source.read()? else {
            break;
        };

        let ordinal = summary.saved as u64 + 1;
        let target = match (&val_dir, interval) {
            (Some(dir), Some(every)) if ordinal % every == 0 => Some(dir),
            _ => None,
        };
        let (dir, split) = match target {
            Some(dir) => (dir, "val"),
            None => (&train_dir, "train"),
        };
        let filename = dir.join(format!("fish_{split}_{frame_idx:06}.jpg"));
        frame
            .image()
            .save_with_format(&filename, ImageFormat::Jpeg)
            .with_context(|| format!("failed to write frame to {}", filename.display()))?;
        log::debug!("saved frame {} to {}", frame_idx, filename.display());

        summary.saved += 1;
        if target.is_some() {
            summary.val += 1;
        } else {
            summary.train += 1;
        }
        frame_idx += step;
    }
    Ok(summary)
}

fn create_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))
}

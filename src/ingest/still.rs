use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::FrameSource;
use crate::frame::Frame;

/// A still image exposed as a single-frame source with no frame rate.
pub struct StillImageSource {
    path: PathBuf,
    frame: Frame,
    position: u64,
}

impl StillImageSource {
    pub fn open(path: &Path) -> Result<Self> {
        let image = image::open(path)
            .with_context(|| format!("failed to decode image {}", path.display()))?
            .to_rgb8();
        Ok(Self {
            path: path.to_path_buf(),
            frame: Frame::from_image(image),
            position: 0,
        })
    }
}

impl FrameSource for StillImageSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn fps(&self) -> f64 {
        0.0
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        if self.position > 0 {
            return Ok(None);
        }
        self.position += 1;
        Ok(Some(self.frame.clone()))
    }

    fn seek(&mut self, frame_idx: u64) -> Result<()> {
        self.position = frame_idx;
        Ok(())
    }
}

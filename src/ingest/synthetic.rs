//! Synthetic clip (`stub://`) for tests and demos.
//!
//! `stub://<name>?fps=30&frames=300&width=160&height=120` produces a finite
//! clip of generated frames. Each frame's pixels depend on its index, so a
//! seek followed by a read is observable.

use anyhow::{anyhow, Context, Result};
use url::Url;

use super::FrameSource;
use crate::frame::Frame;

#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub name: String,
    pub fps: f64,
    pub frames: u64,
    pub width: u32,
    pub height: u32,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            name: "clip".to_string(),
            fps: 30.0,
            frames: 300,
            width: 160,
            height: 120,
        }
    }
}

impl SyntheticConfig {
    /// Parse a `stub://` URL. Unknown query keys are ignored.
    pub fn from_url(raw: &str) -> Result<Self> {
        let url = Url::parse(raw).with_context(|| format!("invalid synthetic source '{}'", raw))?;
        if url.scheme() != "stub" {
            return Err(anyhow!("synthetic sources must use stub:// (got '{}')", raw));
        }
        let mut config = Self::default();
        if let Some(host) = url.host_str() {
            config.name = host.to_string();
        }
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "fps" => {
                    config.fps = value
                        .parse()
                        .map_err(|_| anyhow!("synthetic fps must be a number: {}", value))?
                }
                "frames" => {
                    config.frames = value
                        .parse()
                        .map_err(|_| anyhow!("synthetic frames must be an integer: {}", value))?
                }
                "width" => {
                    config.width = value
                        .parse()
                        .map_err(|_| anyhow!("synthetic width must be an integer: {}", value))?
                }
                "height" => {
                    config.height = value
                        .parse()
                        .map_err(|_| anyhow!("synthetic height must be an integer: {}", value))?
                }
                _ => {}
            }
        }
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!("synthetic frames need non-zero dimensions"));
        }
        Ok(config)
    }
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    position: u64,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            position: 0,
        }
    }

    /// Index of the frame the next `read` returns.
    pub fn position(&self) -> u64 {
        self.position
    }

    fn render(&self, index: u64) -> Result<Frame> {
        let width = self.config.width;
        let height = self.config.height;
        let mut pixels = vec![0u8; (width as usize) * (height as usize) * 3];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + index * 7) % 256) as u8;
        }
        Frame::from_rgb(pixels, width, height)
    }
}

impl FrameSource for SyntheticSource {
    fn describe(&self) -> String {
        format!("stub://{}", self.config.name)
    }

    fn fps(&self) -> f64 {
        self.config.fps
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        if self.position >= self.config.frames {
            return Ok(None);
        }
        let frame = self.render(self.position)?;
        self.position += 1;
        Ok(Some(frame))
    }

    fn seek(&mut self, frame_idx: u64) -> Result<()> {
        self.position = frame_idx;
        Ok(())
    }

    fn skip(&mut self, count: u64) -> Result<u64> {
        let remaining = self.config.frames.saturating_sub(self.position);
        let skipped = count.min(remaining);
        self.position += skipped;
        Ok(skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_query_parameters() {
        let cfg = SyntheticConfig::from_url("stub://tank?fps=25&frames=10&width=8&height=6").unwrap();
        assert_eq!(cfg.name, "tank");
        assert_eq!(cfg.fps, 25.0);
        assert_eq!(cfg.frames, 10);
        assert_eq!((cfg.width, cfg.height), (8, 6));

        assert!(SyntheticConfig::from_url("stub://tank?fps=fast").is_err());
        assert!(SyntheticConfig::from_url("stub://tank?width=0").is_err());
    }

    #[test]
    fn reads_until_exhausted_and_seeks() {
        let mut source = SyntheticSource::new(SyntheticConfig {
            frames: 3,
            width: 4,
            height: 4,
            ..SyntheticConfig::default()
        });
        let first = source.read().unwrap().unwrap();
        assert!(source.read().unwrap().is_some());
        assert!(source.read().unwrap().is_some());
        assert!(source.read().unwrap().is_none());

        source.seek(0).unwrap();
        let again = source.read().unwrap().unwrap();
        assert_eq!(first.pixels(), again.pixels());

        source.seek(5).unwrap();
        assert!(source.read().unwrap().is_none());
    }

    #[test]
    fn skip_stops_at_end() {
        let mut source = SyntheticSource::new(SyntheticConfig {
            frames: 5,
            width: 2,
            height: 2,
            ..SyntheticConfig::default()
        });
        assert_eq!(source.skip(3).unwrap(), 3);
        assert_eq!(source.position(), 3);
        assert_eq!(source.skip(10).unwrap(), 2);
        assert!(source.read().unwrap().is_none());
    }
}

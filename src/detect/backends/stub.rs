use anyhow::{anyhow, Context, Result};
use url::Url;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BBox, BoxDetection, InferenceResult};
use crate::frame::Frame;

const FISH_WIDTH: f32 = 20.0;
const FISH_HEIGHT: f32 = 12.0;

/// Stub backend for tests and demos.
///
/// Either replays a fixed script of per-call results (cycling when the script
/// runs out) or simulates a school of fish drifting right by two pixels per
/// call.
pub struct StubBackend {
    mode: StubMode,
    calls: u64,
}

enum StubMode {
    Script(Vec<Vec<BoxDetection>>),
    School { fish: u32, classes: u32 },
}

impl StubBackend {
    /// A backend that never detects anything.
    pub fn new() -> Self {
        Self::scripted(Vec::new())
    }

    pub fn scripted(script: Vec<Vec<BoxDetection>>) -> Self {
        Self {
            mode: StubMode::Script(script),
            calls: 0,
        }
    }

    pub fn school(fish: u32) -> Self {
        Self {
            mode: StubMode::School { fish, classes: 1 },
            calls: 0,
        }
    }

    /// Parse `stub://school?fish=3&classes=1` or `stub://empty`.
    pub fn from_url(raw: &str) -> Result<Self> {
        let url = Url::parse(raw).with_context(|| format!("invalid stub weights '{}'", raw))?;
        match url.host_str().unwrap_or("school") {
            "empty" => Ok(Self::new()),
            "school" => {
                let mut fish = 3;
                let mut classes = 1;
                for (key, value) in url.query_pairs() {
                    match key.as_ref() {
                        "fish" => {
                            fish = value
                                .parse()
                                .map_err(|_| anyhow!("stub fish must be an integer: {}", value))?
                        }
                        "classes" => {
                            classes = value.parse().map_err(|_| {
                                anyhow!("stub classes must be an integer: {}", value)
                            })?
                        }
                        _ => {}
                    }
                }
                Ok(Self {
                    mode: StubMode::School {
                        fish,
                        classes: classes.max(1),
                    },
                    calls: 0,
                })
            }
            other => Err(anyhow!("unknown stub detector '{}'", other)),
        }
    }

    /// Number of `detect` calls so far.
    pub fn calls(&self) -> u64 {
        self.calls
    }

    fn school_boxes(&self, fish: u32, classes: u32, frame: &Frame) -> Vec<BoxDetection> {
        let span_x = (frame.width() as f32 - FISH_WIDTH).max(1.0);
        let span_y = (frame.height() as f32 - FISH_HEIGHT).max(1.0);
        (0..fish)
            .map(|i| {
                let x1 = (5.0 + 30.0 * i as f32 + 2.0 * self.calls as f32) % span_x;
                let y1 = (8.0 + 20.0 * i as f32) % span_y;
                let confidence = (0.9 - 0.05 * i as f32).max(0.3);
                BoxDetection::new(
                    BBox::new(x1, y1, x1 + FISH_WIDTH, y1 + FISH_HEIGHT),
                    i % classes,
                    confidence,
                )
            })
            .collect()
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, frame: &Frame) -> Result<InferenceResult> {
        let boxes = match &self.mode {
            StubMode::Script(script) if script.is_empty() => Vec::new(),
            StubMode::Script(script) => script[(self.calls as usize) % script.len()].clone(),
            StubMode::School { fish, classes } => self.school_boxes(*fish, *classes, frame),
        };
        self.calls += 1;
        Ok(InferenceResult::new(boxes))
    }
}

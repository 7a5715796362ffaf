use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::ingest::is_synthetic_path;

const DEFAULT_SOURCE: &str = "videos/first_hour.mp4.webm";
const DEFAULT_WEIGHTS: &str = "runs/detect/train/weights/best.onnx";
const DEFAULT_CONFIDENCE: f32 = 0.5;
const DEFAULT_LOG_DIR: &str = "dataset/outputs/logs";
const DEFAULT_PREVIEW_DIR: &str = "dataset/outputs/preview";
const DEFAULT_WEB_ADDR: &str = "127.0.0.1:8000";
const DEFAULT_MIN_SUBJECTS: usize = 3;

/// Environment variable naming an optional JSON defaults file.
pub const CONFIG_ENV: &str = "FISHCOUNT_CONFIG";

#[derive(Debug, Deserialize, Default)]
struct DefaultsFile {
    source: Option<PathBuf>,
    weights: Option<PathBuf>,
    confidence: Option<f32>,
    log_dir: Option<PathBuf>,
    preview_dir: Option<PathBuf>,
    web_addr: Option<String>,
    min_subjects: Option<usize>,
    font: Option<PathBuf>,
}

/// Project-wide defaults shared by the command-line tools and the web form.
///
/// Loaded once at start-up: built-in values, then the JSON file named by
/// `FISHCOUNT_CONFIG`, then `FISHCOUNT_*` environment overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct Defaults {
    pub source: PathBuf,
    pub weights: PathBuf,
    pub confidence: f32,
    pub log_dir: PathBuf,
    pub preview_dir: PathBuf,
    pub web_addr: String,
    pub min_subjects: usize,
    /// TrueType/OpenType font for box labels and chart text. `None` falls
    /// back to common system fonts.
    pub font: Option<PathBuf>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self::from_file(DefaultsFile::default())
    }
}

impl Defaults {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var(CONFIG_ENV).ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: DefaultsFile) -> Self {
        Self {
            source: file.source.unwrap_or_else(|| PathBuf::from(DEFAULT_SOURCE)),
            weights: file.weights.unwrap_or_else(|| PathBuf::from(DEFAULT_WEIGHTS)),
            confidence: file.confidence.unwrap_or(DEFAULT_CONFIDENCE),
            log_dir: file.log_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR)),
            preview_dir: file
                .preview_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PREVIEW_DIR)),
            web_addr: file
                .web_addr
                .unwrap_or_else(|| DEFAULT_WEB_ADDR.to_string()),
            min_subjects: file.min_subjects.unwrap_or(DEFAULT_MIN_SUBJECTS),
            font: file.font,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(source) = env_value("FISHCOUNT_SOURCE") {
            self.source = PathBuf::from(source);
        }
        if let Some(weights) = env_value("FISHCOUNT_WEIGHTS") {
            self.weights = PathBuf::from(weights);
        }
        if let Some(dir) = env_value("FISHCOUNT_LOG_DIR") {
            self.log_dir = PathBuf::from(dir);
        }
        if let Some(dir) = env_value("FISHCOUNT_PREVIEW_DIR") {
            self.preview_dir = PathBuf::from(dir);
        }
        if let Some(font) = env_value("FISHCOUNT_FONT") {
            self.font = Some(PathBuf::from(font));
        }
        if let Some(addr) = env_value("FISHCOUNT_WEB_ADDR") {
            self.web_addr = addr;
        }
        if let Some(conf) = env_value("FISHCOUNT_CONFIDENCE") {
            self.confidence = conf
                .trim()
                .parse()
                .map_err(|_| anyhow!("FISHCOUNT_CONFIDENCE must be a number between 0 and 1"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(ConfigError::InvalidConfidence(self.confidence).into());
        }
        if self.min_subjects == 0 {
            return Err(anyhow!("min_subjects must be at least 1"));
        }
        Ok(())
    }
}

/// Parameters of one detection run. Built once from CLI flags or form
/// fields and read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub source: PathBuf,
    pub weights: PathBuf,
    pub confidence: f32,
    pub stride: u64,
    pub start_seconds: f64,
    pub end_seconds: Option<f64>,
    pub tracker: bool,
    pub display: bool,
    /// Log file or directory; `None` disables logging.
    pub log_destination: Option<PathBuf>,
    /// Progress notification every N frames; 0 disables.
    pub progress_interval: u64,
    pub preview_dir: PathBuf,
    pub font: Option<PathBuf>,
}

impl RunConfig {
    /// A whole-video detection run with logging disabled.
    pub fn from_defaults(defaults: &Defaults) -> Self {
        Self {
            source: defaults.source.clone(),
            weights: defaults.weights.clone(),
            confidence: defaults.confidence,
            stride: 1,
            start_seconds: 0.0,
            end_seconds: None,
            tracker: false,
            display: false,
            log_destination: None,
            progress_interval: 0,
            preview_dir: defaults.preview_dir.clone(),
            font: defaults.font.clone(),
        }
    }

    /// Check everything that can be checked without opening the source.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_synthetic_path(&self.source) && !self.source.exists() {
            return Err(ConfigError::SourceNotFound(self.source.clone()));
        }
        if !is_synthetic_path(&self.weights) && !self.weights.exists() {
            return Err(ConfigError::WeightsNotFound(self.weights.clone()));
        }
        if self.stride == 0 {
            return Err(ConfigError::InvalidStride(self.stride));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(ConfigError::InvalidConfidence(self.confidence));
        }
        if self.start_seconds < 0.0 {
            return Err(ConfigError::NegativeStart(self.start_seconds));
        }
        if let Some(end) = self.end_seconds {
            if end <= self.start_seconds {
                return Err(ConfigError::EndNotAfterStart {
                    start: self.start_seconds,
                    end,
                });
            }
        }
        Ok(())
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<DefaultsFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

use std::path::PathBuf;

/// Configuration errors. These are detected before any I/O or inference runs.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    SourceNotFound(PathBuf),
    WeightsNotFound(PathBuf),
    NegativeStart(f64),
    EndNotAfterStart { start: f64, end: f64 },
    InvalidStride(u64),
    InvalidConfidence(f32),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::SourceNotFound(path) => {
                write!(f, "video source does not exist: {}", path.display())
            }
            ConfigError::WeightsNotFound(path) => {
                write!(f, "missing model weights: {}", path.display())
            }
            ConfigError::NegativeStart(start) => {
                write!(f, "start seconds cannot be negative (got {})", start)
            }
            ConfigError::EndNotAfterStart { start, end } => write!(
                f,
                "end seconds must be greater than start seconds (start={}, end={})",
                start, end
            ),
            ConfigError::InvalidStride(stride) => {
                write!(f, "stride must be at least 1 (got {})", stride)
            }
            ConfigError::InvalidConfidence(conf) => {
                write!(f, "confidence threshold must be within 0..=1 (got {})", conf)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

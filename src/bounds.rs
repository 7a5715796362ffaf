use crate::error::ConfigError;

/// Convert a requested time window into inclusive frame indices.
///
/// The end bound is optional; no clamping against the real video length is
/// done, so a bound past the end just yields a shorter (or empty) run.
pub fn compute_frame_bounds(
    fps: f64,
    start_seconds: f64,
    end_seconds: Option<f64>,
) -> Result<(u64, Option<u64>), ConfigError> {
    if start_seconds < 0.0 {
        return Err(ConfigError::NegativeStart(start_seconds));
    }
    if let Some(end) = end_seconds {
        if end <= start_seconds {
            return Err(ConfigError::EndNotAfterStart {
                start: start_seconds,
                end,
            });
        }
    }
    let start_frame = seconds_to_frame(start_seconds, fps);
    let end_frame = end_seconds.map(|end| seconds_to_frame(end, fps));
    Ok((start_frame, end_frame))
}

fn seconds_to_frame(seconds: f64, fps: f64) -> u64 {
    (seconds * fps).floor().max(0.0) as u64
}

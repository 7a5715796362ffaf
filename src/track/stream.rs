use anyhow::Result;

use super::Tracker;
use crate::detect::{DetectorBackend, InferenceResult};
use crate::frame::Frame;
use crate::ingest::FrameSource;

/// One sampled frame together with its tracked detections.
pub struct TrackedFrame {
    pub frame: Frame,
    pub result: InferenceResult,
}

/// Lazy, finite sequence of tracked frames.
///
/// Reads the source from its current position, keeps every `stride`-th frame,
/// runs detection and the tracker on it. Frame indices are not reported; the
/// consumer counts them itself. Once the source is exhausted or an error has
/// been yielded, the stream stays finished.
pub struct TrackStream<'a> {
    source: &'a mut dyn FrameSource,
    detector: &'a mut dyn DetectorBackend,
    tracker: &'a mut dyn Tracker,
    stride: u64,
    min_confidence: f32,
    started: bool,
    finished: bool,
}

impl<'a> TrackStream<'a> {
    pub fn new(
        source: &'a mut dyn FrameSource,
        detector: &'a mut dyn DetectorBackend,
        tracker: &'a mut dyn Tracker,
        stride: u64,
        min_confidence: f32,
    ) -> Self {
        Self {
            source,
            detector,
            tracker,
            stride: stride.max(1),
            min_confidence,
            started: false,
            finished: false,
        }
    }

    fn advance(&mut self) -> Result<Option<TrackedFrame>> {
        if self.started && self.stride > 1 {
            let wanted = self.stride - 1;
            if self.source.skip(wanted)? < wanted {
                return Ok(None);
            }
        }
        self.started = true;

        let Some(frame) = self.source.read()? else {
            return Ok(None);
        };
        let mut detections = self.detector.detect(&frame)?;
        detections.retain_confident(self.min_confidence);
        let tracked = self.tracker.update(&detections.boxes);
        Ok(Some(TrackedFrame {
            frame,
            result: InferenceResult::new(tracked),
        }))
    }
}

impl Iterator for TrackStream<'_> {
    type Item = Result<TrackedFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.advance() {
            Ok(Some(tracked)) => Some(Ok(tracked)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}

impl std::iter::FusedIterator for TrackStream<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::StubBackend;
    use crate::ingest::{SyntheticConfig, SyntheticSource};
    use crate::track::IouTracker;

    fn source(frames: u64) -> SyntheticSource {
        SyntheticSource::new(SyntheticConfig {
            frames,
            ..SyntheticConfig::default()
        })
    }

    #[test]
    fn stride_samples_every_nth_frame() {
        let mut source = source(10);
        let mut detector = StubBackend::school(2);
        let mut tracker = IouTracker::default();
        let stream = TrackStream::new(&mut source, &mut detector, &mut tracker, 3, 0.0);
        let results: Vec<_> = stream.collect::<Result<Vec<_>>>().unwrap();
        // frames 0, 3, 6, 9
        assert_eq!(results.len(), 4);
        assert_eq!(detector.calls(), 4);
    }

    #[test]
    fn results_carry_stable_track_ids() {
        let mut source = source(5);
        let mut detector = StubBackend::school(3);
        let mut tracker = IouTracker::default();
        let stream = TrackStream::new(&mut source, &mut detector, &mut tracker, 1, 0.0);
        let results: Vec<TrackedFrame> = stream.collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(results.len(), 5);
        for tracked in &results {
            let ids: Vec<Option<u64>> = tracked.result.boxes.iter().map(|b| b.track_id).collect();
            assert_eq!(ids, vec![Some(1), Some(2), Some(3)]);
        }
    }

    #[test]
    fn stream_is_fused_after_exhaustion() {
        let mut source = source(1);
        let mut detector = StubBackend::new();
        let mut tracker = IouTracker::default();
        let mut stream = TrackStream::new(&mut source, &mut detector, &mut tracker, 1, 0.0);
        assert!(stream.next().is_some());
        assert!(stream.next().is_none());
        assert!(stream.next().is_none());
    }
}

use std::cmp::Ordering;

use super::Tracker;
use crate::detect::{BBox, BoxDetection};

/// Two-stage IoU association in the style of ByteTrack.
///
/// High-confidence boxes are matched against every live track first; the
/// remaining tracks that were seen on the previous frame then get a chance to
/// claim low-confidence boxes. Only high-confidence leftovers start new
/// tracks. Tracks survive `max_lost_frames` updates without a match.
#[derive(Clone, Debug)]
pub struct TrackerConfig {
    pub high_threshold: f32,
    pub low_threshold: f32,
    pub new_track_threshold: f32,
    pub min_iou: f32,
    pub max_lost_frames: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            high_threshold: 0.5,
            low_threshold: 0.1,
            new_track_threshold: 0.6,
            min_iou: 0.2,
            max_lost_frames: 30,
        }
    }
}

#[derive(Clone, Debug)]
struct Track {
    id: u64,
    bbox: BBox,
    frames_lost: u32,
}

pub struct IouTracker {
    config: TrackerConfig,
    tracks: Vec<Track>,
    next_id: u64,
}

impl IouTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: Vec::new(),
            next_id: 1,
        }
    }

    /// Number of tracks currently held (matched or coasting).
    pub fn live_tracks(&self) -> usize {
        self.tracks.len()
    }
}

impl Default for IouTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl Tracker for IouTracker {
    fn update(&mut self, boxes: &[BoxDetection]) -> Vec<BoxDetection> {
        let high: Vec<usize> = (0..boxes.len())
            .filter(|&i| boxes[i].confidence >= self.config.high_threshold)
            .collect();
        let low: Vec<usize> = (0..boxes.len())
            .filter(|&i| {
                let conf = boxes[i].confidence;
                conf >= self.config.low_threshold && conf < self.config.high_threshold
            })
            .collect();

        let mut assigned: Vec<Option<u64>> = vec![None; boxes.len()];
        let mut track_matched = vec![false; self.tracks.len()];

        let all_tracks: Vec<usize> = (0..self.tracks.len()).collect();
        let min_iou = self.config.min_iou;
        for (det, track) in greedy_match(boxes, &high, &self.tracks, &all_tracks, min_iou) {
            assigned[det] = Some(self.tracks[track].id);
            track_matched[track] = true;
        }

        let recent_unmatched: Vec<usize> = (0..self.tracks.len())
            .filter(|&t| !track_matched[t] && self.tracks[t].frames_lost == 0)
            .collect();
        for (det, track) in greedy_match(boxes, &low, &self.tracks, &recent_unmatched, min_iou) {
            assigned[det] = Some(self.tracks[track].id);
            track_matched[track] = true;
        }

        for (index, track) in self.tracks.iter_mut().enumerate() {
            if track_matched[index] {
                track.frames_lost = 0;
            } else {
                track.frames_lost += 1;
            }
        }
        for (det, id) in assigned.iter().enumerate() {
            if let Some(id) = id {
                if let Some(track) = self.tracks.iter_mut().find(|t| t.id == *id) {
                    track.bbox = boxes[det].bbox;
                }
            }
        }
        let max_lost = self.config.max_lost_frames;
        self.tracks.retain(|t| t.frames_lost <= max_lost);

        for &det in &high {
            let confident = boxes[det].confidence >= self.config.new_track_threshold;
            if assigned[det].is_none() && confident {
                let id = self.next_id;
                self.next_id += 1;
                self.tracks.push(Track {
                    id,
                    bbox: boxes[det].bbox,
                    frames_lost: 0,
                });
                assigned[det] = Some(id);
            }
        }

        boxes
            .iter()
            .zip(assigned)
            .filter_map(|(det, id)| id.map(|id| det.clone().with_track_id(id)))
            .collect()
    }
}

/// Pair detections with tracks by descending IoU, each used at most once.
fn greedy_match(
    boxes: &[BoxDetection],
    detections: &[usize],
    tracks: &[Track],
    candidates: &[usize],
    min_iou: f32,
) -> Vec<(usize, usize)> {
    let mut pairs: Vec<(f32, usize, usize)> = Vec::new();
    for &det in detections {
        for &track in candidates {
            let iou = boxes[det].bbox.iou(&tracks[track].bbox);
            if iou >= min_iou {
                pairs.push((iou, det, track));
            }
        }
    }
    pairs.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

    let mut used_dets = Vec::new();
    let mut used_tracks = Vec::new();
    let mut matches = Vec::new();
    for (_, det, track) in pairs {
        if used_dets.contains(&det) || used_tracks.contains(&track) {
            continue;
        }
        used_dets.push(det);
        used_tracks.push(track);
        matches.push((det, track));
    }
    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fish(x: f32, conf: f32) -> BoxDetection {
        BoxDetection::new(BBox::new(x, 10.0, x + 20.0, 22.0), 0, conf)
    }

    fn ids(boxes: &[BoxDetection]) -> Vec<u64> {
        boxes.iter().map(|b| b.track_id.unwrap()).collect()
    }

    #[test]
    fn ids_stay_stable_for_moving_boxes() {
        let mut tracker = IouTracker::default();
        let first = tracker.update(&[fish(0.0, 0.9), fish(100.0, 0.9)]);
        assert_eq!(ids(&first), vec![1, 2]);

        let second = tracker.update(&[fish(102.0, 0.9), fish(3.0, 0.9)]);
        assert_eq!(ids(&second), vec![2, 1]);

        let third = tracker.update(&[fish(6.0, 0.9), fish(104.0, 0.9), fish(200.0, 0.9)]);
        assert_eq!(ids(&third), vec![1, 2, 3]);
    }

    #[test]
    fn low_confidence_boxes_only_extend_tracks() {
        let mut tracker = IouTracker::default();
        tracker.update(&[fish(0.0, 0.9)]);

        let out = tracker.update(&[fish(2.0, 0.3), fish(150.0, 0.3)]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].track_id, Some(1));
        assert_eq!(out[0].bbox.x1, 2.0);
    }

    #[test]
    fn unconfident_new_objects_do_not_start_tracks() {
        let mut tracker = IouTracker::default();
        let out = tracker.update(&[fish(0.0, 0.55)]);
        assert!(out.is_empty());
        assert_eq!(tracker.live_tracks(), 0);
    }

    #[test]
    fn lost_tracks_recover_within_buffer_and_expire_after() {
        let mut tracker = IouTracker::new(TrackerConfig {
            max_lost_frames: 2,
            ..TrackerConfig::default()
        });
        tracker.update(&[fish(0.0, 0.9)]);
        tracker.update(&[]);
        tracker.update(&[]);
        let back = tracker.update(&[fish(1.0, 0.9)]);
        assert_eq!(ids(&back), vec![1]);

        tracker.update(&[]);
        tracker.update(&[]);
        tracker.update(&[]);
        assert_eq!(tracker.live_tracks(), 0);
        let fresh = tracker.update(&[fish(1.0, 0.9)]);
        assert_eq!(ids(&fresh), vec![2]);
    }
}

// src/tracker.rs

use crate::types::{box_iou, Detection};
use tracing::debug;

const CONFIRM_HITS: u32 = 2;

#[derive(Debug, Clone)]
struct TrackEntry {
    id: u64,
    bbox: [f32; 4],
    hits: u32,
    misses: u32,
}

/// Greedy IoU association across consecutive frames.
///
/// Owned by the caller for the lifetime of one video; ids are stable while
/// the same physical object stays matched. A track must be observed on two
/// frames before its id is exported — until then the detection's
/// `track_id` stays `None` and downstream accounting ignores it.
#[derive(Debug)]
pub struct TrackerContext {
    tracks: Vec<TrackEntry>,
    next_id: u64,
    iou_threshold: f32,
    max_misses: u32,
}

impl TrackerContext {
    pub fn new(iou_threshold: f32, max_misses: u32) -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 1,
            iou_threshold,
            max_misses,
        }
    }

    /// Associate this frame's detections with existing tracks and stamp
    /// confirmed track ids onto them.
    pub fn update(&mut self, mut detections: Vec<Detection>) -> Vec<Detection> {
        let mut matched_track = vec![false; self.tracks.len()];
        let mut matched_det = vec![false; detections.len()];

        // Highest-IoU pairs first.
        let mut candidates = Vec::new();
        for (ti, track) in self.tracks.iter().enumerate() {
            for (di, det) in detections.iter().enumerate() {
                let iou = box_iou(&track.bbox, &det.bbox);
                if iou >= self.iou_threshold {
                    candidates.push((iou, ti, di));
                }
            }
        }
        candidates.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        for (_, ti, di) in candidates {
            if matched_track[ti] || matched_det[di] {
                continue;
            }
            matched_track[ti] = true;
            matched_det[di] = true;

            let track = &mut self.tracks[ti];
            track.bbox = detections[di].bbox;
            track.hits += 1;
            track.misses = 0;
            if track.hits >= CONFIRM_HITS {
                detections[di].track_id = Some(track.id);
            }
        }

        // Unmatched detections open new tracks; no id is exported for the
        // first observation.
        for (di, det) in detections.iter().enumerate() {
            if !matched_det[di] {
                self.tracks.push(TrackEntry {
                    id: self.next_id,
                    bbox: det.bbox,
                    hits: 1,
                    misses: 0,
                });
                self.next_id += 1;
            }
        }

        // Age out tracks that keep missing.
        for (ti, track) in self.tracks.iter_mut().enumerate() {
            if ti < matched_track.len() && !matched_track[ti] {
                track.misses += 1;
            }
        }
        let before = self.tracks.len();
        let max_misses = self.max_misses;
        self.tracks.retain(|t| t.misses <= max_misses);
        if self.tracks.len() < before {
            debug!("retired {} stale tracks", before - self.tracks.len());
        }

        detections
    }

    pub fn active_tracks(&self) -> usize {
        self.tracks.len()
    }
}

impl Default for TrackerContext {
    fn default() -> Self {
        Self::new(0.3, 30)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(bbox: [f32; 4]) -> Detection {
        Detection::new(bbox, 0.9, 1)
    }

    #[test]
    fn test_first_observation_has_no_id() {
        let mut tracker = TrackerContext::default();
        let out = tracker.update(vec![det([10.0, 10.0, 50.0, 50.0])]);
        assert_eq!(out[0].track_id, None);
    }

    #[test]
    fn test_id_assigned_on_second_observation_and_stable() {
        let mut tracker = TrackerContext::default();
        tracker.update(vec![det([10.0, 10.0, 50.0, 50.0])]);
        let second = tracker.update(vec![det([12.0, 11.0, 52.0, 51.0])]);
        let id = second[0].track_id.expect("confirmed on second frame");

        let third = tracker.update(vec![det([14.0, 12.0, 54.0, 52.0])]);
        assert_eq!(third[0].track_id, Some(id));
    }

    #[test]
    fn test_distinct_objects_get_distinct_ids() {
        let mut tracker = TrackerContext::default();
        let frame = vec![det([0.0, 0.0, 20.0, 20.0]), det([100.0, 100.0, 140.0, 140.0])];
        tracker.update(frame.clone());
        let out = tracker.update(frame);
        let a = out[0].track_id.unwrap();
        let b = out[1].track_id.unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_track_retired_after_max_misses() {
        let mut tracker = TrackerContext::new(0.3, 2);
        tracker.update(vec![det([10.0, 10.0, 50.0, 50.0])]);
        tracker.update(vec![det([10.0, 10.0, 50.0, 50.0])]);
        assert_eq!(tracker.active_tracks(), 1);

        for _ in 0..3 {
            tracker.update(Vec::new());
        }
        assert_eq!(tracker.active_tracks(), 0);
    }

    #[test]
    fn test_reappearing_object_gets_fresh_id() {
        let mut tracker = TrackerContext::new(0.3, 0);
        tracker.update(vec![det([10.0, 10.0, 50.0, 50.0])]);
        let confirmed = tracker.update(vec![det([10.0, 10.0, 50.0, 50.0])]);
        let first_id = confirmed[0].track_id.unwrap();

        // Gone long enough to retire, then back.
        tracker.update(Vec::new());
        tracker.update(vec![det([10.0, 10.0, 50.0, 50.0])]);
        let back = tracker.update(vec![det([10.0, 10.0, 50.0, 50.0])]);
        assert_ne!(back[0].track_id.unwrap(), first_id);
    }
}

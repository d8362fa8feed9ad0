// src/types.rs

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Classifier label set. Index 0 is the lesioned class.
pub const SCTLD_CLASSES: [&str; 2] = ["sctld_coral", "unaffected_coral"];

/// Detector label set.
pub const DETECTOR_CLASSES: [&str; 2] = ["SCTLD", "Coral"];

/// Classifier label index meaning "SCTLD-affected coral".
pub const AFFECTED_LABEL: usize = 0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub model: ModelConfig,
    pub inference: InferenceConfig,
    pub detection: DetectionConfig,
    pub video: VideoConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub detector_path: String,
    pub classifier_path: String,
    pub detector_input_size: usize,
    pub detector_classes: usize,
    pub classifier_input_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    pub use_cuda: bool,
    pub num_threads: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    pub detect_conf_threshold: f32,
    pub classify_conf_threshold: f32,
    pub nms_iou_threshold: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    pub input_dir: String,
    pub output_dir: String,
    pub frame_skip: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

/// Confidence cutoffs for one pipeline invocation. Both comparisons are
/// inclusive: a score exactly at the cutoff is kept.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub detect_conf: f32,
    pub classify_conf: f32,
}

/// Channel order of a frame buffer. Decoders hand out `Bgr`; everything
/// downstream of display normalization works in `Rgb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelOrder {
    Bgr,
    Rgb,
}

/// One raw video or image frame, 8-bit interleaved, 3 channels.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
    pub timestamp_ms: f64,
    pub order: PixelOrder,
}

impl Frame {
    pub fn new(
        data: Vec<u8>,
        width: usize,
        height: usize,
        timestamp_ms: f64,
        order: PixelOrder,
    ) -> Self {
        Self {
            data,
            width,
            height,
            timestamp_ms,
            order,
        }
    }

    /// Normalize to display channel order. Idempotent: an `Rgb` frame is
    /// returned untouched, so this can sit on every path without ever
    /// converting twice.
    pub fn into_display(mut self) -> Self {
        if self.order == PixelOrder::Rgb {
            return self;
        }
        for px in self.data.chunks_exact_mut(3) {
            px.swap(0, 2);
        }
        self.order = PixelOrder::Rgb;
        self
    }
}

/// One candidate coral region from the detector.
///
/// Invariant: `x1 <= x2`, `y1 <= y2`, coordinates inside frame bounds.
/// `clip_to` establishes this after postprocessing; degenerate (zero-area)
/// boxes survive clipping and are skipped at crop time.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: [f32; 4], // [x1, y1, x2, y2] in original image coordinates
    pub confidence: f32,
    pub class_id: usize,
    pub track_id: Option<u64>,
}

impl Detection {
    pub fn new(bbox: [f32; 4], confidence: f32, class_id: usize) -> Self {
        Self {
            bbox,
            confidence,
            class_id,
            track_id: None,
        }
    }

    pub fn clip_to(&mut self, width: usize, height: usize) {
        let w = width as f32;
        let h = height as f32;
        let [x1, y1, x2, y2] = self.bbox;
        let (x1, x2) = if x1 <= x2 { (x1, x2) } else { (x2, x1) };
        let (y1, y2) = if y1 <= y2 { (y1, y2) } else { (y2, y1) };
        self.bbox = [
            x1.clamp(0.0, w),
            y1.clamp(0.0, h),
            x2.clamp(0.0, w),
            y2.clamp(0.0, h),
        ];
    }

    /// Box area in square pixels, never negative.
    pub fn area(&self) -> f64 {
        let w = (self.bbox[2] - self.bbox[0]).max(0.0) as f64;
        let h = (self.bbox[3] - self.bbox[1]).max(0.0) as f64;
        w * h
    }

    pub fn class_name(&self) -> &'static str {
        DETECTOR_CLASSES
            .get(self.class_id)
            .copied()
            .unwrap_or("Coral")
    }
}

/// Intersection-over-union of two corner-format boxes.
pub fn box_iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    let union = area_a + area_b - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// Classifier verdict for one detected region. Points back at the
/// detection by index into the frame's detection list.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub label: usize,
    pub confidence: f32,
    pub detection_index: usize,
}

impl Classification {
    pub fn is_affected(&self) -> bool {
        self.label == AFFECTED_LABEL
    }

    pub fn class_name(&self) -> &'static str {
        SCTLD_CLASSES.get(self.label).copied().unwrap_or("unknown")
    }
}

/// Everything the frame pipeline produced for one still frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameResult {
    pub regions: Vec<(Detection, Option<Classification>)>,
    pub coverage_ratio: f64,
}

impl FrameResult {
    pub fn empty() -> Self {
        Self {
            regions: Vec::new(),
            coverage_ratio: 0.0,
        }
    }
}

/// Cross-frame bookkeeping for one video session. Created at the start of
/// a video, discarded at the end, never shared between requests.
#[derive(Debug, Default)]
pub struct TrackState {
    pub seen_ids: HashSet<u64>,
    pub total_area_accum: f64,
    pub affected_area_accum: f64,
}

impl TrackState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observed track id. Union semantics: re-observations are
    /// no-ops, so the set only ever grows.
    pub fn observe(&mut self, track_id: u64) {
        self.seen_ids.insert(track_id);
    }

    pub fn absorb(&mut self, total_area: f64, affected_area: f64) {
        self.total_area_accum += total_area;
        self.affected_area_accum += affected_area;
    }

    /// Whole-session coverage ratio; 0 when nothing was observed.
    pub fn coverage_ratio(&self) -> f64 {
        if self.total_area_accum > 0.0 {
            self.affected_area_accum / self.total_area_accum
        } else {
            0.0
        }
    }

    pub fn unique_corals(&self) -> usize {
        self.seen_ids.len()
    }
}

/// Final outcome of one processed video.
#[derive(Debug, Clone, Serialize)]
pub struct VideoSummary {
    pub output_ref: String,
    pub coverage_ratio: f64,
    pub unique_corals: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_display_swaps_channels_once() {
        let frame = Frame::new(vec![10, 20, 30, 40, 50, 60], 2, 1, 0.0, PixelOrder::Bgr);
        let rgb = frame.into_display();
        assert_eq!(rgb.order, PixelOrder::Rgb);
        assert_eq!(rgb.data, vec![30, 20, 10, 60, 50, 40]);
    }

    #[test]
    fn test_into_display_is_idempotent() {
        let frame = Frame::new(vec![10, 20, 30], 1, 1, 0.0, PixelOrder::Bgr);
        let once = frame.into_display();
        let twice = once.clone().into_display();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_clip_keeps_box_inside_frame() {
        let mut det = Detection::new([-5.0, -2.0, 700.0, 500.0], 0.9, 1);
        det.clip_to(640, 480);
        assert_eq!(det.bbox, [0.0, 0.0, 640.0, 480.0]);
    }

    #[test]
    fn test_clip_reorders_inverted_corners() {
        let mut det = Detection::new([100.0, 80.0, 40.0, 20.0], 0.9, 1);
        det.clip_to(640, 480);
        assert_eq!(det.bbox, [40.0, 20.0, 100.0, 80.0]);
        assert_eq!(det.area(), 60.0 * 60.0);
    }

    #[test]
    fn test_area_of_degenerate_box_is_zero() {
        let det = Detection::new([10.0, 10.0, 10.0, 30.0], 0.9, 1);
        assert_eq!(det.area(), 0.0);
    }

    #[test]
    fn test_iou_disjoint_and_identical() {
        let a = [0.0, 0.0, 10.0, 10.0];
        let b = [20.0, 20.0, 30.0, 30.0];
        assert_eq!(box_iou(&a, &b), 0.0);
        assert!((box_iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_track_state_set_only_grows() {
        let mut state = TrackState::new();
        state.observe(3);
        state.observe(7);
        state.observe(3);
        assert_eq!(state.unique_corals(), 2);
    }

    #[test]
    fn test_coverage_ratio_zero_denominator() {
        let state = TrackState::new();
        assert_eq!(state.coverage_ratio(), 0.0);
    }

    #[test]
    fn test_coverage_ratio_accumulates() {
        let mut state = TrackState::new();
        state.absorb(100.0, 25.0);
        state.absorb(100.0, 25.0);
        assert!((state.coverage_ratio() - 0.25).abs() < 1e-9);
    }
}

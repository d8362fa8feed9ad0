// src/pipeline.rs
//
// The single parameterized frame pipeline: detect, crop, classify in one
// batch, filter, aggregate. Tracking is a capability of the second entry
// point, not a separate copy of the logic.

use crate::annotate::{annotate, tracked_label, BoxLabel, Style};
use crate::classify::{top_class, CropClassifier};
use crate::detect::ObjectDetector;
use crate::error::{Error, Result};
use crate::preprocessing::{crop_region, resize_crop};
use crate::tracker::TrackerContext;
use crate::types::{Classification, Detection, Frame, FrameResult, Thresholds, TrackState};
use tracing::debug;

/// Per-frame output of the tracking pipeline. Carries the raw area
/// numerator/denominator so the video driver can accumulate them without
/// premature division.
#[derive(Debug)]
pub struct TrackedFrameOutcome {
    pub frame: Frame,
    pub coverage_ratio: f64,
    pub total_area: f64,
    pub affected_area: f64,
}

pub struct FramePipeline<'m, D: ObjectDetector, C: CropClassifier> {
    detector: &'m mut D,
    classifier: &'m mut C,
    classifier_input: usize,
}

impl<'m, D: ObjectDetector, C: CropClassifier> FramePipeline<'m, D, C> {
    pub fn new(detector: &'m mut D, classifier: &'m mut C, classifier_input: usize) -> Self {
        Self {
            detector,
            classifier,
            classifier_input,
        }
    }

    /// Run the full compositing pass over one still frame.
    ///
    /// Returns the display-normalized frame alongside the result so
    /// callers can annotate without converting again. The coverage ratio
    /// uses every detection past the detector threshold as denominator
    /// and only classified-affected detections as numerator; a region
    /// whose crop was skipped or whose classification fell under the
    /// cutoff still counts toward the denominator.
    pub fn run_frame(&mut self, frame: Frame, thresholds: &Thresholds) -> Result<(Frame, FrameResult)> {
        // Display normalization runs exactly once per frame; the empty
        // path below returns the already-normalized frame.
        let frame = frame.into_display();

        let mut detections = self.detector.detect(&frame, thresholds.detect_conf)?;
        detections.retain(|d| d.confidence >= thresholds.detect_conf);

        if detections.is_empty() {
            return Ok((frame, FrameResult::empty()));
        }

        let classifications =
            self.classify_regions(&frame, &detections, thresholds.classify_conf)?;
        let (total_area, affected_area) = area_totals(&detections, &classifications);
        let coverage_ratio = ratio(affected_area, total_area);

        let regions = detections.into_iter().zip(classifications).collect();
        Ok((
            frame,
            FrameResult {
                regions,
                coverage_ratio,
            },
        ))
    }

    /// Tracking variant: detections are associated across frames through
    /// `tracker`, observed ids are folded into `state`, and affected
    /// regions are drawn onto the returned frame.
    ///
    /// Detections without a confirmed track id are excluded from the
    /// frame's accounting entirely — an inherited simplification that
    /// undercounts corals on the frame they first appear.
    ///
    /// Each affected detection contributes its own box area to
    /// `affected_area` (the upstream implementation this replaces
    /// re-added the last iterated box instead).
    pub fn run_tracked_frame(
        &mut self,
        frame: Frame,
        tracker: &mut TrackerContext,
        state: &mut TrackState,
        thresholds: &Thresholds,
        style: &Style,
    ) -> Result<TrackedFrameOutcome> {
        let frame = frame.into_display();

        let mut detections =
            self.detector
                .detect_tracked(&frame, tracker, thresholds.detect_conf)?;
        detections.retain(|d| d.confidence >= thresholds.detect_conf);

        let candidates = detections.len();
        detections.retain(|d| d.track_id.is_some());
        if detections.len() < candidates {
            debug!(
                "excluded {} detections without a track id",
                candidates - detections.len()
            );
        }

        if detections.is_empty() {
            return Ok(TrackedFrameOutcome {
                frame,
                coverage_ratio: 0.0,
                total_area: 0.0,
                affected_area: 0.0,
            });
        }

        for det in &detections {
            if let Some(id) = det.track_id {
                state.observe(id);
            }
        }

        let classifications =
            self.classify_regions(&frame, &detections, thresholds.classify_conf)?;
        let (total_area, affected_area) = area_totals(&detections, &classifications);

        let boxes: Vec<BoxLabel> = detections
            .iter()
            .zip(&classifications)
            .filter_map(|(det, cls)| match (det.track_id, cls) {
                (Some(id), Some(c)) if c.is_affected() => Some(BoxLabel {
                    bbox: det.bbox,
                    text: tracked_label(id, c.confidence),
                }),
                _ => None,
            })
            .collect();
        let frame = annotate(&frame, &boxes, style)?;

        Ok(TrackedFrameOutcome {
            frame,
            coverage_ratio: ratio(affected_area, total_area),
            total_area,
            affected_area,
        })
    }

    /// Crop every detection, batch the crops into ONE classifier call, and
    /// map kept results back onto detections by index. Zero-area crops are
    /// skipped (their detection keeps `None`); a result-count mismatch is
    /// an inference error, never silently realigned.
    fn classify_regions(
        &mut self,
        frame: &Frame,
        detections: &[Detection],
        classify_conf: f32,
    ) -> Result<Vec<Option<Classification>>> {
        let mut indexed_crops = Vec::with_capacity(detections.len());
        for (i, det) in detections.iter().enumerate() {
            if let Some(crop) = crop_region(frame, det) {
                indexed_crops.push((i, resize_crop(&crop, self.classifier_input)));
            }
        }

        let mut results = vec![None; detections.len()];
        if indexed_crops.is_empty() {
            return Ok(results);
        }

        let crops: Vec<_> = indexed_crops.iter().map(|(_, c)| c.clone()).collect();
        let distributions = self.classifier.classify_batch(&crops)?;
        if distributions.len() != crops.len() {
            return Err(Error::ModelInference(format!(
                "classifier returned {} distributions for {} crops",
                distributions.len(),
                crops.len()
            )));
        }

        for ((det_index, _), dist) in indexed_crops.iter().zip(distributions) {
            let (label, confidence) = top_class(&dist);
            // Inclusive, same as the detector cutoff.
            if confidence >= classify_conf {
                results[*det_index] = Some(Classification {
                    label,
                    confidence,
                    detection_index: *det_index,
                });
            }
        }

        Ok(results)
    }
}

/// Denominator over all detections, numerator over the classified-affected
/// subset, each detection weighted by its own clipped box area.
fn area_totals(detections: &[Detection], classifications: &[Option<Classification>]) -> (f64, f64) {
    let mut total = 0.0;
    let mut affected = 0.0;
    for (det, cls) in detections.iter().zip(classifications) {
        let area = det.area();
        total += area;
        if cls.as_ref().is_some_and(|c| c.is_affected()) {
            affected += area;
        }
    }
    (total, affected)
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

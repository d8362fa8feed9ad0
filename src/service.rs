// src/service.rs
//
// The three use-case entry points the serving layer calls. Each takes raw
// bytes plus numeric thresholds and returns data-model values; HTTP,
// uploads, and request policy all live above this boundary.

use crate::annotate::{annotate, detection_label, BoxLabel, Style};
use crate::detect::ObjectDetector;
use crate::error::{Error, Result};
use crate::image_io;
use crate::pipeline::FramePipeline;
use crate::registry::ModelRegistry;
use crate::storage::ArtifactStore;
use crate::tracker::TrackerContext;
use crate::types::{FrameResult, Thresholds, VideoSummary};
use crate::video::{process_video, FrameSource, VideoFileSink, VideoReader};
use std::io::Write;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

/// Annotated image plus the structured result it was drawn from.
#[derive(Debug)]
pub struct ImageAssessment {
    pub image: Vec<u8>,
    pub result: FrameResult,
}

/// Detect coral regions in one image and return it re-encoded with every
/// detection drawn. No classification pass.
pub fn detect_image(registry: &ModelRegistry, image: &[u8], detect_conf: f32) -> Result<Vec<u8>> {
    let frame = image_io::decode_image(image)?.into_display();

    let models = registry.current();
    let mut detector = lock(&models.detector)?;
    let mut detections = detector.detect(&frame, detect_conf)?;
    detections.retain(|d| d.confidence >= detect_conf);
    info!("detect_image: {} coral regions", detections.len());

    let boxes: Vec<BoxLabel> = detections
        .iter()
        .map(|d| BoxLabel {
            bbox: d.bbox,
            text: detection_label(d.class_name(), d.confidence),
        })
        .collect();

    let annotated = annotate(&frame, &boxes, &Style::default())?;
    image_io::encode_jpeg(&annotated)
}

/// Detect, classify, and annotate one image; lesioned regions are drawn
/// with their classification confidence.
pub fn assess_image(
    registry: &ModelRegistry,
    image: &[u8],
    thresholds: &Thresholds,
) -> Result<ImageAssessment> {
    let frame = image_io::decode_image(image)?;

    let models = registry.current();
    let mut detector = lock(&models.detector)?;
    let mut classifier = lock(&models.classifier)?;
    let classifier_input = classifier.input_size();

    let mut pipeline = FramePipeline::new(&mut *detector, &mut *classifier, classifier_input);
    let (frame, result) = pipeline.run_frame(frame, thresholds)?;
    info!(
        "assess_image: {} regions, coverage {:.2}%",
        result.regions.len(),
        result.coverage_ratio * 100.0
    );

    let boxes: Vec<BoxLabel> = result
        .regions
        .iter()
        .filter_map(|(det, cls)| {
            cls.as_ref()
                .filter(|c| c.is_affected())
                .map(|c| BoxLabel {
                    bbox: det.bbox,
                    text: detection_label("SCTLD", c.confidence),
                })
        })
        .collect();

    let annotated = annotate(&frame, &boxes, &Style::default())?;
    Ok(ImageAssessment {
        image: image_io::encode_jpeg(&annotated)?,
        result,
    })
}

/// Track, classify, and annotate a whole video, then hand the encoded
/// artifact to `store`. Tracker and track-state live and die inside this
/// call; nothing is shared across requests.
pub fn assess_video(
    registry: &ModelRegistry,
    video: &[u8],
    frame_skip: usize,
    thresholds: &Thresholds,
    store: &dyn ArtifactStore,
) -> Result<VideoSummary> {
    let mut input = tempfile::Builder::new()
        .suffix(".mp4")
        .tempfile()
        .map_err(|e| Error::InvalidInput(format!("input temp file: {e}")))?;
    input
        .write_all(video)
        .map_err(|e| Error::InvalidInput(format!("input temp file: {e}")))?;
    input
        .flush()
        .map_err(|e| Error::InvalidInput(format!("input temp file: {e}")))?;

    let mut reader = VideoReader::open(input.path())?;
    let fps = if reader.fps() > 0.0 { reader.fps() } else { 20.0 };
    let (width, height) = reader.frame_size();
    let mut sink = VideoFileSink::create(fps, width, height)?;

    let models = registry.current();
    let mut detector = lock(&models.detector)?;
    let mut classifier = lock(&models.classifier)?;
    let classifier_input = classifier.input_size();

    let mut pipeline = FramePipeline::new(&mut *detector, &mut *classifier, classifier_input);
    let mut tracker = TrackerContext::default();
    let style = Style::default();

    process_video(
        &mut reader,
        frame_skip,
        |frame, state| pipeline.run_tracked_frame(frame, &mut tracker, state, thresholds, &style),
        &mut sink,
        store,
    )
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| Error::ModelInference("model adapter lock poisoned".into()))
}

// src/detect.rs

use crate::error::{Error, Result};
use crate::preprocessing;
use crate::tracker::TrackerContext;
use crate::types::{box_iou, Detection, Frame, InferenceConfig, ModelConfig, PixelOrder};
use ort::{
    execution_providers::CUDAExecutionProvider,
    session::{builder::GraphOptimizationLevel, Session},
};
use tracing::{debug, info};

/// Object detector seam. The pipeline only sees this trait; the ONNX
/// implementation below is one provider, test mocks are another.
pub trait ObjectDetector {
    /// Detect coral regions with confidence at or above `conf_threshold`
    /// (inclusive). Returned boxes are clipped to frame bounds.
    fn detect(&mut self, frame: &Frame, conf_threshold: f32) -> Result<Vec<Detection>>;

    /// Detect and associate with the caller's tracker context, stamping
    /// stable `track_id`s on detections whose track is confirmed.
    fn detect_tracked(
        &mut self,
        frame: &Frame,
        tracker: &mut TrackerContext,
        conf_threshold: f32,
    ) -> Result<Vec<Detection>> {
        let detections = self.detect(frame, conf_threshold)?;
        Ok(tracker.update(detections))
    }
}

/// YOLO-family coral detector running through ONNX Runtime.
pub struct CoralDetector {
    session: Session,
    input_size: usize,
    num_classes: usize,
    nms_iou_threshold: f32,
}

impl CoralDetector {
    pub fn new(model: &ModelConfig, inference: &InferenceConfig, nms_iou_threshold: f32) -> Result<Self> {
        info!("Loading coral detector: {}", model.detector_path);

        let mut builder = Session::builder()?;
        if inference.use_cuda {
            builder = builder
                .with_execution_providers([CUDAExecutionProvider::default().build()])?;
        }
        let session = builder
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(inference.num_threads)?
            .commit_from_file(&model.detector_path)?;

        info!("✓ Coral detector initialized");
        Ok(Self {
            session,
            input_size: model.detector_input_size,
            num_classes: model.detector_classes,
            nms_iou_threshold,
        })
    }

    fn infer(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        let shape = [1, 3, self.input_size, self.input_size];
        let input_value =
            ort::value::Value::from_array((shape.as_slice(), input.to_vec().into_boxed_slice()))?;

        let outputs = self.session.run(ort::inputs!["images" => input_value])?;
        let output = &outputs[0];
        let (_, data) = output.try_extract_tensor::<f32>()?;

        Ok(data.to_vec())
    }

    /// Parse raw YOLO output `[1, 4 + num_classes, anchors]` into clipped,
    /// NMS-filtered detections.
    fn postprocess(
        &self,
        output: &[f32],
        scale: f32,
        pad_x: f32,
        pad_y: f32,
        conf_threshold: f32,
        frame_width: usize,
        frame_height: usize,
    ) -> Result<Vec<Detection>> {
        let stride = 4 + self.num_classes;
        if output.is_empty() || output.len() % stride != 0 {
            return Err(Error::ModelInference(format!(
                "unexpected detector output length {} for {} classes",
                output.len(),
                self.num_classes
            )));
        }
        let anchors = output.len() / stride;

        let mut detections = Vec::new();
        for i in 0..anchors {
            let cx = output[i];
            let cy = output[anchors + i];
            let w = output[anchors * 2 + i];
            let h = output[anchors * 3 + i];

            let mut max_conf = 0.0f32;
            let mut best_class = 0;
            for c in 0..self.num_classes {
                let conf = output[anchors * (4 + c) + i];
                if conf > max_conf {
                    max_conf = conf;
                    best_class = c;
                }
            }

            // Inclusive cutoff: a score exactly at the threshold stays.
            if max_conf < conf_threshold {
                continue;
            }

            // Center format -> corner format, then undo the letterbox.
            let x1 = (cx - w / 2.0 - pad_x) / scale;
            let y1 = (cy - h / 2.0 - pad_y) / scale;
            let x2 = (cx + w / 2.0 - pad_x) / scale;
            let y2 = (cy + h / 2.0 - pad_y) / scale;

            let mut detection = Detection::new([x1, y1, x2, y2], max_conf, best_class);
            detection.clip_to(frame_width, frame_height);
            detections.push(detection);
        }

        Ok(nms(detections, self.nms_iou_threshold))
    }
}

impl ObjectDetector for CoralDetector {
    fn detect(&mut self, frame: &Frame, conf_threshold: f32) -> Result<Vec<Detection>> {
        if frame.order != PixelOrder::Rgb {
            return Err(Error::InvalidInput(
                "detector expects display-normalized frames".into(),
            ));
        }

        let (input, scale, pad_x, pad_y) = preprocessing::letterbox(frame, self.input_size);
        let output = self.infer(&input)?;
        let detections = self.postprocess(
            &output,
            scale,
            pad_x,
            pad_y,
            conf_threshold,
            frame.width,
            frame.height,
        )?;

        debug!("Detected {} coral regions", detections.len());
        Ok(detections)
    }
}

/// Non-maximum suppression, highest confidence first.
fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    if detections.is_empty() {
        return detections;
    }

    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    while !detections.is_empty() {
        let current = detections.remove(0);
        detections.retain(|det| box_iou(&current.bbox, &det.bbox) < iou_threshold);
        keep.push(current);
    }

    keep
}

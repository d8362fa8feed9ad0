// src/classify.rs

use crate::error::{Error, Result};
use crate::preprocessing::Crop;
use crate::types::{InferenceConfig, ModelConfig};
use ort::{
    execution_providers::CUDAExecutionProvider,
    session::{builder::GraphOptimizationLevel, Session},
};
use tracing::{debug, info};

/// Probability distribution over the SCTLD class list.
pub type ClassDistribution = Vec<f32>;

/// Index and probability of the strongest class in a distribution.
pub fn top_class(dist: &[f32]) -> (usize, f32) {
    let mut best = 0;
    let mut best_p = f32::MIN;
    for (i, &p) in dist.iter().enumerate() {
        if p > best_p {
            best = i;
            best_p = p;
        }
    }
    (best, best_p)
}

/// Crop classifier seam. One call classifies a whole batch; batching is a
/// performance detail and must return exactly one distribution per crop,
/// in order.
pub trait CropClassifier {
    fn classify_batch(&mut self, crops: &[Crop]) -> Result<Vec<ClassDistribution>>;
}

/// CNN SCTLD classifier running through ONNX Runtime. Expects square RGB
/// crops of `input_size`, channels-last, scaled to [0, 1].
pub struct SctldClassifier {
    session: Session,
    input_size: usize,
}

impl SctldClassifier {
    pub fn new(model: &ModelConfig, inference: &InferenceConfig) -> Result<Self> {
        info!("Loading SCTLD classifier: {}", model.classifier_path);

        let mut builder = Session::builder()?;
        if inference.use_cuda {
            builder = builder
                .with_execution_providers([CUDAExecutionProvider::default().build()])?;
        }
        let session = builder
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(inference.num_threads)?
            .commit_from_file(&model.classifier_path)?;

        info!("✓ SCTLD classifier initialized");
        Ok(Self {
            session,
            input_size: model.classifier_input_size,
        })
    }

    /// Side length of the square crops this model expects.
    pub fn input_size(&self) -> usize {
        self.input_size
    }
}

impl CropClassifier for SctldClassifier {
    fn classify_batch(&mut self, crops: &[Crop]) -> Result<Vec<ClassDistribution>> {
        if crops.is_empty() {
            return Ok(Vec::new());
        }

        let size = self.input_size;
        for crop in crops {
            if crop.width != size || crop.height != size {
                return Err(Error::ModelInference(format!(
                    "classifier expects {size}x{size} crops, got {}x{}",
                    crop.width, crop.height
                )));
            }
        }

        // NHWC batch, the layout the exported CNN was trained with.
        let mut input = Vec::with_capacity(crops.len() * size * size * 3);
        for crop in crops {
            input.extend(crop.data.iter().map(|&v| v as f32 / 255.0));
        }

        let shape = [crops.len(), size, size, 3];
        let input_value =
            ort::value::Value::from_array((shape.as_slice(), input.into_boxed_slice()))?;

        let outputs = self.session.run(ort::inputs![input_value])?;
        let output = &outputs[0];
        let (_, data) = output.try_extract_tensor::<f32>()?;

        if data.is_empty() || data.len() % crops.len() != 0 {
            return Err(Error::ModelInference(format!(
                "classifier returned {} values for {} crops",
                data.len(),
                crops.len()
            )));
        }
        let num_classes = data.len() / crops.len();
        debug!(
            "Classified batch of {} crops over {} classes",
            crops.len(),
            num_classes
        );

        Ok(data.chunks(num_classes).map(|c| c.to_vec()).collect())
    }
}

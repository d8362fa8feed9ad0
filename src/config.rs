// src/config.rs

use crate::error::{Error, Result};
use crate::types::Config;
use std::fs;

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)
            .map_err(|e| Error::InvalidInput(format!("config {path}: {e}")))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
model:
  detector_path: models/coral_yolo.onnx
  classifier_path: models/sctld_cnn.onnx
  detector_input_size: 640
  detector_classes: 2
  classifier_input_size: 224
inference:
  use_cuda: false
  num_threads: 4
detection:
  detect_conf_threshold: 0.5
  classify_conf_threshold: 0.7
  nms_iou_threshold: 0.45
video:
  input_dir: input_videos
  output_dir: output_videos
  frame_skip: 5
logging:
  level: info
"#;

    #[test]
    fn test_load_sample_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = Config::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.model.detector_input_size, 640);
        assert_eq!(config.detection.classify_conf_threshold, 0.7);
        assert_eq!(config.video.frame_skip, 5);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        assert!(Config::load("does_not_exist.yaml").is_err());
    }
}

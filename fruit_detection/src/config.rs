use serde::Deserialize;
use std::path::PathBuf;

pub const DEFAULT_WEIGHTS: &str = "models/best.onnx";
pub const FALLBACK_WEIGHTS_FILE: &str = "yolov8n.onnx";
pub const DEFAULT_FALLBACK_URL: &str =
    "https://github.com/ultralytics/assets/releases/download/v8.3.0/yolov8n.onnx";

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    /// Local path or `http(s)` URL of the ONNX weights.
    #[serde(default = "default_weights")]
    pub weights: String,
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,
    #[serde(default = "default_fallback_url")]
    pub fallback_url: String,
    #[serde(default)]
    pub labels_file: Option<PathBuf>,
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    #[serde(default = "default_max_detections")]
    pub max_detections: usize,
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,
    #[serde(default = "default_model_instances")]
    pub num_instances: usize,
    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,
    #[serde(default)]
    pub eager_load: bool,
}

fn default_weights() -> String {
    DEFAULT_WEIGHTS.to_string()
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_fallback_url() -> String {
    DEFAULT_FALLBACK_URL.to_string()
}

fn default_input_size() -> u32 {
    320
}

fn default_max_detections() -> usize {
    10
}

fn default_iou_threshold() -> f32 {
    0.7
}

fn default_model_instances() -> usize {
    1
}

fn default_intra_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            weights: default_weights(),
            models_dir: default_models_dir(),
            fallback_url: default_fallback_url(),
            labels_file: None,
            input_size: default_input_size(),
            max_detections: default_max_detections(),
            iou_threshold: default_iou_threshold(),
            num_instances: default_model_instances(),
            intra_threads: default_intra_threads(),
            eager_load: false,
        }
    }
}

impl ModelConfig {
    pub fn fallback_weights_path(&self) -> PathBuf {
        self.models_dir.join(FALLBACK_WEIGHTS_FILE)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.input_size == 0 || self.input_size % 32 != 0 {
            return Err(format!(
                "input_size must be a positive multiple of 32, got {}",
                self.input_size
            ));
        }
        if self.max_detections == 0 {
            return Err("max_detections must be greater than 0".to_string());
        }
        if self.num_instances == 0 {
            return Err("num_instances must be greater than 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(format!(
                "iou_threshold must be within [0, 1], got {}",
                self.iou_threshold
            ));
        }
        Ok(())
    }
}

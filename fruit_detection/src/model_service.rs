use crate::{config::ModelConfig, detection::RawDetection, error::DetectionError, labels::ClassNames};
use image::DynamicImage;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferenceParams {
    /// Candidates below this score are discarded by the model.
    pub confidence: f32,
    pub max_detections: usize,
    /// Square side the image is resized to before inference.
    pub input_size: u32,
    pub iou_threshold: f32,
}

impl InferenceParams {
    pub fn from_config(config: &ModelConfig, confidence: f32) -> Self {
        Self {
            confidence,
            max_detections: config.max_detections,
            input_size: config.input_size,
            iou_threshold: config.iou_threshold,
        }
    }
}

/// A loaded detection model.
pub trait ModelService: Send + Sync + 'static {
    fn class_names(&self) -> &ClassNames;

    fn infer(
        &self,
        image: &DynamicImage,
        params: &InferenceParams,
    ) -> Result<Vec<RawDetection>, DetectionError>;
}

use crate::{
    annotate::Annotator,
    detection::{Detection, DetectionResult, LabelRule},
    error::DetectionError,
    model_handle::LazyModel,
    model_service::InferenceParams,
};
use std::path::Path;

/// Image file to [`DetectionResult`], on top of a shared model handle.
pub struct Detector {
    model: LazyModel,
    params: InferenceParams,
    rule: LabelRule,
    annotator: Option<Annotator>,
}

impl Detector {
    pub fn new(model: LazyModel, params: InferenceParams) -> Self {
        Self {
            model,
            params,
            rule: LabelRule::default(),
            annotator: None,
        }
    }

    pub fn with_rule(mut self, rule: LabelRule) -> Self {
        self.rule = rule;
        self
    }

    pub fn with_annotator(mut self, annotator: Annotator) -> Self {
        self.annotator = Some(annotator);
        self
    }

    pub fn model(&self) -> &LazyModel {
        &self.model
    }

    pub fn default_confidence(&self) -> f32 {
        self.params.confidence
    }

    /// Runs the model on `image_path`. With `produce_annotated` set, an
    /// annotated copy is written; failing to render it only drops
    /// `annotated_image` from the result.
    pub fn detect(
        &self,
        image_path: &Path,
        confidence: f32,
        produce_annotated: bool,
    ) -> Result<DetectionResult, DetectionError> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(DetectionError::InvalidThreshold(confidence));
        }

        let model = self.model.get()?;
        // decoder picked from the bytes, the extension can lie
        let image = image::ImageReader::open(image_path)?
            .with_guessed_format()?
            .decode()?;
        let params = InferenceParams {
            confidence,
            ..self.params
        };

        let raw = model.infer(&image, &params)?;
        let names = model.class_names();
        let detections: Vec<Detection> = raw
            .iter()
            .map(|raw| Detection::from_raw(raw, names))
            .collect();

        tracing::debug!("{} detections for {}", detections.len(), image_path.display());
        for (i, detection) in detections.iter().enumerate() {
            tracing::debug!(
                "Detection {}: class_id={}, class_name={}, confidence={:.3}, bbox=({:.1}, {:.1}, {:.1}, {:.1})",
                i,
                detection.class_id,
                detection.class_name,
                detection.confidence,
                detection.box_xyxy[0],
                detection.box_xyxy[1],
                detection.box_xyxy[2],
                detection.box_xyxy[3]
            );
        }

        let annotated = match (&self.annotator, produce_annotated) {
            (Some(annotator), true) => match annotator.save(&image, &detections, names) {
                Ok(path) => Some(path),
                Err(e) => {
                    tracing::warn!("Failed to save annotated image: {}", e);
                    None
                }
            },
            (None, true) => {
                tracing::warn!("Annotated image requested but no annotator is configured");
                None
            }
            _ => None,
        };

        Ok(DetectionResult::new(detections, self.rule).with_annotated_image(annotated))
    }
}

use crate::labels::ClassNames;
use serde::Serialize;
use std::collections::BTreeMap;

pub const NO_DETECTION_LABEL: &str = "no_fruit_detected";
pub const MULTIPLE_CLASSES_LABEL: &str = "multiple_fruits";

/// A candidate returned by the model, before class names are attached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    pub class_id: u32,
    pub confidence: f32,
    /// Absolute pixel coordinates, `[x1, y1, x2, y2]`.
    pub bbox: [f32; 4],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub class_id: u32,
    pub class_name: String,
    pub confidence: f32,
    pub box_xyxy: [f32; 4],
}

impl Detection {
    pub fn from_raw(raw: &RawDetection, names: &ClassNames) -> Self {
        let [x1, y1, x2, y2] = raw.bbox;
        Self {
            class_id: raw.class_id,
            class_name: names.name(raw.class_id),
            confidence: raw.confidence,
            box_xyxy: [x1.min(x2), y1.min(y2), x1.max(x2), y1.max(y2)],
        }
    }
}

/// How the dominant `label` of a result is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LabelRule {
    /// Class name of the most confident detection; ties go to the earliest.
    #[default]
    HighestConfidence,
    /// The class name when only one distinct class was found, otherwise
    /// `multiple_fruits`.
    SingleClass,
}

impl LabelRule {
    fn select(self, detections: &[Detection], counts: &BTreeMap<String, usize>) -> String {
        if detections.is_empty() {
            return NO_DETECTION_LABEL.to_string();
        }
        match self {
            LabelRule::HighestConfidence => {
                let mut best = &detections[0];
                for detection in &detections[1..] {
                    if detection.confidence > best.confidence {
                        best = detection;
                    }
                }
                best.class_name.clone()
            }
            LabelRule::SingleClass => match counts.len() {
                0 => NO_DETECTION_LABEL.to_string(),
                1 => counts.keys().next().cloned().unwrap_or_default(),
                _ => MULTIPLE_CLASSES_LABEL.to_string(),
            },
        }
    }
}

/// Outcome of one detection call. `label` and `counts` are always derived
/// from `detections`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionResult {
    label: String,
    counts: BTreeMap<String, usize>,
    annotated_image: Option<String>,
    detections: Vec<Detection>,
}

impl DetectionResult {
    pub fn new(detections: Vec<Detection>, rule: LabelRule) -> Self {
        let mut counts = BTreeMap::new();
        for detection in &detections {
            *counts.entry(detection.class_name.clone()).or_insert(0) += 1;
        }
        let label = rule.select(&detections, &counts);

        Self {
            label,
            counts,
            annotated_image: None,
            detections,
        }
    }

    pub fn with_annotated_image(mut self, path: Option<String>) -> Self {
        self.annotated_image = path;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn counts(&self) -> &BTreeMap<String, usize> {
        &self.counts
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn annotated_image(&self) -> Option<&str> {
        self.annotated_image.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

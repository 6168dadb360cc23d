use crate::{
    config::ModelConfig,
    detection::RawDetection,
    error::DetectionError,
    labels::{load_labels, ClassNames},
    model_service::{InferenceParams, ModelService},
};
use image::{imageops::FilterType, DynamicImage, GenericImageView};
use ndarray::{s, Array, ArrayView2, Axis, Ix4};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use parking_lot::Mutex;
use std::{
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

fn intersection(box1: &RawDetection, box2: &RawDetection) -> f32 {
    let width = box1.bbox[2].min(box2.bbox[2]) - box1.bbox[0].max(box2.bbox[0]);
    let height = box1.bbox[3].min(box2.bbox[3]) - box1.bbox[1].max(box2.bbox[1]);
    width.max(0.) * height.max(0.)
}

fn union(box1: &RawDetection, box2: &RawDetection) -> f32 {
    ((box1.bbox[2] - box1.bbox[0]) * (box1.bbox[3] - box1.bbox[1]))
        + ((box2.bbox[2] - box2.bbox[0]) * (box2.bbox[3] - box2.bbox[1]))
        - intersection(box1, box2)
}

fn iou(box1: &RawDetection, box2: &RawDetection) -> f32 {
    let union = union(box1, box2);
    if union <= 0. {
        return 0.;
    }
    intersection(box1, box2) / union
}

/// Class-agnostic NMS. Output is ordered by confidence, highest first, and
/// holds at most `max_detections` boxes.
pub(crate) fn non_max_suppression(
    mut boxes: Vec<RawDetection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<RawDetection> {
    boxes.sort_by(|box1, box2| box2.confidence.total_cmp(&box1.confidence));
    let mut result = Vec::new();

    while !boxes.is_empty() && result.len() < max_detections {
        let best = boxes.remove(0);
        boxes.retain(|candidate| iou(&best, candidate) < iou_threshold);
        result.push(best);
    }

    result
}

fn transform_image(image: &DynamicImage, input_size: u32) -> Array<f32, Ix4> {
    let size = input_size as usize;
    let img = image.resize_exact(input_size, input_size, FilterType::Triangle);

    let mut input = Array::zeros((1, 3, size, size));
    for pixel in img.pixels() {
        let x = pixel.0 as _;
        let y = pixel.1 as _;
        let [r, g, b, _] = pixel.2 .0;
        input[[0, 0, y, x]] = (r as f32) / 255.;
        input[[0, 1, y, x]] = (g as f32) / 255.;
        input[[0, 2, y, x]] = (b as f32) / 255.;
    }

    input
}

/// Turns YOLOv8 rows (`cx, cy, w, h, score_0 .. score_n`) into boxes in
/// source image pixels.
pub(crate) fn decode_predictions(
    output: ArrayView2<f32>,
    params: &InferenceParams,
    img_width: u32,
    img_height: u32,
) -> Vec<RawDetection> {
    let scale_x = img_width as f32 / params.input_size as f32;
    let scale_y = img_height as f32 / params.input_size as f32;
    let max_x = img_width as f32;
    let max_y = img_height as f32;

    let mut boxes = Vec::new();
    for row in output.axis_iter(Axis(0)) {
        let Some((class_id, prob)) = row
            .iter()
            .skip(4)
            .copied()
            .enumerate()
            .reduce(|accum, item| if item.1 > accum.1 { item } else { accum })
        else {
            continue;
        };

        if prob < params.confidence {
            continue;
        }

        let xc = row[0] * scale_x;
        let yc = row[1] * scale_y;
        let w = row[2] * scale_x;
        let h = row[3] * scale_y;

        boxes.push(RawDetection {
            class_id: class_id as u32,
            confidence: prob,
            bbox: [
                (xc - w / 2.).clamp(0., max_x),
                (yc - h / 2.).clamp(0., max_y),
                (xc + w / 2.).clamp(0., max_x),
                (yc + h / 2.).clamp(0., max_y),
            ],
        });
    }

    non_max_suppression(boxes, params.iou_threshold, params.max_detections)
}

fn read_class_names(session: &Session, labels_file: Option<&Path>) -> Result<ClassNames, DetectionError> {
    if let Some(path) = labels_file {
        let names = load_labels(path).map_err(|e| {
            DetectionError::ModelLoad(format!("Failed to load labels {}: {}", path.display(), e))
        })?;
        tracing::info!("Loaded {} class labels from {}", names.len(), path.display());
        return Ok(names);
    }

    let raw = session.metadata()?.custom("names")?;
    match raw {
        Some(raw) => {
            let names = ClassNames::from_metadata(&raw);
            tracing::info!("Read {} class names from model metadata", names.len());
            Ok(names)
        }
        None => {
            tracing::warn!("Model carries no class names, ids will be reported instead");
            Ok(ClassNames::default())
        }
    }
}

#[derive(Clone)]
pub struct OrtModelService {
    sessions: Arc<Vec<Arc<Mutex<Session>>>>,
    counter: Arc<AtomicUsize>,
    output_name: String,
    class_names: ClassNames,
}

impl OrtModelService {
    pub fn load(weights: &Path, model_config: &ModelConfig) -> Result<Self, DetectionError> {
        if !weights.exists() {
            return Err(DetectionError::ModelLoad(format!(
                "Model weights not found at {}",
                weights.display()
            )));
        }

        tracing::info!("Loading model from {}", weights.display());
        let sessions = (0..model_config.num_instances)
            .map(|_| {
                let session = Session::builder()?
                    .with_optimization_level(GraphOptimizationLevel::Level3)?
                    .with_intra_threads(model_config.intra_threads)?
                    .commit_from_file(weights)?;
                Ok(Arc::new(Mutex::new(session)))
            })
            .collect::<Result<Vec<_>, ort::Error>>()?;

        let (output_name, class_names) = {
            let session = sessions
                .first()
                .ok_or_else(|| DetectionError::ModelLoad("No session instances".to_string()))?
                .lock();
            let output_name = session
                .outputs
                .first()
                .map(|output| output.name.clone())
                .ok_or_else(|| DetectionError::ModelLoad("Model has no outputs".to_string()))?;
            let class_names = read_class_names(&session, model_config.labels_file.as_deref())?;
            (output_name, class_names)
        };

        tracing::info!(
            "Created {} ONNX sessions, output '{}'",
            model_config.num_instances,
            output_name
        );

        Ok(Self {
            sessions: Arc::new(sessions),
            counter: Arc::new(AtomicUsize::new(0)),
            output_name,
            class_names,
        })
    }

    fn run_inference(&self, input: &Array<f32, Ix4>) -> Result<ndarray::ArrayD<f32>, DetectionError> {
        let index = self.counter.fetch_add(1, Ordering::SeqCst) % self.sessions.len();
        let mut session = self.sessions[index].lock();

        tracing::debug!("Handling request with session {}", index);
        let tensor_ref = TensorRef::from_array_view(input.view())?;
        let outputs = session.run(ort::inputs![tensor_ref])?;

        let output = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| {
                DetectionError::Inference(format!("Output '{}' not found", self.output_name))
            })?
            .try_extract_array::<f32>()?;

        Ok(output.t().into_owned())
    }
}

impl ModelService for OrtModelService {
    fn class_names(&self) -> &ClassNames {
        &self.class_names
    }

    fn infer(
        &self,
        image: &DynamicImage,
        params: &InferenceParams,
    ) -> Result<Vec<RawDetection>, DetectionError> {
        let (img_width, img_height) = image.dimensions();
        let input = transform_image(image, params.input_size);

        // [1, 4 + nc, N] transposed to [N, 4 + nc, 1]
        let output = self.run_inference(&input)?;
        if output.ndim() != 3 {
            return Err(DetectionError::Inference(format!(
                "Unexpected output shape {:?}",
                output.shape()
            )));
        }
        let rows = output.slice(s![.., .., 0]);
        if rows.ncols() <= 4 {
            return Err(DetectionError::Inference(format!(
                "Output has no class scores, shape {:?}",
                output.shape()
            )));
        }

        Ok(decode_predictions(rows, params, img_width, img_height))
    }
}

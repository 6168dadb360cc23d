mod ort_service;

pub mod annotate;
pub mod config;
pub mod detection;
pub mod detector;
pub mod error;
pub mod labels;
pub mod model_handle;
pub mod model_service;
pub mod weights;

pub use annotate::Annotator;
pub use config::ModelConfig;
pub use detection::{Detection, DetectionResult, LabelRule, RawDetection};
pub use detector::Detector;
pub use error::{AnnotationError, DetectionError};
pub use labels::ClassNames;
pub use model_handle::LazyModel;
pub use model_service::{InferenceParams, ModelService};
pub use ort_service::OrtModelService;
pub use weights::resolve_weights;

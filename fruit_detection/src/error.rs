use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),
    #[error("Weights download failed: {0}")]
    Download(String),
    #[error("Image decode failed: {0}")]
    ImageDecode(#[from] image::ImageError),
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("ORT error: {0}")]
    Ort(#[from] ort::Error),
    #[error("Confidence threshold must be within [0, 1], got {0}")]
    InvalidThreshold(f32),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum AnnotationError {
    #[error("Failed to create output directory: {0}")]
    OutputDir(std::io::Error),
    #[error("Failed to encode annotated image: {0}")]
    Encode(#[from] image::ImageError),
    #[error("Failed to write annotated image: {0}")]
    Write(#[from] std::io::Error),
    #[error("Failed to load font: {0}")]
    Font(String),
}

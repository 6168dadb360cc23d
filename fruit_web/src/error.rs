use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use fruit_detection::DetectionError;
use thiserror::Error;

pub const UNSUPPORTED_UPLOAD: &str = "Unsupported file type.";
pub const UNSUPPORTED_FORM_UPLOAD: &str = "Unsupported file type. Use JPG/PNG/BMP/WEBP.";
pub const UNSUPPORTED_URL: &str = "Unsupported file type in URL. Use JPG/PNG/BMP/WEBP.";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("No 'image' file in form-data.")]
    MissingImage,
    #[error("No file selected.")]
    NoFileSelected,
    #[error("Please upload an image or provide a URL.")]
    MissingSource,
    #[error("{0}")]
    UnsupportedType(&'static str),
    #[error("Invalid base64 image data.")]
    InvalidDataUrl,
    #[error("Failed to decode base64 image: {0}")]
    Base64Decode(String),
    #[error("Image is larger than the {0} byte limit.")]
    PayloadTooLarge(usize),
    #[error("Invalid form data: {0}")]
    Multipart(String),
    #[error("Sample image not found: {0}")]
    SampleNotFound(String),
    #[error("Failed to fetch image from URL: {0}")]
    Fetch(String),
    #[error(transparent)]
    Detection(#[from] DetectionError),
    #[error("Failed to store image: {0}")]
    Storage(#[from] std::io::Error),
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::MissingImage
            | AppError::NoFileSelected
            | AppError::MissingSource
            | AppError::InvalidDataUrl
            | AppError::Base64Decode(_)
            | AppError::Multipart(_) => StatusCode::BAD_REQUEST,
            AppError::UnsupportedType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::SampleNotFound(_) => StatusCode::NOT_FOUND,
            AppError::Fetch(_) => StatusCode::BAD_GATEWAY,
            AppError::Detection(e) => match e {
                DetectionError::ModelLoad(_) | DetectionError::Download(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                DetectionError::ImageDecode(_) | DetectionError::InvalidThreshold(_) => {
                    StatusCode::BAD_REQUEST
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Storage(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Multipart reads fail with 413 once the body limit is hit.
    pub fn from_multipart(err: MultipartError, limit: usize) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge(limit)
        } else {
            AppError::Multipart(err.body_text())
        }
    }

    pub(crate) fn log(&self) {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {} ({})", self, status);
        } else {
            tracing::warn!("Request rejected: {} ({})", self, status);
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.log();
        let body = serde_json::json!({ "error": self.to_string() });
        (self.status_code(), Json(body)).into_response()
    }
}

use crate::{
    error::{AppError, UNSUPPORTED_UPLOAD},
    ingest::{read_image_form, ImageExtension},
    server::SharedState,
};
use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    Json,
};
use fruit_detection::DetectionResult;
use tracing::instrument;

/// JSON detection for a multipart `image` upload.
#[instrument(skip(state, multipart))]
pub async fn predict(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<DetectionResult>, AppError> {
    state.metrics.record_request("/predict");

    let Ok(multipart) = multipart else {
        return Err(AppError::MissingImage);
    };
    let form = read_image_form(multipart, state.max_upload_bytes).await?;

    let file = form.file.ok_or(AppError::MissingImage)?;
    if file.filename.is_empty() {
        return Err(AppError::NoFileSelected);
    }
    let extension = ImageExtension::from_file_name(&file.filename)
        .ok_or(AppError::UnsupportedType(UNSUPPORTED_UPLOAD))?;

    let image_path = state.uploads.save(extension, &file.bytes).await?;
    let result = super::run_detection(&state, image_path, "/predict").await?;

    Ok(Json(result))
}

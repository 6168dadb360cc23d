use crate::{
    error::{AppError, UNSUPPORTED_FORM_UPLOAD},
    ingest::{decode_data_url, read_image_form, sample_path, ImageExtension, ImageSource},
    page::{list_samples, render, PageView},
    server::SharedState,
};
use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    response::{Html, IntoResponse, Response},
};
use fruit_detection::DetectionResult;
use tracing::instrument;

pub async fn index_page(State(state): State<SharedState>) -> Html<String> {
    let samples = list_samples(&state.samples_dir).await;
    Html(render(&PageView {
        samples: &samples,
        ..PageView::default()
    }))
}

/// Form submission. Failures are shown on the page with the matching status.
#[instrument(skip(state, multipart))]
pub async fn index_submit(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    state.metrics.record_request("/");
    let samples = list_samples(&state.samples_dir).await;

    match detect_from_form(&state, multipart).await {
        Ok(result) => Html(render(&PageView {
            result: Some(&result),
            error: None,
            samples: &samples,
        }))
        .into_response(),
        Err(e) => {
            e.log();
            let message = e.to_string();
            let page = render(&PageView {
                result: None,
                error: Some(&message),
                samples: &samples,
            });
            (e.status_code(), Html(page)).into_response()
        }
    }
}

async fn detect_from_form(
    state: &SharedState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<DetectionResult, AppError> {
    let multipart = multipart.map_err(|_| AppError::MissingSource)?;
    let form = read_image_form(multipart, state.max_upload_bytes).await?;

    let image_path = match form.into_source()? {
        ImageSource::Upload(file) => {
            let extension = ImageExtension::from_file_name(&file.filename)
                .ok_or(AppError::UnsupportedType(UNSUPPORTED_FORM_UPLOAD))?;
            state.uploads.save(extension, &file.bytes).await?
        }
        ImageSource::DataUrl(data_url) => {
            let (extension, bytes) = decode_data_url(&data_url)?;
            state.uploads.save(extension, &bytes).await?
        }
        ImageSource::Sample(reference) => sample_path(&state.samples_dir, &reference)?,
        ImageSource::Remote(url) => {
            let (extension, bytes) = state.fetcher.fetch(&url).await?;
            state.uploads.save(extension, &bytes).await?
        }
    };

    super::run_detection(state, image_path, "/").await
}

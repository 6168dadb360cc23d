mod health;
mod index;
mod metrics;
mod predict;

use crate::{error::AppError, server::SharedState};
use axum::{
    routing::{get, post},
    Router,
};
use fruit_detection::DetectionResult;
use std::{path::PathBuf, time::Instant};

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/", get(index::index_page).post(index::index_submit))
        .route("/predict", post(predict::predict))
        .route("/health", get(health::healthcheck))
        .route("/metrics", get(metrics::metrics_handler))
}

/// Runs the detector on the blocking pool so decode, inference and encode do
/// not stall the runtime.
async fn run_detection(
    state: &SharedState,
    image_path: PathBuf,
    route: &str,
) -> Result<DetectionResult, AppError> {
    let detector = state.detector.clone();
    let confidence = detector.default_confidence();
    let started = Instant::now();

    let result = tokio::task::spawn_blocking(move || detector.detect(&image_path, confidence, true))
        .await
        .map_err(|e| AppError::Internal(format!("detection task failed: {}", e)))??;

    let elapsed_ms = started.elapsed().as_millis() as u64;
    state.metrics.record_inference_duration(elapsed_ms, route);
    state.metrics.record_detections(&result);
    tracing::info!(
        "Detected `{}` with {} objects in {} ms",
        result.label(),
        result.detections().len(),
        elapsed_ms
    );

    Ok(result)
}

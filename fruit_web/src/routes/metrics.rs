use crate::{error::AppError, server::SharedState};
use axum::extract::State;
use prometheus::{Encoder, TextEncoder};

pub async fn metrics_handler(State(state): State<SharedState>) -> Result<String, AppError> {
    let metric_families = state.metrics.registry.gather();

    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&metric_families, &mut buffer)
        .map_err(|e| AppError::Internal(format!("metrics encoding: {}", e)))?;

    String::from_utf8(buffer).map_err(|e| AppError::Internal(e.to_string()))
}

use axum::{http::StatusCode, response::IntoResponse};

/// Liveness only; never touches the model.
pub async fn healthcheck() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

use crate::{config::ModelConfig, error::DetectionError};
use std::path::{Path, PathBuf};

const ONNX_HINT: &str =
    "set model.weights or model.fallback_url to an ONNX export of a YOLO detector";

fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// File name a remote weights URL is cached under.
fn cached_file_name(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "best.onnx".to_string())
}

async fn download(client: &reqwest::Client, url: &str, dest: &Path) -> Result<(), DetectionError> {
    tracing::info!("Downloading model from {} to {}", url, dest.display());

    let response = client
        .get(url)
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .map_err(|e| DetectionError::Download(format!("{}: {}", url, e)))?;
    let bytes = response
        .bytes()
        .await
        .map_err(|e| DetectionError::Download(format!("{}: {}", url, e)))?;

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let partial = dest.with_extension("part");
    tokio::fs::write(&partial, &bytes).await?;
    tokio::fs::rename(&partial, dest).await?;

    tracing::info!("Cached {} bytes of weights at {}", bytes.len(), dest.display());
    Ok(())
}

/// Resolves the configured weights to a local file: remote URLs are fetched
/// once into `models_dir`, and a missing file falls back to the default
/// pretrained weights, downloaded once and cached.
pub async fn resolve_weights(
    config: &ModelConfig,
    client: &reqwest::Client,
) -> Result<PathBuf, DetectionError> {
    let location = config.weights.trim();

    let candidate = if is_remote(location) {
        let dest = config.models_dir.join(cached_file_name(location));
        if dest.exists() {
            tracing::info!("Model already exists at {}, skipping download", dest.display());
        } else {
            download(client, location, &dest).await?;
        }
        dest
    } else {
        PathBuf::from(location)
    };

    if !location.is_empty() && candidate.is_file() {
        return Ok(candidate);
    }

    tracing::warn!(
        "Model file {} not found, using fallback weights",
        candidate.display()
    );
    let fallback = config.fallback_weights_path();
    if fallback.is_file() {
        tracing::info!("Using cached fallback model at {}", fallback.display());
        return Ok(fallback);
    }

    if config.fallback_url.trim().is_empty() {
        return Err(DetectionError::ModelLoad(format!(
            "Model weights not found at '{}' and no fallback URL is configured; {}",
            candidate.display(),
            ONNX_HINT
        )));
    }
    download(client, config.fallback_url.trim(), &fallback)
        .await
        .map_err(|e| {
            DetectionError::ModelLoad(format!(
                "Model weights not found at '{}' and the fallback could not be fetched ({}); {}",
                candidate.display(),
                e,
                ONNX_HINT
            ))
        })?;
    Ok(fallback)
}

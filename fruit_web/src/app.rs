use crate::{
    config::Config,
    fetch::RemoteFetcher,
    ingest::UploadStore,
    server::{HttpServer, SharedState, OUTPUTS_ROUTE},
    telemetry::Metrics,
};
use anyhow::Context;
use fruit_detection::{
    resolve_weights, Annotator, Detector, InferenceParams, LabelRule, LazyModel, ModelService,
    OrtModelService,
};
use std::{sync::Arc, time::Duration};
use tokio::{signal, sync::broadcast};

pub async fn start_app(config: Config) -> anyhow::Result<()> {
    for dir in [
        &config.storage.uploads_dir,
        &config.storage.outputs_dir,
        &config.model.models_dir,
    ] {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let weights = match resolve_weights(&config.model, &reqwest::Client::new()).await {
        Ok(path) => path,
        Err(e) => {
            tracing::error!("Failed to resolve model weights: {}", e);
            return Err(e.into());
        }
    };
    tracing::info!("Using model weights at {}", weights.display());

    let model_config = config.model.clone();
    let model = LazyModel::new(move || {
        let service = OrtModelService::load(&weights, &model_config)?;
        Ok(Arc::new(service) as Arc<dyn ModelService>)
    });
    if config.model.eager_load {
        model.get().context("eager model load failed")?;
    }

    let mut annotator = Annotator::new(
        &config.storage.outputs_dir,
        OUTPUTS_ROUTE,
        config.storage.jpeg_quality,
    );
    if let Some(font) = &config.storage.font_file {
        annotator = annotator.with_font_file(font)?;
    }

    let detector = Detector::new(
        model,
        InferenceParams::from_config(&config.model, config.inference.confidence_threshold),
    )
    .with_rule(LabelRule::HighestConfidence)
    .with_annotator(annotator);

    let state = SharedState {
        detector: Arc::new(detector),
        uploads: UploadStore::new(&config.storage.uploads_dir),
        fetcher: RemoteFetcher::new(
            Duration::from_secs(config.limits.fetch_timeout_secs),
            config.limits.max_upload_bytes,
        )?,
        samples_dir: config.storage.samples_dir.clone(),
        outputs_dir: config.storage.outputs_dir.clone(),
        max_upload_bytes: config.limits.max_upload_bytes,
        metrics: Arc::new(Metrics::new()?),
    };

    let server = HttpServer::new(state, &config.server).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_shutdown_rx = shutdown_tx.subscribe();

    let server_handle = server.run(server_shutdown_rx).await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    server_handle.await??;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

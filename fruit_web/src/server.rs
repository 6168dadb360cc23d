use crate::{
    config::ServerConfig, fetch::RemoteFetcher, ingest::UploadStore, routes::api_routes,
    telemetry::Metrics,
};
use axum::{extract::DefaultBodyLimit, Router};
use axum_otel_metrics::HttpMetricsLayerBuilder;
use fruit_detection::Detector;
use std::{path::PathBuf, sync::Arc};
use tokio::{net::TcpListener, sync::broadcast::Receiver, task::JoinHandle};
use tower_http::{limit::RequestBodyLimitLayer, services::ServeDir, trace::TraceLayer};

/// URL prefix annotated outputs are served under.
pub const OUTPUTS_ROUTE: &str = "/static/outputs";

/// Room for multipart framing on top of the image itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Clone)]
pub struct SharedState {
    pub detector: Arc<Detector>,
    pub uploads: UploadStore,
    pub fetcher: RemoteFetcher,
    pub samples_dir: PathBuf,
    pub outputs_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub metrics: Arc<Metrics>,
}

/// Full application router. Bodies over `max_upload_bytes` are refused with
/// 413 before anything is written.
pub fn router(state: SharedState) -> Router {
    let max_upload_bytes = state.max_upload_bytes;
    let samples = ServeDir::new(&state.samples_dir);
    let outputs = ServeDir::new(&state.outputs_dir);

    Router::new()
        .merge(api_routes())
        .nest_service("/images", samples)
        .nest_service(OUTPUTS_ROUTE, outputs)
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(RequestBodyLimitLayer::new(
            max_upload_bytes.saturating_add(MULTIPART_OVERHEAD),
        ))
        .layer(TraceLayer::new_for_http())
        .layer(HttpMetricsLayerBuilder::new().build())
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new(state: SharedState, config: &ServerConfig) -> anyhow::Result<Self> {
        let addr = config.get_address();
        let router = router(state);
        let listener = TcpListener::bind(&addr).await?;

        Ok(Self { router, listener })
    }

    pub async fn run(
        self,
        shutdown_rx: Receiver<()>,
    ) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
        tracing::info!("Starting app on {}", self.listener.local_addr()?);

        let listener = self.listener;
        let router = self.router;
        let server_handle = tokio::spawn({
            let mut shutdown_rx = shutdown_rx.resubscribe();
            async move {
                axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        shutdown_rx.recv().await.ok();
                    })
                    .await?;
                Ok(())
            }
        });

        Ok(server_handle)
    }
}

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use fruit_detection::{
    Annotator, ClassNames, DetectionError, Detector, InferenceParams, LabelRule, LazyModel,
    ModelService, RawDetection,
};
use fruit_web::{router, telemetry::Metrics, RemoteFetcher, SharedState, UploadStore};
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use std::{
    io::Cursor,
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tower::ServiceExt;

const BOUNDARY: &str = "fruitboundary";

struct FakeModel {
    names: ClassNames,
    calls: Arc<AtomicUsize>,
}

impl ModelService for FakeModel {
    fn class_names(&self) -> &ClassNames {
        &self.names
    }

    fn infer(
        &self,
        _image: &DynamicImage,
        params: &InferenceParams,
    ) -> Result<Vec<RawDetection>, DetectionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let detections = vec![
            RawDetection {
                class_id: 0,
                confidence: 0.61,
                bbox: [2.0, 2.0, 14.0, 14.0],
            },
            RawDetection {
                class_id: 1,
                confidence: 0.88,
                bbox: [16.0, 4.0, 30.0, 28.0],
            },
            RawDetection {
                class_id: 0,
                confidence: 0.12,
                bbox: [0.0, 0.0, 4.0, 4.0],
            },
        ];
        Ok(detections
            .into_iter()
            .filter(|d| d.confidence >= params.confidence)
            .collect())
    }
}

struct TestApp {
    router: Router,
    dir: TempDir,
    loads: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

impl TestApp {
    fn uploads(&self) -> PathBuf {
        self.dir.path().join("uploads")
    }

    fn outputs(&self) -> PathBuf {
        self.dir.path().join("static/outputs")
    }

    fn stored_uploads(&self) -> usize {
        std::fs::read_dir(self.uploads())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }
}

fn params() -> InferenceParams {
    InferenceParams {
        confidence: 0.25,
        max_detections: 10,
        input_size: 320,
        iou_threshold: 0.7,
    }
}

fn spawn_app_with(
    model: LazyModel,
    loads: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
    max_upload_bytes: usize,
) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let outputs = dir.path().join("static/outputs");
    let samples = dir.path().join("images");
    std::fs::create_dir_all(&samples).unwrap();
    std::fs::write(samples.join("banana.png"), png_bytes()).unwrap();

    let detector = Detector::new(model, params())
        .with_rule(LabelRule::HighestConfidence)
        .with_annotator(Annotator::new(&outputs, "/static/outputs", 75));

    let state = SharedState {
        detector: Arc::new(detector),
        uploads: UploadStore::new(dir.path().join("uploads")),
        fetcher: RemoteFetcher::new(Duration::from_secs(2), max_upload_bytes).unwrap(),
        samples_dir: samples,
        outputs_dir: outputs,
        max_upload_bytes,
        metrics: Arc::new(Metrics::new().unwrap()),
    };

    TestApp {
        router: router(state),
        dir,
        loads,
        calls,
    }
}

fn spawn_app() -> TestApp {
    let loads = Arc::new(AtomicUsize::new(0));
    let calls = Arc::new(AtomicUsize::new(0));
    let model = {
        let loads = loads.clone();
        let calls = calls.clone();
        LazyModel::new(move || {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(FakeModel {
                names: ClassNames::from_names(vec!["apple".into(), "banana".into()]),
                calls: calls.clone(),
            }) as Arc<dyn ModelService>)
        })
    };
    spawn_app_with(model, loads, calls, 8 * 1024 * 1024)
}

fn png_bytes() -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(32, 32, Rgb([200u8, 180, 40])));
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png).unwrap();
    buffer.into_inner()
}

enum Part<'a> {
    File(&'a str, &'a str, &'a [u8]),
    Text(&'a str, &'a str),
}

fn multipart_request(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::File(name, filename, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                        name, filename
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n{}", name, value)
                        .as_bytes(),
                );
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn json(body: &[u8]) -> serde_json::Value {
    serde_json::from_slice(body).unwrap()
}

fn page(body: &[u8]) -> String {
    String::from_utf8(body.to_vec()).unwrap()
}

/// Page text goes through the same escaping as the renderer.
fn shows(html: &str, message: &str) -> bool {
    html.contains(&ammonia::clean_text(message))
}

/// Serves `png_bytes()` at `/x.png` on a local port.
async fn serve_remote_image() -> String {
    let remote = Router::new().route("/x.png", axum::routing::get(|| async { png_bytes() }));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, remote).await.unwrap();
    });
    format!("http://{}", addr)
}

fn output_file(app: &TestApp, annotated: &str) -> PathBuf {
    let name = annotated.rsplit('/').next().unwrap();
    app.outputs().join(name)
}

#[tokio::test]
async fn health_is_ok_even_when_model_cannot_load() {
    let model = LazyModel::new(|| Err(DetectionError::ModelLoad("no weights".into())));
    let app = spawn_app_with(
        model,
        Arc::new(AtomicUsize::new(0)),
        Arc::new(AtomicUsize::new(0)),
        1024,
    );

    let (status, body) = app.send(get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");
}

#[tokio::test]
async fn model_load_failure_is_service_unavailable() {
    let model = LazyModel::new(|| Err(DetectionError::ModelLoad("no weights".into())));
    let app = spawn_app_with(
        model,
        Arc::new(AtomicUsize::new(0)),
        Arc::new(AtomicUsize::new(0)),
        1024 * 1024,
    );
    let png = png_bytes();

    let (status, body) = app
        .send(multipart_request("/predict", &[Part::File("image", "fruit.png", &png)]))
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(json(&body)["error"].as_str().unwrap().contains("no weights"));
}

#[tokio::test]
async fn predict_returns_detection_json() {
    let app = spawn_app();
    let png = png_bytes();

    let (status, body) = app
        .send(multipart_request("/predict", &[Part::File("image", "Fruit.PNG", &png)]))
        .await;
    assert_eq!(status, StatusCode::OK);

    let value = json(&body);
    assert_eq!(value["label"], "banana");
    assert_eq!(value["counts"], serde_json::json!({ "apple": 1, "banana": 1 }));
    let detections = value["detections"].as_array().unwrap();
    assert_eq!(detections.len(), 2);
    assert_eq!(detections[1]["class_name"], "banana");
    assert_eq!(detections[1]["class_id"], 1);
    assert_eq!(
        detections[1]["box_xyxy"],
        serde_json::json!([16.0, 4.0, 30.0, 28.0])
    );

    let annotated = value["annotated_image"].as_str().unwrap();
    assert!(annotated.starts_with("/static/outputs/"));
    assert!(annotated.ends_with("_pred.jpg"));
    assert!(image::open(output_file(&app, annotated)).is_ok());
    assert_eq!(app.stored_uploads(), 1);

    let (status, served) = app.send(get(annotated)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!served.is_empty());
}

#[tokio::test]
async fn model_is_loaded_once_across_requests() {
    let app = spawn_app();
    let png = png_bytes();

    for _ in 0..3 {
        let (status, _) = app
            .send(multipart_request("/predict", &[Part::File("image", "a.jpg", &png)]))
            .await;
        assert_eq!(status, StatusCode::OK);
    }
    assert_eq!(app.loads.load(Ordering::SeqCst), 1);
    assert_eq!(app.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn predict_decodes_by_content_not_extension() {
    let app = spawn_app();
    let png = png_bytes();

    let (status, body) = app
        .send(multipart_request("/predict", &[Part::File("image", "photo.jpg", &png)]))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["label"], "banana");
    assert_eq!(app.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn predict_rejects_unsupported_type() {
    let app = spawn_app();

    let (status, body) = app
        .send(multipart_request("/predict", &[Part::File("image", "clip.gif", b"GIF89a")]))
        .await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(json(&body), serde_json::json!({ "error": "Unsupported file type." }));
    assert_eq!(app.stored_uploads(), 0);
    assert_eq!(app.loads.load(Ordering::SeqCst), 0);
    assert_eq!(app.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn predict_requires_image_file() {
    let app = spawn_app();

    let (status, body) = app
        .send(multipart_request("/predict", &[Part::Text("note", "hello")]))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"], "No 'image' file in form-data.");

    let (status, body) = app
        .send(multipart_request("/predict", &[Part::File("image", "", b"")]))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"], "No file selected.");
    assert_eq!(app.stored_uploads(), 0);
}

#[tokio::test]
async fn oversized_upload_is_rejected_before_write() {
    let loads = Arc::new(AtomicUsize::new(0));
    let calls = Arc::new(AtomicUsize::new(0));
    let model = LazyModel::loaded(Arc::new(FakeModel {
        names: ClassNames::default(),
        calls: calls.clone(),
    }));
    let app = spawn_app_with(model, loads, calls.clone(), 1024);
    let large = vec![0u8; 4096];

    let (status, _) = app
        .send(multipart_request("/predict", &[Part::File("image", "big.jpg", &large)]))
        .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(app.stored_uploads(), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn index_renders_form_and_samples() {
    let app = spawn_app();

    let (status, body) = app.send(get("/")).await;
    assert_eq!(status, StatusCode::OK);
    let html = page(&body);
    assert!(html.contains("name=\"image_url\""));
    assert!(html.contains("banana.png"));
}

#[tokio::test]
async fn index_requires_a_source() {
    let app = spawn_app();

    let (status, body) = app
        .send(multipart_request("/", &[Part::Text("image_url", "   ")]))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(shows(&page(&body), "Please upload an image or provide a URL."));
}

#[tokio::test]
async fn index_rejects_malformed_data_url() {
    let app = spawn_app();

    let (status, body) = app
        .send(multipart_request(
            "/",
            &[Part::Text("image_url", "data:image/png,iVBORw0KGgo=")],
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(shows(&page(&body), "Invalid base64 image data."));
    assert_eq!(app.stored_uploads(), 0);
    assert_eq!(app.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn index_accepts_data_url() {
    use base64::{engine::general_purpose::STANDARD, Engine as _};

    let app = spawn_app();
    let data_url = format!("data:image/png;base64,{}", STANDARD.encode(png_bytes()));

    let (status, body) = app
        .send(multipart_request("/", &[Part::Text("image_url", &data_url)]))
        .await;
    assert_eq!(status, StatusCode::OK);
    let html = page(&body);
    assert!(html.contains("apple: 1"));
    assert!(html.contains("_pred.jpg"));
    assert_eq!(app.stored_uploads(), 1);
}

#[tokio::test]
async fn index_accepts_data_url_with_mismatched_mime() {
    use base64::{engine::general_purpose::STANDARD, Engine as _};

    let app = spawn_app();
    let data_url = format!("data:image/jpeg;base64,{}", STANDARD.encode(png_bytes()));

    let (status, body) = app
        .send(multipart_request("/", &[Part::Text("image_url", &data_url)]))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(page(&body).contains("banana: 1"));
    assert_eq!(app.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn index_fetches_remote_image() {
    let app = spawn_app();
    let base = serve_remote_image().await;

    let (status, body) = app
        .send(multipart_request(
            "/",
            &[Part::Text("image_url", &format!("{}/x.png", base))],
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let html = page(&body);
    assert!(html.contains("apple: 1"));
    assert!(html.contains("_pred.jpg"));
    assert_eq!(app.stored_uploads(), 1);
    assert_eq!(app.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn index_uses_sample_without_writing_upload() {
    let app = spawn_app();

    let (status, body) = app
        .send(multipart_request("/", &[Part::Text("image_url", "/images/banana.png")]))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(page(&body).contains("banana: 1"));
    assert_eq!(app.stored_uploads(), 0);

    let (status, body) = app
        .send(multipart_request("/", &[Part::Text("image_url", "/images/kiwi.png")]))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(shows(&page(&body), "Sample image not found: kiwi.png"));
}

#[tokio::test]
async fn index_rejects_unsupported_remote_type_without_fetching() {
    let app = spawn_app();

    let (status, body) = app
        .send(multipart_request(
            "/",
            &[Part::Text("image_url", "http://127.0.0.1:9/animation.gif")],
        ))
        .await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert!(shows(
        &page(&body),
        "Unsupported file type in URL. Use JPG/PNG/BMP/WEBP."
    ));
}

#[tokio::test]
async fn samples_are_served_statically() {
    let app = spawn_app();

    let (status, body) = app.send(get("/images/banana.png")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, png_bytes());

    let (status, _) = app.send(get("/images/missing.png")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn metrics_are_exposed() {
    let app = spawn_app();

    let (status, _) = app.send(get("/metrics")).await;
    assert_eq!(status, StatusCode::OK);
}

use clap::{Parser, ValueEnum};
use fruit_detection::{
    resolve_weights, Annotator, Detector, InferenceParams, LabelRule, LazyModel, ModelConfig,
    OrtModelService,
};
use std::{path::PathBuf, sync::Arc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Rule {
    /// One distinct class gives its name, several give `multiple_fruits`
    SingleClass,
    /// Class of the most confident detection
    HighestConfidence,
}

impl From<Rule> for LabelRule {
    fn from(rule: Rule) -> Self {
        match rule {
            Rule::SingleClass => LabelRule::SingleClass,
            Rule::HighestConfidence => LabelRule::HighestConfidence,
        }
    }
}

#[derive(Parser)]
#[command(name = "fruit-detect")]
#[command(about = "Run the fruit detector on one image and print the result as JSON")]
struct Args {
    /// ONNX weights, local path or http(s) URL
    model: String,

    /// Image to run detection on
    image: PathBuf,

    /// Minimum confidence of reported detections
    #[arg(long, default_value_t = 0.25)]
    conf: f32,

    /// Class labels file, one `name` or `name,r,g,b` per line
    #[arg(long)]
    labels: Option<PathBuf>,

    /// Square model input size
    #[arg(long, default_value_t = 640)]
    imgsz: u32,

    /// Maximum number of detections
    #[arg(long, default_value_t = 300)]
    max_det: usize,

    /// How the dominant label is chosen
    #[arg(long, value_enum, default_value_t = Rule::SingleClass)]
    rule: Rule,

    /// Write an annotated copy of the image into this directory
    #[arg(long)]
    annotate_dir: Option<PathBuf>,

    /// TrueType font used for box labels in the annotated copy
    #[arg(long)]
    font: Option<PathBuf>,

    /// Directory remote weights are cached in
    #[arg(long, default_value = "models")]
    models_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,ort=warn".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_level(true)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = ModelConfig {
        weights: args.model.clone(),
        models_dir: args.models_dir.clone(),
        fallback_url: String::new(),
        labels_file: args.labels.clone(),
        input_size: args.imgsz,
        max_detections: args.max_det,
        ..ModelConfig::default()
    };
    config.validate().map_err(anyhow::Error::msg)?;

    let weights = resolve_weights(&config, &reqwest::Client::new()).await?;
    let model = OrtModelService::load(&weights, &config)?;

    let mut detector = Detector::new(
        LazyModel::loaded(Arc::new(model)),
        InferenceParams::from_config(&config, args.conf),
    )
    .with_rule(args.rule.into());

    if let Some(dir) = &args.annotate_dir {
        let mut annotator = Annotator::new(dir, dir.display().to_string(), 75);
        if let Some(font) = &args.font {
            annotator = annotator.with_font_file(font)?;
        }
        detector = detector.with_annotator(annotator);
    }

    let result = detector.detect(&args.image, args.conf, args.annotate_dir.is_some())?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}

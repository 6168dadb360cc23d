use fruit_detection::ModelConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(
        default = "default_log_level",
        deserialize_with = "deserialize_log_level"
    )]
    pub log_level: LogLevel,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

impl Config {
    pub fn validate(&self) -> Result<(), String> {
        let confidence = self.inference.confidence_threshold;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(format!(
                "inference.confidence_threshold must be within [0, 1], got {}",
                confidence
            ));
        }
        if !(1..=100).contains(&self.storage.jpeg_quality) {
            return Err(format!(
                "storage.jpeg_quality must be within 1..=100, got {}",
                self.storage.jpeg_quality
            ));
        }
        if self.limits.max_upload_bytes == 0 {
            return Err("limits.max_upload_bytes must be greater than 0".to_string());
        }
        self.model.validate().map_err(|e| format!("model: {}", e))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    pub fn get_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct InferenceConfig {
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
}

fn default_confidence_threshold() -> f32 {
    0.25
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,
    #[serde(default = "default_outputs_dir")]
    pub outputs_dir: PathBuf,
    #[serde(default = "default_samples_dir")]
    pub samples_dir: PathBuf,
    /// TrueType font for box labels; boxes are drawn without text when unset.
    #[serde(default)]
    pub font_file: Option<PathBuf>,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_outputs_dir() -> PathBuf {
    PathBuf::from("static/outputs")
}

fn default_samples_dir() -> PathBuf {
    PathBuf::from("images")
}

fn default_jpeg_quality() -> u8 {
    75
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uploads_dir: default_uploads_dir(),
            outputs_dir: default_outputs_dir(),
            samples_dir: default_samples_dir(),
            font_file: None,
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

fn default_max_upload_bytes() -> usize {
    8 * 1024 * 1024
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload_bytes(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            other => Err(format!(
                "{} is not a supported minimum log level. Use `debug`, `info` or `warn`.",
                other
            )),
        }
    }
}

/// Plain variables the service has always honoured; they win over every
/// other source.
const LEGACY_OVERRIDES: [(&str, &str); 3] = [
    ("YOLO_MODEL_PATH", "model.weights"),
    ("CONF_THRES", "inference.confidence_threshold"),
    ("PORT", "server.port"),
];

pub fn get_configuration() -> Result<Config, config::ConfigError> {
    let base_path = std::env::current_dir()
        .map_err(|e| config::ConfigError::Message(format!("current directory: {}", e)))?;

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;

    load_configuration(&base_path.join("configuration"), environment)
}

pub fn load_configuration(
    configuration_directory: &Path,
    environment: Environment,
) -> Result<Config, config::ConfigError> {
    let mut builder = config::Config::builder()
        .add_source(
            config::File::from(configuration_directory.join("base.yaml")).required(false),
        )
        .add_source(
            config::File::from(
                configuration_directory.join(format!("{}.yaml", environment.as_str())),
            )
            .required(false),
        )
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        );

    for (var, key) in LEGACY_OVERRIDES {
        builder = builder.set_override_option(key, std::env::var(var).ok())?;
    }

    let config: Config = builder.build()?.try_deserialize::<Config>()?;
    config.validate().map_err(config::ConfigError::Message)?;

    Ok(config)
}

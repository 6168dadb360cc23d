//! Turning request input into an image file on disk.

use crate::error::{AppError, UNSUPPORTED_FORM_UPLOAD};
use axum::extract::Multipart;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

static DATA_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^data:image/(\w+);base64,(.+)$").expect("valid data url pattern"));

pub const SAMPLE_PREFIX: &str = "/images/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageExtension {
    Jpg,
    Jpeg,
    Png,
    Bmp,
    Webp,
}

impl ImageExtension {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageExtension::Jpg => ".jpg",
            ImageExtension::Jpeg => ".jpeg",
            ImageExtension::Png => ".png",
            ImageExtension::Bmp => ".bmp",
            ImageExtension::Webp => ".webp",
        }
    }

    /// Extension of the last path component, case-insensitive.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let extension = Path::new(name).extension()?.to_str()?;
        match extension.to_lowercase().as_str() {
            "jpg" => Some(Self::Jpg),
            "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "bmp" => Some(Self::Bmp),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }

    /// `<type>` of an `image/<type>` media type.
    pub fn from_subtype(subtype: &str) -> Option<Self> {
        match subtype.to_lowercase().as_str() {
            "jpeg" | "jpg" => Some(Self::Jpg),
            "png" => Some(Self::Png),
            "bmp" => Some(Self::Bmp),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Bytes,
}

/// The two fields both forms accept. `file` is set for any `image` part that
/// carries a filename, even an empty one.
#[derive(Debug, Default)]
pub struct ImageForm {
    pub file: Option<UploadedFile>,
    pub image_url: Option<String>,
}

pub async fn read_image_form(
    mut multipart: Multipart,
    max_bytes: usize,
) -> Result<ImageForm, AppError> {
    let mut form = ImageForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::from_multipart(e, max_bytes))?
    {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "image" => {
                let Some(filename) = field.file_name().map(str::to_string) else {
                    tracing::debug!("Ignoring `image` field without a filename");
                    continue;
                };
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::from_multipart(e, max_bytes))?;
                if form.file.is_none() {
                    form.file = Some(UploadedFile { filename, bytes });
                }
            }
            "image_url" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::from_multipart(e, max_bytes))?;
                let value = value.trim();
                if !value.is_empty() {
                    form.image_url = Some(value.to_string());
                }
            }
            other => tracing::debug!("Ignoring unknown field: {}", other),
        }
    }

    Ok(form)
}

#[derive(Debug)]
pub enum ImageSource {
    Upload(UploadedFile),
    DataUrl(String),
    Sample(String),
    Remote(String),
}

impl ImageForm {
    /// A named upload takes precedence over `image_url`.
    pub fn into_source(self) -> Result<ImageSource, AppError> {
        if let Some(file) = self.file.filter(|f| !f.filename.is_empty()) {
            return Ok(ImageSource::Upload(file));
        }
        match self.image_url {
            Some(url) if url.starts_with("data:image/") => Ok(ImageSource::DataUrl(url)),
            Some(url) if url.starts_with(SAMPLE_PREFIX) => Ok(ImageSource::Sample(url)),
            Some(url) => Ok(ImageSource::Remote(url)),
            None => Err(AppError::MissingSource),
        }
    }
}

pub fn decode_data_url(data_url: &str) -> Result<(ImageExtension, Vec<u8>), AppError> {
    let caps = DATA_URL.captures(data_url).ok_or(AppError::InvalidDataUrl)?;
    let extension = ImageExtension::from_subtype(&caps[1])
        .ok_or(AppError::UnsupportedType(UNSUPPORTED_FORM_UPLOAD))?;
    let bytes = STANDARD
        .decode(caps[2].trim())
        .map_err(|e| AppError::Base64Decode(e.to_string()))?;
    Ok((extension, bytes))
}

/// Resolves `/images/<name>` to a bundled sample. Only the final path
/// component is used, so references cannot leave `samples_dir`.
pub fn sample_path(samples_dir: &Path, reference: &str) -> Result<PathBuf, AppError> {
    let name = Path::new(reference)
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| AppError::SampleNotFound(reference.to_string()))?;
    if ImageExtension::from_file_name(name).is_none() {
        return Err(AppError::UnsupportedType(UNSUPPORTED_FORM_UPLOAD));
    }
    let path = samples_dir.join(name);
    if !path.is_file() {
        return Err(AppError::SampleNotFound(name.to_string()));
    }
    Ok(path)
}

/// Request images persisted under fresh UUID names. Files are never removed.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn save(&self, extension: ImageExtension, bytes: &[u8]) -> Result<PathBuf, AppError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let file_name = format!("{}{}", uuid::Uuid::new_v4().simple(), extension.as_str());
        let path = self.dir.join(file_name);
        tokio::fs::write(&path, bytes).await?;
        tracing::debug!("Stored {} bytes at {}", bytes.len(), path.display());
        Ok(path)
    }
}

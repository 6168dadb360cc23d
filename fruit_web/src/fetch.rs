use crate::{
    error::{AppError, UNSUPPORTED_URL},
    ingest::ImageExtension,
};
use std::time::Duration;
use url::Url;

/// Downloads images referenced by URL. One attempt, bounded by the client
/// timeout and a body size cap.
#[derive(Debug, Clone)]
pub struct RemoteFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl RemoteFetcher {
    pub fn new(timeout: Duration, max_bytes: usize) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, max_bytes })
    }

    /// Parses `raw` and validates the extension of its path, ignoring any
    /// query string or fragment.
    pub fn parse(raw: &str) -> Result<(Url, ImageExtension), AppError> {
        let url = Url::parse(raw).map_err(|e| AppError::Fetch(format!("{}: {}", raw, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AppError::Fetch(format!(
                "unsupported URL scheme `{}`",
                url.scheme()
            )));
        }
        let extension = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .and_then(ImageExtension::from_file_name)
            .ok_or(AppError::UnsupportedType(UNSUPPORTED_URL))?;
        Ok((url, extension))
    }

    pub async fn fetch(&self, raw: &str) -> Result<(ImageExtension, Vec<u8>), AppError> {
        let (url, extension) = Self::parse(raw)?;
        tracing::info!("Fetching image from {}", url);

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::Fetch(e.to_string()))?;

        if response
            .content_length()
            .is_some_and(|len| len > self.max_bytes as u64)
        {
            return Err(AppError::PayloadTooLarge(self.max_bytes));
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| AppError::Fetch(e.to_string()))?
        {
            if body.len() + chunk.len() > self.max_bytes {
                return Err(AppError::PayloadTooLarge(self.max_bytes));
            }
            body.extend_from_slice(&chunk);
        }

        Ok((extension, body))
    }
}

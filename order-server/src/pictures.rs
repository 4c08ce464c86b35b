//! Return picture uploader

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Invalid base64 image: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Upload failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[async_trait]
pub trait PictureUploader: Send + Sync {
    /// Store one base64-encoded picture and return its URL
    async fn upload(&self, image_base64: &str) -> Result<String, UploadError>;
}

/// Upload every picture; a failed upload becomes an empty string
pub async fn upload_all(uploader: &dyn PictureUploader, images: &[String]) -> Vec<String> {
    let mut urls = Vec::with_capacity(images.len());
    for (index, image) in images.iter().enumerate() {
        match uploader.upload(image).await {
            Ok(url) => urls.push(url),
            Err(e) => {
                tracing::warn!(index, "Return picture upload failed: {e}");
                urls.push(String::new());
            }
        }
    }
    urls
}

#[derive(Deserialize)]
struct UploadResponse {
    url: String,
}

/// Picture service over HTTP: `POST {endpoint}/pictures` with the raw bytes
#[derive(Debug, Clone)]
pub struct HttpPictureUploader {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpPictureUploader {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PictureUploader for HttpPictureUploader {
    async fn upload(&self, image_base64: &str) -> Result<String, UploadError> {
        let bytes = base64::engine::general_purpose::STANDARD.decode(image_base64.trim())?;
        let response: UploadResponse = self
            .client
            .post(format!("{}/pictures", self.endpoint))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.url)
    }
}

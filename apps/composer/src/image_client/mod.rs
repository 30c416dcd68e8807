//! Adapter for the external image-synthesis capability.
//!
//! The image generator depends only on the `ImageService` trait. `HttpImageClient`
//! talks to a JSON endpoint; `DisabledImageService` is used when no endpoint is
//! configured and fails every request with a clear reason.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("image API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("image service returned no usable reference")]
    Malformed,

    #[error("image call timed out after {0:?}")]
    Timeout(Duration),

    #[error("image service is not configured")]
    NotConfigured,
}

/// Target size class of a generated image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSize {
    Square,
    Landscape,
    Portrait,
    Wide,
}

impl ImageSize {
    /// Maps an aspect-ratio hint such as "16:9" to a size class. Unknown hints are landscape.
    pub fn from_aspect_ratio(hint: Option<&str>) -> Self {
        let Some((w, h)) = hint.and_then(|h| h.split_once(':')) else {
            return ImageSize::Landscape;
        };
        let (Ok(w), Ok(h)) = (w.trim().parse::<f32>(), h.trim().parse::<f32>()) else {
            return ImageSize::Landscape;
        };
        if w <= 0.0 || h <= 0.0 {
            return ImageSize::Landscape;
        }

        let ratio = w / h;
        if ratio >= 2.0 {
            ImageSize::Wide
        } else if ratio > 1.1 {
            ImageSize::Landscape
        } else if ratio >= 0.9 {
            ImageSize::Square
        } else {
            ImageSize::Portrait
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRequest {
    pub prompt: String,
    pub size: ImageSize,
    pub style: String,
}

/// A resolvable image reference returned by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAsset {
    pub url: String,
    #[serde(default)]
    pub cached: bool,
}

#[async_trait]
pub trait ImageService: Send + Sync {
    async fn synthesize(&self, request: &ImageRequest) -> Result<ImageAsset, ImageError>;

    fn model_id(&self) -> &str;
}

/// Client for a JSON image endpoint: `POST {prompt, size, style}` → `{url, cached}`.
#[derive(Clone)]
pub struct HttpImageClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpImageClient {
    pub fn new(endpoint: String, api_key: Option<String>) -> Result<Self, ImageError> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(180)).build()?,
            endpoint,
            api_key,
        })
    }
}

#[async_trait]
impl ImageService for HttpImageClient {
    async fn synthesize(&self, request: &ImageRequest) -> Result<ImageAsset, ImageError> {
        let mut builder = self.client.post(&self.endpoint).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ImageError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let asset: ImageAsset = response.json().await?;
        if asset.url.trim().is_empty() {
            return Err(ImageError::Malformed);
        }

        debug!(cached = asset.cached, "Image synthesized");
        Ok(asset)
    }

    fn model_id(&self) -> &str {
        "http-image-service"
    }
}

/// Stand-in used when no image endpoint is configured.
#[derive(Debug, Default)]
pub struct DisabledImageService;

#[async_trait]
impl ImageService for DisabledImageService {
    async fn synthesize(&self, _request: &ImageRequest) -> Result<ImageAsset, ImageError> {
        Err(ImageError::NotConfigured)
    }

    fn model_id(&self) -> &str {
        "disabled"
    }
}

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::future::join_all;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[async_trait]
pub trait ImageCaptioner: Send + Sync {
    async fn caption(&self, image: &[u8]) -> Result<String>;

    /// Order-preserving concurrent map; the caller zips the result to its
    /// image ids positionally.
    async fn caption_all(&self, images: &[Vec<u8>]) -> Result<Vec<String>> {
        let futures: Vec<_> = images.iter().map(|img| self.caption(img)).collect();
        join_all(futures).await.into_iter().collect()
    }
}

#[derive(Serialize)]
struct CaptionRequest {
    image_base64: String,
}

#[derive(Deserialize)]
struct CaptionResponse {
    caption: String,
}

pub struct HttpImageCaptioner {
    client: Client,
    base_url: String,
}

impl HttpImageCaptioner {
    pub fn new(base_url: String, timeout_seconds: u64) -> Self {
        Self {
            client: super::build_client(timeout_seconds),
            base_url,
        }
    }
}

#[async_trait]
impl ImageCaptioner for HttpImageCaptioner {
    async fn caption(&self, image: &[u8]) -> Result<String> {
        debug!("Captioning image ({} bytes)", image.len());

        let request = CaptionRequest {
            image_base64: BASE64.encode(image),
        };

        let response = self
            .client
            .post(format!("{}/caption", self.base_url))
            .json(&request)
            .send()
            .await
            .context("Failed to reach captioner service")?;

        let response = super::check_status(response, "Captioner").await?;
        let body: CaptionResponse = response
            .json()
            .await
            .context("Failed to parse captioner response")?;

        Ok(body.caption)
    }
}

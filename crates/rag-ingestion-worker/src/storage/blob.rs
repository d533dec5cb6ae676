use crate::config::BlobStoreConfig;
use crate::utils::error::WorkerError;
use futures::future::join_all;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

/// Object-store client for extracted page images.
///
/// Images live at `{userId}/{imageId}.png` and uploads are upserts, so
/// re-ingesting a source overwrites its blobs instead of failing.
pub struct BlobStore {
    client: Client,
    base_url: String,
    bucket: String,
    service_key: String,
}

impl BlobStore {
    pub fn new(config: &BlobStoreConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_seconds))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: config.base_url.clone(),
            bucket: config.bucket.clone(),
            service_key: config.service_key.clone(),
        }
    }

    pub fn image_path(user_id: &str, image_id: &str) -> String {
        format!("{user_id}/{image_id}.png")
    }

    pub async fn upload_image(
        &self,
        user_id: &str,
        image_id: &str,
        bytes: Vec<u8>,
    ) -> Result<(), WorkerError> {
        let path = Self::image_path(user_id, image_id);
        let url = format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url, self.bucket, path
        );

        debug!("Uploading image {} ({} bytes)", path, bytes.len());

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.service_key)
            .header("Content-Type", "image/png")
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Failed to upload {}: {} - {}", path, status, body);
            return Err(WorkerError::Storage(format!(
                "blob upload failed for {path}: {status}"
            )));
        }

        Ok(())
    }

    /// Uploads all images concurrently; returns their storage paths in
    /// input order. Any single failure fails the batch.
    pub async fn upload_images(
        &self,
        user_id: &str,
        images: &[(String, Vec<u8>)],
    ) -> Result<Vec<String>, WorkerError> {
        let uploads: Vec<_> = images
            .iter()
            .map(|(image_id, bytes)| self.upload_image(user_id, image_id, bytes.clone()))
            .collect();

        for result in join_all(uploads).await {
            result?;
        }

        Ok(images
            .iter()
            .map(|(image_id, _)| Self::image_path(user_id, image_id))
            .collect())
    }
}

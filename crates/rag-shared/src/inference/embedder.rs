use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// One batched call; the response is index-aligned to `texts`.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn dimension(&self) -> usize;
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    texts: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

pub struct HttpEmbedder {
    client: Client,
    base_url: String,
    dimension: usize,
}

impl HttpEmbedder {
    pub fn new(base_url: String, dimension: usize, timeout_seconds: u64) -> Self {
        Self {
            client: super::build_client(timeout_seconds),
            base_url,
            dimension,
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let response = self
            .client
            .post(format!("{}/embed", self.base_url))
            .json(&EmbedRequest { texts })
            .send()
            .await
            .context("Failed to reach embedding service")?;

        let response = super::check_status(response, "Embedding").await?;
        let body: EmbedResponse = response
            .json()
            .await
            .context("Failed to parse embedding response")?;

        if body.embeddings.len() != texts.len() {
            anyhow::bail!(
                "Embedding count mismatch: expected {}, got {}",
                texts.len(),
                body.embeddings.len()
            );
        }

        for embedding in &body.embeddings {
            if embedding.len() != self.dimension {
                anyhow::bail!(
                    "Embedding dimension mismatch: expected {}, got {}",
                    self.dimension,
                    embedding.len()
                );
            }
        }

        Ok(body.embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

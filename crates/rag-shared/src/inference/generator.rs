use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// One request/response completion. When `json_schema` is set the service
/// constrains decoding so the output validates against the schema.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest {
    pub prompt: String,
    pub max_tokens: usize,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_schema: Option<Value>,
}

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: GenerateRequest) -> Result<String>;
}

#[derive(serde::Deserialize)]
struct GenerateResponse {
    text: String,
}

pub struct HttpGenerator {
    client: Client,
    base_url: String,
}

impl HttpGenerator {
    pub fn new(base_url: String, timeout_seconds: u64) -> Self {
        Self {
            client: super::build_client(timeout_seconds),
            base_url,
        }
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(&self, request: GenerateRequest) -> Result<String> {
        debug!(
            "Generating completion ({} prompt chars, max_tokens={})",
            request.prompt.len(),
            request.max_tokens
        );

        let response = self
            .client
            .post(format!("{}/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .context("Failed to reach generator service")?;

        let response = super::check_status(response, "Generator").await?;
        let body: GenerateResponse = response
            .json()
            .await
            .context("Failed to parse generator response")?;

        Ok(body.text)
    }
}

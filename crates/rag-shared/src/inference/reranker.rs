use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Document handed to the reranker; `id` identifies the parent chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RerankDocument {
    pub id: String,
    pub content: String,
}

#[async_trait]
pub trait Reranker: Send + Sync {
    /// Returns the `top_k` most relevant documents, best first.
    async fn rerank(
        &self,
        query: &str,
        documents: Vec<RerankDocument>,
        top_k: usize,
    ) -> Result<Vec<RerankDocument>>;
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    documents: Vec<RerankDocument>,
    top_k: usize,
}

#[derive(Deserialize)]
struct RerankResponse {
    documents: Vec<RerankDocument>,
}

pub struct HttpReranker {
    client: Client,
    base_url: String,
}

impl HttpReranker {
    pub fn new(base_url: String, timeout_seconds: u64) -> Self {
        Self {
            client: super::build_client(timeout_seconds),
            base_url,
        }
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn rerank(
        &self,
        query: &str,
        documents: Vec<RerankDocument>,
        top_k: usize,
    ) -> Result<Vec<RerankDocument>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Reranking {} documents (top_k={})", documents.len(), top_k);

        let response = self
            .client
            .post(format!("{}/rerank", self.base_url))
            .json(&RerankRequest {
                query,
                documents,
                top_k,
            })
            .send()
            .await
            .context("Failed to reach reranker service")?;

        let response = super::check_status(response, "Reranker").await?;
        let body: RerankResponse = response
            .json()
            .await
            .context("Failed to parse reranker response")?;

        Ok(body.documents)
    }
}

//! Remote inference clients.
//!
//! Each GPU-backed model (parser, captioner, embedder, reranker, generator)
//! is reached over a small JSON-over-HTTP RPC surface. The traits are the
//! seams the pipelines program against; the `Http*` types are the production
//! implementations.

pub mod captioner;
pub mod embedder;
pub mod generator;
pub mod parser;
pub mod reranker;

pub use captioner::{HttpImageCaptioner, ImageCaptioner};
pub use embedder::{Embedder, HttpEmbedder};
pub use generator::{GenerateRequest, Generator, HttpGenerator};
pub use parser::{HttpPdfParser, ParsedPdf, PdfParser};
pub use reranker::{HttpReranker, Reranker, RerankDocument};

use reqwest::Client;
use std::time::Duration;

pub(crate) fn build_client(timeout_seconds: u64) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .build()
        .unwrap_or_else(|_| Client::new())
}

pub(crate) async fn check_status(response: reqwest::Response, what: &str) -> anyhow::Result<reqwest::Response> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("{} API error ({}): {}", what, status, body);
    }
    Ok(response)
}

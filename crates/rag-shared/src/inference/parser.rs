use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::future::join_all;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Output of one remote parse call: markdown whose `![alt](ref)` image
/// refs use fresh UUIDs, plus the PNG bytes keyed by those UUIDs.
#[derive(Debug, Clone)]
pub struct ParsedPdf {
    pub markdown: String,
    pub images: HashMap<String, Vec<u8>>,
}

#[async_trait]
pub trait PdfParser: Send + Sync {
    async fn parse(&self, pdf: &[u8]) -> Result<ParsedPdf>;

    /// Order-preserving concurrent map over page-group blobs.
    async fn parse_all(&self, pdfs: &[Vec<u8>]) -> Result<Vec<ParsedPdf>> {
        let futures: Vec<_> = pdfs.iter().map(|pdf| self.parse(pdf)).collect();
        join_all(futures).await.into_iter().collect()
    }
}

#[derive(Serialize)]
struct ParseRequest {
    pdf_base64: String,
}

#[derive(Deserialize)]
struct ParseResponse {
    markdown: String,
    /// image UUID -> base64 PNG bytes
    images: HashMap<String, String>,
}

pub struct HttpPdfParser {
    client: Client,
    base_url: String,
}

impl HttpPdfParser {
    pub fn new(base_url: String, timeout_seconds: u64) -> Self {
        Self {
            client: super::build_client(timeout_seconds),
            base_url,
        }
    }
}

#[async_trait]
impl PdfParser for HttpPdfParser {
    async fn parse(&self, pdf: &[u8]) -> Result<ParsedPdf> {
        debug!("Parsing PDF chunk ({} bytes)", pdf.len());

        let request = ParseRequest {
            pdf_base64: BASE64.encode(pdf),
        };

        let response = self
            .client
            .post(format!("{}/parse", self.base_url))
            .json(&request)
            .send()
            .await
            .context("Failed to reach parser service")?;

        let response = super::check_status(response, "Parser").await?;
        let body: ParseResponse = response
            .json()
            .await
            .context("Failed to parse parser response")?;

        let mut images = HashMap::with_capacity(body.images.len());
        for (image_id, b64) in body.images {
            let bytes = BASE64
                .decode(&b64)
                .with_context(|| format!("Invalid image payload for {image_id}"))?;
            images.insert(image_id, bytes);
        }

        Ok(ParsedPdf {
            markdown: body.markdown,
            images,
        })
    }
}

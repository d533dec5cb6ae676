pub mod processor;

pub use processor::IngestProcessor;

use crate::config::Settings;
use crate::database::Repository;
use crate::queue::{QueueConsumer, StatusChannel};
use crate::storage::BlobStore;
use anyhow::Result;
use rag_shared::inference::{HttpEmbedder, HttpImageCaptioner, HttpPdfParser};
use rag_shared::{DbPool, IngestTask, SourceStatus};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub struct Worker {
    consumer: QueueConsumer,
    status: Arc<StatusChannel>,
    processor: Arc<IngestProcessor>,
}

impl Worker {
    pub fn new(settings: Settings, db_pool: DbPool) -> Result<Self> {
        let consumer = QueueConsumer::new(&settings.redis)?;
        let status = Arc::new(StatusChannel::new(&settings.redis)?);

        let repository = Arc::new(Repository::new(
            db_pool,
            settings.inference.embedding_dimension,
        ));

        let inference = &settings.inference;
        let parser = Arc::new(HttpPdfParser::new(
            inference.parser_url.clone(),
            inference.timeout_seconds,
        ));
        let captioner = Arc::new(HttpImageCaptioner::new(
            inference.captioner_url.clone(),
            inference.timeout_seconds,
        ));
        let embedder = Arc::new(HttpEmbedder::new(
            inference.embedder_url.clone(),
            inference.embedding_dimension,
            inference.timeout_seconds,
        ));

        let blob_store = Arc::new(BlobStore::new(&settings.blob_store));

        let processor = Arc::new(IngestProcessor::new(
            settings,
            repository,
            status.clone(),
            parser,
            captioner,
            embedder,
            blob_store,
        ));

        Ok(Self {
            consumer,
            status,
            processor,
        })
    }

    /// Main worker loop: blocks on the queue until a shutdown signal.
    /// An in-flight task always runs to completion before shutdown.
    pub async fn run(mut self) -> Result<()> {
        info!("🎯 Worker started, listening on file processing queue");

        loop {
            tokio::select! {
                result = self.consumer.dequeue() => {
                    match result {
                        Ok(payload) => self.handle_message(&payload).await,
                        Err(e) => {
                            error!("Queue receive failed: {}. Reconnecting...", e);
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        info!("Worker stopped");
        Ok(())
    }

    async fn handle_message(&self, payload: &str) {
        let task: IngestTask = match serde_json::from_str(payload) {
            Ok(task) => task,
            Err(e) => {
                error!("Failed to parse queue message: {}", e);

                // Best effort: dig the source id out of the raw payload so
                // the upload does not appear stuck in `queued` forever.
                if let Some(source_id) = recover_source_id(payload) {
                    self.status
                        .set_status_quietly(&source_id, SourceStatus::Failed)
                        .await;
                } else {
                    warn!("Could not recover source id from malformed message");
                }
                return;
            }
        };

        info!(
            "📥 Task received: source={}, user={}, kind={:?}",
            task.id, task.user_id, task.kind
        );

        match self.processor.process(&task).await {
            Ok(_) => info!("✅ Successfully processed source {}", task.id),
            Err(e) => error!("❌ Failed to process source {}: {}", task.id, e),
        }
    }
}

fn recover_source_id(payload: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(payload)
        .ok()?
        .get("id")?
        .as_str()
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_source_id_from_partial_message() {
        let payload = r#"{"id": "src-9", "type": "pdf", "unexpected": true}"#;
        assert_eq!(recover_source_id(payload), Some("src-9".to_string()));
    }

    #[test]
    fn malformed_payload_recovers_nothing() {
        assert_eq!(recover_source_id("not json at all"), None);
        assert_eq!(recover_source_id(r#"{"type":"pdf"}"#), None);
    }
}

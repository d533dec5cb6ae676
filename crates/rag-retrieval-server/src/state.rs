use crate::config::Settings;
use crate::database::Repository;
use crate::retrieval::RetrievalPipeline;
use rag_shared::inference::{HttpEmbedder, HttpGenerator, HttpReranker};
use rag_shared::DbPool;
use std::sync::Arc;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub pipeline: Arc<RetrievalPipeline>,
    pub settings: Settings,
}

impl AppState {
    pub fn new(settings: Settings, db_pool: DbPool) -> Self {
        let repository = Arc::new(Repository::new(
            db_pool.clone(),
            settings.inference.embedding_dimension,
        ));

        let inference = &settings.inference;
        let embedder = Arc::new(HttpEmbedder::new(
            inference.embedder_url.clone(),
            inference.embedding_dimension,
            inference.timeout_seconds,
        ));
        let reranker = Arc::new(HttpReranker::new(
            inference.reranker_url.clone(),
            inference.timeout_seconds,
        ));
        let generator = Arc::new(HttpGenerator::new(
            inference.generator_url.clone(),
            inference.timeout_seconds,
        ));

        let pipeline = Arc::new(RetrievalPipeline::new(
            repository,
            embedder,
            reranker,
            generator,
            settings.retrieval.clone(),
        ));

        Self {
            db_pool,
            pipeline,
            settings,
        }
    }
}

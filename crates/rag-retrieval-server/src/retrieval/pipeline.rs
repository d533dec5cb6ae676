use super::{
    answer, context, parents, prepare_question, rerank, retriever, RequestEncryption,
    RetrievalStatus,
};
use crate::config::RetrievalConfig;
use crate::database::Repository;
use crate::utils::error::PipelineError;
use rag_shared::inference::{Embedder, Generator, Reranker};
use rag_shared::EncryptionType;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// One `/chat` request as the pipeline sees it.
#[derive(Debug, Clone)]
pub struct ChatTask {
    pub notebook_id: String,
    pub assistant_message_id: String,
    pub user_message_id: String,
    pub content: String,
    pub encryption_type: EncryptionType,
    pub encryption_key: Option<String>,
}

/// Orchestrates prepare-question -> retrieve -> parent-fetch -> rerank ->
/// extract -> summarise -> context -> save, emitting a checkpoint before
/// each phase. Checkpoint delivery doubles as the client-liveness signal:
/// a closed receiver means the client went away.
pub struct RetrievalPipeline {
    repository: Arc<Repository>,
    embedder: Arc<dyn Embedder>,
    reranker: Arc<dyn Reranker>,
    generator: Arc<dyn Generator>,
    config: RetrievalConfig,
}

impl RetrievalPipeline {
    pub fn new(
        repository: Arc<Repository>,
        embedder: Arc<dyn Embedder>,
        reranker: Arc<dyn Reranker>,
        generator: Arc<dyn Generator>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            repository,
            embedder,
            reranker,
            generator,
            config,
        }
    }

    /// Runs the pipeline for one request.
    ///
    /// A disconnected client marks the assistant message failed and is
    /// otherwise swallowed; every other failure marks the message failed
    /// and propagates so the HTTP adapter can close the stream.
    pub async fn run(
        &self,
        task: ChatTask,
        tx: mpsc::Sender<RetrievalStatus>,
    ) -> Result<(), PipelineError> {
        match self.run_internal(&task, &tx).await {
            Ok(()) => Ok(()),
            Err(PipelineError::ClientDisconnected) => {
                warn!(
                    "Client disconnected while processing message {}",
                    task.assistant_message_id
                );
                self.mark_failed(&task).await;
                Ok(())
            }
            Err(e) => {
                error!(
                    "Retrieval failed for message {}: {}",
                    task.assistant_message_id, e
                );
                self.mark_failed(&task).await;
                Err(e)
            }
        }
    }

    async fn run_internal(
        &self,
        task: &ChatTask,
        tx: &mpsc::Sender<RetrievalStatus>,
    ) -> Result<(), PipelineError> {
        let encryption = RequestEncryption::new(task.encryption_type, task.encryption_key.clone())?;

        emit(tx, RetrievalStatus::PreparingQuestion).await?;
        let mut queries = prepare_question::prepare_question(
            &self.repository,
            self.generator.as_ref(),
            &task.notebook_id,
            &task.content,
            self.config.max_queries,
        )
        .await?;
        info!(
            "Prepared {} queries for notebook {}",
            queries.len(),
            task.notebook_id
        );

        emit(tx, RetrievalStatus::RetrievingChunks).await?;
        retriever::retrieve_chunks(
            &self.repository,
            self.embedder.as_ref(),
            &task.notebook_id,
            &mut queries,
            self.config.candidate_limit,
        )
        .await?;

        emit(tx, RetrievalStatus::GettingParentChunks).await?;
        parents::attach_parent_chunks(&self.repository, &mut queries, &encryption).await?;

        emit(tx, RetrievalStatus::FilteringParentChunks).await?;
        let filtered = rerank::filter_parent_chunks(
            self.reranker.as_ref(),
            &queries,
            self.config.rerank_top_k,
        )
        .await?;

        emit(tx, RetrievalStatus::ExtractingContent).await?;
        let extracted =
            answer::extract_answer(self.generator.as_ref(), &filtered, &task.content).await?;

        emit(tx, RetrievalStatus::GeneratingResponse).await?;
        let final_response = answer::finalise_response(&extracted);

        emit(tx, RetrievalStatus::SummarizingContent).await?;
        super::summarise::summarise_messages(
            &self.repository,
            self.generator.as_ref(),
            &encryption,
            &task.content,
            &final_response,
            &task.assistant_message_id,
            &task.user_message_id,
        )
        .await?;

        emit(tx, RetrievalStatus::PreparingContext).await?;
        context::prepare_context(
            &self.repository,
            &encryption,
            &task.notebook_id,
            &task.content,
            &final_response,
            &task.user_message_id,
            &task.assistant_message_id,
            self.config.context_token_limit,
        )
        .await?;

        emit(tx, RetrievalStatus::SavingToDb).await?;
        let stored_response = encryption.protect(&final_response)?;
        self.repository
            .save_assistant_message(&task.assistant_message_id, Some(&stored_response), false)
            .await?;

        emit(tx, RetrievalStatus::CleaningUp).await?;

        Ok(())
    }

    async fn mark_failed(&self, task: &ChatTask) {
        if let Err(e) = self
            .repository
            .save_assistant_message(&task.assistant_message_id, None, true)
            .await
        {
            error!(
                "Could not mark message {} failed: {}",
                task.assistant_message_id, e
            );
        }
    }
}

/// Checkpoints are emitted before their phase; a closed receiver means the
/// SSE stream (and with it the client) is gone.
async fn emit(
    tx: &mpsc::Sender<RetrievalStatus>,
    status: RetrievalStatus,
) -> Result<(), PipelineError> {
    tx.send(status)
        .await
        .map_err(|_| PipelineError::ClientDisconnected)
}

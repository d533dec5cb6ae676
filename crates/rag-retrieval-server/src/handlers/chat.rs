use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::{self, Stream};
use rag_shared::EncryptionType;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::retrieval::{ChatTask, RetrievalStatus};
use crate::state::AppState;
use crate::utils::error::ApiError;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatRequest {
    pub notebook_id: String,
    pub assistant_message_id: String,
    pub user_message_id: String,
    pub content: String,
    #[serde(default)]
    pub encryption_type: EncryptionType,
    #[serde(default)]
    pub encryption_key: Option<String>,
}

/// Handle a chat request as an SSE stream of pipeline checkpoints.
/// POST /chat
///
/// The pipeline runs in its own task and pushes one status per phase into
/// a channel; this handler adapts the channel to `data: <status>` frames.
/// Dropping the stream (client gone) closes the receiver, which the
/// pipeline observes as a disconnect.
pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    if request.content.trim().is_empty() {
        return Err(ApiError::BadRequest("content cannot be empty".to_string()));
    }

    info!(
        "Chat request: notebook={}, assistant_message={}",
        request.notebook_id, request.assistant_message_id
    );

    let task = ChatTask {
        notebook_id: request.notebook_id,
        assistant_message_id: request.assistant_message_id,
        user_message_id: request.user_message_id,
        content: request.content,
        encryption_type: request.encryption_type,
        encryption_key: request.encryption_key,
    };

    let (tx, rx) = mpsc::channel::<RetrievalStatus>(16);

    let pipeline = state.pipeline.clone();
    tokio::spawn(async move {
        if let Err(e) = pipeline.run(task, tx).await {
            error!("Retrieval pipeline error: {}", e);
        }
    });

    let stream = stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|status| (Ok(Event::default().data(status.as_str())), rx))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

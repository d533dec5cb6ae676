use crate::config::RedisConfig;
use anyhow::Result;
use rag_shared::SourceStatus;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Publishes per-source processing state as `source:{id}` string keys.
///
/// Writes are independent single-key sets; consumers may observe any
/// intermediate state. The [`SourceStatus`] enum makes invalid values
/// unrepresentable.
pub struct StatusChannel {
    client: redis::Client,
    conn: Mutex<Option<MultiplexedConnection>>,
}

impl StatusChannel {
    pub fn new(config: &RedisConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str())?;

        Ok(Self {
            client,
            conn: Mutex::new(None),
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, redis::RedisError> {
        let mut guard = self.conn.lock().await;

        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let conn = self.client.get_multiplexed_async_connection().await?;
        *guard = Some(conn.clone());

        Ok(conn)
    }

    pub async fn set_status(&self, source_id: &str, status: SourceStatus) -> Result<()> {
        let key = format!("source:{source_id}");
        let mut conn = self.connection().await?;

        let result: Result<(), redis::RedisError> = conn.set(&key, status.as_str()).await;
        if let Err(e) = &result {
            warn!("Failed to publish status for {}: {}", source_id, e);
            *self.conn.lock().await = None;
        }
        result?;

        debug!("📝 Source {} status -> {}", source_id, status);

        Ok(())
    }

    /// Best-effort status write for failure paths: never bubbles an error
    /// on top of the one being handled.
    pub async fn set_status_quietly(&self, source_id: &str, status: SourceStatus) {
        if let Err(e) = self.set_status(source_id, status).await {
            warn!("Dropping status update for {}: {}", source_id, e);
        }
    }
}

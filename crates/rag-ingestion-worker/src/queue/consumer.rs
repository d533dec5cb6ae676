use crate::config::RedisConfig;
use anyhow::Result;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::{info, warn};

/// Blocking consumer of the `file_processing_queue` Redis list.
///
/// BLPOP is atomic, so a message is handed to at most one worker process.
/// The connection is established lazily and dropped on error; the worker
/// loop reconnects by simply calling [`QueueConsumer::dequeue`] again.
pub struct QueueConsumer {
    client: redis::Client,
    queue_name: String,
    conn: Option<MultiplexedConnection>,
}

impl QueueConsumer {
    pub fn new(config: &RedisConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str())?;

        Ok(Self {
            client,
            queue_name: config.queue_name.clone(),
            conn: None,
        })
    }

    async fn connection(&mut self) -> Result<MultiplexedConnection, redis::RedisError> {
        if let Some(conn) = &self.conn {
            // Multiplexed connections are cheap clones over one socket
            return Ok(conn.clone());
        }

        let conn = self.client.get_multiplexed_async_connection().await?;
        info!("🔌 Redis queue connection established");
        self.conn = Some(conn.clone());

        Ok(conn)
    }

    /// Blocks until a message arrives; returns the raw JSON payload.
    pub async fn dequeue(&mut self) -> Result<String, redis::RedisError> {
        let mut conn = self.connection().await?;

        // timeout 0 = block indefinitely
        let result: Result<Option<(String, String)>, redis::RedisError> =
            conn.blpop(&self.queue_name, 0.0).await;

        match result {
            Ok(Some((_list, payload))) => Ok(payload),
            Ok(None) => {
                // BLPOP with no timeout should never return nil; treat as a
                // dropped connection and let the caller retry.
                self.conn = None;
                Err(redis::RedisError::from((
                    redis::ErrorKind::IoError,
                    "BLPOP returned nil without timeout",
                )))
            }
            Err(e) => {
                warn!("Redis connection lost: {}", e);
                self.conn = None;
                Err(e)
            }
        }
    }
}

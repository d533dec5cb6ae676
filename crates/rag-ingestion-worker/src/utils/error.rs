use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Remote inference failure: {0}")]
    RemoteInference(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Queue connection error: {0}")]
    Queue(#[from] redis::RedisError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for WorkerError {
    fn from(err: anyhow::Error) -> Self {
        WorkerError::Other(err.to_string())
    }
}

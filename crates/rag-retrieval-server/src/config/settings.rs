use anyhow::Result;
use config::{Config, Environment, File};
use rag_shared::db::DatabaseConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub inference: InferenceConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct InferenceConfig {
    pub embedder_url: String,
    pub reranker_url: String,
    pub generator_url: String,
    #[serde(default = "default_dimension")]
    pub embedding_dimension: usize,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_dimension() -> usize {
    1024
}

fn default_timeout() -> u64 {
    300
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetrievalConfig {
    /// Total candidate budget shared across the optimized queries.
    pub candidate_limit: usize,
    /// Parents surviving the reranker per query.
    pub rerank_top_k: usize,
    /// Upper bound on LLM-proposed sub-queries.
    pub max_queries: usize,
    /// Token budget for the rolling notebook context.
    pub context_token_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            candidate_limit: 100,
            rerank_top_k: 10,
            max_queries: 5,
            context_token_limit: 8000,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        // Load from environment first
        dotenvy::dotenv().ok();

        let config = Config::builder()
            // Load from config file
            .add_source(File::with_name("config/settings").required(false))
            // Override with environment variables (prefix: APP)
            // Example: APP_SERVER__PORT=8080
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;

        settings.validate()?;

        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.retrieval.max_queries == 0 {
            anyhow::bail!("retrieval.max_queries must be at least 1");
        }

        if self.retrieval.candidate_limit == 0 {
            anyhow::bail!("retrieval.candidate_limit must be at least 1");
        }

        if self.inference.embedding_dimension == 0 {
            anyhow::bail!("inference.embedding_dimension must be set");
        }

        Ok(())
    }
}

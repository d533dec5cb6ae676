use anyhow::Result;
use config::{Config, Environment, File};
use rag_shared::db::DatabaseConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub inference: InferenceConfig,
    pub blob_store: BlobStoreConfig,
    #[serde(default)]
    pub pdf: PdfSplitConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RedisConfig {
    pub url: String,
    #[serde(default = "default_queue_name")]
    pub queue_name: String,
}

fn default_queue_name() -> String {
    "file_processing_queue".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct InferenceConfig {
    pub parser_url: String,
    pub captioner_url: String,
    pub embedder_url: String,
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
pub struct BlobStoreConfig {
    pub base_url: String,
    pub bucket: String,
    pub service_key: String,
    #[serde(default = "default_blob_timeout")]
    pub timeout_seconds: u64,
}

fn default_blob_timeout() -> u64 {
    60
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PdfSplitConfig {
    pub max_parallel: usize,
    pub min_pages: usize,
}

impl Default for PdfSplitConfig {
    fn default() -> Self {
        Self {
            max_parallel: 8,
            min_pages: 25,
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
            // Example: APP_DATABASE__URL=postgres://...
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
        if self.pdf.max_parallel == 0 {
            anyhow::bail!("pdf.max_parallel must be at least 1");
        }

        if self.pdf.min_pages == 0 {
            anyhow::bail!("pdf.min_pages must be at least 1");
        }

        if self.inference.embedding_dimension == 0 {
            anyhow::bail!("inference.embedding_dimension must be set");
        }

        Ok(())
    }
}

pub mod settings;

pub use settings::{InferenceConfig, RetrievalConfig, ServerConfig, Settings};

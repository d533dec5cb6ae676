pub mod settings;

pub use settings::{
    BlobStoreConfig, InferenceConfig, PdfSplitConfig, RedisConfig, Settings,
};

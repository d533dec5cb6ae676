pub mod config;
pub mod database;
pub mod handlers;
pub mod retrieval;
pub mod state;
pub mod utils;

pub use config::Settings;
pub use state::AppState;
pub use utils::error::{ApiError, PipelineError};

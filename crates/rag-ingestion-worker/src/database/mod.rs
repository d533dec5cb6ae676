pub mod models;
pub mod repository;

pub use models::{NewChildChunk, NewParentChunk};
pub use repository::Repository;

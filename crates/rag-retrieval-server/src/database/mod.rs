pub mod models;
pub mod repository;

pub use models::{MessageRow, ParentChunkRow};
pub use repository::Repository;

pub mod db;
pub mod encryption;
pub mod inference;
pub mod markers;
pub mod models;
pub mod tokens;

pub use db::DbPool;
pub use models::{
    ChildChunkDraft, ContextMessage, DbChunk, EncryptionType, IngestTask, NotebookContext,
    ParentChunkDraft, SourceKind, SourceStatus,
};

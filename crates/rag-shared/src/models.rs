use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Smallest provenance unit of a source document. The ids form a dense
/// 0-based sequence per source and are the targets of `<<<id>>>` markers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DbChunk {
    Text { id: i64, content: String },
    Table { id: i64, content: String },
}

impl DbChunk {
    pub fn id(&self) -> i64 {
        match self {
            Self::Text { id, .. } | Self::Table { id, .. } => *id,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Self::Text { content, .. } | Self::Table { content, .. } => content,
        }
    }

    pub fn content_mut(&mut self) -> &mut String {
        match self {
            Self::Text { content, .. } | Self::Table { content, .. } => content,
        }
    }

    pub fn is_table(&self) -> bool {
        matches!(self, Self::Table { .. })
    }
}

/// ~2000-char semantic block; citation target. `content` keeps the
/// `<<<id>>>` markers of every db chunk it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentChunkDraft {
    pub id: Uuid,
    pub content: String,
    pub children_ids: Vec<i64>,
}

/// ~500-char retrieval unit; content is marker-stripped, `parent_ids`
/// points back to every covering parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildChunkDraft {
    pub id: Uuid,
    pub content: String,
    pub parent_ids: Vec<String>,
}

/// Per-source processing state published on the status channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStatus {
    Uploading,
    Queued,
    Processing,
    Starting,
    Vision,
    Extracting,
    Images,
    Chunking,
    Completed,
    Failed,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploading => "uploading",
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Starting => "starting",
            Self::Vision => "vision",
            Self::Extracting => "extracting",
            Self::Images => "images",
            Self::Chunking => "chunking",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceStatus {
    type Err = InvalidStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploading" => Ok(Self::Uploading),
            "queued" => Ok(Self::Queued),
            "processing" => Ok(Self::Processing),
            "starting" => Ok(Self::Starting),
            "vision" => Ok(Self::Vision),
            "extracting" => Ok(Self::Extracting),
            "images" => Ok(Self::Images),
            "chunking" => Ok(Self::Chunking),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(InvalidStatus(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid processing status: {0}")]
pub struct InvalidStatus(pub String);

/// Content-at-rest encryption mode carried on every task/request.
/// Parent and source content are encrypted under any non-`NotEncrypted`
/// mode; child chunk content only under `AdvancedEncryption`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum EncryptionType {
    #[default]
    NotEncrypted,
    Encrypted,
    AdvancedEncryption,
}

impl EncryptionType {
    pub fn is_encrypted(&self) -> bool {
        !matches!(self, Self::NotEncrypted)
    }

    pub fn is_advanced(&self) -> bool {
        matches!(self, Self::AdvancedEncryption)
    }
}

/// Kind of source document on the work queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Pdf,
    Url,
}

/// One message on the `file_processing_queue` Redis list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestTask {
    #[serde(rename = "type")]
    pub kind: SourceKind,
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub base64: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub encryption_type: EncryptionType,
    #[serde(default)]
    pub encryption_key: Option<String>,
}

/// One entry of the rolling conversation context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextMessage {
    pub id: String,
    pub content: String,
}

/// Rolling per-notebook conversation state stored as `Notebook.context`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NotebookContext {
    pub summaries: Vec<String>,
    pub messages: Vec<ContextMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_chunk_round_trips_as_tagged_json() {
        let chunk = DbChunk::Table {
            id: 3,
            content: "| a |".to_string(),
        };
        let json = serde_json::to_value(&chunk).unwrap();
        assert_eq!(json["type"], "table");
        assert_eq!(json["id"], 3);

        let back: DbChunk = serde_json::from_value(json).unwrap();
        assert_eq!(back, chunk);
    }

    #[test]
    fn status_round_trip() {
        for status in [
            SourceStatus::Queued,
            SourceStatus::Extracting,
            SourceStatus::Completed,
            SourceStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<SourceStatus>().unwrap(), status);
        }
    }

    #[test]
    fn invalid_status_is_rejected() {
        assert!("done".parse::<SourceStatus>().is_err());
    }

    #[test]
    fn ingest_task_rejects_unknown_fields() {
        let raw = r#"{"type":"pdf","id":"s1","user_id":"u1","base64":"xx","bogus":1}"#;
        assert!(serde_json::from_str::<IngestTask>(raw).is_err());

        let raw = r#"{"type":"url","id":"s1","user_id":"u1","url":"https://example.com"}"#;
        let task: IngestTask = serde_json::from_str(raw).unwrap();
        assert_eq!(task.kind, SourceKind::Url);
        assert_eq!(task.encryption_type, EncryptionType::NotEncrypted);
    }
}

pub mod answer;
pub mod context;
pub mod parents;
pub mod pipeline;
pub mod prepare_question;
pub mod rerank;
pub mod retriever;
pub mod summarise;

pub use pipeline::{ChatTask, RetrievalPipeline};

use rag_shared::encryption::{decrypt_data, encrypt_data};
use rag_shared::EncryptionType;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Checkpoints streamed to the client, one SSE frame each, emitted before
/// the phase they announce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalStatus {
    PreparingQuestion,
    RetrievingChunks,
    GettingParentChunks,
    FilteringParentChunks,
    ExtractingContent,
    GeneratingResponse,
    SummarizingContent,
    PreparingContext,
    SavingToDb,
    CleaningUp,
}

impl RetrievalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreparingQuestion => "preparing_question",
            Self::RetrievingChunks => "retrieving_chunks",
            Self::GettingParentChunks => "getting_parent_chunks",
            Self::FilteringParentChunks => "filtering_parent_chunks",
            Self::ExtractingContent => "extracting_content",
            Self::GeneratingResponse => "generating_response",
            Self::SummarizingContent => "summarizing_content",
            Self::PreparingContext => "preparing_context",
            Self::SavingToDb => "saving_to_db",
            Self::CleaningUp => "cleaning_up",
        }
    }
}

/// An LLM-rewritten, de-contextualized search query plus everything the
/// pipeline accumulates for it along the way.
#[derive(Debug, Clone)]
pub struct OptimizedQuery {
    pub id: Uuid,
    pub optimized_query: String,
    pub keywords: Vec<String>,
    pub embedding: Option<Vec<f32>>,
    pub parent_ids: Vec<String>,
    pub parent_chunks: Vec<ParentChunk>,
}

impl OptimizedQuery {
    pub fn new(optimized_query: String, keywords: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            optimized_query,
            keywords,
            embedding: None,
            parent_ids: Vec::new(),
            parent_chunks: Vec::new(),
        }
    }
}

/// Parent chunk as the pipeline sees it: decrypted, with both the
/// marker-bearing and the display forms.
#[derive(Debug, Clone)]
pub struct ParentChunk {
    pub id: String,
    pub source_id: String,
    pub content: String,
    pub clean_content: String,
}

/// A parent chunk that survived reranking for one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilteredParentChunk {
    pub content: String,
    pub source_id: String,
}

#[derive(Debug, Clone)]
pub struct FilteredQueryResult {
    pub optimized_query: String,
    pub parent_chunks: Vec<FilteredParentChunk>,
}

/// Structured answer the generator is constrained to produce.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TextWithCitations {
    #[serde(rename = "_reasoning", default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    pub text: String,
    pub citations: Vec<Citation>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Citation {
    pub citation: String,
    #[serde(rename = "sourceId")]
    pub source_id: String,
    #[serde(rename = "chunkId")]
    pub chunk_id: String,
    pub brief_summary: String,
}

/// Encryption mode resolved for one chat request.
#[derive(Debug, Clone)]
pub struct RequestEncryption {
    mode: EncryptionType,
    key: Option<String>,
}

impl RequestEncryption {
    pub fn new(
        mode: EncryptionType,
        key: Option<String>,
    ) -> Result<Self, crate::utils::error::PipelineError> {
        if mode.is_encrypted() && key.is_none() {
            return Err(crate::utils::error::PipelineError::Encryption(
                "encryption key is required when encryption is enabled".to_string(),
            ));
        }

        Ok(Self { mode, key })
    }

    pub fn enabled(&self) -> bool {
        self.mode.is_encrypted()
    }

    /// Decrypt-on-read; corrupt rows come back as the sentinel string
    /// instead of failing the whole request.
    pub fn reveal(&self, content: &str) -> String {
        if !self.enabled() {
            return content.to_string();
        }

        decrypt_data(content, self.key.as_deref().unwrap_or_default())
    }

    /// Encrypt-on-write.
    pub fn protect(&self, content: &str) -> Result<String, crate::utils::error::PipelineError> {
        if !self.enabled() {
            return Ok(content.to_string());
        }

        encrypt_data(content, self.key.as_deref().unwrap_or_default())
            .map_err(|e| crate::utils::error::PipelineError::Encryption(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_match_wire_protocol() {
        assert_eq!(RetrievalStatus::PreparingQuestion.as_str(), "preparing_question");
        assert_eq!(RetrievalStatus::CleaningUp.as_str(), "cleaning_up");
    }

    #[test]
    fn encryption_round_trips_through_request_modes() {
        let enc = RequestEncryption::new(EncryptionType::Encrypted, Some("pw".to_string())).unwrap();
        let token = enc.protect("hello").unwrap();
        assert_ne!(token, "hello");
        assert_eq!(enc.reveal(&token), "hello");

        let plain = RequestEncryption::new(EncryptionType::NotEncrypted, None).unwrap();
        assert_eq!(plain.protect("hello").unwrap(), "hello");
        assert_eq!(plain.reveal("hello"), "hello");
    }

    #[test]
    fn missing_key_is_rejected() {
        assert!(RequestEncryption::new(EncryptionType::AdvancedEncryption, None).is_err());
    }

    #[test]
    fn text_with_citations_accepts_llm_aliases() {
        let raw = r#"{
            "_reasoning": "used doc_A",
            "text": "The sky is blue [CITATION: 1].",
            "citations": [
                {"citation": "1", "sourceId": "doc_A", "chunkId": "99", "brief_summary": "sky"}
            ]
        }"#;

        let parsed: TextWithCitations = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.citations[0].source_id, "doc_A");
        assert_eq!(parsed.citations[0].chunk_id, "99");
    }
}

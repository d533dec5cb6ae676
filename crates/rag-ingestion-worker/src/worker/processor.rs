use crate::config::Settings;
use crate::database::{NewChildChunk, NewParentChunk, Repository};
use crate::document::chunker::{process_chunks, ChunkSet};
use crate::document::{pdf, web};
use crate::queue::StatusChannel;
use crate::storage::BlobStore;
use crate::utils::error::WorkerError;
use once_cell::sync::Lazy;
use pgvector::Vector;
use rag_shared::encryption::encrypt_data;
use rag_shared::inference::{Embedder, ImageCaptioner, PdfParser};
use rag_shared::{DbChunk, EncryptionType, IngestTask, SourceKind, SourceStatus};
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

static IMAGE_REF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\(([^\)]+)\)").expect("valid regex"));

/// Drives one source through parse -> caption -> chunk -> embed -> persist,
/// publishing each stage on the status channel.
pub struct IngestProcessor {
    settings: Settings,
    repository: Arc<Repository>,
    status: Arc<StatusChannel>,
    parser: Arc<dyn PdfParser>,
    captioner: Arc<dyn ImageCaptioner>,
    embedder: Arc<dyn Embedder>,
    blob_store: Arc<BlobStore>,
    http: reqwest::Client,
}

impl IngestProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: Settings,
        repository: Arc<Repository>,
        status: Arc<StatusChannel>,
        parser: Arc<dyn PdfParser>,
        captioner: Arc<dyn ImageCaptioner>,
        embedder: Arc<dyn Embedder>,
        blob_store: Arc<BlobStore>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.inference.timeout_seconds))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            settings,
            repository,
            status,
            parser,
            captioner,
            embedder,
            blob_store,
            http,
        }
    }

    /// Processes a single queue task. Every failure path converges here:
    /// the source is marked failed on both the status channel and the DB,
    /// and the worker moves on to the next message.
    pub async fn process(&self, task: &IngestTask) -> Result<(), WorkerError> {
        self.status.set_status_quietly(&task.id, SourceStatus::Starting).await;

        match self.process_internal(task).await {
            Ok(_) => {
                self.status
                    .set_status_quietly(&task.id, SourceStatus::Completed)
                    .await;
                Ok(())
            }
            Err(e) => {
                error!("Source {} failed: {}", task.id, e);

                self.status
                    .set_status_quietly(&task.id, SourceStatus::Failed)
                    .await;
                if let Err(db_err) = self.repository.mark_source_failed(&task.id).await {
                    error!("Could not mark source {} failed in DB: {}", task.id, db_err);
                }

                Err(e)
            }
        }
    }

    async fn process_internal(&self, task: &IngestTask) -> Result<(), WorkerError> {
        let encryption = Encryption::from_task(task)?;

        let (markdown, images) = match task.kind {
            SourceKind::Pdf => self.extract_pdf(task).await?,
            SourceKind::Url => (self.extract_url(task).await?, Vec::new()),
        };

        if markdown.trim().is_empty() {
            return Err(WorkerError::InvalidInput(format!(
                "source {} produced no text",
                task.id
            )));
        }

        // Caption and inline the extracted images, if any
        let markdown = if images.is_empty() {
            markdown
        } else {
            self.status.set_status_quietly(&task.id, SourceStatus::Images).await;
            self.caption_images(&markdown, &images).await?
        };

        self.status.set_status_quietly(&task.id, SourceStatus::Chunking).await;
        let chunk_set = process_chunks(&markdown);
        info!(
            "Chunked source {}: {} db chunks, {} parents, {} children",
            task.id,
            chunk_set.db_chunks.len(),
            chunk_set.parents.len(),
            chunk_set.children.len()
        );

        // One batched embedding call for every child text
        let child_texts: Vec<String> = chunk_set
            .children
            .iter()
            .map(|c| c.content.clone())
            .collect();
        let embeddings = self
            .embedder
            .embed(&child_texts)
            .await
            .map_err(|e| WorkerError::RemoteInference(e.to_string()))?;

        if embeddings.len() != chunk_set.children.len() {
            return Err(WorkerError::RemoteInference(format!(
                "embedding count mismatch: {} embeddings for {} children",
                embeddings.len(),
                chunk_set.children.len()
            )));
        }

        self.status.set_status_quietly(&task.id, SourceStatus::Uploading).await;
        self.persist(task, &encryption, chunk_set, embeddings, images)
            .await?;

        Ok(())
    }

    /// PDF path: split into page groups, fan parse calls out, stitch the
    /// outputs back together in input order.
    async fn extract_pdf(
        &self,
        task: &IngestTask,
    ) -> Result<(String, Vec<(String, Vec<u8>)>), WorkerError> {
        let base64 = task.base64.as_deref().ok_or_else(|| {
            WorkerError::InvalidInput(format!("pdf task {} is missing base64 payload", task.id))
        })?;

        self.status.set_status_quietly(&task.id, SourceStatus::Extracting).await;

        let page_groups =
            pdf::split_base64_pdf(base64, self.settings.pdf.max_parallel, self.settings.pdf.min_pages)?;
        info!("Source {}: parsing {} page groups", task.id, page_groups.len());

        let results = self
            .parser
            .parse_all(&page_groups)
            .await
            .map_err(|e| WorkerError::RemoteInference(e.to_string()))?;

        let markdown = results
            .iter()
            .map(|r| r.markdown.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        // Merge per-group image maps, preserving group order for the
        // positional caption zip later
        let mut images = Vec::new();
        for result in results {
            let mut group_images: Vec<(String, Vec<u8>)> = result.images.into_iter().collect();
            group_images.sort_by(|a, b| a.0.cmp(&b.0));
            images.extend(group_images);
        }

        Ok((markdown, images))
    }

    async fn extract_url(&self, task: &IngestTask) -> Result<String, WorkerError> {
        let url = task.url.as_deref().ok_or_else(|| {
            WorkerError::InvalidInput(format!("url task {} is missing url", task.id))
        })?;

        self.status.set_status_quietly(&task.id, SourceStatus::Extracting).await;

        web::fetch_url_text(&self.http, url).await
    }

    /// Captions every image and rewrites the markdown refs to inline
    /// `<img id={uuid} alt={caption}/>` tags. The caption list is zipped to
    /// the image list strictly: a length mismatch aborts the source.
    async fn caption_images(
        &self,
        markdown: &str,
        images: &[(String, Vec<u8>)],
    ) -> Result<String, WorkerError> {
        info!("Captioning {} images", images.len());

        let image_bytes: Vec<Vec<u8>> = images.iter().map(|(_, bytes)| bytes.clone()).collect();
        let captions = self
            .captioner
            .caption_all(&image_bytes)
            .await
            .map_err(|e| WorkerError::RemoteInference(e.to_string()))?;

        if captions.len() != images.len() {
            return Err(WorkerError::RemoteInference(format!(
                "caption count mismatch: {} captions for {} images",
                captions.len(),
                images.len()
            )));
        }

        let caption_by_id: HashMap<String, String> = images
            .iter()
            .map(|(id, _)| id.clone())
            .zip(captions)
            .collect();

        Ok(replace_markdown_images_with_html(markdown, &caption_by_id))
    }

    async fn persist(
        &self,
        task: &IngestTask,
        encryption: &Encryption,
        chunk_set: ChunkSet,
        embeddings: Vec<Vec<f32>>,
        images: Vec<(String, Vec<u8>)>,
    ) -> Result<(), WorkerError> {
        // Blob uploads first; paths are recorded on the source row
        let image_paths = if images.is_empty() {
            Vec::new()
        } else {
            debug!("Uploading {} images to blob store", images.len());
            self.blob_store.upload_images(&task.user_id, &images).await?
        };

        let mut db_chunks: Vec<DbChunk> = chunk_set.db_chunks;
        for chunk in &mut db_chunks {
            let content = chunk.content_mut();
            *content = encryption.protect(content)?;
        }

        let parents: Vec<NewParentChunk> = chunk_set
            .parents
            .iter()
            .map(|p| {
                Ok(NewParentChunk {
                    id: p.id.to_string(),
                    content: encryption.protect(&p.content)?,
                })
            })
            .collect::<Result<_, WorkerError>>()?;

        let children: Vec<NewChildChunk> = chunk_set
            .children
            .iter()
            .zip(embeddings)
            .map(|(c, embedding)| {
                Ok(NewChildChunk {
                    id: c.id.to_string(),
                    content: encryption.protect_advanced(&c.content)?,
                    parent_ids: c.parent_ids.clone(),
                    embedding: Vector::from(embedding),
                })
            })
            .collect::<Result<_, WorkerError>>()?;

        self.repository
            .complete_source(&task.id, &db_chunks, &image_paths)
            .await?;
        self.repository
            .insert_parent_chunks(&task.id, parents)
            .await?;
        self.repository
            .insert_child_chunks(&task.id, children)
            .await?;

        info!("💾 Persisted source {}", task.id);

        Ok(())
    }
}

/// Resolved encryption mode for one task.
struct Encryption {
    mode: EncryptionType,
    key: Option<String>,
}

impl Encryption {
    fn from_task(task: &IngestTask) -> Result<Self, WorkerError> {
        if task.encryption_type.is_encrypted() && task.encryption_key.is_none() {
            return Err(WorkerError::Encryption(format!(
                "source {} requires an encryption key",
                task.id
            )));
        }

        Ok(Self {
            mode: task.encryption_type,
            key: task.encryption_key.clone(),
        })
    }

    /// Source and parent content: encrypted under any non-plain mode.
    fn protect(&self, content: &str) -> Result<String, WorkerError> {
        if !self.mode.is_encrypted() {
            return Ok(content.to_string());
        }

        let key = self.key.as_deref().unwrap_or_default();
        encrypt_data(content, key).map_err(|e| WorkerError::Encryption(e.to_string()))
    }

    /// Child chunk content: encrypted only under advanced mode, so the
    /// keyword branch of hybrid search keeps working otherwise.
    fn protect_advanced(&self, content: &str) -> Result<String, WorkerError> {
        if !self.mode.is_advanced() {
            return Ok(content.to_string());
        }

        self.protect(content)
    }
}

/// Rewrites `![alt](uuid)` markdown refs into `<img id={uuid} alt={caption}/>`
/// tags. Captions fall back to the original alt text; quotes are escaped so
/// downstream attribute parsing cannot break.
pub fn replace_markdown_images_with_html(
    text: &str,
    caption_by_id: &HashMap<String, String>,
) -> String {
    IMAGE_REF_RE
        .replace_all(text, |caps: &regex::Captures| {
            let alt = &caps[1];
            let image_id = caps[2].trim();

            let summary = caption_by_id
                .get(image_id)
                .map(String::as_str)
                .unwrap_or(alt)
                .replace('"', "&quot;");

            format!("<img id={{{image_id}}} alt={{{summary}}}/>")
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_image_refs_with_captions() {
        let mut captions = HashMap::new();
        captions.insert("img-1".to_string(), "a bar chart of sales".to_string());

        let text = "before ![chart](img-1) after";
        let rewritten = replace_markdown_images_with_html(text, &captions);

        assert_eq!(rewritten, "before <img id={img-1} alt={a bar chart of sales}/> after");
    }

    #[test]
    fn falls_back_to_alt_text_without_caption() {
        let captions = HashMap::new();
        let text = "![original alt](img-2)";
        assert_eq!(
            replace_markdown_images_with_html(text, &captions),
            "<img id={img-2} alt={original alt}/>"
        );
    }

    #[test]
    fn escapes_quotes_in_captions() {
        let mut captions = HashMap::new();
        captions.insert("img-3".to_string(), r#"the "big" picture"#.to_string());

        let rewritten = replace_markdown_images_with_html("![x](img-3)", &captions);
        assert_eq!(rewritten, "<img id={img-3} alt={the &quot;big&quot; picture}/>");
    }

    #[test]
    fn rewrites_every_reference() {
        let mut captions = HashMap::new();
        captions.insert("a".to_string(), "first".to_string());
        captions.insert("b".to_string(), "second".to_string());

        let rewritten =
            replace_markdown_images_with_html("![x](a) mid ![y](b)", &captions);
        assert!(rewritten.contains("<img id={a} alt={first}/>"));
        assert!(rewritten.contains("<img id={b} alt={second}/>"));
    }

    #[test]
    fn missing_key_is_rejected() {
        let task = IngestTask {
            kind: SourceKind::Pdf,
            id: "s1".to_string(),
            user_id: "u1".to_string(),
            base64: Some("xx".to_string()),
            url: None,
            encryption_type: EncryptionType::Encrypted,
            encryption_key: None,
        };

        assert!(matches!(
            Encryption::from_task(&task),
            Err(WorkerError::Encryption(_))
        ));
    }

    #[test]
    fn advanced_mode_gates_child_encryption() {
        let standard = Encryption {
            mode: EncryptionType::Encrypted,
            key: Some("pw".to_string()),
        };
        // parent content is encrypted...
        assert_ne!(standard.protect("hello").unwrap(), "hello");
        // ...child content is not
        assert_eq!(standard.protect_advanced("hello").unwrap(), "hello");

        let advanced = Encryption {
            mode: EncryptionType::AdvancedEncryption,
            key: Some("pw".to_string()),
        };
        assert_ne!(advanced.protect_advanced("hello").unwrap(), "hello");
    }
}

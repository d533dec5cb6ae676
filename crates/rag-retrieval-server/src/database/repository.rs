use super::{MessageRow, ParentChunkRow};
use anyhow::Result;
use pgvector::Vector;
use rag_shared::{DbPool, NotebookContext};
use sqlx::Row;
use std::collections::HashSet;
use tracing::debug;

pub struct Repository {
    pool: DbPool,
    embedding_dimension: usize,
}

impl Repository {
    pub fn new(pool: DbPool, embedding_dimension: usize) -> Self {
        Self {
            pool,
            embedding_dimension,
        }
    }

    // ==================== Notebook context ====================

    pub async fn get_notebook_context(&self, notebook_id: &str) -> Result<Option<NotebookContext>> {
        let row = sqlx::query(r#"SELECT context FROM "Notebook" WHERE id = $1"#)
            .bind(notebook_id)
            .fetch_optional(self.pool.get_pool())
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let value: Option<serde_json::Value> = row.try_get("context")?;
        match value {
            Some(json) => Ok(Some(serde_json::from_value(json)?)),
            None => Ok(None),
        }
    }

    pub async fn update_notebook_context(
        &self,
        notebook_id: &str,
        context: &NotebookContext,
    ) -> Result<()> {
        sqlx::query(r#"UPDATE "Notebook" SET context = $2 WHERE id = $1"#)
            .bind(notebook_id)
            .bind(serde_json::to_value(context)?)
            .execute(self.pool.get_pool())
            .await?;

        Ok(())
    }

    // ==================== Hybrid search ====================

    /// Vector branch: nearest child chunks for the notebook, projected to
    /// their parent ids (deduplicated, nearest-first).
    pub async fn vector_search_parent_ids(
        &self,
        notebook_id: &str,
        embedding: Vector,
        limit: i64,
    ) -> Result<Vec<String>> {
        let sql = format!(
            r#"SELECT dc."parentIds"
               FROM "DocumentChunk" dc
               JOIN "Source" s ON dc."sourceId" = s.id
               WHERE s."notebookId" = $1
               ORDER BY dc.embedding <=> $2::vector({}) ASC
               LIMIT $3"#,
            self.embedding_dimension
        );

        let rows = sqlx::query(&sql)
            .bind(notebook_id)
            .bind(embedding)
            .bind(limit)
            .fetch_all(self.pool.get_pool())
            .await?;

        Ok(collect_parent_ids(rows)?)
    }

    /// Keyword branch: child chunks matching at least one keyword, ranked
    /// by how many keywords they match, projected to parent ids.
    pub async fn keyword_search_parent_ids(
        &self,
        notebook_id: &str,
        keywords: &[String],
        limit: i64,
    ) -> Result<Vec<String>> {
        if keywords.is_empty() {
            return Ok(Vec::new());
        }

        let filter_pattern = format!(
            "({})",
            keywords
                .iter()
                .map(|k| regex::escape(k))
                .collect::<Vec<_>>()
                .join("|")
        );

        // one match-indicator term per keyword: (content ~* $n)::int
        let score_clause = (0..keywords.len())
            .map(|i| format!(r#"(dc.content ~* ${})::int"#, i + 4))
            .collect::<Vec<_>>()
            .join(" + ");

        let sql = format!(
            r#"SELECT dc."parentIds"
               FROM "DocumentChunk" dc
               JOIN "Source" s ON dc."sourceId" = s.id
               WHERE s."notebookId" = $1
                 AND dc.content ~* $2
               ORDER BY ({score_clause}) DESC
               LIMIT $3"#
        );

        let mut query = sqlx::query(&sql)
            .bind(notebook_id)
            .bind(&filter_pattern)
            .bind(limit);
        for keyword in keywords {
            query = query.bind(keyword);
        }

        let rows = query.fetch_all(self.pool.get_pool()).await?;

        Ok(collect_parent_ids(rows)?)
    }

    // ==================== Parent chunks ====================

    pub async fn get_parent_chunks(&self, ids: &[String]) -> Result<Vec<ParentChunkRow>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let chunks = sqlx::query_as::<_, ParentChunkRow>(
            r#"SELECT id, "sourceId", content FROM "ParentChunk" WHERE id = ANY($1)"#,
        )
        .bind(ids)
        .fetch_all(self.pool.get_pool())
        .await?;

        debug!("Fetched {} parent chunks for {} ids", chunks.len(), ids.len());

        Ok(chunks)
    }

    // ==================== Messages ====================

    pub async fn get_messages_by_ids(&self, ids: &[String]) -> Result<Vec<MessageRow>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let messages = sqlx::query_as::<_, MessageRow>(
            r#"SELECT id, role, summary FROM "Message" WHERE id = ANY($1)"#,
        )
        .bind(ids)
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(messages)
    }

    pub async fn update_message_summary(&self, message_id: &str, summary: &str) -> Result<()> {
        sqlx::query(r#"UPDATE "Message" SET summary = $2 WHERE id = $1"#)
            .bind(message_id)
            .bind(summary)
            .execute(self.pool.get_pool())
            .await?;

        Ok(())
    }

    pub async fn save_assistant_message(
        &self,
        message_id: &str,
        content: Option<&str>,
        failed: bool,
    ) -> Result<()> {
        sqlx::query(r#"UPDATE "Message" SET content = $2, failed = $3 WHERE id = $1"#)
            .bind(message_id)
            .bind(content)
            .bind(failed)
            .execute(self.pool.get_pool())
            .await?;

        Ok(())
    }
}

/// Flattens `parentIds` arrays from search rows, deduplicating while
/// preserving first-appearance (rank) order.
fn collect_parent_ids(rows: Vec<sqlx::postgres::PgRow>) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut parent_ids = Vec::new();

    for row in rows {
        let ids: Vec<String> = row.try_get("parentIds")?;
        for id in ids {
            if seen.insert(id.clone()) {
                parent_ids.push(id);
            }
        }
    }

    Ok(parent_ids)
}

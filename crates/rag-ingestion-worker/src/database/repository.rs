use super::{NewChildChunk, NewParentChunk};
use anyhow::Result;
use rag_shared::{DbChunk, DbPool};
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

    // ==================== Source ====================

    /// Final source write: completed status, ordered chunk content JSON,
    /// and the uploaded image paths.
    pub async fn complete_source(
        &self,
        source_id: &str,
        content: &[DbChunk],
        image_paths: &[String],
    ) -> Result<()> {
        let content_json = if content.is_empty() {
            None
        } else {
            Some(serde_json::to_value(content)?)
        };

        sqlx::query(
            r#"UPDATE "Source"
               SET "processingStatus" = 'completed',
                   content = $2,
                   image_paths = $3
               WHERE id = $1"#,
        )
        .bind(source_id)
        .bind(content_json)
        .bind(image_paths)
        .execute(self.pool.get_pool())
        .await?;

        Ok(())
    }

    pub async fn mark_source_failed(&self, source_id: &str) -> Result<()> {
        sqlx::query(r#"UPDATE "Source" SET "processingStatus" = 'failed' WHERE id = $1"#)
            .bind(source_id)
            .execute(self.pool.get_pool())
            .await?;

        Ok(())
    }

    // ==================== Chunks ====================

    pub async fn insert_parent_chunks(
        &self,
        source_id: &str,
        parents: Vec<NewParentChunk>,
    ) -> Result<()> {
        if parents.is_empty() {
            return Ok(());
        }

        let count = parents.len();
        let mut transaction = self.pool.get_pool().begin().await?;

        for parent in parents {
            sqlx::query(r#"INSERT INTO "ParentChunk" (id, content, "sourceId") VALUES ($1, $2, $3)"#)
                .bind(&parent.id)
                .bind(&parent.content)
                .bind(source_id)
                .execute(&mut *transaction)
                .await?;
        }

        transaction.commit().await?;
        debug!("Inserted {} parent chunks for source {}", count, source_id);

        Ok(())
    }

    /// Raw parameterized insert so the embedding and parent-id casts hit
    /// the pgvector/text[] columns exactly as typed.
    pub async fn insert_child_chunks(
        &self,
        source_id: &str,
        children: Vec<NewChildChunk>,
    ) -> Result<()> {
        if children.is_empty() {
            return Ok(());
        }

        let insert_sql = format!(
            r#"INSERT INTO "DocumentChunk" (id, content, "parentIds", embedding, "sourceId")
               VALUES ($1, $2, $3::text[], $4::vector({}), $5)"#,
            self.embedding_dimension
        );

        let count = children.len();
        let mut transaction = self.pool.get_pool().begin().await?;

        for child in children {
            sqlx::query(&insert_sql)
                .bind(&child.id)
                .bind(&child.content)
                .bind(&child.parent_ids)
                .bind(&child.embedding)
                .bind(source_id)
                .execute(&mut *transaction)
                .await?;
        }

        transaction.commit().await?;
        debug!("Inserted {} child chunks for source {}", count, source_id);

        Ok(())
    }
}

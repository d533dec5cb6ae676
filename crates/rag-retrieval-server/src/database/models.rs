use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct ParentChunkRow {
    pub id: String,
    #[sqlx(rename = "sourceId")]
    pub source_id: String,
    pub content: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct MessageRow {
    pub id: String,
    pub role: String,
    pub summary: Option<String>,
}

use pgvector::Vector;

/// Parent chunk row ready for insertion (content possibly encrypted).
#[derive(Debug, Clone)]
pub struct NewParentChunk {
    pub id: String,
    pub content: String,
}

/// Child chunk row ready for insertion, embedding aligned by the caller.
#[derive(Debug, Clone)]
pub struct NewChildChunk {
    pub id: String,
    pub content: String,
    pub parent_ids: Vec<String>,
    pub embedding: Vector,
}

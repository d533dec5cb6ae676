use super::OptimizedQuery;
use crate::database::Repository;
use crate::utils::error::PipelineError;
use futures::future::join_all;
use pgvector::Vector;
use rag_shared::inference::Embedder;
use std::collections::HashSet;
use tracing::debug;

/// Per-branch candidate budget: the total limit is shared evenly across
/// the optimized queries, with a floor of one row per branch.
pub fn per_query_limit(candidate_limit: usize, query_count: usize) -> i64 {
    (candidate_limit / query_count.max(1)).max(1) as i64
}

/// Trim, drop empties, dedupe preserving order.
pub fn clean_keywords(keywords: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    keywords
        .iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .filter(|k| seen.insert(k.clone()))
        .collect()
}

/// Hybrid retrieval over every optimized query: one batched embedding
/// call, then a concurrent vector + keyword search per query. Each query
/// ends up with the set union of the parent ids both branches returned.
pub async fn retrieve_chunks(
    repository: &Repository,
    embedder: &dyn Embedder,
    notebook_id: &str,
    queries: &mut [OptimizedQuery],
    candidate_limit: usize,
) -> Result<(), PipelineError> {
    let texts: Vec<String> = queries.iter().map(|q| q.optimized_query.clone()).collect();
    let embeddings = embedder
        .embed(&texts)
        .await
        .map_err(|e| PipelineError::RemoteInference(e.to_string()))?;

    for (query, embedding) in queries.iter_mut().zip(embeddings) {
        query.embedding = Some(embedding);
    }

    let limit = per_query_limit(candidate_limit, queries.len());

    let searches = queries.iter().map(|query| {
        let embedding = Vector::from(query.embedding.clone().unwrap_or_default());
        let keywords = clean_keywords(&query.keywords);

        async move {
            // both branches run concurrently
            let (vector_ids, keyword_ids) = tokio::join!(
                repository.vector_search_parent_ids(notebook_id, embedding, limit),
                repository.keyword_search_parent_ids(notebook_id, &keywords, limit),
            );

            Ok::<_, anyhow::Error>((vector_ids?, keyword_ids?))
        }
    });

    let results = join_all(searches).await;

    for (query, result) in queries.iter_mut().zip(results) {
        let (vector_ids, keyword_ids) =
            result.map_err(|e| PipelineError::Other(e.to_string()))?;

        query.parent_ids = union_preserving_order(vector_ids, keyword_ids);
        debug!(
            "Query '{}' matched {} parents",
            query.optimized_query,
            query.parent_ids.len()
        );
    }

    Ok(())
}

fn union_preserving_order(first: Vec<String>, second: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    first
        .into_iter()
        .chain(second)
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_split_across_queries() {
        assert_eq!(per_query_limit(100, 1), 100);
        assert_eq!(per_query_limit(100, 2), 50);
        assert_eq!(per_query_limit(100, 3), 33);
        assert_eq!(per_query_limit(100, 5), 20);
    }

    #[test]
    fn limit_never_drops_below_one() {
        assert_eq!(per_query_limit(3, 5), 1);
        assert_eq!(per_query_limit(0, 1), 1);
    }

    #[test]
    fn keywords_are_cleaned() {
        let raw = vec![
            "  pgvector ".to_string(),
            String::new(),
            "pgvector".to_string(),
            "   ".to_string(),
            "hnsw".to_string(),
        ];
        assert_eq!(clean_keywords(&raw), vec!["pgvector", "hnsw"]);
    }

    #[test]
    fn union_dedupes_across_branches() {
        let union = union_preserving_order(
            vec!["a".into(), "b".into()],
            vec!["b".into(), "c".into()],
        );
        assert_eq!(union, vec!["a", "b", "c"]);
    }
}

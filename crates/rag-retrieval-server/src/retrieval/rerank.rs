use super::{FilteredParentChunk, FilteredQueryResult, OptimizedQuery};
use crate::utils::error::PipelineError;
use futures::future::join_all;
use rag_shared::inference::{Reranker, RerankDocument};
use std::collections::HashMap;
use tracing::debug;

/// Second-stage filter: per-query rerank of the candidate parents,
/// keeping the top-k. A query with no candidates never reaches the
/// remote service. Surviving chunks keep their original marker-bearing
/// content, looked up by id.
pub async fn filter_parent_chunks(
    reranker: &dyn Reranker,
    queries: &[OptimizedQuery],
    top_k: usize,
) -> Result<Vec<FilteredQueryResult>, PipelineError> {
    let tasks = queries.iter().map(|query| async move {
        if query.parent_chunks.is_empty() {
            return Ok(FilteredQueryResult {
                optimized_query: query.optimized_query.clone(),
                parent_chunks: Vec::new(),
            });
        }

        let documents: Vec<RerankDocument> = query
            .parent_chunks
            .iter()
            .map(|chunk| RerankDocument {
                id: chunk.id.clone(),
                content: chunk.content.clone(),
            })
            .collect();

        let kept = reranker
            .rerank(&query.optimized_query, documents, top_k)
            .await
            .map_err(|e| PipelineError::RemoteInference(e.to_string()))?;

        let by_id: HashMap<&str, &super::ParentChunk> = query
            .parent_chunks
            .iter()
            .map(|chunk| (chunk.id.as_str(), chunk))
            .collect();

        let parent_chunks = kept
            .iter()
            .filter_map(|doc| by_id.get(doc.id.as_str()))
            .map(|chunk| FilteredParentChunk {
                content: chunk.content.clone(),
                source_id: chunk.source_id.clone(),
            })
            .collect();

        Ok(FilteredQueryResult {
            optimized_query: query.optimized_query.clone(),
            parent_chunks,
        })
    });

    let results: Vec<Result<FilteredQueryResult, PipelineError>> = join_all(tasks).await;
    let results: Result<Vec<_>, _> = results.into_iter().collect();
    let results = results?;

    debug!(
        "Reranked {} queries, {} surviving chunks total",
        results.len(),
        results.iter().map(|r| r.parent_chunks.len()).sum::<usize>()
    );

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::ParentChunk;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Reranker stub that counts remote calls and echoes the documents.
    struct CountingReranker {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Reranker for CountingReranker {
        async fn rerank(
            &self,
            _query: &str,
            documents: Vec<RerankDocument>,
            top_k: usize,
        ) -> anyhow::Result<Vec<RerankDocument>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(documents.into_iter().take(top_k).collect())
        }
    }

    fn query_with_chunks(chunks: Vec<ParentChunk>) -> OptimizedQuery {
        let mut query = OptimizedQuery::new("q".to_string(), vec![]);
        query.parent_chunks = chunks;
        query
    }

    fn chunk(id: &str, source: &str) -> ParentChunk {
        ParentChunk {
            id: id.to_string(),
            source_id: source.to_string(),
            content: format!("<<<1>>>content of {id}<<</1>>>"),
            clean_content: format!("content of {id}"),
        }
    }

    #[tokio::test]
    async fn empty_candidates_skip_the_remote_call() {
        let reranker = CountingReranker { calls: AtomicUsize::new(0) };
        let queries = vec![query_with_chunks(vec![])];

        let results = filter_parent_chunks(&reranker, &queries, 10).await.unwrap();

        assert_eq!(results.len(), 1);
        assert!(results[0].parent_chunks.is_empty());
        assert_eq!(reranker.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn keeps_top_k_with_original_content() {
        let reranker = CountingReranker { calls: AtomicUsize::new(0) };
        let chunks: Vec<ParentChunk> = (0..5).map(|i| chunk(&format!("p{i}"), "src-1")).collect();
        let queries = vec![query_with_chunks(chunks)];

        let results = filter_parent_chunks(&reranker, &queries, 3).await.unwrap();

        assert_eq!(reranker.calls.load(Ordering::SeqCst), 1);
        assert_eq!(results[0].parent_chunks.len(), 3);
        // marker-bearing content survives for citation extraction
        assert!(results[0].parent_chunks[0].content.contains("<<<1>>>"));
        assert_eq!(results[0].parent_chunks[0].source_id, "src-1");
    }

    #[tokio::test]
    async fn one_call_per_nonempty_query() {
        let reranker = CountingReranker { calls: AtomicUsize::new(0) };
        let queries = vec![
            query_with_chunks(vec![chunk("a", "s1")]),
            query_with_chunks(vec![]),
            query_with_chunks(vec![chunk("b", "s2")]),
        ];

        let results = filter_parent_chunks(&reranker, &queries, 10).await.unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(reranker.calls.load(Ordering::SeqCst), 2);
    }
}

use super::{OptimizedQuery, ParentChunk, RequestEncryption};
use crate::database::Repository;
use crate::utils::error::PipelineError;
use futures::future::join_all;
use rag_shared::markers;
use tracing::debug;

/// Loads the parent chunks behind every query's retrieved parent ids,
/// decrypting content when the request is encrypted and deriving the
/// marker-stripped display form.
pub async fn attach_parent_chunks(
    repository: &Repository,
    queries: &mut [OptimizedQuery],
    encryption: &RequestEncryption,
) -> Result<(), PipelineError> {
    // only queries that actually retrieved something hit the database
    let fetch_plan: Vec<(usize, Vec<String>)> = queries
        .iter()
        .enumerate()
        .filter(|(_, q)| !q.parent_ids.is_empty())
        .map(|(i, q)| (i, q.parent_ids.clone()))
        .collect();

    let fetches = fetch_plan
        .iter()
        .map(|(_, ids)| repository.get_parent_chunks(ids));
    let results = join_all(fetches).await;

    for ((index, _), result) in fetch_plan.iter().zip(results) {
        let rows = result.map_err(|e| PipelineError::Other(e.to_string()))?;

        queries[*index].parent_chunks = rows
            .into_iter()
            .map(|row| {
                let content = encryption.reveal(&row.content);
                let clean_content = markers::strip(&content);
                ParentChunk {
                    id: row.id,
                    source_id: row.source_id,
                    content,
                    clean_content,
                }
            })
            .collect();

        debug!(
            "Attached {} parent chunks to query {}",
            queries[*index].parent_chunks.len(),
            index
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_content_strips_markers() {
        let enc = RequestEncryption::new(rag_shared::EncryptionType::NotEncrypted, None).unwrap();
        let content = "<<<4>>>tables and text<<</4>>>";

        let revealed = enc.reveal(content);
        assert_eq!(markers::strip(&revealed), "tables and text");
    }
}

use super::segmenter::{extract_tables_and_text, Segment};
use super::splitter::RecursiveSplitter;
use rag_shared::markers;
use rag_shared::{ChildChunkDraft, DbChunk, ParentChunkDraft};
use std::collections::{HashMap, HashSet};
use tracing::debug;
use uuid::Uuid;

const DB_CHUNK_SIZE: usize = 300;
const PARENT_CHUNK_SIZE: usize = 2000;
const PARENT_CHUNK_OVERLAP: usize = 200;
const CHILD_CHUNK_SIZE: usize = 500;
const CHILD_CHUNK_OVERLAP: usize = 100;

/// Everything the chunker derives from one source document.
#[derive(Debug, Clone)]
pub struct ChunkSet {
    pub db_chunks: Vec<DbChunk>,
    pub parents: Vec<ParentChunkDraft>,
    pub children: Vec<ChildChunkDraft>,
}

/// Runs the full chunking pass: segment -> flat db chunks -> parent/child
/// hierarchy with marker provenance.
pub fn process_chunks(text: &str) -> ChunkSet {
    let segments = extract_tables_and_text(text);
    let db_chunks = build_db_chunks(&segments);
    let (parents, children) = build_parent_child_chunks(&db_chunks);

    ChunkSet {
        db_chunks,
        parents,
        children,
    }
}

/// Stage 1: flat db chunks with a dense 0-based id sequence in document
/// order. Text segments are split at (300, 0); a table is one chunk.
pub fn build_db_chunks(segments: &[Segment]) -> Vec<DbChunk> {
    let splitter = RecursiveSplitter::mixed_content(DB_CHUNK_SIZE, 0);
    let mut chunks = Vec::new();
    let mut chunk_id = 0i64;

    debug!("Processing {} segments into db chunks", segments.len());

    for segment in segments {
        match segment {
            Segment::Text(content) => {
                for piece in splitter.split(content) {
                    chunks.push(DbChunk::Text {
                        id: chunk_id,
                        content: piece,
                    });
                    chunk_id += 1;
                }
            }
            Segment::Table(content) => {
                chunks.push(DbChunk::Table {
                    id: chunk_id,
                    content: content.clone(),
                });
                chunk_id += 1;
            }
        }
    }

    chunks
}

/// A maximal run of marker-wrapped content: consecutive text chunks fuse,
/// a table always stands alone.
enum Run {
    Text(String),
    Table(String),
}

fn build_runs(db_chunks: &[DbChunk]) -> Vec<Run> {
    let mut runs = Vec::new();
    let mut pending_text = String::new();

    for chunk in db_chunks {
        let wrapped = markers::wrap(chunk.id(), chunk.content());

        if chunk.is_table() {
            if !pending_text.is_empty() {
                runs.push(Run::Text(std::mem::take(&mut pending_text)));
            }
            runs.push(Run::Table(wrapped));
        } else {
            pending_text.push_str(&wrapped);
        }
    }

    if !pending_text.is_empty() {
        runs.push(Run::Text(pending_text));
    }

    runs
}

/// Stage 2: parents at (2000, 200) and children at (500, 100) over the
/// marker-wrapped runs. Child `parent_ids` are resolved through the marker
/// ids shared with parents, flattened and deduped in first-appearance
/// order.
pub fn build_parent_child_chunks(
    db_chunks: &[DbChunk],
) -> (Vec<ParentChunkDraft>, Vec<ChildChunkDraft>) {
    let runs = build_runs(db_chunks);

    let parent_splitter = RecursiveSplitter::mixed_content(PARENT_CHUNK_SIZE, PARENT_CHUNK_OVERLAP);
    let child_splitter = RecursiveSplitter::mixed_content(CHILD_CHUNK_SIZE, CHILD_CHUNK_OVERLAP);

    let mut parents = Vec::new();
    for run in &runs {
        match run {
            Run::Text(content) => {
                for piece in parent_splitter.split(content) {
                    let children_ids = markers::marker_ids(&piece);
                    parents.push(ParentChunkDraft {
                        id: Uuid::new_v4(),
                        content: piece,
                        children_ids,
                    });
                }
            }
            Run::Table(content) => {
                parents.push(ParentChunkDraft {
                    id: Uuid::new_v4(),
                    content: content.clone(),
                    children_ids: markers::marker_ids(content),
                });
            }
        }
    }

    debug!("Created {} parent chunks", parents.len());

    // marker id -> covering parent UUIDs, in parent order
    let mut marker_to_parents: HashMap<i64, Vec<String>> = HashMap::new();
    for parent in &parents {
        for &marker_id in &parent.children_ids {
            marker_to_parents
                .entry(marker_id)
                .or_default()
                .push(parent.id.to_string());
        }
    }

    let mut children = Vec::new();
    for run in &runs {
        match run {
            Run::Text(content) => {
                for piece in child_splitter.split(content) {
                    children.push(make_child(&piece, &marker_to_parents));
                }
            }
            Run::Table(content) => {
                children.push(make_child(content, &marker_to_parents));
            }
        }
    }

    debug!("Created {} child chunks", children.len());

    (parents, children)
}

fn make_child(raw: &str, marker_to_parents: &HashMap<i64, Vec<String>>) -> ChildChunkDraft {
    let mut parent_ids = Vec::new();
    let mut seen = HashSet::new();

    for marker_id in markers::marker_ids(raw) {
        if let Some(parents) = marker_to_parents.get(&marker_id) {
            for parent_id in parents {
                if seen.insert(parent_id.clone()) {
                    parent_ids.push(parent_id.clone());
                }
            }
        }
    }

    ChildChunkDraft {
        id: Uuid::new_v4(),
        content: markers::strip(raw),
        parent_ids,
    }
}

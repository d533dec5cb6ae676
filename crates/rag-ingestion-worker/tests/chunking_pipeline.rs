use rag_ingestion_worker::document::chunker::process_chunks;
use rag_shared::markers;
use std::collections::{HashMap, HashSet};

const REPORT: &str = "\
# Quarterly Report

The first quarter showed steady growth across all regions. Revenue \
increased by twelve percent compared to the previous quarter, driven \
mostly by the expansion into the northern markets.

| Region | Revenue | Growth |
|--------|---------|--------|
| North  | 1.2M    | 18%    |
| South  | 0.8M    | 6%     |

Operating costs stayed flat. The engineering team shipped the new \
ingestion pipeline ahead of schedule, and support load decreased for \
the third month in a row.

| Metric   | Q4   | Q1   |
|----------|------|------|
| Tickets  | 840  | 660  |

Looking ahead, the focus shifts to the retrieval stack and to bringing \
the remaining regions onto the new infrastructure.";

#[test]
fn db_chunks_reconstruct_the_document() {
    let set = process_chunks(REPORT);

    // ids are dense and ordered
    let ids: Vec<i64> = set.db_chunks.iter().map(|c| c.id()).collect();
    let expected: Vec<i64> = (0..set.db_chunks.len() as i64).collect();
    assert_eq!(ids, expected);

    // concatenating chunk contents in id order reproduces the document
    // content (whitespace at chunk boundaries may collapse)
    let reassembled: String = set
        .db_chunks
        .iter()
        .map(|c| c.content())
        .collect::<Vec<_>>()
        .join(" ");
    let original_words: Vec<&str> = REPORT.split_whitespace().collect();
    let reassembled_words: Vec<&str> = reassembled.split_whitespace().collect();
    assert_eq!(reassembled_words, original_words);
}

#[test]
fn tables_become_standalone_chunks() {
    let set = process_chunks(REPORT);

    let tables: Vec<_> = set.db_chunks.iter().filter(|c| c.is_table()).collect();
    assert_eq!(tables.len(), 2);
    assert!(tables[0].content().contains("| North  | 1.2M    | 18%    |"));
    assert!(tables[1].content().contains("| Tickets  | 840  | 660  |"));
}

#[test]
fn hierarchy_invariants_hold() {
    let set = process_chunks(REPORT);

    // every parent's children_ids is exactly the sorted marker-id set of
    // its content
    for parent in &set.parents {
        assert_eq!(parent.children_ids, markers::marker_ids(&parent.content));
    }

    // every db chunk id is covered by at least one parent
    let covered: HashSet<i64> = set
        .parents
        .iter()
        .flat_map(|p| p.children_ids.iter().copied())
        .collect();
    for chunk in &set.db_chunks {
        assert!(covered.contains(&chunk.id()), "chunk {} uncovered", chunk.id());
    }

    // children are marker-free, carry unique parent links, and each linked
    // parent exists
    let parents_by_id: HashMap<String, &rag_shared::ParentChunkDraft> = set
        .parents
        .iter()
        .map(|p| (p.id.to_string(), p))
        .collect();

    for child in &set.children {
        assert!(!child.content.contains("<<<"));
        assert!(!child.parent_ids.is_empty());

        let unique: HashSet<&String> = child.parent_ids.iter().collect();
        assert_eq!(unique.len(), child.parent_ids.len());

        for parent_id in &child.parent_ids {
            assert!(parents_by_id.contains_key(parent_id));
        }
    }
}

#[test]
fn each_table_is_its_own_parent() {
    let set = process_chunks(REPORT);

    let table_parents: Vec<_> = set
        .parents
        .iter()
        .filter(|p| p.content.contains("|---"))
        .collect();
    assert_eq!(table_parents.len(), 2);

    for parent in table_parents {
        // a table parent wraps exactly one db chunk
        assert_eq!(parent.children_ids.len(), 1);
    }
}

use super::{Citation, FilteredQueryResult, TextWithCitations};
use crate::utils::error::PipelineError;
use once_cell::sync::Lazy;
use rag_shared::inference::{GenerateRequest, Generator};
use regex::Regex;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

const ANSWER_MAX_TOKENS: usize = 5000;
const ANSWER_TEMPERATURE: f32 = 0.5;

static CITATION_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[CITATION:\s*([^\]\s]+)\s*\]").expect("valid regex"));

static SPAN_UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<span data-citation="true"[^>]*>\[([0-9a-f-]{36})\]</span>"#)
        .expect("valid regex")
});

const SYSTEM_PROMPT: &str = r#"You are a precise knowledge-retrieval assistant. Answer using ONLY the provided source context. Write detailed, thorough answers covering every part of the query.

### RESPONSE FORMAT
Return a SINGLE valid JSON object (no markdown fences). Schema:
{
    "_reasoning": "Briefly explain which sources you selected and why.",
    "text": "Detailed answer in GitHub Markdown, with [CITATION: N] markers throughout.",
    "citations": [
        {
            "citation": "1",
            "sourceId": "The 'id' attribute from the <source> tag",
            "chunkId": "The id found inside <<<...>>> markers (e.g. '123' from '<<<123>>>')",
            "brief_summary": "What this source contributed"
        }
    ]
}

### CITATION RULES
1. Citations are mandatory whenever the context is non-empty.
2. Use the `[CITATION: 1]` form in the text. Never combine markers: `[CITATION: 1] [CITATION: 2]` is correct, `[CITATION: 1, 2]` is not.
3. Extract chunkId from markers like `<<<123>>>` -> use `123`.
4. Cite every factual statement, number, definition, or claim taken from the context.
5. When multiple sources support the same point, cite all of them."#;

/// Grounded prompt: per query a `<related_query>` tag, then each surviving
/// parent chunk as a `<source>` element carrying its raw, marker-bearing
/// content.
pub fn build_grounded_prompt(results: &[FilteredQueryResult], user_query: &str) -> String {
    let mut context_parts = Vec::new();

    for result in results {
        context_parts.push(format!(
            "<related_query>{}</related_query>",
            result.optimized_query
        ));

        for chunk in &result.parent_chunks {
            let safe_content = chunk.content.replace('\\', "\\\\").replace('"', "\\\"");
            context_parts.push(format!(
                "<source id=\"{}\">\n  <content>{}</content>\n</source>",
                chunk.source_id, safe_content
            ));
        }
    }

    let context_str = context_parts.join("\n");

    format!(
        "{SYSTEM_PROMPT}\n\nAnswer this query using the context below.\n\nUSER QUERY: {user_query}\n\nSOURCE CONTEXT:\n{context_str}\n"
    )
}

/// JSON schema for the structured answer; `sourceId` is enum-constrained
/// to the sources actually present in the prompt.
pub fn text_with_citations_schema(source_ids: &[String]) -> Value {
    json!({
        "type": "object",
        "properties": {
            "_reasoning": {
                "type": "string",
                "description": "Briefly explain which sources you selected and why."
            },
            "text": {
                "type": "string",
                "description": "The answer text with embedded [CITATION: N] markers."
            },
            "citations": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "citation": { "type": "string" },
                        "sourceId": { "type": "string", "enum": source_ids },
                        "chunkId": { "type": "string" },
                        "brief_summary": { "type": "string" }
                    },
                    "required": ["citation", "sourceId", "chunkId", "brief_summary"]
                }
            }
        },
        "required": ["text", "citations"]
    })
}

/// Calls the generator under the citation schema and validates the reply.
pub async fn extract_answer(
    generator: &dyn Generator,
    results: &[FilteredQueryResult],
    user_query: &str,
) -> Result<TextWithCitations, PipelineError> {
    let mut source_ids: Vec<String> = Vec::new();
    for result in results {
        for chunk in &result.parent_chunks {
            if !source_ids.contains(&chunk.source_id) {
                source_ids.push(chunk.source_id.clone());
            }
        }
    }

    let response = generator
        .generate(GenerateRequest {
            prompt: build_grounded_prompt(results, user_query),
            max_tokens: ANSWER_MAX_TOKENS,
            temperature: ANSWER_TEMPERATURE,
            json_schema: Some(text_with_citations_schema(&source_ids)),
        })
        .await
        .map_err(|e| PipelineError::RemoteInference(e.to_string()))?;

    let answer: TextWithCitations = serde_json::from_str(&response)
        .map_err(|e| PipelineError::SchemaValidation(format!("answer output: {e}")))?;

    debug!(
        "Extracted answer: {} chars, {} citations",
        answer.text.len(),
        answer.citations.len()
    );

    Ok(deduplicate_citations(answer))
}

/// Collapses citations that reference the same `(sourceId, chunkId)` pair
/// onto one dense number and rewrites the text markers consistently in a
/// single pass.
pub fn deduplicate_citations(answer: TextWithCitations) -> TextWithCitations {
    let mut unique: Vec<Citation> = Vec::new();
    let mut key_to_number: HashMap<(String, String), String> = HashMap::new();
    let mut old_to_new: HashMap<String, String> = HashMap::new();

    for citation in &answer.citations {
        let key = (citation.source_id.clone(), citation.chunk_id.clone());

        let number = match key_to_number.get(&key) {
            Some(number) => number.clone(),
            None => {
                let number = (unique.len() + 1).to_string();
                key_to_number.insert(key, number.clone());
                unique.push(Citation {
                    citation: number.clone(),
                    source_id: citation.source_id.clone(),
                    chunk_id: citation.chunk_id.clone(),
                    brief_summary: citation.brief_summary.clone(),
                });
                number
            }
        };

        old_to_new.insert(citation.citation.clone(), number);
    }

    let text = CITATION_MARKER_RE
        .replace_all(&answer.text, |caps: &regex::Captures| {
            match old_to_new.get(&caps[1]) {
                Some(new_number) => format!("[CITATION: {new_number}]"),
                // marker without a citations entry: leave untouched
                None => caps[0].to_string(),
            }
        })
        .into_owned();

    TextWithCitations {
        reasoning: answer.reasoning,
        text,
        citations: unique,
    }
}

/// Rewrites the deduplicated answer into its final display form:
/// every `[CITATION: n]` becomes a citation span, then spans are numbered
/// 1..M densely by first appearance. Citations never referenced in the
/// text are discarded along the way (they produce no span).
pub fn finalise_response(answer: &TextWithCitations) -> String {
    let with_spans = replace_markers_with_spans(answer);
    renumber_spans(&with_spans)
}

fn replace_markers_with_spans(answer: &TextWithCitations) -> String {
    let mut text = answer.text.clone();

    for citation in &answer.citations {
        // one UUID per citation, shared by every occurrence, so repeated
        // references keep a single displayed number after renumbering
        let span_uuid = Uuid::new_v4();
        let summary = escape_attribute(&citation.brief_summary);

        let span = format!(
            "<span data-citation=\"true\" data-source-id=\"{}\" data-chunk-id=\"{}\" data-summary=\"{}\">[{}]</span>",
            escape_attribute(&citation.source_id),
            escape_attribute(&citation.chunk_id),
            summary,
            span_uuid
        );

        let marker = Regex::new(&format!(
            r"\[CITATION:\s*{}\s*\]",
            regex::escape(&citation.citation)
        ))
        .expect("escaped citation number compiles");

        text = marker.replace_all(&text, span.as_str()).into_owned();
    }

    text
}

fn renumber_spans(text: &str) -> String {
    let mut order: Vec<String> = Vec::new();

    for caps in SPAN_UUID_RE.captures_iter(text) {
        let span_uuid = caps[1].to_string();
        if !order.contains(&span_uuid) {
            order.push(span_uuid);
        }
    }

    let mut renumbered = text.to_string();
    for (index, span_uuid) in order.iter().enumerate() {
        renumbered = renumbered.replace(&format!("[{span_uuid}]"), &format!("[{}]", index + 1));
    }

    renumbered
}

fn escape_attribute(value: &str) -> String {
    value.replace('"', "&quot;").replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::FilteredParentChunk;

    fn citation(number: &str, source: &str, chunk: &str) -> Citation {
        Citation {
            citation: number.to_string(),
            source_id: source.to_string(),
            chunk_id: chunk.to_string(),
            brief_summary: format!("summary of {chunk}"),
        }
    }

    #[test]
    fn prompt_carries_queries_and_sources() {
        let results = vec![FilteredQueryResult {
            optimized_query: "how does chunking work".to_string(),
            parent_chunks: vec![FilteredParentChunk {
                content: "<<<0>>>chunking uses markers<<</0>>>".to_string(),
                source_id: "src-1".to_string(),
            }],
        }];

        let prompt = build_grounded_prompt(&results, "explain chunking");
        assert!(prompt.contains("<related_query>how does chunking work</related_query>"));
        assert!(prompt.contains("<source id=\"src-1\">"));
        assert!(prompt.contains("<<<0>>>"));
        assert!(prompt.contains("USER QUERY: explain chunking"));
    }

    #[test]
    fn schema_constrains_source_ids() {
        let schema = text_with_citations_schema(&["a".to_string(), "b".to_string()]);
        let enum_values = &schema["properties"]["citations"]["items"]["properties"]["sourceId"]["enum"];
        assert_eq!(enum_values, &json!(["a", "b"]));
    }

    #[test]
    fn duplicate_citations_collapse_to_one_number() {
        let answer = TextWithCitations {
            reasoning: None,
            text: "first [CITATION: 2] then [CITATION: 5] again [CITATION: 2]".to_string(),
            citations: vec![
                citation("2", "src-a", "10"),
                citation("5", "src-b", "20"),
                citation("2", "src-a", "10"),
            ],
        };

        let deduped = deduplicate_citations(answer);
        assert_eq!(deduped.citations.len(), 2);
        assert_eq!(deduped.citations[0].citation, "1");
        assert_eq!(deduped.citations[1].citation, "2");
        assert_eq!(
            deduped.text,
            "first [CITATION: 1] then [CITATION: 2] again [CITATION: 1]"
        );
    }

    #[test]
    fn same_chunk_under_two_numbers_merges() {
        let answer = TextWithCitations {
            reasoning: None,
            text: "x [CITATION: 1] y [CITATION: 3]".to_string(),
            citations: vec![citation("1", "src-a", "7"), citation("3", "src-a", "7")],
        };

        let deduped = deduplicate_citations(answer);
        assert_eq!(deduped.citations.len(), 1);
        assert_eq!(deduped.text, "x [CITATION: 1] y [CITATION: 1]");
    }

    #[test]
    fn finalised_spans_renumber_by_appearance() {
        let answer = TextWithCitations {
            reasoning: None,
            text: "alpha [CITATION: 2] beta [CITATION: 5] gamma [CITATION: 2]".to_string(),
            citations: vec![citation("2", "src-a", "10"), citation("5", "src-b", "20")],
        };

        let final_text = finalise_response(&deduplicate_citations(answer));

        // repeated citation shares its displayed number
        assert!(final_text.contains(">[1]</span>"));
        assert!(final_text.contains(">[2]</span>"));
        let ones = final_text.matches(">[1]</span>").count();
        assert_eq!(ones, 2);
        assert_eq!(final_text.matches(">[2]</span>").count(), 1);

        // appearance order: [1] before [2]
        let first_one = final_text.find(">[1]</span>").unwrap();
        let first_two = final_text.find(">[2]</span>").unwrap();
        assert!(first_one < first_two);

        assert!(final_text.contains("data-citation=\"true\""));
        assert!(final_text.contains("data-source-id=\"src-a\""));
        assert!(final_text.contains("data-chunk-id=\"10\""));
        assert!(!final_text.contains("[CITATION:"));
    }

    #[test]
    fn unreferenced_citation_produces_no_span() {
        let answer = TextWithCitations {
            reasoning: None,
            text: "only one marker [CITATION: 1]".to_string(),
            citations: vec![citation("1", "src-a", "10"), citation("2", "src-b", "99")],
        };

        let final_text = finalise_response(&answer);
        assert!(final_text.contains("data-source-id=\"src-a\""));
        assert!(!final_text.contains("src-b"));
    }

    #[test]
    fn summary_quotes_are_escaped() {
        let mut c = citation("1", "src-a", "10");
        c.brief_summary = r#"says "hello" and 'bye'"#.to_string();
        let answer = TextWithCitations {
            reasoning: None,
            text: "x [CITATION: 1]".to_string(),
            citations: vec![c],
        };

        let final_text = finalise_response(&answer);
        assert!(final_text.contains("&quot;hello&quot;"));
        assert!(final_text.contains("&apos;bye&apos;"));
    }
}

use async_trait::async_trait;
use rag_retrieval_server::retrieval::answer;
use rag_retrieval_server::retrieval::{FilteredParentChunk, FilteredQueryResult};
use rag_shared::inference::{GenerateRequest, Generator};

/// Generator stub that records the request and replies with a canned
/// structured answer.
struct ScriptedGenerator {
    reply: String,
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, request: GenerateRequest) -> anyhow::Result<String> {
        // the pipeline must constrain the answer schema
        assert!(request.json_schema.is_some(), "answer call carries a schema");
        Ok(self.reply.clone())
    }
}

fn filtered_results() -> Vec<FilteredQueryResult> {
    vec![FilteredQueryResult {
        optimized_query: "how did revenue change".to_string(),
        parent_chunks: vec![
            FilteredParentChunk {
                content: "<<<4>>>Revenue grew by twelve percent.<<</4>>>".to_string(),
                source_id: "src-report".to_string(),
            },
            FilteredParentChunk {
                content: "<<<9>>>Costs stayed flat.<<</9>>>".to_string(),
                source_id: "src-costs".to_string(),
            },
        ],
    }]
}

#[tokio::test]
async fn extracted_answer_is_validated_and_deduplicated() {
    let generator = ScriptedGenerator {
        reply: r#"{
            "_reasoning": "both sources are relevant",
            "text": "Revenue grew [CITATION: 1] while costs stayed flat [CITATION: 2]. Growth again [CITATION: 3].",
            "citations": [
                {"citation": "1", "sourceId": "src-report", "chunkId": "4", "brief_summary": "revenue growth"},
                {"citation": "2", "sourceId": "src-costs", "chunkId": "9", "brief_summary": "flat costs"},
                {"citation": "3", "sourceId": "src-report", "chunkId": "4", "brief_summary": "revenue growth repeated"}
            ]
        }"#
        .to_string(),
    };

    let extracted = answer::extract_answer(&generator, &filtered_results(), "revenue?")
        .await
        .unwrap();

    // citation 3 collapses onto citation 1 (same source and chunk)
    assert_eq!(extracted.citations.len(), 2);
    assert!(extracted.text.contains("Growth again [CITATION: 1]"));

    let final_text = answer::finalise_response(&extracted);
    assert!(final_text.contains("data-source-id=\"src-report\""));
    assert!(final_text.contains("data-chunk-id=\"4\""));
    // the repeated citation keeps the number of its first appearance
    assert_eq!(final_text.matches(">[1]</span>").count(), 2);
    assert_eq!(final_text.matches(">[2]</span>").count(), 1);
}

#[tokio::test]
async fn malformed_llm_output_is_a_schema_failure() {
    let generator = ScriptedGenerator {
        reply: "this is not json".to_string(),
    };

    let err = answer::extract_answer(&generator, &filtered_results(), "revenue?")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        rag_retrieval_server::PipelineError::SchemaValidation(_)
    ));
}

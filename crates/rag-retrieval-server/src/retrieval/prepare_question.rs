use super::OptimizedQuery;
use crate::database::Repository;
use crate::utils::error::PipelineError;
use rag_shared::inference::{GenerateRequest, Generator};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

#[derive(Debug, Deserialize)]
struct QueryOptimizerOutput {
    #[serde(rename = "_reasoning", default)]
    #[allow(dead_code)]
    reasoning: Option<String>,
    queries: Vec<LlmQuery>,
}

#[derive(Debug, Deserialize)]
struct LlmQuery {
    optimized_query: String,
    keywords: Vec<String>,
}

fn query_optimizer_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "_reasoning": {
                "type": "string",
                "description": "Explain why you are splitting or combining the queries."
            },
            "queries": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "optimized_query": {
                            "type": "string",
                            "description": "The fully de-contextualized, specific question optimized for vector search."
                        },
                        "keywords": {
                            "type": "array",
                            "items": { "type": "string" },
                            "description": "Top 3-5 unique technical keywords for keyword search."
                        }
                    },
                    "required": ["optimized_query", "keywords"]
                }
            }
        },
        "required": ["_reasoning", "queries"]
    })
}

fn build_query_optimizer_prompt(user_input: &str, context: &str) -> String {
    let ctx = if context.is_empty() {
        "No prior context."
    } else {
        context
    };

    format!(
        r#"You are a search query optimizer.

### Instructions
1. Analyze the User Input against the Context and decide whether the topics are related or unrelated.
2. Convert vague questions into specific, self-contained search queries. Resolve pronouns (it, he, that) using the Context.
3. Unrelated topics must become separate queries; related topics stay combined.
4. Output valid JSON only.

### Schema
{{
  "_reasoning": "Explain why you are splitting or combining the queries.",
  "queries": [
    {{
      "optimized_query": "string",
      "keywords": ["str", "str"]
    }}
  ]
}}

### Example
Input: why is it crashing?
Context: User is debugging a React Native app on Android.
Output:
{{
  "_reasoning": "The user refers to 'it', which is the React Native app from context. A single technical issue.",
  "queries": [
    {{
      "optimized_query": "debug react native crash on android",
      "keywords": ["react native", "android", "crash log"]
    }}
  ]
}}

Context: {ctx}
Input: {user_input}
"#
    )
}

/// Turns the raw user message into 1..N self-contained search queries,
/// conditioned on the notebook's rolling context. N is capped and each
/// query gets a locally assigned UUID.
pub async fn prepare_question(
    repository: &Repository,
    generator: &dyn Generator,
    notebook_id: &str,
    content: &str,
    max_queries: usize,
) -> Result<Vec<OptimizedQuery>, PipelineError> {
    let context = repository
        .get_notebook_context(notebook_id)
        .await
        .map_err(|e| PipelineError::Other(e.to_string()))?;

    let context_str = match &context {
        Some(ctx) => serde_json::to_string(ctx).unwrap_or_default(),
        None => String::new(),
    };

    let response = generator
        .generate(GenerateRequest {
            prompt: build_query_optimizer_prompt(content, &context_str),
            max_tokens: 8192,
            temperature: 0.5,
            json_schema: Some(query_optimizer_schema()),
        })
        .await
        .map_err(|e| PipelineError::RemoteInference(e.to_string()))?;

    let parsed: QueryOptimizerOutput = serde_json::from_str(&response)
        .map_err(|e| PipelineError::SchemaValidation(format!("query optimizer output: {e}")))?;

    if parsed.queries.is_empty() {
        return Err(PipelineError::SchemaValidation(
            "query optimizer produced no queries".to_string(),
        ));
    }

    let queries: Vec<OptimizedQuery> = parsed
        .queries
        .into_iter()
        .take(max_queries)
        .map(|q| OptimizedQuery::new(q.optimized_query, q.keywords))
        .collect();

    debug!("Prepared {} optimized queries", queries.len());

    Ok(queries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_embeds_context_and_input() {
        let prompt = build_query_optimizer_prompt("why is it slow?", "user asked about pgvector");
        assert!(prompt.contains("why is it slow?"));
        assert!(prompt.contains("user asked about pgvector"));
    }

    #[test]
    fn empty_context_gets_placeholder() {
        let prompt = build_query_optimizer_prompt("hello", "");
        assert!(prompt.contains("No prior context."));
    }

    #[test]
    fn schema_requires_queries() {
        let schema = query_optimizer_schema();
        let required = schema["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v == "queries"));
    }

    #[test]
    fn llm_output_parses() {
        let raw = r#"{
            "_reasoning": "two unrelated topics",
            "queries": [
                {"optimized_query": "best rust web framework", "keywords": ["axum", "actix"]},
                {"optimized_query": "chicken recipes", "keywords": ["chicken", "recipe"]}
            ]
        }"#;

        let parsed: QueryOptimizerOutput = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.queries.len(), 2);
        assert_eq!(parsed.queries[0].optimized_query, "best rust web framework");
    }
}

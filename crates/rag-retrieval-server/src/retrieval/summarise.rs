use super::RequestEncryption;
use crate::database::Repository;
use crate::utils::error::PipelineError;
use rag_shared::inference::{GenerateRequest, Generator};
use rag_shared::tokens::estimate_tokens;
use tracing::debug;

const USER_SUMMARY_TOKENS: usize = 100;
const RESPONSE_SUMMARY_TOKENS: usize = 400;

/// Stores a token-bounded paraphrase of the turn on both message rows.
/// Short messages are stored verbatim; long ones go through the generator
/// first. Summaries are encrypted at rest when the request is encrypted.
pub async fn summarise_messages(
    repository: &Repository,
    generator: &dyn Generator,
    encryption: &RequestEncryption,
    user_query: &str,
    final_response: &str,
    assistant_message_id: &str,
    user_message_id: &str,
) -> Result<(), PipelineError> {
    let user_summary = bounded_summary(generator, user_query, USER_SUMMARY_TOKENS).await?;
    let response_summary =
        bounded_summary(generator, final_response, RESPONSE_SUMMARY_TOKENS).await?;

    let user_summary = encryption.protect(&user_summary)?;
    let response_summary = encryption.protect(&response_summary)?;

    tokio::try_join!(
        repository.update_message_summary(assistant_message_id, &response_summary),
        repository.update_message_summary(user_message_id, &user_summary),
    )
    .map_err(|e| PipelineError::Other(e.to_string()))?;

    Ok(())
}

async fn bounded_summary(
    generator: &dyn Generator,
    text: &str,
    max_tokens: usize,
) -> Result<String, PipelineError> {
    if estimate_tokens(text) <= max_tokens {
        return Ok(text.to_string());
    }

    debug!("Summarising message down to {} tokens", max_tokens);

    generator
        .generate(GenerateRequest {
            prompt: format!(
                "Summarise the following message to {max_tokens} tokens or less: {text}"
            ),
            max_tokens,
            temperature: 1.0,
            json_schema: None,
        })
        .await
        .map_err(|e| PipelineError::RemoteInference(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingGenerator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Generator for CountingGenerator {
        async fn generate(&self, _request: GenerateRequest) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("a short summary".to_string())
        }
    }

    #[tokio::test]
    async fn short_text_is_kept_verbatim() {
        let generator = CountingGenerator { calls: AtomicUsize::new(0) };

        let summary = bounded_summary(&generator, "short question", 100).await.unwrap();
        assert_eq!(summary, "short question");
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn long_text_goes_through_the_generator() {
        let generator = CountingGenerator { calls: AtomicUsize::new(0) };
        let long_text = "word ".repeat(500);

        let summary = bounded_summary(&generator, &long_text, 100).await.unwrap();
        assert_eq!(summary, "a short summary");
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }
}

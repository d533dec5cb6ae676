use super::RequestEncryption;
use crate::database::Repository;
use crate::utils::error::PipelineError;
use rag_shared::tokens::estimate_tokens;
use rag_shared::{ContextMessage, NotebookContext};
use std::collections::HashMap;
use tracing::{debug, info};

/// Walks entries newest-to-oldest accumulating token cost and returns the
/// split index: everything before it no longer fits the budget. The first
/// entry that would overflow the budget decides the split.
pub fn token_budget_split(entries: &[String], token_limit: usize) -> usize {
    let mut current_tokens = 0;
    let mut split_index = 0;

    for i in (0..entries.len()).rev() {
        let cost = estimate_tokens(&entries[i]);

        if current_tokens + cost > token_limit {
            split_index = i + 1;
            break;
        }

        current_tokens += cost;
    }

    split_index
}

/// Rolls the notebook context forward one turn: appends the new user and
/// assistant messages, demotes whatever no longer fits the token budget to
/// the summaries list (via the per-message summaries stored on the Message
/// rows), and trims the summaries to the same budget. The notebook row is
/// only written when the context actually changed.
#[allow(clippy::too_many_arguments)]
pub async fn prepare_context(
    repository: &Repository,
    encryption: &RequestEncryption,
    notebook_id: &str,
    user_query: &str,
    final_response: &str,
    user_message_id: &str,
    assistant_message_id: &str,
    token_limit: usize,
) -> Result<(), PipelineError> {
    let mut context = repository
        .get_notebook_context(notebook_id)
        .await
        .map_err(|e| PipelineError::Other(e.to_string()))?
        .unwrap_or_default();

    let original = context.clone();

    context.messages.push(ContextMessage {
        id: user_message_id.to_string(),
        content: format!("USER: {user_query}"),
    });
    context.messages.push(ContextMessage {
        id: assistant_message_id.to_string(),
        content: format!("ASSISTANT: {final_response}"),
    });

    let contents: Vec<String> = context.messages.iter().map(|m| m.content.clone()).collect();
    let split_index = token_budget_split(&contents, token_limit);

    let demoted: Vec<ContextMessage> = context.messages.drain(..split_index).collect();

    if !demoted.is_empty() {
        debug!("Demoting {} context messages to summaries", demoted.len());

        let demoted_ids: Vec<String> = demoted.iter().map(|m| m.id.clone()).collect();
        let rows = repository
            .get_messages_by_ids(&demoted_ids)
            .await
            .map_err(|e| PipelineError::Other(e.to_string()))?;

        let by_id: HashMap<String, (String, Option<String>)> = rows
            .into_iter()
            .map(|row| (row.id, (row.role, row.summary)))
            .collect();

        // demotion order, not DB row order
        for message in &demoted {
            if let Some((role, Some(summary))) = by_id.get(&message.id) {
                let summary = encryption.reveal(summary);
                context
                    .summaries
                    .push(format!("{}: {}", role.to_uppercase(), summary));
            }
        }

        // the summaries list obeys the same budget, dropping oldest first
        let summary_split = token_budget_split(&context.summaries, token_limit);
        context.summaries.drain(..summary_split);
    }

    if context != original {
        info!("Updating context for notebook {}", notebook_id);
        repository
            .update_notebook_context(notebook_id, &context)
            .await
            .map_err(|e| PipelineError::Other(e.to_string()))?;
    } else {
        debug!("Context unchanged for notebook {}, skipping update", notebook_id);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_with_tokens(label: &str, approx_tokens: usize) -> String {
        // estimate is words * 1.3 + 5; build an entry close to the target
        let words = ((approx_tokens.saturating_sub(5)) as f64 / 1.3) as usize;
        let mut s = String::from(label);
        for i in 0..words.saturating_sub(1) {
            s.push_str(&format!(" w{i}"));
        }
        s
    }

    #[test]
    fn everything_fits_under_a_roomy_budget() {
        let entries = vec!["USER: hi".to_string(), "ASSISTANT: hello".to_string()];
        assert_eq!(token_budget_split(&entries, 8000), 0);
    }

    #[test]
    fn oldest_entries_fall_outside_the_budget() {
        // ten ~900-token messages: only the newest ~8 fit into 8000
        let entries: Vec<String> = (0..10).map(|i| entry_with_tokens(&format!("m{i}"), 900)).collect();

        let split = token_budget_split(&entries, 8000);
        assert!(split > 0, "some messages must be demoted");

        let kept_cost: usize = entries[split..].iter().map(|e| estimate_tokens(e)).sum();
        assert!(kept_cost <= 8000, "kept messages exceed the budget");

        // demoting one fewer message would overflow
        let with_one_more: usize = entries[split - 1..].iter().map(|e| estimate_tokens(e)).sum();
        assert!(with_one_more > 8000);
    }

    #[test]
    fn split_preserves_order_semantics() {
        let entries: Vec<String> = (0..6).map(|i| entry_with_tokens(&format!("m{i}"), 500)).collect();
        let split = token_budget_split(&entries, 1200);

        // demoted prefix + kept suffix re-cover the whole list
        assert_eq!(entries[..split].len() + entries[split..].len(), entries.len());
        // the kept part is the newest suffix
        assert!(entries[split..].last().unwrap().starts_with("m5"));
    }

    #[test]
    fn zero_budget_demotes_everything() {
        let entries = vec![entry_with_tokens("a", 50), entry_with_tokens("b", 50)];
        assert_eq!(token_budget_split(&entries, 0), entries.len());
    }
}

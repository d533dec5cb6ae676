/// Deterministic token estimate used for context budgets and summary
/// thresholds. Rule: ~1.3 tokens per word plus a small formatting overhead.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }

    let words = text.split_whitespace().count();

    ((words as f64 * 1.3) + 5.0).ceil() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_free() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn scales_with_words() {
        // 7 words * 1.3 + 5 = 14.1 -> 15
        let text = "the quick brown fox jumps over everything";
        assert_eq!(estimate_tokens(text), 15);
    }

    #[test]
    fn whitespace_only_counts_overhead() {
        assert_eq!(estimate_tokens("   \n  "), 5);
    }
}

//! Heuristic token estimation.

use crate::types::Message;

/// Approximates the token count of `text` as
/// `ceil((words * 1.3 + chars / 4) / 2)`.
///
/// Only an estimate: it is used when a provider does not report usage and must not
/// be compared against a real tokenizer.
pub fn estimate_tokens(text: &str) -> u64 {
    let words = text.split_whitespace().count() as f64;
    let chars = text.chars().count() as f64;
    ((words * 1.3 + chars / 4.0) / 2.0).ceil() as u64
}

/// Sum of [`estimate_tokens`] over every message body.
pub fn estimate_conversation(messages: &[Message]) -> u64 {
    messages.iter().map(|m| estimate_tokens(&m.content)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("   "), 1); // 0 words, 3 chars -> ceil(0.375)
    }

    #[test]
    fn test_formula_is_pinned() {
        // 2 words, 11 chars: (2.6 + 2.75) / 2 = 2.675 -> 3
        assert_eq!(estimate_tokens("hello world"), 3);
        // 9 words, 43 chars: (11.7 + 10.75) / 2 = 11.225 -> 12
        assert_eq!(
            estimate_tokens("the quick brown fox jumps over the lazy dog"),
            12
        );
        // 1 word, 1 char: (1.3 + 0.25) / 2 = 0.775 -> 1
        assert_eq!(estimate_tokens("a"), 1);
    }

    #[test]
    fn test_counts_unicode_scalars_not_bytes() {
        // 1 word, 4 chars (12 bytes): (1.3 + 1.0) / 2 = 1.15 -> 2
        assert_eq!(estimate_tokens("日本語だ"), 2);
    }

    #[test]
    fn test_conversation_sum() {
        let msgs = vec![Message::system("a"), Message::user("hello world")];
        assert_eq!(estimate_conversation(&msgs), 4);
    }
}

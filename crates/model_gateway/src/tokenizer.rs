//! Token counting.

use tiktoken_rs::CoreBPE;

use llmops_core::traits::{TokenCounter, WhitespaceCounter};

/// Counts tokens with the `cl100k_base` BPE encoding.
///
/// Falls back to whitespace counting when the encoding cannot be loaded.
pub struct TiktokenCounter {
    bpe: Option<CoreBPE>,
}

impl TiktokenCounter {
    pub fn new() -> Self {
        let bpe = match tiktoken_rs::cl100k_base() {
            Ok(bpe) => Some(bpe),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load cl100k_base, counting whitespace tokens");
                None
            }
        };
        Self { bpe }
    }

    /// Whether the BPE encoding is in use.
    pub fn is_exact(&self) -> bool {
        self.bpe.is_some()
    }
}

impl Default for TiktokenCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCounter for TiktokenCounter {
    fn count_tokens(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        match &self.bpe {
            Some(bpe) => bpe.encode_with_special_tokens(text).len(),
            None => WhitespaceCounter.count_tokens(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_has_no_tokens() {
        assert_eq!(TiktokenCounter::new().count_tokens(""), 0);
    }

    #[test]
    fn test_counts_grow_with_text() {
        let counter = TiktokenCounter::new();
        let short = counter.count_tokens("hello");
        let long = counter.count_tokens("hello there, how are you doing today?");
        assert!(short >= 1);
        assert!(long > short);
    }

    #[test]
    fn test_known_encoding() {
        let counter = TiktokenCounter::new();
        if counter.is_exact() {
            assert_eq!(counter.count_tokens("hello world"), 2);
        }
    }
}

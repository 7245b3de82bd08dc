//! Tokenization shared by lexical index construction and query scoring.
//!
//! The same [`Tokenizer`] instance must be used at build time and at query
//! time; [`HybridRetriever`](crate::fusion::HybridRetriever) enforces this by
//! owning one tokenizer for both.

/// Splits text into index terms.
pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<String>;
}

/// Lowercases and splits on every non-alphanumeric character.
///
/// `"Multi-Actor apps!"` → `["multi", "actor", "apps"]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleTokenizer;

impl Tokenizer for SimpleTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercase_and_punctuation() {
        let tokens = SimpleTokenizer.tokenize("LangGraph builds stateful, multi-actor apps.");
        assert_eq!(
            tokens,
            vec!["langgraph", "builds", "stateful", "multi", "actor", "apps"]
        );
    }

    #[test]
    fn test_empty_and_symbols_only() {
        assert!(SimpleTokenizer.tokenize("").is_empty());
        assert!(SimpleTokenizer.tokenize(" -- !! ").is_empty());
    }

    #[test]
    fn test_unicode_letters_kept() {
        let tokens = SimpleTokenizer.tokenize("Café naïve");
        assert_eq!(tokens, vec!["café", "naïve"]);
    }
}

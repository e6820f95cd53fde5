//! Token types for text analysis.

use serde::{Deserialize, Serialize};

/// A single unit of analyzed text.
///
/// Tokens flow from the tokenizer to the indexer carrying everything the
/// postings writer can record: the term text, the position increment
/// relative to the previous token, the character offsets into the original
/// value, and an optional payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// The term text.
    pub text: String,

    /// Position increment from the previous token (normally 1; 0 chains
    /// synonyms onto the same position).
    pub position_increment: u32,

    /// Byte offset where the token starts in the original text.
    pub start_offset: u32,

    /// Byte offset one past the token's end in the original text.
    pub end_offset: u32,

    /// Optional per-position payload.
    pub payload: Option<Vec<u8>>,
}

impl Token {
    /// Create a token with offsets and the default increment of 1.
    pub fn new<S: Into<String>>(text: S, start_offset: u32, end_offset: u32) -> Self {
        Token {
            text: text.into(),
            position_increment: 1,
            start_offset,
            end_offset,
            payload: None,
        }
    }

    /// Override the position increment.
    pub fn with_position_increment(mut self, increment: u32) -> Self {
        self.position_increment = increment;
        self
    }

    /// Attach a payload.
    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Length of the token text in bytes.
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Whether the token text is empty.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// A lazy stream of tokens.
pub type TokenStream = Box<dyn Iterator<Item = Token> + Send>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_builders() {
        let token = Token::new("falx", 10, 14)
            .with_position_increment(0)
            .with_payload(vec![1, 2]);
        assert_eq!(token.text, "falx");
        assert_eq!(token.position_increment, 0);
        assert_eq!(token.start_offset, 10);
        assert_eq!(token.end_offset, 14);
        assert_eq!(token.payload, Some(vec![1, 2]));
        assert_eq!(token.len(), 4);
    }
}

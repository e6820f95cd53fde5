//! Tokenizer implementations.

use crate::analysis::token::{Token, TokenStream};
use crate::error::Result;

/// Trait for tokenizers that convert text into token streams.
pub trait Tokenizer: Send + Sync {
    /// Tokenize the given text.
    fn tokenize(&self, text: &str) -> Result<TokenStream>;

    /// Tokenizer name, for diagnostics.
    fn name(&self) -> &'static str;
}

/// Splits on runs of whitespace; tokens keep their original case.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceTokenizer;

impl WhitespaceTokenizer {
    /// Create a new whitespace tokenizer.
    pub fn new() -> Self {
        WhitespaceTokenizer
    }
}

impl Tokenizer for WhitespaceTokenizer {
    fn tokenize(&self, text: &str) -> Result<TokenStream> {
        let mut tokens = Vec::new();
        let mut start = None;
        for (i, c) in text.char_indices() {
            if c.is_whitespace() {
                if let Some(s) = start.take() {
                    tokens.push(Token::new(&text[s..i], s as u32, i as u32));
                }
            } else if start.is_none() {
                start = Some(i);
            }
        }
        if let Some(s) = start {
            tokens.push(Token::new(&text[s..], s as u32, text.len() as u32));
        }
        Ok(Box::new(tokens.into_iter()))
    }

    fn name(&self) -> &'static str {
        "whitespace"
    }
}

/// Splits on non-alphanumeric characters and lowercases each token.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardTokenizer;

impl StandardTokenizer {
    /// Create a new standard tokenizer.
    pub fn new() -> Self {
        StandardTokenizer
    }
}

impl Tokenizer for StandardTokenizer {
    fn tokenize(&self, text: &str) -> Result<TokenStream> {
        let mut tokens = Vec::new();
        let mut start = None;
        for (i, c) in text.char_indices() {
            if c.is_alphanumeric() {
                if start.is_none() {
                    start = Some(i);
                }
            } else if let Some(s) = start.take() {
                tokens.push(Token::new(text[s..i].to_lowercase(), s as u32, i as u32));
            }
        }
        if let Some(s) = start {
            tokens.push(Token::new(
                text[s..].to_lowercase(),
                s as u32,
                text.len() as u32,
            ));
        }
        Ok(Box::new(tokens.into_iter()))
    }

    fn name(&self) -> &'static str {
        "standard"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(tokenizer: &dyn Tokenizer, text: &str) -> Vec<Token> {
        tokenizer.tokenize(text).unwrap().collect()
    }

    #[test]
    fn test_whitespace_offsets() {
        let tokens = collect(&WhitespaceTokenizer::new(), " a quick  fox ");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].text, "a");
        assert_eq!((tokens[0].start_offset, tokens[0].end_offset), (1, 2));
        assert_eq!(tokens[1].text, "quick");
        assert_eq!((tokens[1].start_offset, tokens[1].end_offset), (3, 8));
        assert_eq!(tokens[2].text, "fox");
        assert_eq!((tokens[2].start_offset, tokens[2].end_offset), (10, 13));
    }

    #[test]
    fn test_whitespace_empty_and_blank() {
        assert!(collect(&WhitespaceTokenizer::new(), "").is_empty());
        assert!(collect(&WhitespaceTokenizer::new(), "   \t\n").is_empty());
    }

    #[test]
    fn test_standard_splits_punctuation() {
        let tokens = collect(&StandardTokenizer::new(), "It's well-known: rust2021");
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["it", "s", "well", "known", "rust2021"]);
    }

    #[test]
    fn test_standard_unicode() {
        let tokens = collect(&StandardTokenizer::new(), "caf\u{e9} au lait");
        assert_eq!(tokens[0].text, "caf\u{e9}");
        // offsets are byte offsets into the original text
        assert_eq!(tokens[0].end_offset, 5);
    }
}

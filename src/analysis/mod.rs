//! Text analysis: tokenizers and analyzers feeding the indexer.
//!
//! An [`Analyzer`] turns a field's text into a lazy stream of [`Token`]s
//! carrying term text, position increment, character offsets and an
//! optional payload. The indexer consumes the stream without materializing
//! it.

pub mod token;
pub mod tokenizer;

use crate::error::Result;
pub use token::{Token, TokenStream};
pub use tokenizer::{StandardTokenizer, Tokenizer, WhitespaceTokenizer};

/// Turns field text into token streams.
pub trait Analyzer: Send + Sync {
    /// Analyze one value of the named field.
    fn token_stream(&self, field: &str, text: &str) -> Result<TokenStream>;

    /// Positions to add between two values of a multi-valued field.
    fn position_increment_gap(&self, _field: &str) -> u32 {
        0
    }

    /// Offset to add between two values of a multi-valued field.
    fn offset_gap(&self, _field: &str) -> u32 {
        1
    }

    /// Analyzer name, for diagnostics.
    fn name(&self) -> &'static str;
}

/// Whitespace analyzer: splits on whitespace, keeps case.
#[derive(Debug, Clone, Default)]
pub struct WhitespaceAnalyzer {
    tokenizer: WhitespaceTokenizer,
}

impl WhitespaceAnalyzer {
    /// Create a new whitespace analyzer.
    pub fn new() -> Self {
        WhitespaceAnalyzer::default()
    }
}

impl Analyzer for WhitespaceAnalyzer {
    fn token_stream(&self, _field: &str, text: &str) -> Result<TokenStream> {
        self.tokenizer.tokenize(text)
    }

    fn name(&self) -> &'static str {
        "whitespace"
    }
}

/// Standard analyzer: alphanumeric runs, lowercased.
#[derive(Debug, Clone, Default)]
pub struct StandardAnalyzer {
    tokenizer: StandardTokenizer,
}

impl StandardAnalyzer {
    /// Create a new standard analyzer.
    pub fn new() -> Self {
        StandardAnalyzer::default()
    }
}

impl Analyzer for StandardAnalyzer {
    fn token_stream(&self, _field: &str, text: &str) -> Result<TokenStream> {
        self.tokenizer.tokenize(text)
    }

    fn position_increment_gap(&self, _field: &str) -> u32 {
        100
    }

    fn name(&self) -> &'static str {
        "standard"
    }
}

//! Query evaluation: the query tree, weights, scorers and the searcher.
//!
//! A [`Query`] is compiled per searcher into a [`Weight`] (capturing
//! index-wide statistics), which produces one [`Scorer`] tree per segment
//! leaf. Scorers are pull iterators over strictly increasing doc ids;
//! bulk scorers push batches of hits into collectors to allow window-based
//! evaluation.

pub mod bm25;
pub mod boolean;
pub mod bulk;
pub mod collector;
pub mod scorer;
pub mod searcher;

pub use boolean::{BooleanQuery, BooleanWeight};
pub use collector::{ScoreDoc, TopDocs};
pub use searcher::IndexSearcher;

use crate::error::Result;
use crate::index::reader::LeafReaderContext;
use scorer::Scorer;

/// The four Boolean roles of a clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Occur {
    /// The clause must match and contributes to the score.
    Must,
    /// The clause may match; matching raises the score.
    Should,
    /// The clause must not match.
    MustNot,
    /// The clause must match but never contributes to the score.
    Filter,
}

/// What the collector needs from scorers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreMode {
    /// Every match is visited and scored.
    Complete,
    /// Every match is visited, scores are not needed.
    CompleteNoScores,
    /// Only the best-scoring matches are needed; scorers may prune
    /// non-competitive documents using impacts.
    TopScores,
}

impl ScoreMode {
    /// Whether scores must be computed.
    pub fn needs_scores(&self) -> bool {
        !matches!(self, ScoreMode::CompleteNoScores)
    }
}

/// A term in a named field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Term {
    /// Field name.
    pub field: String,
    /// Term bytes.
    pub bytes: Vec<u8>,
}

impl Term {
    /// Term from field and text.
    pub fn new<F: Into<String>, T: AsRef<str>>(field: F, text: T) -> Self {
        Term {
            field: field.into(),
            bytes: text.as_ref().as_bytes().to_vec(),
        }
    }

    /// Term from raw bytes.
    pub fn from_bytes<F: Into<String>>(field: F, bytes: Vec<u8>) -> Self {
        Term {
            field: field.into(),
            bytes,
        }
    }
}

/// An exact phrase in a field: terms at consecutive positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhraseQuery {
    /// Field name.
    pub field: String,
    /// Phrase terms in order.
    pub terms: Vec<Vec<u8>>,
}

impl PhraseQuery {
    /// Phrase from field and word texts.
    pub fn new<F: Into<String>>(field: F, words: &[&str]) -> Self {
        PhraseQuery {
            field: field.into(),
            terms: words.iter().map(|w| w.as_bytes().to_vec()).collect(),
        }
    }
}

/// An inclusive range over a point field's packed values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointRangeQuery {
    /// Field name.
    pub field: String,
    /// Inclusive lower bound, packed.
    pub lower: Vec<u8>,
    /// Inclusive upper bound, packed.
    pub upper: Vec<u8>,
}

impl PointRangeQuery {
    /// One-dimensional i64 range.
    pub fn new_i64<F: Into<String>>(field: F, lower: i64, upper: i64) -> Self {
        PointRangeQuery {
            field: field.into(),
            lower: crate::index::points::pack_i64(lower),
            upper: crate::index::points::pack_i64(upper),
        }
    }
}

/// The structured query tree.
#[derive(Debug, Clone)]
pub enum Query {
    /// Match documents containing a term.
    Term(Term),
    /// Boolean combination of sub-queries.
    Boolean(BooleanQuery),
    /// Match every document with score 1.
    MatchAll,
    /// Match nothing.
    MatchNone,
    /// Match an exact phrase.
    Phrase(PhraseQuery),
    /// Match documents with a point value inside a range.
    PointRange(PointRangeQuery),
    /// Wrap a query, replacing its scores with a constant.
    ConstantScore {
        /// The wrapped query.
        query: Box<Query>,
        /// The constant score.
        boost: f32,
    },
}

impl Query {
    /// Convenience term query.
    pub fn term<F: Into<String>, T: AsRef<str>>(field: F, text: T) -> Self {
        Query::Term(Term::new(field, text))
    }
}

/// The compiled, searcher-bound form of a query.
///
/// A weight holds whatever index-wide state scoring needs (idf, collection
/// statistics) so that the query itself stays reusable and immutable.
pub trait Weight: Send + Sync {
    /// Build a scorer over one segment leaf, or `None` when the leaf
    /// cannot match.
    fn scorer(&self, leaf: &LeafReaderContext<'_>) -> Result<Option<Box<dyn Scorer>>>;

    /// Build a bulk scorer over one leaf. The default wraps
    /// [`Weight::scorer`].
    fn bulk_scorer(&self, leaf: &LeafReaderContext<'_>) -> Result<Option<Box<dyn bulk::BulkScorer>>> {
        match self.scorer(leaf)? {
            Some(scorer) => Ok(Some(Box::new(bulk::DefaultBulkScorer::new(scorer)))),
            None => Ok(None),
        }
    }

    /// Whether `doc` matches in `leaf`.
    fn matches(&self, leaf: &LeafReaderContext<'_>, doc: u32) -> Result<bool> {
        match self.scorer(leaf)? {
            Some(mut scorer) => Ok(scorer.advance(doc)? == doc),
            None => Ok(false),
        }
    }

    /// Explain the score of `doc` in `leaf`.
    fn explain(&self, leaf: &LeafReaderContext<'_>, doc: u32) -> Result<Explanation> {
        match self.scorer(leaf)? {
            Some(mut scorer) => {
                if scorer.advance(doc)? == doc {
                    let value = scorer.score()?;
                    Ok(Explanation::matched(value, "score"))
                } else {
                    Ok(Explanation::no_match("no matching term"))
                }
            }
            None => Ok(Explanation::no_match("no matching term")),
        }
    }

    /// Whether per-leaf results may be cached.
    fn is_cacheable(&self, _leaf: &LeafReaderContext<'_>) -> bool {
        true
    }
}

/// A human-readable score breakdown.
#[derive(Debug, Clone, PartialEq)]
pub struct Explanation {
    /// Whether the document matched.
    pub matched: bool,
    /// The (partial) score value.
    pub value: f32,
    /// What this node of the explanation describes.
    pub description: String,
    /// Sub-explanations.
    pub details: Vec<Explanation>,
}

impl Explanation {
    /// A matching explanation.
    pub fn matched<S: Into<String>>(value: f32, description: S) -> Self {
        Explanation {
            matched: true,
            value,
            description: description.into(),
            details: Vec::new(),
        }
    }

    /// A non-matching explanation.
    pub fn no_match<S: Into<String>>(description: S) -> Self {
        Explanation {
            matched: false,
            value: 0.0,
            description: description.into(),
            details: Vec::new(),
        }
    }

    /// Attach sub-explanations.
    pub fn with_details(mut self, details: Vec<Explanation>) -> Self {
        self.details = details;
        self
    }
}


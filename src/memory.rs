//! In-RAM single-document index.
//!
//! `MemoryIndex` inverts one document's fields into plain maps and answers
//! queries through the same scorer combinators as the on-disk index,
//! bypassing the segment format entirely. Typical use is percolation:
//! score an ad-hoc document against a query without touching storage.

use std::collections::BTreeMap;

use ahash::AHashMap;

use crate::analysis::Analyzer;
use crate::error::{FalxError, Result};
use crate::search::bm25::Bm25Similarity;
use crate::search::scorer::{
    ConjunctionScorer, ConstantScoreScorer, DisjunctionScorer, MatchAllScorer,
    ReqExclScorer, ReqOptSumScorer, Scorer, VecScorer,
};
use crate::search::{Occur, Query};
use crate::postings::NO_MORE_DOCS;

#[derive(Debug, Default, Clone)]
struct MemoryPosting {
    freq: u32,
    positions: Vec<u32>,
}

#[derive(Debug, Default, Clone)]
struct MemoryField {
    terms: BTreeMap<Vec<u8>, MemoryPosting>,
    length: u32,
}

/// A single-document in-memory index.
#[derive(Debug, Default, Clone)]
pub struct MemoryIndex {
    fields: AHashMap<String, MemoryField>,
    similarity: Bm25Similarity,
}

impl MemoryIndex {
    /// New empty index.
    pub fn new() -> Self {
        MemoryIndex::default()
    }

    /// Analyze and invert one field value.
    pub fn add_field(&mut self, analyzer: &dyn Analyzer, field: &str, text: &str) -> Result<()> {
        let entry = self.fields.entry(field.to_string()).or_default();
        let mut position: i64 = if entry.length == 0 {
            -1
        } else {
            entry.length as i64 - 1 + analyzer.position_increment_gap(field) as i64
        };
        for token in analyzer.token_stream(field, text)? {
            position += token.position_increment.max(1) as i64;
            let posting = entry
                .terms
                .entry(token.text.as_bytes().to_vec())
                .or_default();
            posting.freq += 1;
            posting.positions.push(position as u32);
            entry.length += 1;
        }
        Ok(())
    }

    /// The distinct terms of a field, in ascending byte order.
    pub fn terms(&self, field: &str) -> Vec<Vec<u8>> {
        self.fields
            .get(field)
            .map(|f| f.terms.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Term frequency of one term in the document.
    pub fn freq(&self, field: &str, term: &[u8]) -> u32 {
        self.fields
            .get(field)
            .and_then(|f| f.terms.get(term))
            .map(|p| p.freq)
            .unwrap_or(0)
    }

    /// Score the document against a query; `0.0` means no match.
    pub fn search(&self, query: &Query) -> Result<f32> {
        let mut scorer = match self.scorer_for(query)? {
            Some(scorer) => scorer,
            None => return Ok(0.0),
        };
        if scorer.next_doc()? == NO_MORE_DOCS {
            return Ok(0.0);
        }
        scorer.score()
    }

    fn term_scorer(&self, field: &str, term: &[u8]) -> Option<Box<dyn Scorer>> {
        let mem_field = self.fields.get(field)?;
        let posting = mem_field.terms.get(term)?;
        let idf = Bm25Similarity::idf(1, 1);
        let sim = self
            .similarity
            .scorer(1.0, idf, mem_field.length.max(1) as f32);
        let score = sim.score(posting.freq, crate::util::int_to_byte4(mem_field.length));
        Some(Box::new(VecScorer::new(vec![(0, score)])))
    }

    fn phrase_matches(&self, field: &str, terms: &[Vec<u8>]) -> Option<u32> {
        let mem_field = self.fields.get(field)?;
        let first = mem_field.terms.get(terms.first()?)?;
        let mut freq = 0u32;
        for &p0 in &first.positions {
            let mut all = true;
            for (i, term) in terms.iter().enumerate().skip(1) {
                match mem_field.terms.get(term) {
                    Some(posting) if posting.positions.binary_search(&(p0 + i as u32)).is_ok() => {}
                    _ => {
                        all = false;
                        break;
                    }
                }
            }
            if all {
                freq += 1;
            }
        }
        if freq > 0 {
            Some(freq)
        } else {
            None
        }
    }

    fn scorer_for(&self, query: &Query) -> Result<Option<Box<dyn Scorer>>> {
        match query {
            Query::Term(term) => Ok(self.term_scorer(&term.field, &term.bytes)),
            Query::MatchAll => Ok(Some(Box::new(MatchAllScorer::new(1, 1.0)))),
            Query::MatchNone => Ok(None),
            Query::Phrase(phrase) => {
                match self.phrase_matches(&phrase.field, &phrase.terms) {
                    Some(freq) => {
                        let field_len = self
                            .fields
                            .get(&phrase.field)
                            .map(|f| f.length)
                            .unwrap_or(1);
                        let sim = self.similarity.scorer(
                            1.0,
                            Bm25Similarity::idf(1, 1) * phrase.terms.len() as f32,
                            field_len.max(1) as f32,
                        );
                        let score = sim.score(freq, crate::util::int_to_byte4(field_len));
                        Ok(Some(Box::new(VecScorer::new(vec![(0, score)]))))
                    }
                    None => Ok(None),
                }
            }
            Query::PointRange(_) => Err(FalxError::invalid_argument(
                "memory index does not hold point values",
            )),
            Query::ConstantScore { query, boost } => match self.scorer_for(query)? {
                Some(inner) => Ok(Some(Box::new(ConstantScoreScorer::new(inner, *boost)))),
                None => Ok(None),
            },
            Query::Boolean(boolean) => {
                let mut required: Vec<Box<dyn Scorer>> = Vec::new();
                let mut required_scoring = Vec::new();
                let mut optional: Vec<Box<dyn Scorer>> = Vec::new();
                let mut prohibited: Vec<Box<dyn Scorer>> = Vec::new();
                for (occur, sub) in &boolean.clauses {
                    let scorer = self.scorer_for(sub)?;
                    match occur {
                        Occur::Must => match scorer {
                            Some(s) => {
                                required.push(s);
                                required_scoring.push(true);
                            }
                            None => return Ok(None),
                        },
                        Occur::Filter => match scorer {
                            Some(s) => {
                                required.push(s);
                                required_scoring.push(false);
                            }
                            None => return Ok(None),
                        },
                        Occur::Should => {
                            if let Some(s) = scorer {
                                optional.push(s);
                            }
                        }
                        Occur::MustNot => {
                            if let Some(s) = scorer {
                                prohibited.push(s);
                            }
                        }
                    }
                }
                let msm = boolean.min_should_match as usize;
                if optional.len() < msm {
                    return Ok(None);
                }
                if required.is_empty() && optional.is_empty() {
                    return Ok(None);
                }
                let positive: Box<dyn Scorer> = if required.is_empty() {
                    Box::new(DisjunctionScorer::new(optional, msm.max(1))?)
                } else {
                    let base: Box<dyn Scorer> = if required.len() == 1 {
                        let scoring = required_scoring[0];
                        let scorer = required.pop().ok_or_else(|| {
                            FalxError::invalid_argument("required scorer vanished")
                        })?;
                        if scoring {
                            scorer
                        } else {
                            Box::new(ConstantScoreScorer::new(scorer, 0.0))
                        }
                    } else {
                        Box::new(ConjunctionScorer::new(required, required_scoring)?)
                    };
                    if optional.is_empty() {
                        base
                    } else if msm > 0 {
                        Box::new(ConjunctionScorer::new(
                            vec![base, Box::new(DisjunctionScorer::new(optional, msm)?)],
                            vec![true, true],
                        )?)
                    } else {
                        Box::new(ReqOptSumScorer::new(
                            base,
                            Box::new(DisjunctionScorer::new(optional, 1)?),
                        ))
                    }
                };
                if prohibited.is_empty() {
                    Ok(Some(positive))
                } else {
                    let excl: Box<dyn Scorer> = if prohibited.len() == 1 {
                        match prohibited.into_iter().next() {
                            Some(s) => s,
                            None => return Ok(Some(positive)),
                        }
                    } else {
                        Box::new(DisjunctionScorer::new(prohibited, 1)?)
                    };
                    Ok(Some(Box::new(ReqExclScorer::new(positive, excl))))
                }
            }
        }
    }
}

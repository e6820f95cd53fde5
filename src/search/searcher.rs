//! The index searcher: compiles queries into weights, fans evaluation out
//! per segment leaf, and merges ranked results.
//!
//! Searches run in parallel across leaves; within a leaf, evaluation is
//! strictly CPU-bound block iteration with a cooperative cancellation check
//! once per 128-doc stride.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;

use crate::error::{FalxError, Result};
use crate::index::live_docs::FixedBitSet;
use crate::index::reader::{IndexReader, LeafReaderContext};
use crate::postings::NO_MORE_DOCS;
use crate::search::bm25::{Bm25Scorer, Bm25Similarity};
use crate::search::boolean::BooleanWeight;
use crate::search::bulk::BulkScorer;
use crate::search::collector::{CountCollector, LeafCollector, TopDocsLeafCollector};
use crate::search::scorer::{
    BitSetScorer, ConstantScoreScorer, ExactPhraseScorer, MatchAllScorer, Scorer, TermScorer,
};
use crate::search::{Explanation, Occur, PhraseQuery, PointRangeQuery, Query, ScoreMode, Term,
    TopDocs, Weight};

/// Docs scored between two cancellation checks.
const CANCEL_CHECK_INTERVAL: u32 = 128;

/// Aggregated statistics of one term across the whole index.
#[derive(Debug, Clone, Copy, Default)]
pub struct TermStatistics {
    /// Documents containing the term.
    pub doc_freq: u64,
    /// Total occurrences of the term.
    pub total_term_freq: u64,
}

/// Aggregated statistics of one field across the whole index.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectionStatistics {
    /// Documents with the field.
    pub doc_count: u64,
    /// Sum of doc frequencies over the field's terms.
    pub sum_doc_freq: u64,
    /// Sum of total term frequencies over the field's terms.
    pub sum_total_term_freq: u64,
}

impl CollectionStatistics {
    /// Average field length in tokens.
    pub fn avg_field_length(&self) -> f32 {
        if self.doc_count == 0 {
            1.0
        } else {
            self.sum_total_term_freq as f32 / self.doc_count as f32
        }
    }
}

/// Searches one pinned [`IndexReader`] snapshot.
pub struct IndexSearcher<'r> {
    reader: &'r IndexReader,
    similarity: Bm25Similarity,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'r> IndexSearcher<'r> {
    /// New searcher over a reader snapshot.
    pub fn new(reader: &'r IndexReader) -> Self {
        IndexSearcher {
            reader,
            similarity: Bm25Similarity::default(),
            cancel: None,
        }
    }

    /// Arm cooperative cancellation: setting the flag makes running
    /// searches fail with [`FalxError::SearchCancelled`].
    pub fn with_cancellation(mut self, token: Arc<AtomicBool>) -> Self {
        self.cancel = Some(token);
        self
    }

    /// The underlying reader.
    pub fn reader(&self) -> &'r IndexReader {
        self.reader
    }

    fn check_cancelled(&self) -> Result<()> {
        if let Some(token) = &self.cancel {
            if token.load(Ordering::Relaxed) {
                return Err(FalxError::SearchCancelled);
            }
        }
        Ok(())
    }

    /// Aggregate one term's statistics across leaves.
    pub fn term_statistics(&self, term: &Term) -> Result<TermStatistics> {
        let mut stats = TermStatistics::default();
        for leaf in self.reader.leaves() {
            if let Some(meta) = leaf.reader.term_meta(&term.field, &term.bytes)? {
                stats.doc_freq += meta.doc_freq as u64;
                stats.total_term_freq += meta.total_term_freq;
            }
        }
        Ok(stats)
    }

    /// Aggregate one field's statistics across leaves.
    pub fn collection_statistics(&self, field: &str) -> Result<CollectionStatistics> {
        let mut stats = CollectionStatistics::default();
        for leaf in self.reader.leaves() {
            if let Some(terms) = leaf.reader.terms(field) {
                stats.doc_count += terms.stats.doc_count as u64;
                stats.sum_doc_freq += terms.stats.sum_doc_freq;
                stats.sum_total_term_freq += terms.stats.sum_total_term_freq;
            }
        }
        Ok(stats)
    }

    fn term_sim_scorer(&self, term: &Term, boost: f32) -> Result<Option<Bm25Scorer>> {
        let term_stats = self.term_statistics(term)?;
        if term_stats.doc_freq == 0 {
            return Ok(None);
        }
        let field_stats = self.collection_statistics(&term.field)?;
        let idf = Bm25Similarity::idf(term_stats.doc_freq, field_stats.doc_count.max(1));
        Ok(Some(self.similarity.scorer(
            boost,
            idf,
            field_stats.avg_field_length(),
        )))
    }

    /// Compile a query into a weight.
    pub fn create_weight(
        &self,
        query: &Query,
        score_mode: ScoreMode,
        boost: f32,
    ) -> Result<Box<dyn Weight>> {
        match query {
            Query::Term(term) => match self.term_sim_scorer(term, boost)? {
                Some(sim) => Ok(Box::new(TermWeight {
                    term: term.clone(),
                    sim,
                })),
                None => Ok(Box::new(NoMatchWeight)),
            },
            Query::Boolean(boolean) => {
                let mut clauses = Vec::with_capacity(boolean.clauses.len());
                for (occur, sub) in &boolean.clauses {
                    let sub_mode = match occur {
                        Occur::Must | Occur::Should => score_mode,
                        Occur::Filter | Occur::MustNot => ScoreMode::CompleteNoScores,
                    };
                    clauses.push((*occur, self.create_weight(sub, sub_mode, boost)?));
                }
                Ok(Box::new(BooleanWeight::new(
                    clauses,
                    boolean.min_should_match,
                    score_mode,
                )))
            }
            Query::MatchAll => Ok(Box::new(MatchAllWeight { boost })),
            Query::MatchNone => Ok(Box::new(NoMatchWeight)),
            Query::Phrase(phrase) => {
                if phrase.terms.len() < 2 {
                    return Err(FalxError::invalid_argument(
                        "phrase query needs at least two terms",
                    ));
                }
                // the phrase idf is the sum of its terms' idfs
                let field_stats = self.collection_statistics(&phrase.field)?;
                let mut idf_sum = 0.0f32;
                for bytes in &phrase.terms {
                    let term = Term::from_bytes(phrase.field.clone(), bytes.clone());
                    let stats = self.term_statistics(&term)?;
                    if stats.doc_freq == 0 {
                        return Ok(Box::new(NoMatchWeight));
                    }
                    idf_sum += Bm25Similarity::idf(stats.doc_freq, field_stats.doc_count.max(1));
                }
                let sim = self
                    .similarity
                    .scorer(boost, idf_sum, field_stats.avg_field_length());
                Ok(Box::new(PhraseWeight {
                    phrase: phrase.clone(),
                    sim,
                }))
            }
            Query::PointRange(range) => Ok(Box::new(PointRangeWeight {
                range: range.clone(),
                boost,
            })),
            Query::ConstantScore { query, boost: b } => {
                let inner = self.create_weight(query, ScoreMode::CompleteNoScores, 1.0)?;
                Ok(Box::new(ConstantScoreWeight { inner, boost: *b }))
            }
        }
    }

    fn drive_bulk(
        &self,
        bulk: &mut dyn BulkScorer,
        collector: &mut dyn LeafCollector,
        live_docs: Option<&FixedBitSet>,
        max_doc: u32,
    ) -> Result<()> {
        let mut min = 0u32;
        while min < max_doc {
            self.check_cancelled()?;
            let window_end = min.saturating_add(CANCEL_CHECK_INTERVAL).min(max_doc);
            min = bulk.score_range(collector, live_docs, min, window_end)?;
            if min == NO_MORE_DOCS {
                break;
            }
        }
        Ok(())
    }

    fn search_leaf(
        &self,
        weight: &dyn Weight,
        leaf: &LeafReaderContext<'_>,
        k: usize,
    ) -> Result<TopDocs> {
        let mut collector = TopDocsLeafCollector::new(k, leaf.doc_base);
        if let Some(mut bulk) = weight.bulk_scorer(leaf)? {
            self.drive_bulk(
                bulk.as_mut(),
                &mut collector,
                leaf.reader.live_docs(),
                leaf.reader.max_doc(),
            )?;
        }
        Ok(collector.into_top_docs())
    }

    /// Rank the top `k` hits, fanning out per segment leaf.
    pub fn search(&self, query: &Query, k: usize) -> Result<TopDocs> {
        let weight = self.create_weight(query, ScoreMode::TopScores, 1.0)?;
        let leaves = self.reader.leaves();
        let parts: Vec<Result<TopDocs>> = leaves
            .par_iter()
            .map(|leaf| self.search_leaf(weight.as_ref(), leaf, k))
            .collect();
        let mut merged = Vec::with_capacity(parts.len());
        for part in parts {
            merged.push(part?);
        }
        Ok(TopDocs::merge(k, merged))
    }

    /// Count matching documents.
    pub fn count(&self, query: &Query) -> Result<u64> {
        let weight = self.create_weight(query, ScoreMode::CompleteNoScores, 1.0)?;
        let mut total = 0u64;
        for leaf in self.reader.leaves() {
            let mut collector = CountCollector::default();
            if let Some(mut bulk) = weight.bulk_scorer(&leaf)? {
                self.drive_bulk(
                    bulk.as_mut(),
                    &mut collector,
                    leaf.reader.live_docs(),
                    leaf.reader.max_doc(),
                )?;
            }
            total += collector.count;
        }
        Ok(total)
    }

    /// Explain a global doc's score for a query.
    pub fn explain(&self, query: &Query, global_doc: u32) -> Result<Explanation> {
        let weight = self.create_weight(query, ScoreMode::Complete, 1.0)?;
        for leaf in self.reader.leaves() {
            let max = leaf.doc_base + leaf.reader.max_doc();
            if global_doc >= leaf.doc_base && global_doc < max {
                return weight.explain(&leaf, global_doc - leaf.doc_base);
            }
        }
        Err(FalxError::invalid_argument(format!(
            "doc {global_doc} out of range"
        )))
    }
}

/// Weight of a single-term query.
struct TermWeight {
    term: Term,
    sim: Bm25Scorer,
}

impl Weight for TermWeight {
    fn scorer(&self, leaf: &LeafReaderContext<'_>) -> Result<Option<Box<dyn Scorer>>> {
        let postings = match leaf
            .reader
            .postings(&self.term.field, &self.term.bytes, false)?
        {
            Some(postings) => postings,
            None => return Ok(None),
        };
        let norms = leaf.reader.doc_values().norms_column(&self.term.field);
        Ok(Some(Box::new(TermScorer::new(
            postings,
            self.sim.clone(),
            norms,
        ))))
    }

    fn explain(&self, leaf: &LeafReaderContext<'_>, doc: u32) -> Result<Explanation> {
        match self.scorer(leaf)? {
            Some(mut scorer) => {
                if scorer.advance(doc)? == doc {
                    let value = scorer.score()?;
                    Ok(Explanation::matched(
                        value,
                        format!(
                            "BM25 weight of {}:{:?}",
                            self.term.field,
                            String::from_utf8_lossy(&self.term.bytes)
                        ),
                    ))
                } else {
                    Ok(Explanation::no_match("term not present in doc"))
                }
            }
            None => Ok(Explanation::no_match("term not present in doc")),
        }
    }
}

/// Weight matching nothing (absent terms, MatchNone).
struct NoMatchWeight;

impl Weight for NoMatchWeight {
    fn scorer(&self, _leaf: &LeafReaderContext<'_>) -> Result<Option<Box<dyn Scorer>>> {
        Ok(None)
    }
}

/// Weight of `MatchAll`.
struct MatchAllWeight {
    boost: f32,
}

impl Weight for MatchAllWeight {
    fn scorer(&self, leaf: &LeafReaderContext<'_>) -> Result<Option<Box<dyn Scorer>>> {
        Ok(Some(Box::new(MatchAllScorer::new(
            leaf.reader.max_doc(),
            self.boost,
        ))))
    }
}

/// Weight of an exact phrase.
struct PhraseWeight {
    phrase: PhraseQuery,
    sim: Bm25Scorer,
}

impl Weight for PhraseWeight {
    fn scorer(&self, leaf: &LeafReaderContext<'_>) -> Result<Option<Box<dyn Scorer>>> {
        let mut postings = Vec::with_capacity(self.phrase.terms.len());
        for term in &self.phrase.terms {
            match leaf.reader.postings(&self.phrase.field, term, true)? {
                Some(iter) => postings.push(iter),
                None => return Ok(None),
            }
        }
        let norms = leaf.reader.doc_values().norms_column(&self.phrase.field);
        Ok(Some(Box::new(ExactPhraseScorer::new(
            postings,
            self.sim.clone(),
            norms,
        )?)))
    }
}

/// Weight of a point range: constant score over the matching bitset.
struct PointRangeWeight {
    range: PointRangeQuery,
    boost: f32,
}

impl Weight for PointRangeWeight {
    fn scorer(&self, leaf: &LeafReaderContext<'_>) -> Result<Option<Box<dyn Scorer>>> {
        let points = match leaf.reader.points() {
            Some(points) => points,
            None => return Ok(None),
        };
        if points.field(&self.range.field).is_none() {
            return Ok(None);
        }
        let mut hits = Vec::new();
        points.intersect_range(&self.range.field, &self.range.lower, &self.range.upper, &mut hits)?;
        if hits.is_empty() {
            return Ok(None);
        }
        let mut bits = FixedBitSet::new(leaf.reader.max_doc());
        for doc in hits {
            bits.set(doc);
        }
        Ok(Some(Box::new(BitSetScorer::new(bits, self.boost))))
    }
}

/// Weight replacing a wrapped query's scores with a constant.
struct ConstantScoreWeight {
    inner: Box<dyn Weight>,
    boost: f32,
}

impl Weight for ConstantScoreWeight {
    fn scorer(&self, leaf: &LeafReaderContext<'_>) -> Result<Option<Box<dyn Scorer>>> {
        match self.inner.scorer(leaf)? {
            Some(scorer) => Ok(Some(Box::new(ConstantScoreScorer::new(scorer, self.boost)))),
            None => Ok(None),
        }
    }

    fn is_cacheable(&self, leaf: &LeafReaderContext<'_>) -> bool {
        self.inner.is_cacheable(leaf)
    }
}

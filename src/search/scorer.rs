//! Scorers: pull iterators over matching documents with scores.
//!
//! Every scorer yields strictly increasing doc ids, never revisits one, and
//! terminates with [`NO_MORE_DOCS`]. `score()` may only be called after a
//! successful `next_doc`/`advance`. `cost()` is an upper bound on the
//! number of matches.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::error::{FalxError, Result};
use crate::index::live_docs::FixedBitSet;
use crate::postings::reader::BlockPostingsIterator;
use crate::postings::{PostingsIterator, NO_MORE_DOCS};
use crate::search::bm25::Bm25Scorer;
use crate::util::int_to_byte4;

/// Sentinel for a scorer that has not produced its first doc.
pub const UNSTARTED: u32 = u32::MAX;

/// Iterator over a sorted doc-id set.
pub trait DocIdSetIterator: Send {
    /// Current doc id; [`UNSTARTED`] before the first advance,
    /// [`NO_MORE_DOCS`] when exhausted.
    fn doc_id(&self) -> u32;

    /// Move to the next doc.
    fn next_doc(&mut self) -> Result<u32>;

    /// Move to the first doc `>= target`.
    fn advance(&mut self, target: u32) -> Result<u32>;

    /// Upper bound on the number of docs this iterator may return.
    fn cost(&self) -> u64;
}

/// A doc iterator that can also score the current doc.
pub trait Scorer: DocIdSetIterator {
    /// Score the current doc.
    fn score(&mut self) -> Result<f32>;

    /// Upper bound on any score this scorer can produce.
    fn max_score(&self) -> f32 {
        f32::INFINITY
    }

    /// Inform the scorer that only scores above `score` are competitive;
    /// it may then skip non-competitive documents.
    fn set_min_competitive_score(&mut self, _score: f32) {}
}

fn norm_byte(norms: &Option<Arc<Vec<Option<i64>>>>, doc: u32) -> u8 {
    norms
        .as_ref()
        .and_then(|n| n.get(doc as usize).copied().flatten())
        .map(|v| v as u8)
        .unwrap_or_else(|| int_to_byte4(1))
}

/// Scores one term's postings with BM25.
pub struct TermScorer {
    postings: BlockPostingsIterator,
    sim: Bm25Scorer,
    norms: Option<Arc<Vec<Option<i64>>>>,
    min_competitive: f32,
}

impl TermScorer {
    /// New scorer over a term's postings.
    pub fn new(
        postings: BlockPostingsIterator,
        sim: Bm25Scorer,
        norms: Option<Arc<Vec<Option<i64>>>>,
    ) -> Self {
        TermScorer {
            postings,
            sim,
            norms,
            min_competitive: 0.0,
        }
    }

    /// The underlying postings iterator.
    pub fn postings_mut(&mut self) -> &mut BlockPostingsIterator {
        &mut self.postings
    }

    /// Best score the current block can produce, from its level-0
    /// competitive impacts.
    fn block_max_score(&self) -> f32 {
        self.postings
            .impacts(0)
            .iter()
            .map(|impact| {
                if impact.freq == u32::MAX {
                    self.sim.max_score()
                } else {
                    self.sim.score_upper_bound(impact.freq, impact.norm)
                }
            })
            .fold(0.0f32, f32::max)
    }
}

impl DocIdSetIterator for TermScorer {
    fn doc_id(&self) -> u32 {
        self.postings.doc_id()
    }

    fn next_doc(&mut self) -> Result<u32> {
        if self.min_competitive > 0.0 && self.min_competitive > self.sim.max_score() {
            // not even a saturated tf can compete for the top-k
            return self.advance(NO_MORE_DOCS);
        }
        let mut doc = self.postings.next_doc()?;
        if self.min_competitive > 0.0 {
            // hop over whole blocks whose impacts cannot compete; the
            // bound is only reported while the skip state covers the
            // current position, so this never over-skips
            while doc != NO_MORE_DOCS {
                let bound = match self.postings.block_bound() {
                    Some(bound) => bound,
                    None => break,
                };
                if self.min_competitive > self.block_max_score() {
                    doc = self.postings.advance(bound.saturating_add(1))?;
                } else {
                    break;
                }
            }
        }
        Ok(doc)
    }

    fn advance(&mut self, target: u32) -> Result<u32> {
        self.postings.advance(target)
    }

    fn cost(&self) -> u64 {
        self.postings.cost()
    }
}

impl Scorer for TermScorer {
    fn score(&mut self) -> Result<f32> {
        let doc = self.postings.doc_id();
        let freq = self.postings.freq();
        Ok(self.sim.score(freq, norm_byte(&self.norms, doc)))
    }

    fn max_score(&self) -> f32 {
        self.sim.max_score()
    }

    fn set_min_competitive_score(&mut self, score: f32) {
        self.min_competitive = score;
    }
}

/// Intersection of several scorers; the cheapest leads.
pub struct ConjunctionScorer {
    scorers: Vec<Box<dyn Scorer>>,
    scoring: Vec<bool>,
    doc: u32,
    cost: u64,
}

impl ConjunctionScorer {
    /// New conjunction; `scoring[i]` marks whether scorer `i` contributes
    /// to the score (filters do not).
    pub fn new(mut scorers: Vec<Box<dyn Scorer>>, scoring: Vec<bool>) -> Result<Self> {
        if scorers.is_empty() {
            return Err(FalxError::invalid_argument("empty conjunction"));
        }
        // sort by cost ascending so the rarest clause leads
        let mut order: Vec<usize> = (0..scorers.len()).collect();
        order.sort_by_key(|&i| scorers[i].cost());
        let mut sorted_scorers = Vec::with_capacity(scorers.len());
        let mut sorted_scoring = Vec::with_capacity(scorers.len());
        for &i in &order {
            sorted_scorers.push(std::mem::replace(
                &mut scorers[i],
                Box::new(EmptyScorer::new()),
            ));
            sorted_scoring.push(scoring[i]);
        }
        let cost = sorted_scorers[0].cost();
        Ok(ConjunctionScorer {
            scorers: sorted_scorers,
            scoring: sorted_scoring,
            doc: UNSTARTED,
            cost,
        })
    }

    /// Advance the followers until every scorer agrees on one doc.
    fn align(&mut self, mut candidate: u32) -> Result<u32> {
        'outer: loop {
            if candidate == NO_MORE_DOCS {
                self.doc = NO_MORE_DOCS;
                return Ok(NO_MORE_DOCS);
            }
            for i in 1..self.scorers.len() {
                let mut doc = self.scorers[i].doc_id();
                if doc == UNSTARTED || doc < candidate {
                    doc = self.scorers[i].advance(candidate)?;
                }
                if doc > candidate {
                    // overshoot: restart with a new leader position
                    candidate = self.scorers[0].advance(doc)?;
                    continue 'outer;
                }
            }
            self.doc = candidate;
            return Ok(candidate);
        }
    }
}

impl DocIdSetIterator for ConjunctionScorer {
    fn doc_id(&self) -> u32 {
        self.doc
    }

    fn next_doc(&mut self) -> Result<u32> {
        let candidate = self.scorers[0].next_doc()?;
        self.align(candidate)
    }

    fn advance(&mut self, target: u32) -> Result<u32> {
        let candidate = self.scorers[0].advance(target)?;
        self.align(candidate)
    }

    fn cost(&self) -> u64 {
        self.cost
    }
}

impl Scorer for ConjunctionScorer {
    fn score(&mut self) -> Result<f32> {
        let mut total = 0.0;
        for (i, scorer) in self.scorers.iter_mut().enumerate() {
            if self.scoring[i] {
                total += scorer.score()?;
            }
        }
        Ok(total)
    }

    fn max_score(&self) -> f32 {
        self.scorers
            .iter()
            .zip(&self.scoring)
            .filter(|(_, &s)| s)
            .map(|(scorer, _)| scorer.max_score())
            .sum()
    }
}

/// Union of several scorers via a min-heap keyed by doc id; emits a doc
/// when at least `min_should_match` subs agree on it. Scores sum the
/// agreeing subs.
pub struct DisjunctionScorer {
    subs: Vec<Box<dyn Scorer>>,
    heap: BinaryHeap<Reverse<(u32, usize)>>,
    tied: Vec<usize>,
    min_should_match: usize,
    doc: u32,
    started: bool,
    cost: u64,
}

impl DisjunctionScorer {
    /// New disjunction over `subs` requiring `min_should_match` agreeing
    /// clauses per doc (0 is treated as 1).
    pub fn new(subs: Vec<Box<dyn Scorer>>, min_should_match: usize) -> Result<Self> {
        if subs.is_empty() {
            return Err(FalxError::invalid_argument("empty disjunction"));
        }
        let cost = subs.iter().map(|s| s.cost()).sum();
        Ok(DisjunctionScorer {
            subs,
            heap: BinaryHeap::new(),
            tied: Vec::new(),
            min_should_match: min_should_match.max(1),
            doc: UNSTARTED,
            started: false,
            cost,
        })
    }

    fn start(&mut self) -> Result<()> {
        for i in 0..self.subs.len() {
            let doc = self.subs[i].next_doc()?;
            if doc != NO_MORE_DOCS {
                self.heap.push(Reverse((doc, i)));
            }
        }
        self.started = true;
        Ok(())
    }

    /// Advance the subs that produced the current doc and re-enter them.
    fn release_tied(&mut self) -> Result<()> {
        let tied = std::mem::take(&mut self.tied);
        for i in tied {
            let doc = self.subs[i].next_doc()?;
            if doc != NO_MORE_DOCS {
                self.heap.push(Reverse((doc, i)));
            }
        }
        Ok(())
    }

    /// Find the next doc where the tie count reaches the minimum.
    fn find_match(&mut self) -> Result<u32> {
        loop {
            let top_doc = match self.heap.peek() {
                Some(&Reverse((doc, _))) => doc,
                None => {
                    self.doc = NO_MORE_DOCS;
                    return Ok(NO_MORE_DOCS);
                }
            };
            let mut tied = Vec::new();
            while let Some(&Reverse((doc, i))) = self.heap.peek() {
                if doc != top_doc {
                    break;
                }
                self.heap.pop();
                tied.push(i);
            }
            if tied.len() >= self.min_should_match {
                self.tied = tied;
                self.doc = top_doc;
                return Ok(top_doc);
            }
            // not enough agreeing clauses: move them along
            for i in tied {
                let doc = self.subs[i].next_doc()?;
                if doc != NO_MORE_DOCS {
                    self.heap.push(Reverse((doc, i)));
                }
            }
        }
    }
}

impl DocIdSetIterator for DisjunctionScorer {
    fn doc_id(&self) -> u32 {
        self.doc
    }

    fn next_doc(&mut self) -> Result<u32> {
        if !self.started {
            self.start()?;
        } else {
            self.release_tied()?;
        }
        self.find_match()
    }

    fn advance(&mut self, target: u32) -> Result<u32> {
        if !self.started {
            self.start()?;
        } else {
            self.release_tied()?;
        }
        // advance every sub still below the target
        let mut entries = Vec::new();
        while let Some(&Reverse((doc, i))) = self.heap.peek() {
            if doc >= target {
                break;
            }
            self.heap.pop();
            entries.push(i);
        }
        for i in entries {
            let doc = self.subs[i].advance(target)?;
            if doc != NO_MORE_DOCS {
                self.heap.push(Reverse((doc, i)));
            }
        }
        self.find_match()
    }

    fn cost(&self) -> u64 {
        self.cost
    }
}

impl Scorer for DisjunctionScorer {
    fn score(&mut self) -> Result<f32> {
        let mut total = 0.0;
        for &i in &self.tied {
            total += self.subs[i].score()?;
        }
        Ok(total)
    }

    fn max_score(&self) -> f32 {
        self.subs.iter().map(|s| s.max_score()).sum()
    }

    fn set_min_competitive_score(&mut self, score: f32) {
        // if even the sum of every clause's best cannot compete, drain
        if score > self.max_score() {
            self.heap.clear();
            self.tied.clear();
            self.started = true;
            self.doc = NO_MORE_DOCS;
        }
    }
}

/// Emits the docs of `req` that are absent from `excl`.
pub struct ReqExclScorer {
    req: Box<dyn Scorer>,
    excl: Box<dyn Scorer>,
}

impl ReqExclScorer {
    /// New required/excluded scorer.
    pub fn new(req: Box<dyn Scorer>, excl: Box<dyn Scorer>) -> Self {
        ReqExclScorer { req, excl }
    }

    fn to_non_excluded(&mut self) -> Result<u32> {
        loop {
            let doc = self.req.doc_id();
            if doc == NO_MORE_DOCS {
                return Ok(NO_MORE_DOCS);
            }
            let mut excl_doc = self.excl.doc_id();
            if excl_doc == UNSTARTED || excl_doc < doc {
                excl_doc = self.excl.advance(doc)?;
            }
            if excl_doc != doc {
                return Ok(doc);
            }
            self.req.next_doc()?;
        }
    }
}

impl DocIdSetIterator for ReqExclScorer {
    fn doc_id(&self) -> u32 {
        self.req.doc_id()
    }

    fn next_doc(&mut self) -> Result<u32> {
        self.req.next_doc()?;
        self.to_non_excluded()
    }

    fn advance(&mut self, target: u32) -> Result<u32> {
        self.req.advance(target)?;
        self.to_non_excluded()
    }

    fn cost(&self) -> u64 {
        self.req.cost()
    }
}

impl Scorer for ReqExclScorer {
    fn score(&mut self) -> Result<f32> {
        self.req.score()
    }

    fn max_score(&self) -> f32 {
        self.req.max_score()
    }
}

/// Iterates the required scorer, adding the optional scorer's score when it
/// lands on the same doc.
pub struct ReqOptSumScorer {
    req: Box<dyn Scorer>,
    opt: Box<dyn Scorer>,
}

impl ReqOptSumScorer {
    /// New required+optional scorer.
    pub fn new(req: Box<dyn Scorer>, opt: Box<dyn Scorer>) -> Self {
        ReqOptSumScorer { req, opt }
    }
}

impl DocIdSetIterator for ReqOptSumScorer {
    fn doc_id(&self) -> u32 {
        self.req.doc_id()
    }

    fn next_doc(&mut self) -> Result<u32> {
        self.req.next_doc()
    }

    fn advance(&mut self, target: u32) -> Result<u32> {
        self.req.advance(target)
    }

    fn cost(&self) -> u64 {
        self.req.cost()
    }
}

impl Scorer for ReqOptSumScorer {
    fn score(&mut self) -> Result<f32> {
        let doc = self.req.doc_id();
        let mut total = self.req.score()?;
        let mut opt_doc = self.opt.doc_id();
        if opt_doc == UNSTARTED || opt_doc < doc {
            opt_doc = self.opt.advance(doc)?;
        }
        if opt_doc == doc {
            total += self.opt.score()?;
        }
        Ok(total)
    }

    fn max_score(&self) -> f32 {
        self.req.max_score() + self.opt.max_score()
    }
}

/// Matches every doc below `max_doc` with a constant score.
pub struct MatchAllScorer {
    doc: u32,
    max_doc: u32,
    score: f32,
}

impl MatchAllScorer {
    /// New match-all scorer.
    pub fn new(max_doc: u32, score: f32) -> Self {
        MatchAllScorer {
            doc: UNSTARTED,
            max_doc,
            score,
        }
    }
}

impl DocIdSetIterator for MatchAllScorer {
    fn doc_id(&self) -> u32 {
        self.doc
    }

    fn next_doc(&mut self) -> Result<u32> {
        let next = if self.doc == UNSTARTED { 0 } else { self.doc + 1 };
        self.doc = if next >= self.max_doc { NO_MORE_DOCS } else { next };
        Ok(self.doc)
    }

    fn advance(&mut self, target: u32) -> Result<u32> {
        self.doc = if target >= self.max_doc {
            NO_MORE_DOCS
        } else {
            target
        };
        Ok(self.doc)
    }

    fn cost(&self) -> u64 {
        self.max_doc as u64
    }
}

impl Scorer for MatchAllScorer {
    fn score(&mut self) -> Result<f32> {
        Ok(self.score)
    }

    fn max_score(&self) -> f32 {
        self.score
    }
}

/// Matches nothing.
pub struct EmptyScorer {
    doc: u32,
}

impl EmptyScorer {
    /// New empty scorer.
    pub fn new() -> Self {
        EmptyScorer { doc: UNSTARTED }
    }
}

impl Default for EmptyScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl DocIdSetIterator for EmptyScorer {
    fn doc_id(&self) -> u32 {
        self.doc
    }

    fn next_doc(&mut self) -> Result<u32> {
        self.doc = NO_MORE_DOCS;
        Ok(NO_MORE_DOCS)
    }

    fn advance(&mut self, _target: u32) -> Result<u32> {
        self.doc = NO_MORE_DOCS;
        Ok(NO_MORE_DOCS)
    }

    fn cost(&self) -> u64 {
        0
    }
}

impl Scorer for EmptyScorer {
    fn score(&mut self) -> Result<f32> {
        Err(FalxError::invalid_argument("score() on empty scorer"))
    }

    fn max_score(&self) -> f32 {
        0.0
    }
}

/// Constant-score iterator over a materialized bitset (point ranges).
pub struct BitSetScorer {
    bits: FixedBitSet,
    doc: u32,
    score: f32,
    cost: u64,
}

impl BitSetScorer {
    /// New scorer over the set bits.
    pub fn new(bits: FixedBitSet, score: f32) -> Self {
        let cost = bits.count_ones() as u64;
        BitSetScorer {
            bits,
            doc: UNSTARTED,
            score,
            cost,
        }
    }
}

impl DocIdSetIterator for BitSetScorer {
    fn doc_id(&self) -> u32 {
        self.doc
    }

    fn next_doc(&mut self) -> Result<u32> {
        let from = if self.doc == UNSTARTED { 0 } else { self.doc + 1 };
        self.doc = self.bits.next_set_bit(from).unwrap_or(NO_MORE_DOCS);
        Ok(self.doc)
    }

    fn advance(&mut self, target: u32) -> Result<u32> {
        self.doc = self.bits.next_set_bit(target).unwrap_or(NO_MORE_DOCS);
        Ok(self.doc)
    }

    fn cost(&self) -> u64 {
        self.cost
    }
}

impl Scorer for BitSetScorer {
    fn score(&mut self) -> Result<f32> {
        Ok(self.score)
    }

    fn max_score(&self) -> f32 {
        self.score
    }
}

/// Exact-phrase scorer: a positional conjunction.
pub struct ExactPhraseScorer {
    postings: Vec<BlockPostingsIterator>,
    sim: Bm25Scorer,
    norms: Option<Arc<Vec<Option<i64>>>>,
    doc: u32,
    phrase_freq: u32,
    cost: u64,
}

impl ExactPhraseScorer {
    /// New scorer over the phrase terms' postings, in phrase order.
    pub fn new(
        postings: Vec<BlockPostingsIterator>,
        sim: Bm25Scorer,
        norms: Option<Arc<Vec<Option<i64>>>>,
    ) -> Result<Self> {
        if postings.len() < 2 {
            return Err(FalxError::invalid_argument(
                "phrase needs at least two terms",
            ));
        }
        let cost = postings.iter().map(|p| p.cost()).min().unwrap_or(0);
        Ok(ExactPhraseScorer {
            postings,
            sim,
            norms,
            doc: UNSTARTED,
            phrase_freq: 0,
            cost,
        })
    }

    /// Align all terms on one doc, starting from the lead's current doc.
    fn align(&mut self, mut candidate: u32) -> Result<u32> {
        'outer: loop {
            if candidate == NO_MORE_DOCS {
                self.doc = NO_MORE_DOCS;
                return Ok(NO_MORE_DOCS);
            }
            for i in 1..self.postings.len() {
                let mut doc = self.postings[i].doc_id();
                if doc == u32::MAX || doc < candidate {
                    doc = self.postings[i].advance(candidate)?;
                }
                if doc > candidate {
                    candidate = self.postings[0].advance(doc)?;
                    continue 'outer;
                }
            }
            // all aligned: check positions
            let freq = self.phrase_freq_at_current()?;
            if freq > 0 {
                self.doc = candidate;
                self.phrase_freq = freq;
                return Ok(candidate);
            }
            candidate = self.postings[0].next_doc()?;
        }
    }

    fn phrase_freq_at_current(&mut self) -> Result<u32> {
        let mut positions: Vec<Vec<u32>> = Vec::with_capacity(self.postings.len());
        for postings in &mut self.postings {
            let freq = postings.freq();
            let mut list = Vec::with_capacity(freq as usize);
            for _ in 0..freq {
                list.push(postings.next_position()?);
            }
            positions.push(list);
        }
        let mut freq = 0u32;
        for &p0 in &positions[0] {
            let mut all = true;
            for (i, list) in positions.iter().enumerate().skip(1) {
                if list.binary_search(&(p0 + i as u32)).is_err() {
                    all = false;
                    break;
                }
            }
            if all {
                freq += 1;
            }
        }
        Ok(freq)
    }
}

impl DocIdSetIterator for ExactPhraseScorer {
    fn doc_id(&self) -> u32 {
        self.doc
    }

    fn next_doc(&mut self) -> Result<u32> {
        let candidate = self.postings[0].next_doc()?;
        self.align(candidate)
    }

    fn advance(&mut self, target: u32) -> Result<u32> {
        let candidate = self.postings[0].advance(target)?;
        self.align(candidate)
    }

    fn cost(&self) -> u64 {
        self.cost
    }
}

impl Scorer for ExactPhraseScorer {
    fn score(&mut self) -> Result<f32> {
        let doc = self.doc;
        Ok(self
            .sim
            .score(self.phrase_freq, norm_byte(&self.norms, doc)))
    }
}

/// Wraps a scorer, replacing every score with a constant.
pub struct ConstantScoreScorer {
    inner: Box<dyn Scorer>,
    score: f32,
}

impl ConstantScoreScorer {
    /// New constant-score wrapper.
    pub fn new(inner: Box<dyn Scorer>, score: f32) -> Self {
        ConstantScoreScorer { inner, score }
    }
}

impl DocIdSetIterator for ConstantScoreScorer {
    fn doc_id(&self) -> u32 {
        self.inner.doc_id()
    }

    fn next_doc(&mut self) -> Result<u32> {
        self.inner.next_doc()
    }

    fn advance(&mut self, target: u32) -> Result<u32> {
        self.inner.advance(target)
    }

    fn cost(&self) -> u64 {
        self.inner.cost()
    }
}

impl Scorer for ConstantScoreScorer {
    fn score(&mut self) -> Result<f32> {
        Ok(self.score)
    }

    fn max_score(&self) -> f32 {
        self.score
    }
}

/// In-memory scorer used by unit tests and the in-RAM index.
pub struct VecScorer {
    docs: Vec<(u32, f32)>,
    at: usize,
    doc: u32,
}

impl VecScorer {
    /// Scorer over `(doc, score)` pairs sorted by doc.
    pub fn new(docs: Vec<(u32, f32)>) -> Self {
        debug_assert!(docs.windows(2).all(|w| w[0].0 < w[1].0));
        VecScorer {
            docs,
            at: 0,
            doc: UNSTARTED,
        }
    }
}

impl DocIdSetIterator for VecScorer {
    fn doc_id(&self) -> u32 {
        self.doc
    }

    fn next_doc(&mut self) -> Result<u32> {
        self.doc = match self.docs.get(self.at) {
            Some(&(doc, _)) => {
                self.at += 1;
                doc
            }
            None => NO_MORE_DOCS,
        };
        Ok(self.doc)
    }

    fn advance(&mut self, target: u32) -> Result<u32> {
        while self.at < self.docs.len() && self.docs[self.at].0 < target {
            self.at += 1;
        }
        self.next_doc()
    }

    fn cost(&self) -> u64 {
        self.docs.len() as u64
    }
}

impl Scorer for VecScorer {
    fn score(&mut self) -> Result<f32> {
        if self.at == 0 || self.at > self.docs.len() {
            return Err(FalxError::invalid_argument("score() before next_doc()"));
        }
        Ok(self.docs[self.at - 1].1)
    }

    fn max_score(&self) -> f32 {
        self.docs.iter().map(|&(_, s)| s).fold(0.0, f32::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(scorer: &mut dyn Scorer) -> Vec<(u32, f32)> {
        let mut out = Vec::new();
        loop {
            let doc = scorer.next_doc().unwrap();
            if doc == NO_MORE_DOCS {
                return out;
            }
            out.push((doc, scorer.score().unwrap()));
        }
    }

    fn vs(docs: &[u32]) -> Box<dyn Scorer> {
        Box::new(VecScorer::new(docs.iter().map(|&d| (d, 1.0)).collect()))
    }

    #[test]
    fn test_conjunction_intersects() {
        let scorer = ConjunctionScorer::new(
            vec![vs(&[1, 3, 5, 7, 9]), vs(&[3, 4, 5, 9, 11])],
            vec![true, true],
        )
        .unwrap();
        let mut scorer = scorer;
        let hits: Vec<u32> = drain(&mut scorer).into_iter().map(|(d, _)| d).collect();
        assert_eq!(hits, vec![3, 5, 9]);
    }

    #[test]
    fn test_conjunction_cost_is_min() {
        let scorer =
            ConjunctionScorer::new(vec![vs(&[1, 2, 3, 4, 5]), vs(&[2, 4])], vec![true, true])
                .unwrap();
        assert_eq!(scorer.cost(), 2);
    }

    #[test]
    fn test_conjunction_scores_sum() {
        let a = Box::new(VecScorer::new(vec![(2, 1.5), (4, 2.0)]));
        let b = Box::new(VecScorer::new(vec![(2, 0.5), (3, 9.0), (4, 1.0)]));
        let mut scorer = ConjunctionScorer::new(vec![a, b], vec![true, true]).unwrap();
        let hits = drain(&mut scorer);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, 2);
        assert!((hits[0].1 - 2.0).abs() < 1e-6);
        assert!((hits[1].1 - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_conjunction_filter_does_not_score() {
        let a = Box::new(VecScorer::new(vec![(2, 1.5)]));
        let b = Box::new(VecScorer::new(vec![(2, 100.0)]));
        let mut scorer = ConjunctionScorer::new(vec![a, b], vec![true, false]).unwrap();
        let hits = drain(&mut scorer);
        assert!((hits[0].1 - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_disjunction_unions_and_sums() {
        let a = Box::new(VecScorer::new(vec![(1, 1.0), (3, 1.0)]));
        let b = Box::new(VecScorer::new(vec![(2, 2.0), (3, 2.0)]));
        let mut scorer = DisjunctionScorer::new(vec![a, b], 1).unwrap();
        let hits = drain(&mut scorer);
        assert_eq!(
            hits.iter().map(|&(d, _)| d).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!((hits[2].1 - 3.0).abs() < 1e-6, "scores sum on ties");
    }

    #[test]
    fn test_disjunction_min_should_match() {
        // docs: a={1,2,4}, b={2,3,4}, c={2,4,5}; msm=2 -> {2,4}
        let mut scorer = DisjunctionScorer::new(
            vec![vs(&[1, 2, 4]), vs(&[2, 3, 4]), vs(&[2, 4, 5])],
            2,
        )
        .unwrap();
        let hits: Vec<u32> = drain(&mut scorer).into_iter().map(|(d, _)| d).collect();
        assert_eq!(hits, vec![2, 4]);
    }

    #[test]
    fn test_disjunction_advance() {
        let mut scorer =
            DisjunctionScorer::new(vec![vs(&[1, 10, 20]), vs(&[5, 10, 30])], 1).unwrap();
        assert_eq!(scorer.advance(9).unwrap(), 10);
        assert_eq!(scorer.next_doc().unwrap(), 20);
        assert_eq!(scorer.next_doc().unwrap(), 30);
        assert_eq!(scorer.next_doc().unwrap(), NO_MORE_DOCS);
    }

    #[test]
    fn test_req_excl() {
        let req = vs(&[1, 2, 3, 4]);
        let excl = vs(&[2, 4]);
        let mut scorer = ReqExclScorer::new(req, excl);
        let hits: Vec<u32> = drain(&mut scorer).into_iter().map(|(d, _)| d).collect();
        assert_eq!(hits, vec![1, 3]);
    }

    #[test]
    fn test_req_opt_adds_optional() {
        let req = Box::new(VecScorer::new(vec![(1, 1.0), (5, 1.0)]));
        let opt = Box::new(VecScorer::new(vec![(5, 4.0), (9, 4.0)]));
        let mut scorer = ReqOptSumScorer::new(req, opt);
        let hits = drain(&mut scorer);
        assert_eq!(hits.iter().map(|&(d, _)| d).collect::<Vec<_>>(), vec![1, 5]);
        assert!((hits[0].1 - 1.0).abs() < 1e-6);
        assert!((hits[1].1 - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_match_all_and_bitset() {
        let mut all = MatchAllScorer::new(3, 1.0);
        assert_eq!(drain(&mut all).len(), 3);

        let mut bits = FixedBitSet::new(10);
        bits.set(2);
        bits.set(7);
        let mut scorer = BitSetScorer::new(bits, 0.5);
        let hits = drain(&mut scorer);
        assert_eq!(hits.iter().map(|&(d, _)| d).collect::<Vec<_>>(), vec![2, 7]);
        assert!((hits[0].1 - 0.5).abs() < 1e-6);
    }
}

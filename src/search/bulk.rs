//! Bulk scorers: push-style evaluation over doc windows.
//!
//! Where scorers are pull iterators, bulk scorers drive a collector over a
//! `[min, max)` range, which lets dense disjunctions batch their work: the
//! window-based [`BooleanScorer`] accumulates partial scores and match
//! counts in a bucket array per 2048-doc window instead of re-heapifying
//! per document.

use crate::error::Result;
use crate::index::live_docs::FixedBitSet;
use crate::postings::NO_MORE_DOCS;
use crate::search::collector::LeafCollector;
use crate::search::scorer::{Scorer, UNSTARTED};

/// Window width of the boolean bulk scorer.
pub const WINDOW_SIZE: u32 = 2048;

/// Push-style scorer over doc ranges.
pub trait BulkScorer: Send {
    /// Score every match in `[min, max)`, pushing hits into `collector`
    /// (skipping deleted docs), and return the first doc at or beyond `max`
    /// still to be scored, or [`NO_MORE_DOCS`].
    fn score_range(
        &mut self,
        collector: &mut dyn LeafCollector,
        live_docs: Option<&FixedBitSet>,
        min: u32,
        max: u32,
    ) -> Result<u32>;

    /// Upper bound on the number of matches.
    fn cost(&self) -> u64;
}

/// Wraps a pull scorer into the push interface.
pub struct DefaultBulkScorer {
    scorer: Box<dyn Scorer>,
}

impl DefaultBulkScorer {
    /// New wrapper around `scorer`.
    pub fn new(scorer: Box<dyn Scorer>) -> Self {
        DefaultBulkScorer { scorer }
    }
}

impl BulkScorer for DefaultBulkScorer {
    fn score_range(
        &mut self,
        collector: &mut dyn LeafCollector,
        live_docs: Option<&FixedBitSet>,
        min: u32,
        max: u32,
    ) -> Result<u32> {
        let mut doc = self.scorer.doc_id();
        if doc == UNSTARTED || doc < min {
            doc = self.scorer.advance(min)?;
        }
        while doc < max {
            if live_docs.map_or(true, |l| l.get(doc)) {
                let score = self.scorer.score()?;
                collector.collect(doc, score)?;
                if let Some(min_score) = collector.min_competitive_score() {
                    self.scorer.set_min_competitive_score(min_score);
                }
            }
            doc = self.scorer.next_doc()?;
        }
        Ok(doc)
    }

    fn cost(&self) -> u64 {
        self.scorer.cost()
    }
}

/// Window-based disjunction bulk scorer.
///
/// Each 2048-doc window accumulates per-bucket score sums and match counts
/// across all sub-scorers, then replays the buckets in doc order emitting
/// the docs whose match count reaches `min_should_match`.
pub struct BooleanScorer {
    subs: Vec<Box<dyn Scorer>>,
    min_should_match: usize,
    buckets_score: Vec<f64>,
    buckets_count: Vec<u32>,
    cost: u64,
}

impl BooleanScorer {
    /// New window scorer over optional clauses.
    pub fn new(subs: Vec<Box<dyn Scorer>>, min_should_match: usize) -> Self {
        let cost = subs.iter().map(|s| s.cost()).sum();
        BooleanScorer {
            subs,
            min_should_match: min_should_match.max(1),
            buckets_score: vec![0.0; WINDOW_SIZE as usize],
            buckets_count: vec![0; WINDOW_SIZE as usize],
            cost,
        }
    }
}

impl BulkScorer for BooleanScorer {
    fn score_range(
        &mut self,
        collector: &mut dyn LeafCollector,
        live_docs: Option<&FixedBitSet>,
        min: u32,
        max: u32,
    ) -> Result<u32> {
        let mut window_min = min;
        while window_min < max {
            let window_max = window_min.saturating_add(WINDOW_SIZE).min(max);
            for bucket in self.buckets_score.iter_mut() {
                *bucket = 0.0;
            }
            for bucket in self.buckets_count.iter_mut() {
                *bucket = 0;
            }

            let mut next_beyond = NO_MORE_DOCS;
            for sub in &mut self.subs {
                let mut doc = sub.doc_id();
                if doc == UNSTARTED || doc < window_min {
                    doc = sub.advance(window_min)?;
                }
                while doc < window_max {
                    let bucket = (doc - window_min) as usize;
                    self.buckets_score[bucket] += sub.score()? as f64;
                    self.buckets_count[bucket] += 1;
                    doc = sub.next_doc()?;
                }
                next_beyond = next_beyond.min(doc);
            }

            for bucket in 0..(window_max - window_min) as usize {
                if self.buckets_count[bucket] as usize >= self.min_should_match {
                    let doc = window_min + bucket as u32;
                    if live_docs.map_or(true, |l| l.get(doc)) {
                        collector.collect(doc, self.buckets_score[bucket] as f32)?;
                    }
                }
            }

            if next_beyond >= max {
                return Ok(next_beyond);
            }
            // jump straight to the next window with any candidate
            window_min = next_beyond.max(window_max);
        }
        Ok(NO_MORE_DOCS)
    }

    fn cost(&self) -> u64 {
        self.cost
    }
}

/// Applies a prohibited iterator on top of a positive bulk scorer.
pub struct ReqExclBulkScorer {
    positive: Box<dyn BulkScorer>,
    prohibited: Box<dyn Scorer>,
}

impl ReqExclBulkScorer {
    /// New excluding wrapper.
    pub fn new(positive: Box<dyn BulkScorer>, prohibited: Box<dyn Scorer>) -> Self {
        ReqExclBulkScorer {
            positive,
            prohibited,
        }
    }
}

struct ExcludingCollector<'a> {
    inner: &'a mut dyn LeafCollector,
    prohibited: &'a mut dyn Scorer,
}

impl LeafCollector for ExcludingCollector<'_> {
    fn collect(&mut self, doc: u32, score: f32) -> Result<()> {
        let mut excl = self.prohibited.doc_id();
        if excl == UNSTARTED || excl < doc {
            excl = self.prohibited.advance(doc)?;
        }
        if excl != doc {
            self.inner.collect(doc, score)?;
        }
        Ok(())
    }

    fn min_competitive_score(&self) -> Option<f32> {
        self.inner.min_competitive_score()
    }
}

impl BulkScorer for ReqExclBulkScorer {
    fn score_range(
        &mut self,
        collector: &mut dyn LeafCollector,
        live_docs: Option<&FixedBitSet>,
        min: u32,
        max: u32,
    ) -> Result<u32> {
        let mut excluding = ExcludingCollector {
            inner: collector,
            prohibited: self.prohibited.as_mut(),
        };
        self.positive.score_range(&mut excluding, live_docs, min, max)
    }

    fn cost(&self) -> u64 {
        self.positive.cost()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::collector::{CountCollector, LeafCollector};
    use crate::search::scorer::VecScorer;

    struct CollectAll {
        hits: Vec<(u32, f32)>,
    }

    impl LeafCollector for CollectAll {
        fn collect(&mut self, doc: u32, score: f32) -> Result<()> {
            self.hits.push((doc, score));
            Ok(())
        }
    }

    fn vec_scorer(docs: &[(u32, f32)]) -> Box<dyn Scorer> {
        Box::new(VecScorer::new(docs.to_vec()))
    }

    #[test]
    fn test_default_bulk_scorer_ranges() {
        let scorer = vec_scorer(&[(1, 1.0), (5, 1.0), (100, 1.0)]);
        let mut bulk = DefaultBulkScorer::new(scorer);
        let mut collector = CollectAll { hits: Vec::new() };
        let next = bulk.score_range(&mut collector, None, 0, 50).unwrap();
        assert_eq!(next, 100);
        assert_eq!(
            collector.hits.iter().map(|&(d, _)| d).collect::<Vec<_>>(),
            vec![1, 5]
        );
        bulk.score_range(&mut collector, None, next, NO_MORE_DOCS)
            .unwrap();
        assert_eq!(collector.hits.len(), 3);
    }

    #[test]
    fn test_default_bulk_scorer_live_docs() {
        let scorer = vec_scorer(&[(0, 1.0), (1, 1.0), (2, 1.0)]);
        let mut bulk = DefaultBulkScorer::new(scorer);
        let mut live = FixedBitSet::full(3);
        live.clear(1);
        let mut collector = CountCollector::default();
        bulk.score_range(&mut collector, Some(&live), 0, NO_MORE_DOCS)
            .unwrap();
        assert_eq!(collector.count, 2);
    }

    #[test]
    fn test_boolean_scorer_window_sums() {
        let a = vec_scorer(&[(10, 1.0), (3000, 1.0)]);
        let b = vec_scorer(&[(10, 2.0), (2100, 2.0)]);
        let mut bulk = BooleanScorer::new(vec![a, b], 1);
        let mut collector = CollectAll { hits: Vec::new() };
        bulk.score_range(&mut collector, None, 0, NO_MORE_DOCS)
            .unwrap();
        assert_eq!(
            collector.hits.iter().map(|&(d, _)| d).collect::<Vec<_>>(),
            vec![10, 2100, 3000]
        );
        assert!((collector.hits[0].1 - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_boolean_scorer_min_should_match() {
        let a = vec_scorer(&[(1, 1.0), (2, 1.0)]);
        let b = vec_scorer(&[(2, 1.0), (3, 1.0)]);
        let c = vec_scorer(&[(2, 1.0), (3, 1.0)]);
        let mut bulk = BooleanScorer::new(vec![a, b, c], 2);
        let mut collector = CollectAll { hits: Vec::new() };
        bulk.score_range(&mut collector, None, 0, NO_MORE_DOCS)
            .unwrap();
        assert_eq!(
            collector.hits.iter().map(|&(d, _)| d).collect::<Vec<_>>(),
            vec![2, 3]
        );
    }

    #[test]
    fn test_req_excl_bulk() {
        let positive = Box::new(DefaultBulkScorer::new(vec_scorer(&[
            (1, 1.0),
            (2, 1.0),
            (3, 1.0),
            (4, 1.0),
        ])));
        let prohibited = vec_scorer(&[(2, 1.0), (4, 1.0)]);
        let mut bulk = ReqExclBulkScorer::new(positive, prohibited);
        let mut collector = CollectAll { hits: Vec::new() };
        bulk.score_range(&mut collector, None, 0, NO_MORE_DOCS)
            .unwrap();
        assert_eq!(
            collector.hits.iter().map(|&(d, _)| d).collect::<Vec<_>>(),
            vec![1, 3]
        );
    }
}

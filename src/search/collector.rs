//! Hit collection: top-k heaps and count collectors.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One hit: a global doc id and its score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreDoc {
    /// Global doc id (segment doc id plus the leaf's doc base).
    pub doc: u32,
    /// BM25 score.
    pub score: f32,
}

/// The result of a top-k search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopDocs {
    /// Total number of matching documents.
    pub total_hits: u64,
    /// The best hits, by descending score then ascending doc id.
    pub score_docs: Vec<ScoreDoc>,
}

impl TopDocs {
    /// Merge per-leaf results into one ranked list of at most `k` hits.
    pub fn merge(k: usize, parts: Vec<TopDocs>) -> TopDocs {
        let total_hits = parts.iter().map(|p| p.total_hits).sum();
        let mut all: Vec<ScoreDoc> = parts.into_iter().flat_map(|p| p.score_docs).collect();
        all.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a.doc.cmp(&b.doc))
        });
        all.truncate(k);
        TopDocs {
            total_hits,
            score_docs: all,
        }
    }
}

/// Receives the hits of one segment leaf.
pub trait LeafCollector {
    /// Collect one matching doc (segment-local id).
    fn collect(&mut self, doc: u32, score: f32) -> Result<()>;

    /// The lowest score that can still enter the result, used by scorers to
    /// prune; `None` until the collector has a full buffer.
    fn min_competitive_score(&self) -> Option<f32> {
        None
    }
}

/// Min-heap entry ordered worst-first, so the root is the weakest hit.
#[derive(Debug, Clone, Copy, PartialEq)]
struct HeapEntry {
    score: f32,
    doc: u32,
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: invert so the weakest hit is on top.
        // A worse hit = lower score, or equal score with a larger doc.
        other
            .score
            .partial_cmp(&self.score)
            .unwrap_or(Ordering::Equal)
            .then(self.doc.cmp(&other.doc))
    }
}

/// Collects the top `k` hits of one leaf by score.
pub struct TopDocsLeafCollector {
    k: usize,
    doc_base: u32,
    heap: BinaryHeap<HeapEntry>,
    total_hits: u64,
}

impl TopDocsLeafCollector {
    /// New collector for one leaf.
    pub fn new(k: usize, doc_base: u32) -> Self {
        TopDocsLeafCollector {
            k,
            doc_base,
            heap: BinaryHeap::with_capacity(k + 1),
            total_hits: 0,
        }
    }

    /// Finish the leaf, returning its ranked hits.
    pub fn into_top_docs(self) -> TopDocs {
        let mut hits: Vec<ScoreDoc> = self
            .heap
            .into_iter()
            .map(|e| ScoreDoc {
                doc: e.doc,
                score: e.score,
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a.doc.cmp(&b.doc))
        });
        TopDocs {
            total_hits: self.total_hits,
            score_docs: hits,
        }
    }
}

impl LeafCollector for TopDocsLeafCollector {
    fn collect(&mut self, doc: u32, score: f32) -> Result<()> {
        self.total_hits += 1;
        let entry = HeapEntry {
            score,
            doc: doc + self.doc_base,
        };
        if self.heap.len() < self.k {
            self.heap.push(entry);
        } else if let Some(worst) = self.heap.peek() {
            if entry.cmp(worst) == Ordering::Greater {
                self.heap.pop();
                self.heap.push(entry);
            }
        }
        Ok(())
    }

    fn min_competitive_score(&self) -> Option<f32> {
        if self.heap.len() >= self.k {
            self.heap.peek().map(|e| e.score)
        } else {
            None
        }
    }
}

/// Counts matches without keeping them.
#[derive(Debug, Default)]
pub struct CountCollector {
    /// Number of hits seen.
    pub count: u64,
}

impl LeafCollector for CountCollector {
    fn collect(&mut self, _doc: u32, _score: f32) -> Result<()> {
        self.count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_k_keeps_best() {
        let mut collector = TopDocsLeafCollector::new(2, 0);
        for (doc, score) in [(0u32, 1.0f32), (1, 5.0), (2, 3.0), (3, 0.5)] {
            collector.collect(doc, score).unwrap();
        }
        let top = collector.into_top_docs();
        assert_eq!(top.total_hits, 4);
        assert_eq!(top.score_docs.len(), 2);
        assert_eq!(top.score_docs[0].doc, 1);
        assert_eq!(top.score_docs[1].doc, 2);
    }

    #[test]
    fn test_ties_break_by_doc() {
        let mut collector = TopDocsLeafCollector::new(2, 0);
        for doc in [5u32, 1, 9] {
            collector.collect(doc, 2.0).unwrap();
        }
        let top = collector.into_top_docs();
        assert_eq!(top.score_docs[0].doc, 1);
        assert_eq!(top.score_docs[1].doc, 5);
    }

    #[test]
    fn test_min_competitive_appears_when_full() {
        let mut collector = TopDocsLeafCollector::new(2, 0);
        assert_eq!(collector.min_competitive_score(), None);
        collector.collect(0, 3.0).unwrap();
        collector.collect(1, 1.0).unwrap();
        assert_eq!(collector.min_competitive_score(), Some(1.0));
        collector.collect(2, 2.0).unwrap();
        assert_eq!(collector.min_competitive_score(), Some(2.0));
    }

    #[test]
    fn test_doc_base_applied() {
        let mut collector = TopDocsLeafCollector::new(1, 100);
        collector.collect(7, 1.0).unwrap();
        let top = collector.into_top_docs();
        assert_eq!(top.score_docs[0].doc, 107);
    }

    #[test]
    fn test_merge() {
        let a = TopDocs {
            total_hits: 3,
            score_docs: vec![
                ScoreDoc { doc: 0, score: 3.0 },
                ScoreDoc { doc: 2, score: 1.0 },
            ],
        };
        let b = TopDocs {
            total_hits: 2,
            score_docs: vec![ScoreDoc { doc: 10, score: 2.0 }],
        };
        let merged = TopDocs::merge(2, vec![a, b]);
        assert_eq!(merged.total_hits, 5);
        assert_eq!(merged.score_docs.len(), 2);
        assert_eq!(merged.score_docs[0].doc, 0);
        assert_eq!(merged.score_docs[1].doc, 10);
    }
}

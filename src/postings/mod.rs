//! Block postings with multi-level skip lists and impacts.
//!
//! Each term's documents are encoded in blocks of [`BLOCK_SIZE`] deltas
//! packed at the block's own bit width; a shorter tail is VByte-encoded.
//! Every block boundary feeds the skip writer, which maintains a pyramid of
//! skip entries (one per block at level 0, one per [`SKIP_MULTIPLIER`]
//! level-0 entries at level 1, and so on) carrying the block's file
//! pointers and the competitive `(freq, norm)` impacts used for top-k
//! pruning.

pub mod reader;
pub mod skip;
pub mod writer;

use crate::error::Result;

/// Number of postings per packed block.
pub const BLOCK_SIZE: usize = 128;

/// Level-0 skip granularity: one entry per block.
pub const SKIP_INTERVAL: u32 = BLOCK_SIZE as u32;

/// Entries per level that roll up into the next level.
pub const SKIP_MULTIPLIER: u32 = 8;

/// Upper bound on skip levels.
pub const MAX_SKIP_LEVELS: usize = 10;

/// Sentinel terminating every doc iterator.
pub const NO_MORE_DOCS: u32 = i32::MAX as u32;

/// Per-term postings metadata recorded in the terms dictionary.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TermMeta {
    /// Number of documents containing the term.
    pub doc_freq: u32,
    /// Total occurrences of the term across documents.
    pub total_term_freq: u64,
    /// Start of the term's doc blocks in the `.doc` file.
    pub doc_start_fp: u64,
    /// Start of the term's positions in the `.pos` file, if positions are
    /// indexed.
    pub pos_start_fp: u64,
    /// Start of the term's offsets/payloads in the `.pay` file, if present.
    pub pay_start_fp: u64,
    /// Offset of the skip data relative to `doc_start_fp`, when the term
    /// spans more than one block.
    pub skip_offset: Option<u64>,
}

/// A `(freq, norm)` pair bounding the best score a block can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Impact {
    /// Largest term frequency with this norm.
    pub freq: u32,
    /// One-byte quantized field length.
    pub norm: u8,
}

/// Accumulates the Pareto-optimal set of `(freq, norm)` pairs in a block.
///
/// A pair is competitive unless another pair has at least its frequency and
/// at most its norm; dominated pairs can never win a BM25 comparison.
#[derive(Debug, Clone, Default)]
pub struct CompetitiveImpactAccumulator {
    impacts: Vec<Impact>,
}

impl CompetitiveImpactAccumulator {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        CompetitiveImpactAccumulator::default()
    }

    /// Record one document's `(freq, norm)`.
    pub fn add(&mut self, freq: u32, norm: u8) {
        for existing in &self.impacts {
            if existing.freq >= freq && existing.norm <= norm {
                return;
            }
        }
        self.impacts
            .retain(|other| !(freq >= other.freq && norm <= other.norm));
        self.impacts.push(Impact { freq, norm });
    }

    /// Merge another accumulator into this one.
    pub fn add_all(&mut self, other: &CompetitiveImpactAccumulator) {
        for impact in &other.impacts {
            self.add(impact.freq, impact.norm);
        }
    }

    /// Drop all recorded impacts.
    pub fn clear(&mut self) {
        self.impacts.clear();
    }

    /// The competitive pairs, sorted by increasing frequency.
    pub fn competitive_impacts(&self) -> Vec<Impact> {
        let mut impacts = self.impacts.clone();
        impacts.sort_by_key(|i| (i.freq, i.norm));
        impacts
    }
}

/// Pull iterator over one term's postings.
///
/// Doc IDs are strictly increasing and never revisited;
/// [`NO_MORE_DOCS`] terminates the stream. Position, offset and payload
/// accessors are only valid between `next_position` calls bounded by
/// `freq()`.
pub trait PostingsIterator: Send {
    /// The current document, [`NO_MORE_DOCS`] when exhausted.
    fn doc_id(&self) -> u32;

    /// Advance to the next document.
    fn next_doc(&mut self) -> Result<u32>;

    /// Advance to the first document `>= target`.
    fn advance(&mut self, target: u32) -> Result<u32>;

    /// Term frequency within the current document.
    fn freq(&self) -> u32;

    /// Next position of the term in the current document.
    fn next_position(&mut self) -> Result<u32> {
        Ok(0)
    }

    /// Start offset of the position last returned, if offsets are indexed.
    fn start_offset(&self) -> Option<u32> {
        None
    }

    /// End offset of the position last returned, if offsets are indexed.
    fn end_offset(&self) -> Option<u32> {
        None
    }

    /// Payload of the position last returned, if payloads are indexed.
    fn payload(&self) -> Option<&[u8]> {
        None
    }

    /// Upper bound on the number of documents this iterator may return
    /// (the term's doc frequency).
    fn cost(&self) -> u64;

    /// Competitive impacts for the smallest indexed block span containing
    /// the current document at the given skip level.
    fn impacts(&self, _level: usize) -> Vec<Impact> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_competitive_impacts_prune_dominated() {
        let mut acc = CompetitiveImpactAccumulator::new();
        acc.add(3, 10);
        acc.add(5, 10); // dominates (3, 10)
        acc.add(2, 4); // survives: lower norm
        acc.add(1, 20); // dominated by (5, 10)
        let impacts = acc.competitive_impacts();
        assert_eq!(
            impacts,
            vec![Impact { freq: 2, norm: 4 }, Impact { freq: 5, norm: 10 }]
        );
    }

    #[test]
    fn test_competitive_impacts_merge() {
        let mut a = CompetitiveImpactAccumulator::new();
        a.add(4, 8);
        let mut b = CompetitiveImpactAccumulator::new();
        b.add(6, 8);
        b.add(2, 2);
        a.add_all(&b);
        assert_eq!(
            a.competitive_impacts(),
            vec![Impact { freq: 2, norm: 2 }, Impact { freq: 6, norm: 8 }]
        );
    }

    #[test]
    fn test_duplicate_add_is_stable() {
        let mut acc = CompetitiveImpactAccumulator::new();
        acc.add(3, 7);
        acc.add(3, 7);
        assert_eq!(acc.competitive_impacts().len(), 1);
    }
}

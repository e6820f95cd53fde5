//! BM25 similarity.
//!
//! Fixed parameters `k1 = 1.2`, `b = 0.75`. Document length enters through
//! the one-byte norm; the per-norm part of the denominator is precomputed
//! into a 256-entry table per term weight.

use crate::util::byte4_to_int;

/// BM25 with fixed parameters.
#[derive(Debug, Clone, Copy)]
pub struct Bm25Similarity {
    /// Term-frequency saturation.
    pub k1: f32,
    /// Length normalization strength.
    pub b: f32,
}

impl Default for Bm25Similarity {
    fn default() -> Self {
        Bm25Similarity { k1: 1.2, b: 0.75 }
    }
}

impl Bm25Similarity {
    /// Inverse document frequency of one term.
    pub fn idf(doc_freq: u64, doc_count: u64) -> f32 {
        let doc_freq = doc_freq as f64;
        let doc_count = doc_count as f64;
        (1.0 + (doc_count - doc_freq + 0.5) / (doc_freq + 0.5)).ln() as f32
    }

    /// Build the per-term scorer.
    pub fn scorer(&self, boost: f32, idf: f32, avg_field_length: f32) -> Bm25Scorer {
        let mut norm_cache = [0f32; 256];
        for (byte, slot) in norm_cache.iter_mut().enumerate() {
            let length = byte4_to_int(byte as u8) as f32;
            *slot = self.k1 * (1.0 - self.b + self.b * length / avg_field_length.max(1.0));
        }
        Bm25Scorer {
            weight: boost * idf,
            norm_cache,
        }
    }
}

/// Scores one term's occurrences.
#[derive(Debug, Clone)]
pub struct Bm25Scorer {
    weight: f32,
    norm_cache: [f32; 256],
}

impl Bm25Scorer {
    /// Score a document given its term frequency and norm byte.
    pub fn score(&self, freq: u32, norm: u8) -> f32 {
        let freq = freq as f32;
        self.weight * freq / (freq + self.norm_cache[norm as usize])
    }

    /// Upper bound over any document with the given impact.
    pub fn score_upper_bound(&self, freq: u32, norm: u8) -> f32 {
        self.score(freq, norm)
    }

    /// Upper bound over all documents: the saturation limit.
    pub fn max_score(&self) -> f32 {
        self.weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idf_decreases_with_doc_freq() {
        let rare = Bm25Similarity::idf(1, 1000);
        let common = Bm25Similarity::idf(900, 1000);
        assert!(rare > common);
        assert!(common > 0.0);
    }

    #[test]
    fn test_score_increases_with_freq() {
        let sim = Bm25Similarity::default();
        let scorer = sim.scorer(1.0, 2.0, 10.0);
        let s1 = scorer.score(1, 10);
        let s3 = scorer.score(3, 10);
        let s30 = scorer.score(30, 10);
        assert!(s1 < s3);
        assert!(s3 < s30);
        // and saturates below the limit
        assert!(s30 < scorer.max_score());
    }

    #[test]
    fn test_longer_docs_score_lower() {
        let sim = Bm25Similarity::default();
        let scorer = sim.scorer(1.0, 2.0, 10.0);
        let short_norm = crate::util::int_to_byte4(3);
        let long_norm = crate::util::int_to_byte4(300);
        assert!(scorer.score(2, short_norm) > scorer.score(2, long_norm));
    }

    #[test]
    fn test_boost_scales_linearly() {
        let sim = Bm25Similarity::default();
        let base = sim.scorer(1.0, 2.0, 10.0);
        let boosted = sim.scorer(2.0, 2.0, 10.0);
        let s = base.score(4, 20);
        assert!((boosted.score(4, 20) - 2.0 * s).abs() < 1e-6);
    }
}

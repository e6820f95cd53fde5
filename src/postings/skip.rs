//! Multi-level skip list writer and reader.
//!
//! The writer keeps one growing buffer per level. Every block boundary
//! produces a level-0 entry; every [`SKIP_MULTIPLIER`]-th entry of level L
//! also produces an entry at level L+1. An entry stores the block's last
//! doc, the file pointers needed to resume decoding after it, and the
//! competitive impacts accumulated since the previous entry at that level;
//! entries above level 0 append a child pointer into the level below.
//! Levels are finally concatenated highest first, each preceded by its
//! length.

use crate::error::{FalxError, Result};
use crate::postings::{
    CompetitiveImpactAccumulator, Impact, MAX_SKIP_LEVELS, NO_MORE_DOCS, SKIP_INTERVAL,
    SKIP_MULTIPLIER,
};
use crate::storage::structured::StructWriter;
use crate::storage::StorageOutput;
use crate::util::log;
use crate::util::varint::encode_u64;

fn push_vlong(buf: &mut Vec<u8>, value: u64) {
    buf.extend_from_slice(&encode_u64(value));
}

fn read_vlong_at(buf: &[u8], pos: &mut usize) -> Result<u64> {
    let mut result = 0u64;
    let mut shift = 0u32;
    loop {
        let byte = *buf
            .get(*pos)
            .ok_or_else(|| FalxError::corrupt("skip data truncated"))?;
        *pos += 1;
        result |= ((byte & 0x7F) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
        if shift >= 64 {
            return Err(FalxError::corrupt("skip data VLong overflow"));
        }
    }
}

/// Number of levels a pyramid over `doc_count` docs can use.
fn levels_for(doc_count: u32) -> usize {
    if doc_count <= SKIP_INTERVAL {
        1
    } else {
        (1 + log(doc_count / SKIP_INTERVAL, SKIP_MULTIPLIER) as usize).min(MAX_SKIP_LEVELS)
    }
}

/// Buffers skip entries for one term and serializes the level pyramid.
#[derive(Debug)]
pub struct SkipWriter {
    num_levels: usize,
    level_buffers: Vec<Vec<u8>>,
    last_doc: Vec<u32>,
    last_doc_fp: Vec<u64>,
    last_pos_fp: Vec<u64>,
    last_pay_fp: Vec<u64>,
    impacts: Vec<CompetitiveImpactAccumulator>,
    has_pos: bool,
    has_pay: bool,
}

impl SkipWriter {
    /// Create a writer sized for a segment of `max_doc` documents.
    pub fn new(max_doc: u32, has_pos: bool, has_pay: bool) -> Self {
        let num_levels = levels_for(max_doc);
        SkipWriter {
            num_levels,
            level_buffers: vec![Vec::new(); num_levels],
            last_doc: vec![0; num_levels],
            last_doc_fp: vec![0; num_levels],
            last_pos_fp: vec![0; num_levels],
            last_pay_fp: vec![0; num_levels],
            impacts: vec![CompetitiveImpactAccumulator::new(); num_levels],
            has_pos,
            has_pay,
        }
    }

    /// Forget all buffered entries; called at the start of each term.
    pub fn reset(&mut self) {
        for level in 0..self.num_levels {
            self.level_buffers[level].clear();
            self.last_doc[level] = 0;
            self.last_doc_fp[level] = 0;
            self.last_pos_fp[level] = 0;
            self.last_pay_fp[level] = 0;
            self.impacts[level].clear();
        }
    }

    /// Record one finished block.
    ///
    /// `doc` is the last doc of the block, the file pointers name where the
    /// next block starts, `df` is the number of docs buffered so far (a
    /// multiple of the block size), and `block_impacts` are the impacts of
    /// the block just finished.
    pub fn buffer_skip(
        &mut self,
        doc: u32,
        doc_fp: u64,
        pos_fp: u64,
        pay_fp: u64,
        df: u32,
        block_impacts: &CompetitiveImpactAccumulator,
    ) -> Result<()> {
        if df % SKIP_INTERVAL != 0 {
            return Err(FalxError::invalid_argument(format!(
                "skip entries must land on block boundaries, got df {df}"
            )));
        }
        self.impacts[0].add_all(block_impacts);

        let mut entry_levels = 1usize;
        let mut d = df / SKIP_INTERVAL;
        while d % SKIP_MULTIPLIER == 0 && entry_levels < self.num_levels {
            entry_levels += 1;
            d /= SKIP_MULTIPLIER;
        }

        let mut child_pointer = 0u64;
        for level in 0..entry_levels {
            self.write_entry(level, doc, doc_fp, pos_fp, pay_fp);
            // an entry at this level summarizes everything below it
            if level + 1 < self.num_levels {
                let (lo, hi) = self.impacts.split_at_mut(level + 1);
                hi[0].add_all(&lo[level]);
            }
            self.impacts[level].clear();
            let new_child_pointer = self.level_buffers[level].len() as u64;
            if level != 0 {
                push_vlong(&mut self.level_buffers[level], child_pointer);
            }
            child_pointer = new_child_pointer;
        }
        Ok(())
    }

    fn write_entry(&mut self, level: usize, doc: u32, doc_fp: u64, pos_fp: u64, pay_fp: u64) {
        let buf = &mut self.level_buffers[level];
        push_vlong(buf, (doc - self.last_doc[level]) as u64);
        push_vlong(buf, doc_fp - self.last_doc_fp[level]);
        if self.has_pos {
            push_vlong(buf, pos_fp - self.last_pos_fp[level]);
        }
        if self.has_pay {
            push_vlong(buf, pay_fp - self.last_pay_fp[level]);
        }
        let impacts = self.impacts[level].competitive_impacts();
        push_vlong(buf, impacts.len() as u64);
        for impact in impacts {
            push_vlong(buf, impact.freq as u64);
            buf.push(impact.norm);
        }
        self.last_doc[level] = doc;
        self.last_doc_fp[level] = doc_fp;
        self.last_pos_fp[level] = pos_fp;
        self.last_pay_fp[level] = pay_fp;
    }

    /// Serialize the pyramid for a term that ended with `doc_freq` docs:
    /// exactly the levels such a term can populate, highest first, each
    /// preceded by its length. Returns the number of bytes written.
    pub fn write_skip<W: StorageOutput>(
        &self,
        writer: &mut StructWriter<W>,
        doc_freq: u32,
    ) -> Result<u64> {
        let start = writer.position();
        let levels = levels_for(doc_freq).min(self.num_levels);
        for level in (0..levels).rev() {
            writer.write_vlong(self.level_buffers[level].len() as u64)?;
            writer.write_raw(&self.level_buffers[level])?;
        }
        Ok(writer.position() - start)
    }
}

/// Walks a serialized skip pyramid to service `skip_to(target)`.
#[derive(Debug)]
pub struct SkipReader {
    levels: Vec<Vec<u8>>,
    pos: Vec<usize>,
    num_levels: usize,
    doc_count: u32,
    has_pos: bool,
    has_pay: bool,

    skip_doc: Vec<u32>,
    doc_fp: Vec<u64>,
    pos_fp: Vec<u64>,
    pay_fp: Vec<u64>,
    child_pointer: Vec<u64>,
    num_skipped: Vec<i64>,
    impacts: Vec<Vec<Impact>>,

    last_doc: u32,
    last_doc_fp: u64,
    last_pos_fp: u64,
    last_pay_fp: u64,
    last_child_pointer: u64,
}

impl SkipReader {
    /// Parse the serialized pyramid for a term of `doc_freq` docs, whose
    /// doc blocks start at the given file pointers.
    pub fn new(
        data: &[u8],
        doc_freq: u32,
        doc_start_fp: u64,
        pos_start_fp: u64,
        pay_start_fp: u64,
        has_pos: bool,
        has_pay: bool,
    ) -> Result<Self> {
        let num_levels = levels_for(doc_freq);
        let mut levels = vec![Vec::new(); num_levels];
        let mut cursor = 0usize;
        for level in (0..num_levels).rev() {
            let len = read_vlong_at(data, &mut cursor)? as usize;
            let end = cursor + len;
            if end > data.len() {
                return Err(FalxError::corrupt("skip level length past end of data"));
            }
            levels[level] = data[cursor..end].to_vec();
            cursor = end;
        }
        Self::from_levels(
            levels,
            doc_freq,
            doc_start_fp,
            pos_start_fp,
            pay_start_fp,
            has_pos,
            has_pay,
        )
    }

    /// Parse the pyramid straight out of the `.doc` stream positioned at
    /// the term's skip offset.
    pub fn read_from<R: crate::storage::StorageInput>(
        reader: &mut crate::storage::structured::StructReader<R>,
        doc_freq: u32,
        doc_start_fp: u64,
        pos_start_fp: u64,
        pay_start_fp: u64,
        has_pos: bool,
        has_pay: bool,
    ) -> Result<Self> {
        let num_levels = levels_for(doc_freq);
        let mut levels = vec![Vec::new(); num_levels];
        for level in (0..num_levels).rev() {
            let len = reader.read_vlong()? as usize;
            levels[level] = reader.read_raw(len)?;
        }
        Self::from_levels(
            levels,
            doc_freq,
            doc_start_fp,
            pos_start_fp,
            pay_start_fp,
            has_pos,
            has_pay,
        )
    }

    fn from_levels(
        levels: Vec<Vec<u8>>,
        doc_freq: u32,
        doc_start_fp: u64,
        pos_start_fp: u64,
        pay_start_fp: u64,
        has_pos: bool,
        has_pay: bool,
    ) -> Result<Self> {
        let num_levels = levels.len();
        Ok(SkipReader {
            levels,
            pos: vec![0; num_levels],
            num_levels,
            doc_count: doc_freq,
            has_pos,
            has_pay,
            skip_doc: vec![0; num_levels],
            doc_fp: vec![doc_start_fp; num_levels],
            pos_fp: vec![pos_start_fp; num_levels],
            pay_fp: vec![pay_start_fp; num_levels],
            child_pointer: vec![0; num_levels],
            num_skipped: vec![0; num_levels],
            impacts: vec![Vec::new(); num_levels],
            last_doc: 0,
            last_doc_fp: doc_start_fp,
            last_pos_fp: pos_start_fp,
            last_pay_fp: pay_start_fp,
            last_child_pointer: 0,
        })
    }

    fn interval_at(level: usize) -> i64 {
        SKIP_INTERVAL as i64 * (SKIP_MULTIPLIER as i64).pow(level as u32)
    }

    /// Skip to the last entry before `target`, returning the number of docs
    /// known to precede the resume point (`<= target - interval - 1`). The
    /// caller still consumes up to `target` through the block decoder.
    pub fn skip_to(&mut self, target: u32) -> Result<i64> {
        let mut level = 0usize;
        while level + 1 < self.num_levels && target > self.skip_doc[level + 1] {
            level += 1;
        }

        loop {
            if target > self.skip_doc[level] {
                self.load_next_skip(level)?;
            } else {
                if level == 0 {
                    break;
                }
                if self.last_child_pointer > self.pos[level - 1] as u64 {
                    self.seek_child(level - 1)?;
                }
                level -= 1;
            }
        }

        Ok(self.num_skipped[0] - SKIP_INTERVAL as i64 - 1)
    }

    fn load_next_skip(&mut self, level: usize) -> Result<bool> {
        self.set_last_skip_data(level);

        self.num_skipped[level] += Self::interval_at(level);
        if self.num_skipped[level] > self.doc_count as i64 {
            // this level is exhausted
            self.skip_doc[level] = NO_MORE_DOCS;
            return Ok(false);
        }

        let buf = &self.levels[level];
        let pos = &mut self.pos[level];
        self.skip_doc[level] += read_vlong_at(buf, pos)? as u32;
        self.doc_fp[level] += read_vlong_at(buf, pos)?;
        if self.has_pos {
            self.pos_fp[level] += read_vlong_at(buf, pos)?;
        }
        if self.has_pay {
            self.pay_fp[level] += read_vlong_at(buf, pos)?;
        }
        let impact_count = read_vlong_at(buf, pos)? as usize;
        let mut impacts = Vec::with_capacity(impact_count);
        for _ in 0..impact_count {
            let freq = read_vlong_at(buf, pos)? as u32;
            let norm = *buf
                .get(*pos)
                .ok_or_else(|| FalxError::corrupt("skip data truncated"))?;
            *pos += 1;
            impacts.push(Impact { freq, norm });
        }
        self.impacts[level] = impacts;
        if level != 0 {
            self.child_pointer[level] = read_vlong_at(buf, pos)?;
        }
        Ok(true)
    }

    fn seek_child(&mut self, level: usize) -> Result<()> {
        self.pos[level] = self.last_child_pointer as usize;
        self.num_skipped[level] = self.num_skipped[level + 1] - Self::interval_at(level + 1);
        self.skip_doc[level] = self.last_doc;
        self.doc_fp[level] = self.last_doc_fp;
        self.pos_fp[level] = self.last_pos_fp;
        self.pay_fp[level] = self.last_pay_fp;
        self.impacts[level] = self.impacts[level + 1].clone();
        if level > 0 {
            let buf = &self.levels[level];
            let pos = &mut self.pos[level];
            self.child_pointer[level] = read_vlong_at(buf, pos)?;
        }
        Ok(())
    }

    fn set_last_skip_data(&mut self, level: usize) {
        self.last_doc = self.skip_doc[level];
        self.last_doc_fp = self.doc_fp[level];
        self.last_pos_fp = self.pos_fp[level];
        self.last_pay_fp = self.pay_fp[level];
        self.last_child_pointer = self.child_pointer[level];
    }

    /// Doc id of the last skip entry at or before the target.
    pub fn doc(&self) -> u32 {
        self.last_doc
    }

    /// Doc id of the current level-0 entry: the last doc of the block the
    /// iterator is positioned in ([`NO_MORE_DOCS`] when level 0 is
    /// exhausted).
    pub fn next_entry_doc(&self) -> u32 {
        self.skip_doc[0]
    }

    /// `.doc` file pointer to resume decoding from.
    pub fn doc_fp(&self) -> u64 {
        self.last_doc_fp
    }

    /// `.pos` file pointer to resume decoding from.
    pub fn pos_fp(&self) -> u64 {
        self.last_pos_fp
    }

    /// `.pay` file pointer to resume decoding from.
    pub fn pay_fp(&self) -> u64 {
        self.last_pay_fp
    }

    /// Impacts of the current entry at `level` (empty when nothing was
    /// loaded yet).
    pub fn impacts(&self, level: usize) -> &[Impact] {
        if level < self.num_levels {
            &self.impacts[level]
        } else {
            &self.impacts[self.num_levels - 1]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postings::BLOCK_SIZE;

    /// Build skip data for a term matching every doc in `0..doc_count`.
    fn build_skip(doc_count: u32) -> (Vec<u8>, u32) {
        let mut writer = SkipWriter::new(doc_count, false, false);
        let mut impacts = CompetitiveImpactAccumulator::new();
        impacts.add(1, 1);
        let blocks = doc_count / SKIP_INTERVAL;
        for block in 0..blocks {
            let last_doc = (block + 1) * SKIP_INTERVAL - 1;
            let doc_fp = (block as u64 + 1) * 1000;
            writer
                .buffer_skip(last_doc, doc_fp, 0, 0, (block + 1) * SKIP_INTERVAL, &impacts)
                .unwrap();
        }

        use crate::storage::memory::MemoryStorage;
        use crate::storage::{MemoryStorageConfig, Storage};
        let storage = MemoryStorage::new(MemoryStorageConfig::default());
        {
            let out = storage.create_output("skip").unwrap();
            let mut sw = StructWriter::new(out);
            writer.write_skip(&mut sw, doc_count).unwrap();
            sw.close().unwrap();
        }
        let mut input = storage.open_input("skip").unwrap();
        let mut data = Vec::new();
        std::io::Read::read_to_end(&mut input, &mut data).unwrap();
        (data, doc_count)
    }

    #[test]
    fn test_skip_to_block_boundaries() {
        let (data, doc_count) = build_skip(10 * BLOCK_SIZE as u32);
        let mut reader = SkipReader::new(&data, doc_count, 0, 0, 0, false, false).unwrap();

        // target in the middle of block 4 (docs 512..639)
        let skipped = reader.skip_to(600).unwrap();
        // the entry before the target is the end of block 3; blocks 0..=3
        // (512 docs) are known to precede the resume point
        assert_eq!(reader.doc(), 4 * SKIP_INTERVAL - 1);
        assert_eq!(reader.doc_fp(), 4000);
        assert_eq!(skipped, 4 * SKIP_INTERVAL as i64 - 1);
    }

    #[test]
    fn test_skip_to_uses_higher_levels() {
        // 100 blocks: two skip levels (multiplier 8)
        let (data, doc_count) = build_skip(100 * BLOCK_SIZE as u32);
        let mut reader = SkipReader::new(&data, doc_count, 0, 0, 0, false, false).unwrap();

        let target = 90 * SKIP_INTERVAL + 5;
        reader.skip_to(target).unwrap();
        assert_eq!(reader.doc(), 90 * SKIP_INTERVAL - 1);
        assert_eq!(reader.doc_fp(), 90 * 1000);

        // moving forward again reuses the current levels
        let target2 = 95 * SKIP_INTERVAL + 5;
        reader.skip_to(target2).unwrap();
        assert_eq!(reader.doc(), 95 * SKIP_INTERVAL - 1);
    }

    #[test]
    fn test_skip_past_end_is_exhausted() {
        let (data, doc_count) = build_skip(4 * BLOCK_SIZE as u32);
        let mut reader = SkipReader::new(&data, doc_count, 0, 0, 0, false, false).unwrap();
        reader.skip_to(NO_MORE_DOCS - 1).unwrap();
        // all entries consumed; resume point is the last block boundary
        assert_eq!(reader.doc(), 4 * SKIP_INTERVAL - 1);
    }

    #[test]
    fn test_impacts_survive_levels() {
        let doc_count = 64 * BLOCK_SIZE as u32;
        let mut writer = SkipWriter::new(doc_count, false, false);
        for block in 0..64u32 {
            let mut impacts = CompetitiveImpactAccumulator::new();
            impacts.add(block + 1, 1);
            writer
                .buffer_skip(
                    (block + 1) * SKIP_INTERVAL - 1,
                    (block as u64 + 1) * 10,
                    0,
                    0,
                    (block + 1) * SKIP_INTERVAL,
                    &impacts,
                )
                .unwrap();
        }

        use crate::storage::memory::MemoryStorage;
        use crate::storage::{MemoryStorageConfig, Storage};
        let storage = MemoryStorage::new(MemoryStorageConfig::default());
        {
            let out = storage.create_output("skip").unwrap();
            let mut sw = StructWriter::new(out);
            writer.write_skip(&mut sw, doc_count).unwrap();
            sw.close().unwrap();
        }
        let mut input = storage.open_input("skip").unwrap();
        let mut data = Vec::new();
        std::io::Read::read_to_end(&mut input, &mut data).unwrap();

        let mut reader = SkipReader::new(&data, doc_count, 0, 0, 0, false, false).unwrap();
        reader.skip_to(10 * SKIP_INTERVAL + 1).unwrap();
        // level-0 impacts describe a single block
        let level0 = reader.impacts(0).to_vec();
        assert!(!level0.is_empty());
        // level-1 impacts summarize 8 blocks, so the max freq is at least
        // as large as level 0's
        let level1 = reader.impacts(1).to_vec();
        let max0 = level0.iter().map(|i| i.freq).max().unwrap();
        let max1 = level1.iter().map(|i| i.freq).max().unwrap_or(max0);
        assert!(max1 >= max0);
    }
}

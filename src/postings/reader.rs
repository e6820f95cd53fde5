//! Block postings iterator over the `.doc`, `.pos` and `.pay` streams.
//!
//! Decodes one 128-doc block at a time into flat buffers; `advance` consults
//! the skip pyramid only when the target is more than one block away, seeks
//! every stream to the block boundary the skip reader names, and finishes
//! with a linear scan inside the refilled block.

use crate::error::{FalxError, Result};
use crate::postings::skip::SkipReader;
use crate::postings::writer::PostingsFlags;
use crate::postings::{
    Impact, PostingsIterator, TermMeta, BLOCK_SIZE, NO_MORE_DOCS, SKIP_INTERVAL,
};
use crate::storage::structured::StructReader;
use crate::storage::StorageInput;
use crate::util::packed;

type In = StructReader<Box<dyn StorageInput>>;

/// Sentinel for an iterator that has not produced its first doc yet.
const UNSTARTED: u32 = u32::MAX;

/// Pull iterator over one term's postings.
pub struct BlockPostingsIterator {
    doc_in: In,
    pos_in: Option<In>,
    pay_in: Option<In>,
    meta: TermMeta,
    flags: PostingsFlags,

    docs: Vec<u32>,
    freqs: Vec<u32>,
    buffer_len: usize,
    next_idx: usize,
    cur: usize,
    docs_consumed: u32,
    accum: u32,
    doc: u32,

    pos_buffer: Vec<u32>,
    pos_doc_start: Vec<usize>,
    off_start_buf: Vec<u32>,
    off_end_buf: Vec<u32>,
    pay_ranges: Vec<(usize, usize)>,
    pay_bytes: Vec<u8>,
    pos_fetch: usize,
    pos_remaining: u32,
    cur_pos: usize,

    skip: Option<SkipReader>,
}

impl BlockPostingsIterator {
    /// Open an iterator for the term described by `meta`. `pos_in` and
    /// `pay_in` are passed only when the caller wants those features and
    /// the field records them.
    pub fn new(
        mut doc_in: In,
        mut pos_in: Option<In>,
        mut pay_in: Option<In>,
        meta: TermMeta,
        flags: PostingsFlags,
    ) -> Result<Self> {
        doc_in.seek(meta.doc_start_fp)?;
        if let Some(pos_in) = pos_in.as_mut() {
            pos_in.seek(meta.pos_start_fp)?;
        }
        if let Some(pay_in) = pay_in.as_mut() {
            pay_in.seek(meta.pay_start_fp)?;
        }
        Ok(BlockPostingsIterator {
            doc_in,
            pos_in,
            pay_in,
            meta,
            flags,
            docs: Vec::with_capacity(BLOCK_SIZE),
            freqs: Vec::with_capacity(BLOCK_SIZE),
            buffer_len: 0,
            next_idx: 0,
            cur: 0,
            docs_consumed: 0,
            accum: 0,
            doc: UNSTARTED,
            pos_buffer: Vec::new(),
            pos_doc_start: Vec::new(),
            off_start_buf: Vec::new(),
            off_end_buf: Vec::new(),
            pay_ranges: Vec::new(),
            pay_bytes: Vec::new(),
            pos_fetch: 0,
            pos_remaining: 0,
            cur_pos: 0,
            skip: None,
        })
    }

    fn read_packed_stream(input: &mut In, total: usize) -> Result<Vec<u32>> {
        let mut out = Vec::with_capacity(total);
        let mut left = total;
        while left > 0 {
            if left >= BLOCK_SIZE {
                let width = input.read_u8()? as u32;
                if !(1..=32).contains(&width) {
                    return Err(FalxError::corrupt(format!("bad packed width {width}")));
                }
                let bytes = input.read_raw(packed::packed_len(BLOCK_SIZE, width))?;
                out.extend(packed::unpack(&bytes, BLOCK_SIZE, width));
                left -= BLOCK_SIZE;
            } else {
                for _ in 0..left {
                    out.push(input.read_vint()?);
                }
                left = 0;
            }
        }
        Ok(out)
    }

    /// Decode the next block (or tail) of docs, and its positions, offsets
    /// and payloads when requested.
    fn refill(&mut self) -> Result<bool> {
        let remaining = self.meta.doc_freq - self.docs_consumed;
        if remaining == 0 {
            return Ok(false);
        }
        let n = (remaining as usize).min(BLOCK_SIZE);
        let full = n == BLOCK_SIZE;

        let deltas = if full {
            let width = self.doc_in.read_u8()? as u32;
            if !(1..=32).contains(&width) {
                return Err(FalxError::corrupt(format!("bad doc block width {width}")));
            }
            let bytes = self.doc_in.read_raw(packed::packed_len(BLOCK_SIZE, width))?;
            packed::unpack(&bytes, BLOCK_SIZE, width)
        } else {
            let mut deltas = Vec::with_capacity(n);
            let mut freqs = Vec::with_capacity(n);
            for _ in 0..n {
                deltas.push(self.doc_in.read_vint()?);
                if self.flags.has_freqs {
                    freqs.push(self.doc_in.read_vint()?);
                }
            }
            self.freqs = freqs;
            deltas
        };
        if full && self.flags.has_freqs {
            let width = self.doc_in.read_u8()? as u32;
            if !(1..=32).contains(&width) {
                return Err(FalxError::corrupt(format!("bad freq block width {width}")));
            }
            let bytes = self.doc_in.read_raw(packed::packed_len(BLOCK_SIZE, width))?;
            self.freqs = packed::unpack(&bytes, BLOCK_SIZE, width);
        }

        self.docs.clear();
        let mut prev = self.accum;
        for &delta in &deltas {
            prev += delta;
            if prev >= NO_MORE_DOCS {
                return Err(FalxError::corrupt("doc id overflows the sentinel"));
            }
            self.docs.push(prev);
        }

        if self.pos_in.is_some() {
            self.refill_positions(n)?;
        }

        self.accum = self.docs[n - 1];
        self.docs_consumed += n as u32;
        self.buffer_len = n;
        self.next_idx = 0;
        Ok(true)
    }

    fn refill_positions(&mut self, n: usize) -> Result<()> {
        let total: usize = self.freqs[..n].iter().map(|&f| f as usize).sum();

        self.pos_doc_start.clear();
        let mut acc = 0usize;
        for &f in &self.freqs[..n] {
            self.pos_doc_start.push(acc);
            acc += f as usize;
        }

        let pos_in = self.pos_in.as_mut().ok_or_else(|| {
            FalxError::invalid_argument("positions requested but no .pos stream")
        })?;
        let deltas = Self::read_packed_stream(pos_in, total)?;
        self.pos_buffer.clear();
        for (i, &f) in self.freqs[..n].iter().enumerate() {
            let start = self.pos_doc_start[i];
            let mut prev = 0u32;
            for j in 0..f as usize {
                prev += deltas[start + j];
                self.pos_buffer.push(prev);
            }
        }

        if let Some(pay_in) = self.pay_in.as_mut() {
            if self.flags.has_offsets {
                let start_deltas = Self::read_packed_stream(pay_in, total)?;
                let lens = Self::read_packed_stream(pay_in, total)?;
                self.off_start_buf.clear();
                self.off_end_buf.clear();
                for (i, &f) in self.freqs[..n].iter().enumerate() {
                    let start = self.pos_doc_start[i];
                    let mut prev = 0u32;
                    for j in 0..f as usize {
                        prev += start_deltas[start + j];
                        self.off_start_buf.push(prev);
                        self.off_end_buf.push(prev + lens[start + j]);
                    }
                }
            }
            if self.flags.has_payloads {
                let lens = Self::read_packed_stream(pay_in, total)?;
                let total_bytes: usize = lens.iter().map(|&l| l as usize).sum();
                self.pay_bytes = pay_in.read_raw(total_bytes)?;
                self.pay_ranges.clear();
                let mut at = 0usize;
                for &len in &lens {
                    self.pay_ranges.push((at, at + len as usize));
                    at += len as usize;
                }
            }
        }
        Ok(())
    }

    /// Lazily parse the term's skip pyramid out of the `.doc` stream.
    fn load_skip(&mut self) -> Result<()> {
        if self.skip.is_some() {
            return Ok(());
        }
        let offset = self
            .meta
            .skip_offset
            .ok_or_else(|| FalxError::invalid_argument("term has no skip data"))?;
        let mut skip_in = self.doc_in.clone_reader()?;
        skip_in.seek(self.meta.doc_start_fp + offset)?;
        self.skip = Some(SkipReader::read_from(
            &mut skip_in,
            self.meta.doc_freq,
            self.meta.doc_start_fp,
            self.meta.pos_start_fp,
            self.meta.pay_start_fp,
            self.flags.has_positions,
            self.flags.has_pay_file(),
        )?);
        Ok(())
    }

    /// Last doc of the block the iterator currently sits in, when the skip
    /// reader has been engaged and is still aligned with the position.
    /// `None` when no bound is known; never over-claims a span.
    pub fn block_bound(&self) -> Option<u32> {
        let skip = self.skip.as_ref()?;
        let bound = skip.next_entry_doc();
        if bound == NO_MORE_DOCS {
            // level 0 exhausted: only the unindexed tail remains
            return None;
        }
        if self.doc != NO_MORE_DOCS && (self.doc == UNSTARTED || self.doc <= bound) {
            Some(bound)
        } else {
            None
        }
    }

    fn set_current(&mut self) {
        let i = self.next_idx;
        self.doc = self.docs[i];
        self.cur = i;
        self.next_idx += 1;
        if self.pos_in.is_some() {
            self.pos_fetch = self.pos_doc_start[i];
            self.pos_remaining = self.freqs[i];
            self.cur_pos = self.pos_fetch;
        }
    }
}

impl PostingsIterator for BlockPostingsIterator {
    fn doc_id(&self) -> u32 {
        self.doc
    }

    fn next_doc(&mut self) -> Result<u32> {
        if self.doc == NO_MORE_DOCS {
            return Ok(NO_MORE_DOCS);
        }
        if self.next_idx >= self.buffer_len {
            if !self.refill()? {
                self.doc = NO_MORE_DOCS;
                return Ok(NO_MORE_DOCS);
            }
        }
        self.set_current();
        Ok(self.doc)
    }

    fn advance(&mut self, target: u32) -> Result<u32> {
        if self.doc == NO_MORE_DOCS {
            return Ok(NO_MORE_DOCS);
        }
        if self.doc != UNSTARTED && self.doc >= target {
            return Ok(self.doc);
        }

        let current = if self.doc == UNSTARTED { 0 } else { self.doc };
        if self.meta.skip_offset.is_some() && target.saturating_sub(current) > SKIP_INTERVAL {
            self.load_skip()?;
            let skip = self.skip.as_mut().ok_or_else(|| {
                FalxError::invalid_argument("skip reader missing after load")
            })?;
            let new_doc_upto = (skip.skip_to(target)? + 1) as u32;
            if new_doc_upto > self.docs_consumed {
                // jump every stream to the block boundary the skip named
                self.doc_in.seek(skip.doc_fp())?;
                let pos_fp = skip.pos_fp();
                let pay_fp = skip.pay_fp();
                let accum = skip.doc();
                if let Some(pos_in) = self.pos_in.as_mut() {
                    pos_in.seek(pos_fp)?;
                }
                if let Some(pay_in) = self.pay_in.as_mut() {
                    pay_in.seek(pay_fp)?;
                }
                self.accum = accum;
                self.docs_consumed = new_doc_upto;
                self.buffer_len = 0;
                self.next_idx = 0;
            }
        }

        loop {
            let doc = self.next_doc()?;
            if doc >= target {
                return Ok(doc);
            }
        }
    }

    fn freq(&self) -> u32 {
        if self.flags.has_freqs && self.cur < self.freqs.len() {
            self.freqs[self.cur]
        } else {
            1
        }
    }

    fn next_position(&mut self) -> Result<u32> {
        if self.pos_in.is_none() {
            return Ok(0);
        }
        if self.pos_remaining == 0 {
            return Err(FalxError::invalid_argument(
                "next_position past the doc's freq",
            ));
        }
        self.cur_pos = self.pos_fetch;
        self.pos_fetch += 1;
        self.pos_remaining -= 1;
        Ok(self.pos_buffer[self.cur_pos])
    }

    fn start_offset(&self) -> Option<u32> {
        if self.flags.has_offsets && self.pay_in.is_some() {
            self.off_start_buf.get(self.cur_pos).copied()
        } else {
            None
        }
    }

    fn end_offset(&self) -> Option<u32> {
        if self.flags.has_offsets && self.pay_in.is_some() {
            self.off_end_buf.get(self.cur_pos).copied()
        } else {
            None
        }
    }

    fn payload(&self) -> Option<&[u8]> {
        if self.flags.has_payloads && self.pay_in.is_some() {
            self.pay_ranges
                .get(self.cur_pos)
                .map(|&(start, end)| &self.pay_bytes[start..end])
        } else {
            None
        }
    }

    fn cost(&self) -> u64 {
        self.meta.doc_freq as u64
    }

    fn impacts(&self, level: usize) -> Vec<Impact> {
        match &self.skip {
            Some(skip) => {
                let impacts = skip.impacts(level);
                if impacts.is_empty() {
                    vec![Impact {
                        freq: u32::MAX,
                        norm: 1,
                    }]
                } else {
                    impacts.to_vec()
                }
            }
            // nothing loaded yet: an unbounded impact never prunes wrongly
            None => vec![Impact {
                freq: u32::MAX,
                norm: 1,
            }],
        }
    }
}

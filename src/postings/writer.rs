//! Block postings writer for the `.doc`, `.pos` and `.pay` files.
//!
//! Documents arrive with strictly increasing ids. Deltas and frequencies are
//! buffered until a 128-entry block is full, then packed at the block's bit
//! width; a block boundary also flushes the block's positions and
//! offsets/payloads and hands the skip writer the file pointers where the
//! next block starts. A final short tail is VByte-encoded, and the skip
//! pyramid lands after the tail in the `.doc` stream.

use crate::error::{FalxError, Result};
use crate::postings::skip::SkipWriter;
use crate::postings::{CompetitiveImpactAccumulator, TermMeta, BLOCK_SIZE};
use crate::storage::structured::StructWriter;
use crate::storage::StorageOutput;
use crate::util::packed;

/// Which postings features a field records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PostingsFlags {
    /// Term frequencies are recorded.
    pub has_freqs: bool,
    /// Term positions are recorded (implies `has_freqs`).
    pub has_positions: bool,
    /// Character offsets are recorded per position.
    pub has_offsets: bool,
    /// Payloads are recorded per position.
    pub has_payloads: bool,
}

impl PostingsFlags {
    /// Whether a `.pay` stream exists for this field.
    pub fn has_pay_file(&self) -> bool {
        self.has_offsets || self.has_payloads
    }
}

type Out = StructWriter<Box<dyn StorageOutput>>;

/// Writes one segment's postings across all fields and terms.
pub struct PostingsWriter {
    doc_out: Out,
    pos_out: Option<Out>,
    pay_out: Option<Out>,
    max_doc: u32,
    flags: PostingsFlags,
    skip_writer: SkipWriter,

    // per-term state
    doc_deltas: Vec<u32>,
    freqs: Vec<u32>,
    block_pos_deltas: Vec<u32>,
    block_off_starts: Vec<u32>,
    block_off_lens: Vec<u32>,
    block_pay_lens: Vec<u32>,
    block_pay_bytes: Vec<u8>,
    block_impacts: CompetitiveImpactAccumulator,

    doc_start_fp: u64,
    pos_start_fp: u64,
    pay_start_fp: u64,
    doc_freq: u32,
    total_term_freq: u64,
    blocks_written: u32,

    // per-doc state
    last_doc: u32,
    cur_doc_freq: u32,
    positions_seen: u32,
    last_pos: u32,
    last_off_start: u32,
    in_doc: bool,
    in_term: bool,
}

impl PostingsWriter {
    /// Create a writer over the segment's postings outputs. `pos_out` and
    /// `pay_out` are only given when some field records those features.
    pub fn new(doc_out: Out, pos_out: Option<Out>, pay_out: Option<Out>, max_doc: u32) -> Self {
        PostingsWriter {
            doc_out,
            pos_out,
            pay_out,
            max_doc,
            flags: PostingsFlags::default(),
            skip_writer: SkipWriter::new(max_doc, false, false),
            doc_deltas: Vec::with_capacity(BLOCK_SIZE),
            freqs: Vec::with_capacity(BLOCK_SIZE),
            block_pos_deltas: Vec::new(),
            block_off_starts: Vec::new(),
            block_off_lens: Vec::new(),
            block_pay_lens: Vec::new(),
            block_pay_bytes: Vec::new(),
            block_impacts: CompetitiveImpactAccumulator::new(),
            doc_start_fp: 0,
            pos_start_fp: 0,
            pay_start_fp: 0,
            doc_freq: 0,
            total_term_freq: 0,
            blocks_written: 0,
            last_doc: 0,
            cur_doc_freq: 0,
            positions_seen: 0,
            last_pos: 0,
            last_off_start: 0,
            in_doc: false,
            in_term: false,
        }
    }

    /// Switch to a new field's feature set.
    pub fn set_field(&mut self, flags: PostingsFlags) {
        self.flags = flags;
        self.skip_writer = SkipWriter::new(self.max_doc, flags.has_positions, flags.has_pay_file());
    }

    /// Begin a new term.
    pub fn start_term(&mut self) -> Result<()> {
        if self.in_term {
            return Err(FalxError::invalid_argument("start_term inside open term"));
        }
        self.in_term = true;
        self.doc_freq = 0;
        self.total_term_freq = 0;
        self.blocks_written = 0;
        self.last_doc = 0;
        self.doc_start_fp = self.doc_out.position();
        self.pos_start_fp = self.pos_out.as_ref().map_or(0, |o| o.position());
        self.pay_start_fp = self.pay_out.as_ref().map_or(0, |o| o.position());
        self.skip_writer.reset();
        self.clear_block();
        Ok(())
    }

    fn clear_block(&mut self) {
        self.doc_deltas.clear();
        self.freqs.clear();
        self.block_pos_deltas.clear();
        self.block_off_starts.clear();
        self.block_off_lens.clear();
        self.block_pay_lens.clear();
        self.block_pay_bytes.clear();
        self.block_impacts.clear();
    }

    /// Begin one document of the current term.
    ///
    /// `norm` is the document's one-byte field-length norm, recorded in the
    /// block's competitive impacts.
    pub fn start_doc(&mut self, doc_id: u32, freq: u32, norm: u8) -> Result<()> {
        if !self.in_term {
            return Err(FalxError::invalid_argument("start_doc outside term"));
        }
        if self.doc_freq > 0 && doc_id <= self.last_doc {
            return Err(FalxError::invalid_argument(format!(
                "docs out of order: {doc_id} after {}",
                self.last_doc
            )));
        }
        let delta = if self.doc_freq == 0 {
            doc_id
        } else {
            doc_id - self.last_doc
        };
        self.doc_deltas.push(delta);
        if self.flags.has_freqs {
            self.freqs.push(freq);
        }
        self.block_impacts.add(if self.flags.has_freqs { freq } else { 1 }, norm);
        self.last_doc = doc_id;
        self.doc_freq += 1;
        self.total_term_freq += freq as u64;
        self.cur_doc_freq = freq;
        self.positions_seen = 0;
        self.last_pos = 0;
        self.last_off_start = 0;
        self.in_doc = true;
        Ok(())
    }

    /// Record one position of the current document, in increasing order.
    pub fn add_position(
        &mut self,
        position: u32,
        offsets: Option<(u32, u32)>,
        payload: Option<&[u8]>,
    ) -> Result<()> {
        if !self.in_doc {
            return Err(FalxError::invalid_argument("add_position outside doc"));
        }
        if !self.flags.has_positions {
            return Ok(());
        }
        if self.positions_seen > 0 && position <= self.last_pos {
            return Err(FalxError::invalid_argument(format!(
                "positions out of order: {position} after {}",
                self.last_pos
            )));
        }
        let delta = if self.positions_seen == 0 {
            position
        } else {
            position - self.last_pos
        };
        self.block_pos_deltas.push(delta);
        self.last_pos = position;

        if self.flags.has_offsets {
            let (start, end) = offsets.ok_or_else(|| {
                FalxError::invalid_argument("field indexes offsets but none were supplied")
            })?;
            if end < start {
                return Err(FalxError::invalid_argument(format!(
                    "offset end {end} before start {start}"
                )));
            }
            let start_delta = if self.positions_seen == 0 {
                start
            } else {
                start - self.last_off_start
            };
            self.block_off_starts.push(start_delta);
            self.block_off_lens.push(end - start);
            self.last_off_start = start;
        }
        if self.flags.has_payloads {
            let payload = payload.unwrap_or(&[]);
            self.block_pay_lens.push(payload.len() as u32);
            self.block_pay_bytes.extend_from_slice(payload);
        }
        self.positions_seen += 1;
        Ok(())
    }

    /// End the current document, flushing a block at each 128-doc boundary.
    pub fn finish_doc(&mut self) -> Result<()> {
        if !self.in_doc {
            return Err(FalxError::invalid_argument("finish_doc outside doc"));
        }
        if self.flags.has_positions && self.positions_seen != self.cur_doc_freq {
            return Err(FalxError::invalid_argument(format!(
                "doc freq {} but {} positions recorded",
                self.cur_doc_freq, self.positions_seen
            )));
        }
        self.in_doc = false;

        if self.doc_deltas.len() == BLOCK_SIZE {
            self.flush_block()?;
        }
        Ok(())
    }

    fn write_packed_stream(out: &mut Out, values: &[u32]) -> Result<()> {
        for chunk in values.chunks(BLOCK_SIZE) {
            if chunk.len() == BLOCK_SIZE {
                let width = packed::width_for(chunk);
                out.write_u8(width as u8)?;
                out.write_raw(&packed::pack(chunk, width))?;
            } else {
                for &v in chunk {
                    out.write_vint(v)?;
                }
            }
        }
        Ok(())
    }

    /// Write the buffered 128-doc block and feed the skip writer.
    fn flush_block(&mut self) -> Result<()> {
        let width = packed::width_for(&self.doc_deltas);
        self.doc_out.write_u8(width as u8)?;
        self.doc_out.write_raw(&packed::pack(&self.doc_deltas, width))?;
        if self.flags.has_freqs {
            let width = packed::width_for(&self.freqs);
            self.doc_out.write_u8(width as u8)?;
            self.doc_out.write_raw(&packed::pack(&self.freqs, width))?;
        }

        if let Some(pos_out) = self.pos_out.as_mut() {
            if self.flags.has_positions {
                Self::write_packed_stream(pos_out, &self.block_pos_deltas)?;
            }
        }
        if let Some(pay_out) = self.pay_out.as_mut() {
            if self.flags.has_offsets {
                Self::write_packed_stream(pay_out, &self.block_off_starts)?;
                Self::write_packed_stream(pay_out, &self.block_off_lens)?;
            }
            if self.flags.has_payloads {
                Self::write_packed_stream(pay_out, &self.block_pay_lens)?;
                pay_out.write_raw(&self.block_pay_bytes)?;
            }
        }

        self.blocks_written += 1;
        let doc_fp = self.doc_out.position();
        let pos_fp = self.pos_out.as_ref().map_or(0, |o| o.position());
        let pay_fp = self.pay_out.as_ref().map_or(0, |o| o.position());
        let impacts = std::mem::take(&mut self.block_impacts);
        self.skip_writer.buffer_skip(
            self.last_doc,
            doc_fp,
            pos_fp,
            pay_fp,
            self.blocks_written * BLOCK_SIZE as u32,
            &impacts,
        )?;
        self.clear_block();
        Ok(())
    }

    /// End the term, writing the VByte tail and the skip pyramid, and
    /// return the term's metadata.
    pub fn finish_term(&mut self) -> Result<TermMeta> {
        if !self.in_term {
            return Err(FalxError::invalid_argument("finish_term outside term"));
        }
        if self.in_doc {
            return Err(FalxError::invalid_argument("finish_term inside open doc"));
        }
        self.in_term = false;

        // VByte tail
        if !self.doc_deltas.is_empty() {
            for i in 0..self.doc_deltas.len() {
                self.doc_out.write_vint(self.doc_deltas[i])?;
                if self.flags.has_freqs {
                    self.doc_out.write_vint(self.freqs[i])?;
                }
            }
            if let Some(pos_out) = self.pos_out.as_mut() {
                if self.flags.has_positions {
                    Self::write_packed_stream(pos_out, &self.block_pos_deltas)?;
                }
            }
            if let Some(pay_out) = self.pay_out.as_mut() {
                if self.flags.has_offsets {
                    Self::write_packed_stream(pay_out, &self.block_off_starts)?;
                    Self::write_packed_stream(pay_out, &self.block_off_lens)?;
                }
                if self.flags.has_payloads {
                    Self::write_packed_stream(pay_out, &self.block_pay_lens)?;
                    pay_out.write_raw(&self.block_pay_bytes)?;
                }
            }
        }

        let skip_offset = if self.blocks_written > 0 {
            let offset = self.doc_out.position() - self.doc_start_fp;
            self.skip_writer.write_skip(&mut self.doc_out, self.doc_freq)?;
            Some(offset)
        } else {
            None
        };

        let meta = TermMeta {
            doc_freq: self.doc_freq,
            total_term_freq: if self.flags.has_freqs {
                self.total_term_freq
            } else {
                self.doc_freq as u64
            },
            doc_start_fp: self.doc_start_fp,
            pos_start_fp: self.pos_start_fp,
            pay_start_fp: self.pay_start_fp,
            skip_offset,
        };
        self.clear_block();
        Ok(meta)
    }

    /// Finish the postings streams, closing the underlying outputs after the
    /// caller has framed them with footers.
    pub fn into_outputs(self) -> (Out, Option<Out>, Option<Out>) {
        (self.doc_out, self.pos_out, self.pay_out)
    }
}

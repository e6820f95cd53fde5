//! The FST-backed terms dictionary (`.tim` + `.tip`).
//!
//! `.tip` holds one FST per field mapping each term's bytes to the offset
//! of its metadata record in `.tim`; `.tim` holds the per-term records
//! `(doc_freq, total_term_freq, doc_start_fp, pos_start_fp, pay_start_fp,
//! skip_offset)`. Terms must be fed in ascending byte order per field,
//! which the in-RAM postings buffer guarantees by construction.

use ahash::AHashMap;

use crate::error::{FalxError, Result};
use crate::fst::builder::FstBuilder;
use crate::fst::outputs::U64Outputs;
use crate::fst::Fst;
use crate::postings::writer::PostingsFlags;
use crate::postings::TermMeta;
use crate::storage::checksum::{check_footer, check_header, write_footer, write_header};
use crate::storage::structured::{StructReader, StructWriter};
use crate::storage::{StorageInput, StorageOutput};

/// Codec name of the `.tim` term-metadata file.
pub const TERMS_CODEC: &str = "FalxTerms";
/// Codec name of the `.tip` terms-index file.
pub const TERMS_INDEX_CODEC: &str = "FalxTermsIndex";
/// Current terms format version.
pub const TERMS_VERSION: u32 = 1;

/// Aggregate statistics of one field's terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldStats {
    /// Number of distinct terms.
    pub num_terms: u64,
    /// Sum of doc frequencies across terms.
    pub sum_doc_freq: u64,
    /// Sum of total term frequencies across terms.
    pub sum_total_term_freq: u64,
    /// Number of documents with at least one term in the field.
    pub doc_count: u32,
}

/// Writes both terms files for one segment.
pub struct TermsWriter {
    tim: StructWriter<Box<dyn StorageOutput>>,
    tip: StructWriter<Box<dyn StorageOutput>>,
    fields_written: u32,
    // per-field state
    current: Option<FieldState>,
}

struct FieldState {
    field_number: u32,
    flags: PostingsFlags,
    builder: FstBuilder<U64Outputs>,
    stats: FieldStats,
    last_term: Vec<u8>,
    any_terms: bool,
}

impl TermsWriter {
    /// Open the writer over fresh `.tim`/`.tip` outputs.
    pub fn new(
        tim_out: Box<dyn StorageOutput>,
        tip_out: Box<dyn StorageOutput>,
        segment_id: &[u8; 16],
    ) -> Result<Self> {
        let mut tim = StructWriter::new(tim_out);
        let mut tip = StructWriter::new(tip_out);
        write_header(&mut tim, TERMS_CODEC, TERMS_VERSION, segment_id, "")?;
        write_header(&mut tip, TERMS_INDEX_CODEC, TERMS_VERSION, segment_id, "")?;
        Ok(TermsWriter {
            tim,
            tip,
            fields_written: 0,
            current: None,
        })
    }

    /// Begin a new field's terms.
    pub fn start_field(&mut self, field_number: u32, flags: PostingsFlags) -> Result<()> {
        if self.current.is_some() {
            return Err(FalxError::invalid_argument("start_field inside open field"));
        }
        self.current = Some(FieldState {
            field_number,
            flags,
            builder: FstBuilder::new(U64Outputs),
            stats: FieldStats::default(),
            last_term: Vec::new(),
            any_terms: false,
        });
        Ok(())
    }

    /// Record one term and its postings metadata. Terms must arrive in
    /// strictly ascending byte order.
    pub fn write_term(&mut self, term: &[u8], meta: &TermMeta) -> Result<()> {
        let state = self
            .current
            .as_mut()
            .ok_or_else(|| FalxError::invalid_argument("write_term outside field"))?;
        if state.any_terms && term <= state.last_term.as_slice() {
            return Err(FalxError::invalid_argument(format!(
                "terms out of order: {term:?} after {:?}",
                state.last_term
            )));
        }

        let offset = self.tim.position();
        self.tim.write_vint(meta.doc_freq)?;
        self.tim.write_vlong(meta.total_term_freq)?;
        self.tim.write_vlong(meta.doc_start_fp)?;
        if state.flags.has_positions {
            self.tim.write_vlong(meta.pos_start_fp)?;
        }
        if state.flags.has_pay_file() {
            self.tim.write_vlong(meta.pay_start_fp)?;
        }
        match meta.skip_offset {
            Some(skip) => {
                self.tim.write_u8(1)?;
                self.tim.write_vlong(skip)?;
            }
            None => self.tim.write_u8(0)?,
        }

        state.builder.add(term, offset)?;
        state.stats.num_terms += 1;
        state.stats.sum_doc_freq += meta.doc_freq as u64;
        state.stats.sum_total_term_freq += meta.total_term_freq;
        state.last_term = term.to_vec();
        state.any_terms = true;
        Ok(())
    }

    /// End the current field, compiling and saving its FST.
    pub fn finish_field(&mut self, doc_count: u32) -> Result<()> {
        let mut state = self
            .current
            .take()
            .ok_or_else(|| FalxError::invalid_argument("finish_field outside field"))?;
        state.stats.doc_count = doc_count;
        let fst = state.builder.finish()?;

        self.tip.write_vint(state.field_number)?;
        let mut flag_bits = 0u8;
        if state.flags.has_freqs {
            flag_bits |= 1;
        }
        if state.flags.has_positions {
            flag_bits |= 2;
        }
        if state.flags.has_offsets {
            flag_bits |= 4;
        }
        if state.flags.has_payloads {
            flag_bits |= 8;
        }
        self.tip.write_u8(flag_bits)?;
        self.tip.write_vlong(state.stats.num_terms)?;
        self.tip.write_vlong(state.stats.sum_doc_freq)?;
        self.tip.write_vlong(state.stats.sum_total_term_freq)?;
        self.tip.write_vint(state.stats.doc_count)?;
        fst.save(&mut self.tip)?;
        self.fields_written += 1;
        Ok(())
    }

    /// Seal both files with footers and close them.
    pub fn finish(mut self, num_fields: u32) -> Result<()> {
        if self.current.is_some() {
            return Err(FalxError::invalid_argument("finish inside open field"));
        }
        if num_fields != self.fields_written {
            return Err(FalxError::invalid_argument(format!(
                "expected {num_fields} fields, wrote {}",
                self.fields_written
            )));
        }
        // field count trailer lets the reader iterate without a directory
        self.tip.write_vint(u32::MAX)?; // end-of-fields marker
        self.tip.write_vint(num_fields)?;
        write_footer(&mut self.tim)?;
        write_footer(&mut self.tip)?;
        self.tim.close()?;
        self.tip.close()
    }
}

/// One field's compiled terms dictionary.
pub struct FieldTerms {
    /// The field's postings feature set.
    pub flags: PostingsFlags,
    /// Aggregate term statistics.
    pub stats: FieldStats,
    fst: Fst<U64Outputs>,
}

impl FieldTerms {
    /// The FST mapping term bytes to `.tim` offsets.
    pub fn fst(&self) -> &Fst<U64Outputs> {
        &self.fst
    }
}

/// Reader over both terms files of a segment.
pub struct TermsReader {
    fields: AHashMap<u32, FieldTerms>,
    tim_source: Box<dyn StorageInput>,
    tim_name: String,
}

impl TermsReader {
    /// Load the `.tip` FSTs into memory and keep `.tim` open for record
    /// reads.
    pub fn open(
        tip_in: Box<dyn StorageInput>,
        tim_in: Box<dyn StorageInput>,
        segment_id: &[u8; 16],
        tip_name: &str,
        tim_name: &str,
    ) -> Result<Self> {
        let mut tip = StructReader::new(tip_in);
        check_header(
            &mut tip,
            TERMS_INDEX_CODEC,
            TERMS_VERSION,
            TERMS_VERSION,
            Some(segment_id),
            tip_name,
        )?;

        let mut fields = AHashMap::new();
        loop {
            let field_number = tip.read_vint()?;
            if field_number == u32::MAX {
                break;
            }
            let flag_bits = tip.read_u8()?;
            let flags = PostingsFlags {
                has_freqs: flag_bits & 1 != 0,
                has_positions: flag_bits & 2 != 0,
                has_offsets: flag_bits & 4 != 0,
                has_payloads: flag_bits & 8 != 0,
            };
            let num_terms = tip.read_vlong()?;
            let sum_doc_freq = tip.read_vlong()?;
            let sum_total_term_freq = tip.read_vlong()?;
            let doc_count = tip.read_vint()?;
            let fst = Fst::load(&mut tip, U64Outputs)?;
            fields.insert(
                field_number,
                FieldTerms {
                    flags,
                    stats: FieldStats {
                        num_terms,
                        sum_doc_freq,
                        sum_total_term_freq,
                        doc_count,
                    },
                    fst,
                },
            );
        }
        let declared = tip.read_vint()?;
        if declared as usize != fields.len() {
            return Err(FalxError::corrupt(format!(
                "terms index declares {declared} fields but contains {}",
                fields.len()
            )));
        }
        check_footer(&mut tip, tip_name)?;

        // validate the .tim header once so corrupt files fail at open
        {
            let mut tim = StructReader::new(tim_in.clone_input()?);
            check_header(
                &mut tim,
                TERMS_CODEC,
                TERMS_VERSION,
                TERMS_VERSION,
                Some(segment_id),
                tim_name,
            )?;
        }

        Ok(TermsReader {
            fields,
            tim_source: tim_in,
            tim_name: tim_name.to_string(),
        })
    }

    /// The terms of a field, if the field has any.
    pub fn field(&self, field_number: u32) -> Option<&FieldTerms> {
        self.fields.get(&field_number)
    }

    /// Decode the metadata record at a `.tim` offset previously produced by
    /// an FST lookup on the same field.
    pub fn read_term_meta(&self, field: &FieldTerms, tim_offset: u64) -> Result<TermMeta> {
        let mut tim = StructReader::new(self.tim_source.clone_input()?);
        tim.seek(tim_offset)?;
        let doc_freq = tim.read_vint()?;
        let total_term_freq = tim.read_vlong()?;
        let doc_start_fp = tim.read_vlong()?;
        let pos_start_fp = if field.flags.has_positions {
            tim.read_vlong()?
        } else {
            0
        };
        let pay_start_fp = if field.flags.has_pay_file() {
            tim.read_vlong()?
        } else {
            0
        };
        let skip_offset = if tim.read_u8()? != 0 {
            Some(tim.read_vlong()?)
        } else {
            None
        };
        Ok(TermMeta {
            doc_freq,
            total_term_freq,
            doc_start_fp,
            pos_start_fp,
            pay_start_fp,
            skip_offset,
        })
    }

    /// Look up one term's metadata.
    pub fn term_meta(&self, field_number: u32, term: &[u8]) -> Result<Option<TermMeta>> {
        let field = match self.fields.get(&field_number) {
            Some(field) => field,
            None => return Ok(None),
        };
        match field.fst.get(term)? {
            None => Ok(None),
            Some(offset) => Ok(Some(self.read_term_meta(field, offset)?)),
        }
    }

    /// Iterate a field's terms in ascending byte order with their metadata.
    pub fn terms_iter(
        &self,
        field_number: u32,
    ) -> Result<Vec<(Vec<u8>, TermMeta)>> {
        let field = match self.fields.get(&field_number) {
            Some(field) => field,
            None => return Ok(Vec::new()),
        };
        let mut out = Vec::new();
        for item in field.fst.iter() {
            let (term, offset) = item?;
            out.push((term, self.read_term_meta(field, offset)?));
        }
        Ok(out)
    }

    /// The `.tim` file name, for error messages and integrity checks.
    pub fn tim_name(&self) -> &str {
        &self.tim_name
    }
}

//! Term vectors (`.vec`): per document, the field→terms→postings view.
//!
//! Each document is one length-prefixed record; the reader scans the record
//! lengths once at open to build the doc offset table, allocating its
//! scratch up front, and then serves `get(doc)` with a single seek.

use crate::error::{FalxError, Result};
use crate::storage::checksum::{check_footer, check_header, write_footer, write_header, FOOTER_LENGTH};
use crate::storage::structured::{StructReader, StructWriter};
use crate::storage::{StorageInput, StorageOutput};

/// Codec name of the term-vectors file.
pub const TERM_VECTORS_CODEC: &str = "FalxTermVectors";
/// Current term-vectors format version.
pub const TERM_VECTORS_VERSION: u32 = 1;
/// Extension of the term-vectors file.
pub const TERM_VECTORS_EXTENSION: &str = "vec";

/// One term's entry in a document's vector.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VectorTerm {
    /// The term bytes.
    pub term: Vec<u8>,
    /// Frequency within the document's field.
    pub freq: u32,
    /// Positions, when recorded.
    pub positions: Vec<u32>,
    /// `(start, end)` offsets, when recorded.
    pub offsets: Vec<(u32, u32)>,
}

/// One field's vector within a document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldVector {
    /// Field name.
    pub field: String,
    /// Terms in ascending byte order.
    pub terms: Vec<VectorTerm>,
    /// Whether positions were recorded.
    pub has_positions: bool,
    /// Whether offsets were recorded.
    pub has_offsets: bool,
}

/// Writes the term vectors of one segment, one record per document.
pub struct TermVectorsWriter {
    out: StructWriter<Box<dyn StorageOutput>>,
    num_docs: u32,
    scratch: Vec<u8>,
}

impl TermVectorsWriter {
    /// Open a writer over a fresh `.vec` output.
    pub fn new(out: Box<dyn StorageOutput>, segment_id: &[u8; 16]) -> Result<Self> {
        let mut out = StructWriter::new(out);
        write_header(&mut out, TERM_VECTORS_CODEC, TERM_VECTORS_VERSION, segment_id, "")?;
        Ok(TermVectorsWriter {
            out,
            num_docs: 0,
            scratch: Vec::new(),
        })
    }

    fn push_vint(scratch: &mut Vec<u8>, value: u32) {
        scratch.extend_from_slice(&crate::util::varint::encode_u32(value));
    }

    /// Write one document's vectors (possibly empty).
    pub fn write_document(&mut self, vectors: &[FieldVector]) -> Result<()> {
        self.scratch.clear();
        Self::push_vint(&mut self.scratch, vectors.len() as u32);
        for vector in vectors {
            Self::push_vint(&mut self.scratch, vector.field.len() as u32);
            self.scratch.extend_from_slice(vector.field.as_bytes());
            let mut bits = 0u8;
            if vector.has_positions {
                bits |= 1;
            }
            if vector.has_offsets {
                bits |= 2;
            }
            self.scratch.push(bits);
            Self::push_vint(&mut self.scratch, vector.terms.len() as u32);
            for term in &vector.terms {
                Self::push_vint(&mut self.scratch, term.term.len() as u32);
                self.scratch.extend_from_slice(&term.term);
                Self::push_vint(&mut self.scratch, term.freq);
                if vector.has_positions {
                    for &pos in &term.positions {
                        Self::push_vint(&mut self.scratch, pos);
                    }
                }
                if vector.has_offsets {
                    for &(start, end) in &term.offsets {
                        Self::push_vint(&mut self.scratch, start);
                        Self::push_vint(&mut self.scratch, end);
                    }
                }
            }
        }
        self.out.write_vint(self.scratch.len() as u32)?;
        self.out.write_raw(&self.scratch)?;
        self.num_docs += 1;
        Ok(())
    }

    /// Seal and close the file.
    pub fn finish(mut self) -> Result<()> {
        write_footer(&mut self.out)?;
        self.out.close()
    }
}

/// Reads term vectors back per document.
pub struct TermVectorsReader {
    input: Box<dyn StorageInput>,
    doc_offsets: Vec<u64>,
}

impl TermVectorsReader {
    /// Open the file, validating framing and indexing the doc records.
    pub fn open(
        input: Box<dyn StorageInput>,
        segment_id: &[u8; 16],
        resource: &str,
    ) -> Result<Self> {
        let mut reader = StructReader::new(input.clone_input()?);
        check_header(
            &mut reader,
            TERM_VECTORS_CODEC,
            TERM_VECTORS_VERSION,
            TERM_VECTORS_VERSION,
            Some(segment_id),
            resource,
        )?;
        let body_end = reader
            .len()
            .checked_sub(FOOTER_LENGTH)
            .ok_or_else(|| FalxError::corrupt(format!("{resource} too short")))?;

        // scratch allocated before the scan loop
        let mut doc_offsets = Vec::new();
        while reader.position() < body_end {
            doc_offsets.push(reader.position());
            let record_len = reader.read_vint()? as u64;
            reader.skip(record_len)?;
        }
        check_footer(&mut reader, resource)?;
        Ok(TermVectorsReader { input, doc_offsets })
    }

    /// Number of documents with a vectors record.
    pub fn num_docs(&self) -> u32 {
        self.doc_offsets.len() as u32
    }

    /// Decode one document's vectors.
    pub fn get(&self, doc_id: u32) -> Result<Vec<FieldVector>> {
        let offset = *self
            .doc_offsets
            .get(doc_id as usize)
            .ok_or_else(|| FalxError::invalid_argument(format!("doc {doc_id} out of range")))?;
        let mut reader = StructReader::new(self.input.clone_input()?);
        reader.seek(offset)?;
        let _record_len = reader.read_vint()?;

        let num_fields = reader.read_vint()?;
        let mut vectors = Vec::with_capacity(num_fields as usize);
        for _ in 0..num_fields {
            let field = reader.read_string()?;
            let bits = reader.read_u8()?;
            let has_positions = bits & 1 != 0;
            let has_offsets = bits & 2 != 0;
            let num_terms = reader.read_vint()?;
            let mut terms = Vec::with_capacity(num_terms as usize);
            for _ in 0..num_terms {
                let term = reader.read_bytes()?;
                let freq = reader.read_vint()?;
                let mut positions = Vec::new();
                let mut offsets = Vec::new();
                if has_positions {
                    positions.reserve(freq as usize);
                    for _ in 0..freq {
                        positions.push(reader.read_vint()?);
                    }
                }
                if has_offsets {
                    offsets.reserve(freq as usize);
                    for _ in 0..freq {
                        let start = reader.read_vint()?;
                        let end = reader.read_vint()?;
                        offsets.push((start, end));
                    }
                }
                terms.push(VectorTerm {
                    term,
                    freq,
                    positions,
                    offsets,
                });
            }
            vectors.push(FieldVector {
                field,
                terms,
                has_positions,
                has_offsets,
            });
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;
    use crate::storage::{MemoryStorageConfig, Storage};

    const ID: [u8; 16] = [8u8; 16];

    #[test]
    fn test_roundtrip() {
        let storage = MemoryStorage::new(MemoryStorageConfig::default());
        let doc0 = vec![FieldVector {
            field: "body".to_string(),
            has_positions: true,
            has_offsets: true,
            terms: vec![
                VectorTerm {
                    term: b"fox".to_vec(),
                    freq: 2,
                    positions: vec![3, 9],
                    offsets: vec![(12, 15), (40, 43)],
                },
                VectorTerm {
                    term: b"quick".to_vec(),
                    freq: 1,
                    positions: vec![1],
                    offsets: vec![(4, 9)],
                },
            ],
        }];
        let doc1: Vec<FieldVector> = Vec::new();
        let doc2 = vec![FieldVector {
            field: "title".to_string(),
            has_positions: false,
            has_offsets: false,
            terms: vec![VectorTerm {
                term: b"hello".to_vec(),
                freq: 1,
                positions: vec![],
                offsets: vec![],
            }],
        }];
        {
            let mut writer =
                TermVectorsWriter::new(storage.create_output("_0.vec").unwrap(), &ID).unwrap();
            writer.write_document(&doc0).unwrap();
            writer.write_document(&doc1).unwrap();
            writer.write_document(&doc2).unwrap();
            writer.finish().unwrap();
        }

        let reader =
            TermVectorsReader::open(storage.open_input("_0.vec").unwrap(), &ID, "_0.vec").unwrap();
        assert_eq!(reader.num_docs(), 3);
        assert_eq!(reader.get(0).unwrap(), doc0);
        assert_eq!(reader.get(1).unwrap(), doc1);
        assert_eq!(reader.get(2).unwrap(), doc2);
        assert!(reader.get(3).is_err());
    }

    #[test]
    fn test_empty_input() {
        // a segment with zero documents still opens cleanly
        let storage = MemoryStorage::new(MemoryStorageConfig::default());
        {
            let writer =
                TermVectorsWriter::new(storage.create_output("_0.vec").unwrap(), &ID).unwrap();
            writer.finish().unwrap();
        }
        let reader =
            TermVectorsReader::open(storage.open_input("_0.vec").unwrap(), &ID, "_0.vec").unwrap();
        assert_eq!(reader.num_docs(), 0);
    }
}

//! Read-only views over committed segments.
//!
//! A [`SegmentReader`] opens every file of one segment; an [`IndexReader`]
//! pins one commit point and concatenates its segments in order with
//! per-segment doc bases. Readers are immutable snapshots: a commit made
//! after opening is invisible until the index is reopened.

use std::sync::Arc;

use crate::document::Document;
use crate::error::{FalxError, Result};
use crate::index::doc_values::{DocValuesReader, DOC_VALUES_EXTENSION};
use crate::index::field_infos::{FieldInfos, FIELD_INFOS_EXTENSION};
use crate::index::live_docs::{read_live_docs, FixedBitSet};
use crate::index::points::{PointsReader, POINTS_DATA_EXTENSION, POINTS_INDEX_EXTENSION};
use crate::index::segment_info::{SegmentCommitInfo, SegmentInfo, SegmentInfos, SEGMENT_INFO_EXTENSION};
use crate::index::stored_fields::{StoredFieldsReader, STORED_FIELDS_EXTENSION};
use crate::index::term_vectors::{FieldVector, TermVectorsReader, TERM_VECTORS_EXTENSION};
use crate::index::terms::{FieldTerms, TermsReader};
use crate::index::{
    DOC_EXTENSION, PAY_EXTENSION, POS_EXTENSION, TIM_EXTENSION, TIP_EXTENSION,
};
use crate::postings::reader::BlockPostingsIterator;
use crate::postings::TermMeta;
use crate::storage::checksum::verify_file;
use crate::storage::structured::StructReader;
use crate::storage::{segment_file_name, Storage, StorageInput};

/// Read-only view over one segment.
pub struct SegmentReader {
    storage: Arc<dyn Storage>,
    info: SegmentInfo,
    commit: SegmentCommitInfo,
    field_infos: FieldInfos,
    terms: TermsReader,
    stored: StoredFieldsReader,
    doc_values: DocValuesReader,
    points: Option<PointsReader>,
    vectors: Option<TermVectorsReader>,
    live_docs: Option<FixedBitSet>,
    doc_source: Box<dyn StorageInput>,
    pos_source: Option<Box<dyn StorageInput>>,
    pay_source: Option<Box<dyn StorageInput>>,
}

impl SegmentReader {
    /// Open every file the commit entry references.
    pub fn open(storage: Arc<dyn Storage>, commit: &SegmentCommitInfo) -> Result<Self> {
        let name = &commit.name;
        let id = &commit.id;

        let si_name = segment_file_name(name, "", SEGMENT_INFO_EXTENSION);
        let info = {
            let mut reader = StructReader::new(storage.open_input(&si_name)?);
            SegmentInfo::read(&mut reader, id, &si_name)?
        };

        let inf_name = segment_file_name(name, "", FIELD_INFOS_EXTENSION);
        let field_infos = {
            let mut reader = StructReader::new(storage.open_input(&inf_name)?);
            FieldInfos::read(&mut reader, id, &inf_name)?
        };

        let tip_name = segment_file_name(name, "", TIP_EXTENSION);
        let tim_name = segment_file_name(name, "", TIM_EXTENSION);
        let terms = TermsReader::open(
            storage.open_input(&tip_name)?,
            storage.open_input(&tim_name)?,
            id,
            &tip_name,
            &tim_name,
        )?;

        let fld_name = segment_file_name(name, "", STORED_FIELDS_EXTENSION);
        let stored = StoredFieldsReader::open(storage.open_input(&fld_name)?, id, &fld_name)?;

        let dvd_name = segment_file_name(name, "", DOC_VALUES_EXTENSION);
        let doc_values =
            DocValuesReader::open(storage.open_input(&dvd_name)?, id, info.max_doc, &dvd_name)?;

        let idx_name = segment_file_name(name, "", POINTS_INDEX_EXTENSION);
        let points = if info.files.contains(&idx_name) {
            let dat_name = segment_file_name(name, "", POINTS_DATA_EXTENSION);
            Some(PointsReader::open(
                storage.open_input(&idx_name)?,
                storage.open_input(&dat_name)?,
                id,
                &idx_name,
            )?)
        } else {
            None
        };

        let vec_name = segment_file_name(name, "", TERM_VECTORS_EXTENSION);
        let vectors = if info.files.contains(&vec_name) {
            Some(TermVectorsReader::open(
                storage.open_input(&vec_name)?,
                id,
                &vec_name,
            )?)
        } else {
            None
        };

        let live_docs = match commit.live_docs_file() {
            Some(liv_name) => Some(read_live_docs(
                storage.open_input(&liv_name)?,
                id,
                info.max_doc,
                &liv_name,
            )?),
            None => None,
        };

        let doc_source = storage.open_input(&segment_file_name(name, "", DOC_EXTENSION))?;
        let pos_name = segment_file_name(name, "", POS_EXTENSION);
        let pos_source = if info.files.contains(&pos_name) {
            Some(storage.open_input(&pos_name)?)
        } else {
            None
        };
        let pay_name = segment_file_name(name, "", PAY_EXTENSION);
        let pay_source = if info.files.contains(&pay_name) {
            Some(storage.open_input(&pay_name)?)
        } else {
            None
        };

        Ok(SegmentReader {
            storage,
            info,
            commit: commit.clone(),
            field_infos,
            terms,
            stored,
            doc_values,
            points,
            vectors,
            live_docs,
            doc_source,
            pos_source,
            pay_source,
        })
    }

    /// Segment name.
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Total documents in the segment, deleted ones included.
    pub fn max_doc(&self) -> u32 {
        self.info.max_doc
    }

    /// Live documents (None = nothing deleted).
    pub fn live_docs(&self) -> Option<&FixedBitSet> {
        self.live_docs.as_ref()
    }

    /// Number of live documents.
    pub fn num_docs(&self) -> u32 {
        match &self.live_docs {
            Some(live) => live.count_ones(),
            None => self.info.max_doc,
        }
    }

    /// The segment's field schema.
    pub fn field_infos(&self) -> &FieldInfos {
        &self.field_infos
    }

    /// The terms of a field, if the field is indexed.
    pub fn terms(&self, field: &str) -> Option<&FieldTerms> {
        let info = self.field_infos.get(field)?;
        self.terms.field(info.number)
    }

    /// Every `(term, metadata)` of a field in ascending term order.
    pub fn terms_iter(&self, field: &str) -> Result<Vec<(Vec<u8>, TermMeta)>> {
        match self.field_infos.get(field) {
            Some(info) => self.terms.terms_iter(info.number),
            None => Ok(Vec::new()),
        }
    }

    /// A term's metadata, if present.
    pub fn term_meta(&self, field: &str, term: &[u8]) -> Result<Option<TermMeta>> {
        match self.field_infos.get(field) {
            Some(info) => self.terms.term_meta(info.number, term),
            None => Ok(None),
        }
    }

    /// Open a postings iterator for one term. `with_positions` requests
    /// position/offset/payload decoding when the field records them.
    pub fn postings(
        &self,
        field: &str,
        term: &[u8],
        with_positions: bool,
    ) -> Result<Option<BlockPostingsIterator>> {
        let info = match self.field_infos.get(field) {
            Some(info) => info,
            None => return Ok(None),
        };
        let field_terms = match self.terms.field(info.number) {
            Some(field_terms) => field_terms,
            None => return Ok(None),
        };
        let meta = match field_terms.fst().get(term)? {
            Some(offset) => self.terms.read_term_meta(field_terms, offset)?,
            None => return Ok(None),
        };
        let flags = field_terms.flags;

        let doc_in = StructReader::new(self.doc_source.clone_input()?);
        let pos_in = if with_positions && flags.has_positions {
            match &self.pos_source {
                Some(source) => Some(StructReader::new(source.clone_input()?)),
                None => None,
            }
        } else {
            None
        };
        let pay_in = if with_positions && flags.has_pay_file() {
            match &self.pay_source {
                Some(source) => Some(StructReader::new(source.clone_input()?)),
                None => None,
            }
        } else {
            None
        };
        Ok(Some(BlockPostingsIterator::new(
            doc_in, pos_in, pay_in, meta, flags,
        )?))
    }

    /// One-byte length norm of a doc, if the field has norms.
    pub fn norm(&self, field: &str, doc: u32) -> Option<u8> {
        self.doc_values.norm(field, doc)
    }

    /// The segment's doc-values columns.
    pub fn doc_values(&self) -> &DocValuesReader {
        &self.doc_values
    }

    /// The segment's points, if any field indexed them.
    pub fn points(&self) -> Option<&PointsReader> {
        self.points.as_ref()
    }

    /// A document's term vectors, if recorded.
    pub fn term_vectors(&self, doc: u32) -> Result<Vec<FieldVector>> {
        match &self.vectors {
            Some(vectors) if doc < vectors.num_docs() => vectors.get(doc),
            _ => Ok(Vec::new()),
        }
    }

    /// A document's stored fields.
    pub fn document(&self, doc: u32) -> Result<Document> {
        if doc >= self.info.max_doc {
            return Err(FalxError::invalid_argument(format!(
                "doc {doc} out of range 0..{}",
                self.info.max_doc
            )));
        }
        self.stored.document(doc)
    }

    /// Re-read every file of the segment and verify its footer CRC.
    ///
    /// Any mismatch taints the whole index: the error carries the first
    /// corrupt file.
    pub fn check_integrity(&self) -> Result<()> {
        for file in &self.commit.files {
            verify_file(self.storage.as_ref(), file)?;
        }
        Ok(())
    }
}

/// One segment leaf plus its doc base within the composite reader.
pub struct LeafReaderContext<'r> {
    /// Index of this leaf.
    pub ord: usize,
    /// First global doc id of this leaf.
    pub doc_base: u32,
    /// The segment reader.
    pub reader: &'r SegmentReader,
}

/// Read-only view over one commit point of the whole index.
pub struct IndexReader {
    segments: Vec<SegmentReader>,
    doc_bases: Vec<u32>,
    max_doc: u32,
    generation: u64,
}

impl IndexReader {
    /// Open the latest commit point in `storage`.
    pub fn open(storage: Arc<dyn Storage>) -> Result<Self> {
        let infos = SegmentInfos::read_latest(storage.as_ref())?;
        let mut segments = Vec::with_capacity(infos.segments.len());
        let mut doc_bases = Vec::with_capacity(infos.segments.len());
        let mut max_doc = 0u32;
        for entry in &infos.segments {
            let reader = SegmentReader::open(storage.clone(), entry)?;
            doc_bases.push(max_doc);
            max_doc += reader.max_doc();
            segments.push(reader);
        }
        Ok(IndexReader {
            segments,
            doc_bases,
            max_doc,
            generation: infos.generation,
        })
    }

    /// Commit generation this reader pins.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Total docs across segments, deleted included.
    pub fn max_doc(&self) -> u32 {
        self.max_doc
    }

    /// Total live docs across segments.
    pub fn num_docs(&self) -> u32 {
        self.segments.iter().map(|s| s.num_docs()).sum()
    }

    /// The segment leaves in reader order.
    pub fn leaves(&self) -> Vec<LeafReaderContext<'_>> {
        self.segments
            .iter()
            .enumerate()
            .map(|(ord, reader)| LeafReaderContext {
                ord,
                doc_base: self.doc_bases[ord],
                reader,
            })
            .collect()
    }

    /// A document's stored fields by global doc id.
    pub fn document(&self, global_doc: u32) -> Result<Document> {
        let leaf = match self.doc_bases.binary_search(&global_doc) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        self.segments[leaf].document(global_doc - self.doc_bases[leaf])
    }

    /// Verify every segment file's checksum.
    pub fn check_integrity(&self) -> Result<()> {
        for segment in &self.segments {
            segment.check_integrity()?;
        }
        Ok(())
    }
}

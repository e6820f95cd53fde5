//! The single index writer: buffers documents in RAM, flushes immutable
//! segments, and publishes commit points.
//!
//! Documents are inverted into per-field term maps as they arrive; `flush`
//! serializes the buffer through the codec into a new segment, and `commit`
//! additionally applies buffered deletes to every segment and renames a new
//! `segments_N` into place. An error while writing segment files aborts the
//! half-written segment: everything created for it is deleted and the
//! buffered documents are discarded.

use std::collections::BTreeMap;
use std::sync::Arc;

use ahash::AHashMap;

use crate::analysis::Analyzer;
use crate::document::{Document, FieldValue};
use crate::error::{FalxError, Result};
use crate::index::doc_values::{DocValuesWriter, DOC_VALUES_EXTENSION};
use crate::index::field_infos::{
    DocValuesType, FieldInfos, FieldInfosBuilder, IndexOptions, FIELD_INFOS_EXTENSION,
};
use crate::index::live_docs::{write_live_docs, FixedBitSet};
use crate::index::points::{pack_i64, PointsWriter, POINTS_DATA_EXTENSION, POINTS_INDEX_EXTENSION};
use crate::index::reader::SegmentReader;
use crate::index::segment_info::{
    SegmentCommitInfo, SegmentInfo, SegmentInfos, SEGMENT_INFO_EXTENSION, SEGMENT_VERSION,
};
use crate::index::stored_fields::{StoredFieldsWriter, STORED_FIELDS_EXTENSION};
use crate::index::term_vectors::{FieldVector, TermVectorsWriter, VectorTerm, TERM_VECTORS_EXTENSION};
use crate::index::terms::TermsWriter;
use crate::index::{
    CODEC_NAME, DOC_EXTENSION, PAY_EXTENSION, POSTINGS_DOC_CODEC, POSTINGS_PAY_CODEC,
    POSTINGS_POS_CODEC, POSTINGS_VERSION, POS_EXTENSION, TIM_EXTENSION, TIP_EXTENSION,
};
use crate::postings::writer::PostingsWriter;
use crate::postings::PostingsIterator;
use crate::storage::checksum::{write_footer, write_header};
use crate::storage::structured::StructWriter;
use crate::storage::{segment_file_name, Storage, StorageLock};
use crate::util::int_to_byte4;

/// Index writer configuration.
pub struct WriterConfig {
    /// Analyzer applied to tokenized text fields.
    pub analyzer: Arc<dyn Analyzer>,
    /// Buffered documents that trigger an automatic flush.
    pub max_buffered_docs: usize,
}

impl WriterConfig {
    /// Config with the given analyzer and default buffering.
    pub fn new(analyzer: Arc<dyn Analyzer>) -> Self {
        WriterConfig {
            analyzer,
            max_buffered_docs: 1024,
        }
    }
}

/// One term's buffered postings.
#[derive(Debug, Default)]
struct RamPosting {
    docs: Vec<(u32, u32)>,
    positions: Vec<Vec<u32>>,
    offsets: Vec<Vec<(u32, u32)>>,
    payloads: Vec<Vec<Option<Vec<u8>>>>,
}

impl RamPosting {
    fn add_occurrence(
        &mut self,
        doc: u32,
        position: u32,
        offset: Option<(u32, u32)>,
        payload: Option<Vec<u8>>,
    ) {
        if self.docs.last().map(|&(d, _)| d) != Some(doc) {
            self.docs.push((doc, 0));
            self.positions.push(Vec::new());
            self.offsets.push(Vec::new());
            self.payloads.push(Vec::new());
        }
        let last = self.docs.len() - 1;
        self.docs[last].1 += 1;
        self.positions[last].push(position);
        if let Some(offset) = offset {
            self.offsets[last].push(offset);
        }
        self.payloads[last].push(payload);
    }
}

/// One field's buffered inverted index.
#[derive(Debug, Default)]
struct RamField {
    terms: BTreeMap<Vec<u8>, RamPosting>,
    lengths: AHashMap<u32, u32>,
}

/// Buffered doc-values for one field.
#[derive(Debug)]
enum DvBuffer {
    Numeric(AHashMap<u32, i64>),
    Binary(AHashMap<u32, Vec<u8>>),
    Sorted(AHashMap<u32, Vec<u8>>),
    SortedNumeric(AHashMap<u32, Vec<i64>>),
    SortedSet(AHashMap<u32, Vec<Vec<u8>>>),
}

#[derive(Default)]
struct DocBuffer {
    field_infos: FieldInfosBuilder,
    fields: AHashMap<String, RamField>,
    stored: Vec<Document>,
    doc_values: AHashMap<String, DvBuffer>,
    points: AHashMap<String, Vec<(Vec<u8>, u32)>>,
    vectors: Vec<Vec<FieldVector>>,
    num_docs: u32,
}

/// The single writer over one directory.
pub struct IndexWriter {
    storage: Arc<dyn Storage>,
    config: WriterConfig,
    segment_infos: SegmentInfos,
    buffer: DocBuffer,
    pending_deletes: Vec<(String, Vec<u8>, u32)>,
    lock: Option<Box<dyn StorageLock>>,
    closed: bool,
}

impl IndexWriter {
    /// Open (or create) an index in `storage`, taking the write lock.
    pub fn new(storage: Arc<dyn Storage>, config: WriterConfig) -> Result<Self> {
        let lock = storage.obtain_write_lock()?;
        let segment_infos = SegmentInfos::read_latest(storage.as_ref())?;
        Ok(IndexWriter {
            storage,
            config,
            segment_infos,
            buffer: DocBuffer::default(),
            pending_deletes: Vec::new(),
            lock: Some(lock),
            closed: false,
        })
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(FalxError::already_closed("index writer"));
        }
        Ok(())
    }

    /// Number of documents buffered but not yet flushed.
    pub fn buffered_docs(&self) -> u32 {
        self.buffer.num_docs
    }

    /// Add one document. May trigger an automatic flush.
    pub fn add_document(&mut self, doc: Document) -> Result<()> {
        self.check_open()?;
        let doc_id = self.buffer.num_docs;
        let mut doc_vectors: Vec<FieldVector> = Vec::new();

        // accumulated positions per field allow multi-valued fields to
        // continue where the previous value stopped
        let mut field_positions: AHashMap<String, i64> = AHashMap::new();
        let mut field_offsets: AHashMap<String, u32> = AHashMap::new();

        for field in &doc.fields {
            let options = field.field_type.index_options;
            self.buffer.field_infos.add_or_update(
                &field.name,
                options,
                field.field_type.doc_values,
                false,
            )?;

            if options != IndexOptions::None {
                let text = field.value.as_text().ok_or_else(|| {
                    FalxError::invalid_argument(format!(
                        "indexed field {} must have a text value",
                        field.name
                    ))
                })?;
                self.invert_field(
                    doc_id,
                    field.name.clone(),
                    text,
                    field.field_type.tokenized,
                    options,
                    field.field_type.term_vectors,
                    &mut doc_vectors,
                    &mut field_positions,
                    &mut field_offsets,
                )?;
            }

            if field.field_type.doc_values != DocValuesType::None {
                self.buffer_doc_values(doc_id, field)?;
            }

            if field.field_type.point_dimension_count > 0 {
                let packed = match &field.value {
                    FieldValue::Int(v) => pack_i64(*v),
                    FieldValue::Binary(bytes) => bytes.clone(),
                    other => {
                        return Err(FalxError::invalid_argument(format!(
                            "field {} cannot index {other:?} as a point",
                            field.name
                        )))
                    }
                };
                self.buffer.field_infos.set_point_dimensions(
                    &field.name,
                    field.field_type.point_dimension_count,
                    field.field_type.point_dimension_count,
                    field.field_type.point_num_bytes,
                )?;
                self.buffer
                    .points
                    .entry(field.name.clone())
                    .or_default()
                    .push((packed, doc_id));
            }
        }

        self.buffer.vectors.push(doc_vectors);
        self.buffer.stored.push(doc);
        self.buffer.num_docs += 1;

        if self.buffer.num_docs as usize >= self.config.max_buffered_docs {
            self.flush()?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn invert_field(
        &mut self,
        doc_id: u32,
        name: String,
        text: &str,
        tokenized: bool,
        options: IndexOptions,
        record_vectors: bool,
        doc_vectors: &mut Vec<FieldVector>,
        field_positions: &mut AHashMap<String, i64>,
        field_offsets: &mut AHashMap<String, u32>,
    ) -> Result<()> {
        let has_positions = options.has_positions();
        let has_offsets = options.has_offsets();

        let mut position = *field_positions.get(&name).unwrap_or(&-1);
        if position >= 0 {
            position += self.config.analyzer.position_increment_gap(&name) as i64;
        }
        let offset_base = *field_offsets.get(&name).unwrap_or(&0);

        let mut token_count = 0u32;
        let mut has_payloads = false;
        let mut vector_terms: BTreeMap<Vec<u8>, VectorTerm> = BTreeMap::new();

        let tokens: Vec<crate::analysis::Token> = if tokenized {
            self.config.analyzer.token_stream(&name, text)?.collect()
        } else {
            vec![crate::analysis::Token::new(text, 0, text.len() as u32)]
        };
        let mut end_offset = offset_base;
        for token in tokens {
            position += token.position_increment.max(if token_count == 0 { 1 } else { 0 }) as i64;
            let pos = position as u32;
            let start = offset_base + token.start_offset;
            let end = offset_base + token.end_offset;
            end_offset = end;
            has_payloads |= token.payload.is_some();

            let term = token.text.as_bytes().to_vec();
            let ram_field = self.buffer.fields.entry(name.clone()).or_default();
            ram_field.terms.entry(term.clone()).or_default().add_occurrence(
                doc_id,
                pos,
                if has_offsets { Some((start, end)) } else { None },
                token.payload.clone(),
            );
            token_count += 1;

            if record_vectors {
                let entry = vector_terms.entry(term).or_default();
                entry.freq += 1;
                if has_positions {
                    entry.positions.push(pos);
                }
                if has_offsets {
                    entry.offsets.push((start, end));
                }
            }
        }

        let ram_field = self.buffer.fields.entry(name.clone()).or_default();
        *ram_field.lengths.entry(doc_id).or_insert(0) += token_count;

        if has_payloads {
            self.buffer
                .field_infos
                .add_or_update(&name, options, DocValuesType::None, true)?;
        }

        field_positions.insert(name.clone(), position);
        field_offsets.insert(
            name.clone(),
            end_offset + self.config.analyzer.offset_gap(&name),
        );

        if record_vectors && !vector_terms.is_empty() {
            let mut terms: Vec<VectorTerm> = Vec::with_capacity(vector_terms.len());
            for (term, mut entry) in vector_terms {
                entry.term = term;
                terms.push(entry);
            }
            doc_vectors.push(FieldVector {
                field: name,
                terms,
                has_positions,
                has_offsets,
            });
        }
        Ok(())
    }

    fn buffer_doc_values(&mut self, doc_id: u32, field: &crate::document::Field) -> Result<()> {
        use DocValuesType::*;
        let name = &field.name;
        let entry = self.buffer.doc_values.entry(name.clone());
        match (field.field_type.doc_values, &field.value) {
            (Numeric, FieldValue::Int(v)) => {
                if let DvBuffer::Numeric(map) =
                    entry.or_insert_with(|| DvBuffer::Numeric(AHashMap::new()))
                {
                    map.insert(doc_id, *v);
                }
            }
            (Binary, FieldValue::Binary(bytes)) => {
                if let DvBuffer::Binary(map) =
                    entry.or_insert_with(|| DvBuffer::Binary(AHashMap::new()))
                {
                    map.insert(doc_id, bytes.clone());
                }
            }
            (Binary, FieldValue::Text(text)) => {
                if let DvBuffer::Binary(map) =
                    entry.or_insert_with(|| DvBuffer::Binary(AHashMap::new()))
                {
                    map.insert(doc_id, text.as_bytes().to_vec());
                }
            }
            (Sorted, FieldValue::Text(text)) => {
                if let DvBuffer::Sorted(map) =
                    entry.or_insert_with(|| DvBuffer::Sorted(AHashMap::new()))
                {
                    map.insert(doc_id, text.as_bytes().to_vec());
                }
            }
            (SortedNumeric, FieldValue::Int(v)) => {
                if let DvBuffer::SortedNumeric(map) =
                    entry.or_insert_with(|| DvBuffer::SortedNumeric(AHashMap::new()))
                {
                    map.entry(doc_id).or_default().push(*v);
                }
            }
            (SortedSet, FieldValue::Text(text)) => {
                if let DvBuffer::SortedSet(map) =
                    entry.or_insert_with(|| DvBuffer::SortedSet(AHashMap::new()))
                {
                    map.entry(doc_id).or_default().push(text.as_bytes().to_vec());
                }
            }
            (dv, value) => {
                return Err(FalxError::invalid_argument(format!(
                    "field {name}: doc values {dv:?} cannot hold {value:?}"
                )))
            }
        }
        Ok(())
    }

    /// Buffer a delete-by-term. The delete affects every already-flushed
    /// segment and the documents buffered before this call.
    pub fn delete_documents(&mut self, field: &str, term: &[u8]) -> Result<()> {
        self.check_open()?;
        self.pending_deletes
            .push((field.to_string(), term.to_vec(), self.buffer.num_docs));
        Ok(())
    }

    /// Flush buffered documents into a new immutable segment, first
    /// applying buffered deletes to the segments that predate them.
    ///
    /// Returns the new segment's name, or `None` if nothing was buffered.
    pub fn flush(&mut self) -> Result<Option<String>> {
        self.check_open()?;
        if self.buffer.num_docs == 0 && self.pending_deletes.is_empty() {
            return Ok(None);
        }

        // every doc in an already-flushed segment predates every pending
        // delete, so those segments take the deletes unconditionally
        self.apply_deletes()?;

        if self.buffer.num_docs == 0 {
            self.pending_deletes.clear();
            return Ok(None);
        }
        let name = self.segment_infos.next_segment_name();
        let segment_id = new_segment_id(&name, self.segment_infos.counter);

        let buffer = std::mem::take(&mut self.buffer);
        let result = self.write_segment(&name, &segment_id, &buffer);
        self.pending_deletes.clear();
        match result {
            Ok(entry) => {
                self.segment_infos.segments.push(entry);
                Ok(Some(name))
            }
            Err(e) => {
                // abort: drop everything the half-written segment created
                for file in self.storage.list_all()? {
                    if file.starts_with(&format!("{name}.")) || file.starts_with(&format!("{name}_"))
                    {
                        let _ = self.storage.delete_file(&file);
                    }
                }
                Err(e)
            }
        }
    }

    fn write_segment(
        &self,
        name: &str,
        segment_id: &[u8; 16],
        buffer: &DocBuffer,
    ) -> Result<SegmentCommitInfo> {
        let storage = self.storage.as_ref();
        let max_doc = buffer.num_docs;
        let field_infos = buffer.field_infos.finish()?;
        let mut files: Vec<String> = Vec::new();

        // field infos
        let inf_name = segment_file_name(name, "", FIELD_INFOS_EXTENSION);
        {
            let out = storage.create_output(&inf_name)?;
            let mut writer = StructWriter::new(out);
            field_infos.write(&mut writer, segment_id)?;
            writer.close()?;
        }
        files.push(inf_name);

        // stored fields
        let fld_name = segment_file_name(name, "", STORED_FIELDS_EXTENSION);
        {
            let mut writer = StoredFieldsWriter::new(storage.create_output(&fld_name)?, segment_id)?;
            for doc in &buffer.stored {
                writer.write_document(doc, &field_infos)?;
            }
            writer.finish()?;
        }
        files.push(fld_name);

        // doc values and norms
        let dvd_name = segment_file_name(name, "", DOC_VALUES_EXTENSION);
        {
            let mut writer =
                DocValuesWriter::new(storage.create_output(&dvd_name)?, segment_id, max_doc)?;
            self.write_doc_values(&mut writer, buffer, max_doc)?;
            writer.finish()?;
        }
        files.push(dvd_name);

        // points
        if !buffer.points.is_empty() {
            let dat_name = segment_file_name(name, "", POINTS_DATA_EXTENSION);
            let idx_name = segment_file_name(name, "", POINTS_INDEX_EXTENSION);
            let mut writer = PointsWriter::new(storage.create_output(&dat_name)?, segment_id)?;
            let mut field_names: Vec<&String> = buffer.points.keys().collect();
            field_names.sort();
            for field_name in field_names {
                let info = field_infos.get(field_name).ok_or_else(|| {
                    FalxError::invalid_argument(format!("unregistered point field {field_name}"))
                })?;
                writer.write_field(
                    field_name,
                    info.point_dimension_count,
                    info.point_num_bytes,
                    buffer.points[field_name].clone(),
                )?;
            }
            writer.finish(storage.create_output(&idx_name)?, segment_id)?;
            files.push(dat_name);
            files.push(idx_name);
        }

        // term vectors
        if buffer.vectors.iter().any(|v| !v.is_empty()) {
            let vec_name = segment_file_name(name, "", TERM_VECTORS_EXTENSION);
            let mut writer = TermVectorsWriter::new(storage.create_output(&vec_name)?, segment_id)?;
            for doc_vectors in &buffer.vectors {
                writer.write_document(doc_vectors)?;
            }
            writer.finish()?;
            files.push(vec_name);
        }

        // postings and terms dictionary
        let postings_files = self.write_postings(name, segment_id, buffer, &field_infos)?;
        files.extend(postings_files);

        // deletes that arrived while these docs were buffered
        let mut del_gen = 0u64;
        let mut live = FixedBitSet::full(max_doc);
        let mut any_deleted = false;
        for (field, term, seq) in &self.pending_deletes {
            if let Some(ram_field) = buffer.fields.get(field) {
                if let Some(posting) = ram_field.terms.get(term) {
                    for &(doc, _) in &posting.docs {
                        if doc < *seq && live.get(doc) {
                            live.clear(doc);
                            any_deleted = true;
                        }
                    }
                }
            }
        }
        if any_deleted {
            del_gen = 1;
            let liv_name = write_live_docs(storage, name, segment_id, del_gen, &live)?;
            files.push(liv_name);
        }

        // segment info, written last so it can list every file
        let si_name = segment_file_name(name, "", SEGMENT_INFO_EXTENSION);
        let mut si_files: Vec<String> = files
            .iter()
            .filter(|f| !f.ends_with(".liv"))
            .cloned()
            .collect();
        si_files.push(si_name.clone());
        si_files.sort();
        let mut diagnostics = BTreeMap::new();
        diagnostics.insert("source".to_string(), "flush".to_string());
        diagnostics.insert("max_doc".to_string(), max_doc.to_string());
        let field_names: Vec<&str> = field_infos.iter().map(|f| f.name.as_str()).collect();
        diagnostics.insert("fields".to_string(), serde_json::to_string(&field_names)?);
        let si = SegmentInfo {
            name: name.to_string(),
            max_doc,
            id: *segment_id,
            version: SEGMENT_VERSION,
            files: si_files,
            diagnostics,
        };
        {
            let out = storage.create_output(&si_name)?;
            let mut writer = StructWriter::new(out);
            si.write(&mut writer)?;
            writer.close()?;
        }
        files.push(si_name);
        files.sort();

        Ok(SegmentCommitInfo {
            name: name.to_string(),
            codec: CODEC_NAME.to_string(),
            del_gen,
            field_infos_gen: 0,
            dv_gen: 0,
            soft_del_count: 0,
            id: *segment_id,
            files,
        })
    }

    fn write_doc_values(
        &self,
        writer: &mut DocValuesWriter,
        buffer: &DocBuffer,
        max_doc: u32,
    ) -> Result<()> {
        let mut names: Vec<&String> = buffer.doc_values.keys().collect();
        names.sort();
        for name in names {
            match &buffer.doc_values[name] {
                DvBuffer::Numeric(map) => {
                    let values: Vec<Option<i64>> =
                        (0..max_doc).map(|d| map.get(&d).copied()).collect();
                    writer.add_numeric_field(name, &values)?;
                }
                DvBuffer::Binary(map) => {
                    let values: Vec<Option<Vec<u8>>> =
                        (0..max_doc).map(|d| map.get(&d).cloned()).collect();
                    writer.add_binary_field(name, &values)?;
                }
                DvBuffer::Sorted(map) => {
                    let values: Vec<Option<Vec<u8>>> =
                        (0..max_doc).map(|d| map.get(&d).cloned()).collect();
                    writer.add_sorted_field(name, &values)?;
                }
                DvBuffer::SortedNumeric(map) => {
                    let values: Vec<Vec<i64>> = (0..max_doc)
                        .map(|d| map.get(&d).cloned().unwrap_or_default())
                        .collect();
                    writer.add_sorted_numeric_field(name, &values)?;
                }
                DvBuffer::SortedSet(map) => {
                    let values: Vec<Vec<Vec<u8>>> = (0..max_doc)
                        .map(|d| map.get(&d).cloned().unwrap_or_default())
                        .collect();
                    writer.add_sorted_set_field(name, &values)?;
                }
            }
        }

        // norms for every indexed field
        let mut field_names: Vec<&String> = buffer.fields.keys().collect();
        field_names.sort();
        for name in field_names {
            let ram_field = &buffer.fields[name];
            let norms: Vec<Option<u8>> = (0..max_doc)
                .map(|d| ram_field.lengths.get(&d).map(|&len| int_to_byte4(len)))
                .collect();
            writer.add_norms(name, &norms)?;
        }
        Ok(())
    }

    fn write_postings(
        &self,
        name: &str,
        segment_id: &[u8; 16],
        buffer: &DocBuffer,
        field_infos: &FieldInfos,
    ) -> Result<Vec<String>> {
        let storage = self.storage.as_ref();
        let max_doc = buffer.num_docs;
        let mut files = Vec::new();

        let any_positions = field_infos.iter().any(|f| f.index_options.has_positions());
        let any_pay = field_infos
            .iter()
            .any(|f| f.index_options.has_offsets() || f.has_payloads);

        let doc_name = segment_file_name(name, "", DOC_EXTENSION);
        let mut doc_out = StructWriter::new(storage.create_output(&doc_name)?);
        write_header(&mut doc_out, POSTINGS_DOC_CODEC, POSTINGS_VERSION, segment_id, "")?;
        files.push(doc_name);

        let pos_out = if any_positions {
            let pos_name = segment_file_name(name, "", POS_EXTENSION);
            let mut out = StructWriter::new(storage.create_output(&pos_name)?);
            write_header(&mut out, POSTINGS_POS_CODEC, POSTINGS_VERSION, segment_id, "")?;
            files.push(pos_name);
            Some(out)
        } else {
            None
        };
        let pay_out = if any_pay {
            let pay_name = segment_file_name(name, "", PAY_EXTENSION);
            let mut out = StructWriter::new(storage.create_output(&pay_name)?);
            write_header(&mut out, POSTINGS_PAY_CODEC, POSTINGS_VERSION, segment_id, "")?;
            files.push(pay_name);
            Some(out)
        } else {
            None
        };

        let tim_name = segment_file_name(name, "", TIM_EXTENSION);
        let tip_name = segment_file_name(name, "", TIP_EXTENSION);
        let mut terms_writer = TermsWriter::new(
            storage.create_output(&tim_name)?,
            storage.create_output(&tip_name)?,
            segment_id,
        )?;
        files.push(tim_name);
        files.push(tip_name);

        let mut postings_writer = PostingsWriter::new(doc_out, pos_out, pay_out, max_doc);

        let mut indexed_fields: Vec<&crate::index::field_infos::FieldInfo> = field_infos
            .iter()
            .filter(|f| f.index_options != IndexOptions::None)
            .collect();
        indexed_fields.sort_by_key(|f| f.number);
        let mut fields_written = 0u32;
        for info in indexed_fields {
            let ram_field = match buffer.fields.get(&info.name) {
                Some(ram_field) => ram_field,
                None => continue,
            };
            let flags = info.postings_flags();
            postings_writer.set_field(flags);
            terms_writer.start_field(info.number, flags)?;

            for (term, posting) in &ram_field.terms {
                postings_writer.start_term()?;
                for (i, &(doc, freq)) in posting.docs.iter().enumerate() {
                    let length = ram_field.lengths.get(&doc).copied().unwrap_or(1);
                    postings_writer.start_doc(doc, freq, int_to_byte4(length))?;
                    if flags.has_positions {
                        for (j, &pos) in posting.positions[i].iter().enumerate() {
                            let offsets = if flags.has_offsets {
                                posting.offsets[i].get(j).copied()
                            } else {
                                None
                            };
                            let payload = if flags.has_payloads {
                                posting.payloads[i].get(j).and_then(|p| p.as_deref())
                            } else {
                                None
                            };
                            postings_writer.add_position(pos, offsets, payload)?;
                        }
                    }
                    postings_writer.finish_doc()?;
                }
                let meta = postings_writer.finish_term()?;
                terms_writer.write_term(term, &meta)?;
            }
            terms_writer.finish_field(ram_field.lengths.len() as u32)?;
            fields_written += 1;
        }
        terms_writer.finish(fields_written)?;

        let (mut doc_out, pos_out, pay_out) = postings_writer.into_outputs();
        write_footer(&mut doc_out)?;
        doc_out.close()?;
        if let Some(mut out) = pos_out {
            write_footer(&mut out)?;
            out.close()?;
        }
        if let Some(mut out) = pay_out {
            write_footer(&mut out)?;
            out.close()?;
        }
        Ok(files)
    }

    /// Flush and durably publish a new commit point.
    pub fn commit(&mut self) -> Result<()> {
        self.check_open()?;
        self.flush()?;
        self.segment_infos.commit(self.storage.as_ref())?;
        self.delete_unused_files()?;
        Ok(())
    }

    /// Apply buffered delete terms to the already-flushed segments.
    fn apply_deletes(&mut self) -> Result<()> {
        if self.pending_deletes.is_empty() {
            return Ok(());
        }
        let deletes = self.pending_deletes.clone();
        for entry in &mut self.segment_infos.segments {
            let reader = SegmentReader::open(self.storage.clone(), entry)?;
            let max_doc = reader.max_doc();
            let mut live = reader
                .live_docs()
                .cloned()
                .unwrap_or_else(|| FixedBitSet::full(max_doc));
            let mut any = false;
            for (field, term, _seq) in &deletes {
                if let Some(mut postings) = reader.postings(field, term, false)? {
                    loop {
                        let doc = postings.next_doc()?;
                        if doc == crate::postings::NO_MORE_DOCS {
                            break;
                        }
                        if live.get(doc) {
                            live.clear(doc);
                            any = true;
                        }
                    }
                }
            }
            if any {
                entry.del_gen += 1;
                let liv_name = write_live_docs(
                    self.storage.as_ref(),
                    &entry.name,
                    &entry.id,
                    entry.del_gen,
                    &live,
                )?;
                entry.files.retain(|f| !f.ends_with(".liv"));
                entry.files.push(liv_name);
                entry.files.sort();
            }
        }
        Ok(())
    }

    /// Delete files no commit point references.
    fn delete_unused_files(&self) -> Result<()> {
        let referenced: std::collections::HashSet<String> =
            self.segment_infos.referenced_files().into_iter().collect();
        for file in self.storage.list_all()? {
            if file == "write.lock" || file.starts_with("pending_segments_") {
                continue;
            }
            if !referenced.contains(&file) {
                let _ = self.storage.delete_file(&file);
            }
        }
        Ok(())
    }

    /// Discard buffered documents and deletes without touching disk.
    pub fn rollback(&mut self) -> Result<()> {
        self.check_open()?;
        self.buffer = DocBuffer::default();
        self.pending_deletes.clear();
        Ok(())
    }

    /// Release the write lock. Buffered, uncommitted documents are lost.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        if let Some(mut lock) = self.lock.take() {
            lock.release()?;
        }
        Ok(())
    }
}

/// Derive a 16-byte segment id from the name, a counter and the address of
/// this writer invocation; ids only need to be unique within the directory.
fn new_segment_id(name: &str, counter: u64) -> [u8; 16] {
    use std::hash::{Hash, Hasher};
    let mut id = [0u8; 16];
    let mut hasher = ahash::AHasher::default();
    name.hash(&mut hasher);
    counter.hash(&mut hasher);
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
        .hash(&mut hasher);
    let a = hasher.finish();
    counter.wrapping_mul(0x9E37_79B9_7F4A_7C15).hash(&mut hasher);
    let b = hasher.finish();
    id[..8].copy_from_slice(&a.to_le_bytes());
    id[8..].copy_from_slice(&b.to_le_bytes());
    id
}

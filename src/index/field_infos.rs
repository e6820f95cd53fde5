//! Per-field schema recorded with every segment (`.inf`).
//!
//! A field's number is stable within a segment; its index options may only
//! be upgraded or stay equal across documents, never downgraded.

use ahash::AHashMap;

use crate::error::{FalxError, Result};
use crate::postings::writer::PostingsFlags;
use crate::storage::checksum::{check_footer, check_header, write_footer, write_header};
use crate::storage::structured::{StructReader, StructWriter};
use crate::storage::{StorageInput, StorageOutput};

/// Codec name for the field-infos file.
pub const FIELD_INFOS_CODEC: &str = "FalxFieldInfos";
/// Current field-infos format version.
pub const FIELD_INFOS_VERSION: u32 = 1;
/// Extension of the field-infos file.
pub const FIELD_INFOS_EXTENSION: &str = "inf";

/// How much postings detail a field records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum IndexOptions {
    /// Not indexed.
    #[default]
    None,
    /// Documents only.
    Docs,
    /// Documents and term frequencies.
    DocsAndFreqs,
    /// Documents, frequencies and positions.
    DocsAndFreqsAndPositions,
    /// Documents, frequencies, positions and character offsets.
    DocsAndFreqsAndPositionsAndOffsets,
}

impl IndexOptions {
    /// Whether term frequencies are recorded.
    pub fn has_freqs(&self) -> bool {
        *self >= IndexOptions::DocsAndFreqs
    }

    /// Whether positions are recorded.
    pub fn has_positions(&self) -> bool {
        *self >= IndexOptions::DocsAndFreqsAndPositions
    }

    /// Whether offsets are recorded.
    pub fn has_offsets(&self) -> bool {
        *self >= IndexOptions::DocsAndFreqsAndPositionsAndOffsets
    }

    fn to_byte(self) -> u8 {
        match self {
            IndexOptions::None => 0,
            IndexOptions::Docs => 1,
            IndexOptions::DocsAndFreqs => 2,
            IndexOptions::DocsAndFreqsAndPositions => 3,
            IndexOptions::DocsAndFreqsAndPositionsAndOffsets => 4,
        }
    }

    fn from_byte(b: u8) -> Result<Self> {
        Ok(match b {
            0 => IndexOptions::None,
            1 => IndexOptions::Docs,
            2 => IndexOptions::DocsAndFreqs,
            3 => IndexOptions::DocsAndFreqsAndPositions,
            4 => IndexOptions::DocsAndFreqsAndPositionsAndOffsets,
            _ => return Err(FalxError::corrupt(format!("bad index options byte {b}"))),
        })
    }
}

/// Doc-values column type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocValuesType {
    /// No doc values.
    #[default]
    None,
    /// One i64 per document.
    Numeric,
    /// One byte slice per document.
    Binary,
    /// One ordinal per document into a sorted value dictionary.
    Sorted,
    /// Several i64s per document.
    SortedNumeric,
    /// Several ordinals per document into a sorted value dictionary.
    SortedSet,
}

impl DocValuesType {
    fn to_byte(self) -> u8 {
        match self {
            DocValuesType::None => 0,
            DocValuesType::Numeric => 1,
            DocValuesType::Binary => 2,
            DocValuesType::Sorted => 3,
            DocValuesType::SortedNumeric => 4,
            DocValuesType::SortedSet => 5,
        }
    }

    fn from_byte(b: u8) -> Result<Self> {
        Ok(match b {
            0 => DocValuesType::None,
            1 => DocValuesType::Numeric,
            2 => DocValuesType::Binary,
            3 => DocValuesType::Sorted,
            4 => DocValuesType::SortedNumeric,
            5 => DocValuesType::SortedSet,
            _ => return Err(FalxError::corrupt(format!("bad doc-values byte {b}"))),
        })
    }
}

/// Everything the codec knows about one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    /// Field name.
    pub name: String,
    /// Stable per-segment field number.
    pub number: u32,
    /// Postings detail level.
    pub index_options: IndexOptions,
    /// Whether a one-byte length norm is stored per document.
    pub has_norms: bool,
    /// Whether postings carry payloads.
    pub has_payloads: bool,
    /// Doc-values column type.
    pub doc_values_type: DocValuesType,
    /// Number of point dimensions (0 = no points).
    pub point_dimension_count: u32,
    /// Number of dimensions used by the point index.
    pub point_index_dimension_count: u32,
    /// Bytes per point dimension.
    pub point_num_bytes: u32,
    /// Whether this field drives soft deletes.
    pub soft_deletes: bool,
}

impl FieldInfo {
    /// The postings feature set implied by this field's options.
    pub fn postings_flags(&self) -> PostingsFlags {
        PostingsFlags {
            has_freqs: self.index_options.has_freqs(),
            has_positions: self.index_options.has_positions(),
            has_offsets: self.index_options.has_offsets(),
            has_payloads: self.has_payloads,
        }
    }
}

/// The set of fields of one segment, addressable by name or number.
#[derive(Debug, Clone, Default)]
pub struct FieldInfos {
    by_number: Vec<FieldInfo>,
    by_name: AHashMap<String, usize>,
}

impl FieldInfos {
    /// Build from a list of fields (numbers must be dense from 0).
    pub fn new(mut fields: Vec<FieldInfo>) -> Result<Self> {
        fields.sort_by_key(|f| f.number);
        for (i, field) in fields.iter().enumerate() {
            if field.number as usize != i {
                return Err(FalxError::corrupt(format!(
                    "field numbers not dense: {} at index {i}",
                    field.number
                )));
            }
        }
        let by_name = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect();
        Ok(FieldInfos {
            by_number: fields,
            by_name,
        })
    }

    /// Look up a field by name.
    pub fn get(&self, name: &str) -> Option<&FieldInfo> {
        self.by_name.get(name).map(|&i| &self.by_number[i])
    }

    /// Look up a field by number.
    pub fn get_by_number(&self, number: u32) -> Option<&FieldInfo> {
        self.by_number.get(number as usize)
    }

    /// Iterate fields in number order.
    pub fn iter(&self) -> impl Iterator<Item = &FieldInfo> {
        self.by_number.iter()
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.by_number.len()
    }

    /// Whether there are no fields.
    pub fn is_empty(&self) -> bool {
        self.by_number.is_empty()
    }

    /// Write the `.inf` file.
    pub fn write<W: StorageOutput>(
        &self,
        writer: &mut StructWriter<W>,
        segment_id: &[u8; 16],
    ) -> Result<()> {
        write_header(writer, FIELD_INFOS_CODEC, FIELD_INFOS_VERSION, segment_id, "")?;
        writer.write_vint(self.by_number.len() as u32)?;
        for field in &self.by_number {
            writer.write_string(&field.name)?;
            writer.write_vint(field.number)?;
            writer.write_u8(field.index_options.to_byte())?;
            writer.write_u8(field.doc_values_type.to_byte())?;
            let mut bits = 0u8;
            if field.has_norms {
                bits |= 1;
            }
            if field.has_payloads {
                bits |= 2;
            }
            if field.soft_deletes {
                bits |= 4;
            }
            writer.write_u8(bits)?;
            writer.write_vint(field.point_dimension_count)?;
            writer.write_vint(field.point_index_dimension_count)?;
            writer.write_vint(field.point_num_bytes)?;
        }
        write_footer(writer)
    }

    /// Read the `.inf` file.
    pub fn read<R: StorageInput>(
        reader: &mut StructReader<R>,
        segment_id: &[u8; 16],
        resource: &str,
    ) -> Result<Self> {
        check_header(
            reader,
            FIELD_INFOS_CODEC,
            FIELD_INFOS_VERSION,
            FIELD_INFOS_VERSION,
            Some(segment_id),
            resource,
        )?;
        let count = reader.read_vint()?;
        let mut fields = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name = reader.read_string()?;
            let number = reader.read_vint()?;
            let index_options = IndexOptions::from_byte(reader.read_u8()?)?;
            let doc_values_type = DocValuesType::from_byte(reader.read_u8()?)?;
            let bits = reader.read_u8()?;
            let point_dimension_count = reader.read_vint()?;
            let point_index_dimension_count = reader.read_vint()?;
            let point_num_bytes = reader.read_vint()?;
            fields.push(FieldInfo {
                name,
                number,
                index_options,
                has_norms: bits & 1 != 0,
                has_payloads: bits & 2 != 0,
                doc_values_type,
                point_dimension_count,
                point_index_dimension_count,
                point_num_bytes,
                soft_deletes: bits & 4 != 0,
            });
        }
        check_footer(reader, resource)?;
        FieldInfos::new(fields)
    }
}

/// Accumulates field infos while documents are being indexed; enforces the
/// upgrade-only rule on index options.
#[derive(Debug, Default)]
pub struct FieldInfosBuilder {
    fields: Vec<FieldInfo>,
    by_name: AHashMap<String, usize>,
}

impl FieldInfosBuilder {
    /// New empty builder.
    pub fn new() -> Self {
        FieldInfosBuilder::default()
    }

    /// Register `name` with the given options, allocating a number on first
    /// sight. Index options may upgrade but never downgrade.
    pub fn add_or_update(
        &mut self,
        name: &str,
        index_options: IndexOptions,
        doc_values_type: DocValuesType,
        has_payloads: bool,
    ) -> Result<&mut FieldInfo> {
        match self.by_name.get(name) {
            Some(&i) => {
                let field = &mut self.fields[i];
                if index_options < field.index_options && index_options != IndexOptions::None {
                    return Err(FalxError::invalid_argument(format!(
                        "cannot downgrade index options of field {name} from {:?} to {index_options:?}",
                        field.index_options
                    )));
                }
                if index_options > field.index_options {
                    field.index_options = index_options;
                    field.has_norms = index_options != IndexOptions::None;
                }
                if doc_values_type != DocValuesType::None {
                    field.doc_values_type = doc_values_type;
                }
                field.has_payloads |= has_payloads;
                Ok(field)
            }
            None => {
                let number = self.fields.len() as u32;
                self.fields.push(FieldInfo {
                    name: name.to_string(),
                    number,
                    index_options,
                    has_norms: index_options != IndexOptions::None,
                    has_payloads,
                    doc_values_type,
                    point_dimension_count: 0,
                    point_index_dimension_count: 0,
                    point_num_bytes: 0,
                    soft_deletes: false,
                });
                let i = self.fields.len() - 1;
                self.by_name.insert(name.to_string(), i);
                Ok(&mut self.fields[i])
            }
        }
    }

    /// Set point dimensions for a field already registered.
    pub fn set_point_dimensions(
        &mut self,
        name: &str,
        dims: u32,
        index_dims: u32,
        num_bytes: u32,
    ) -> Result<()> {
        let i = *self
            .by_name
            .get(name)
            .ok_or_else(|| FalxError::invalid_argument(format!("unknown field {name}")))?;
        let field = &mut self.fields[i];
        field.point_dimension_count = dims;
        field.point_index_dimension_count = index_dims;
        field.point_num_bytes = num_bytes;
        Ok(())
    }

    /// Snapshot the accumulated fields.
    pub fn finish(&self) -> Result<FieldInfos> {
        FieldInfos::new(self.fields.clone())
    }
}

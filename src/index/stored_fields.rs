//! Stored fields (`.fld`), line-oriented.
//!
//! The body is plain text between a binary codec header and CRC footer:
//!
//! ```text
//! doc 0
//!   field 2
//!     name title
//!     type string
//!     value a quick brown fox
//! doc 1
//!   ...
//! END
//! ```
//!
//! Values escape backslash and newline so every record stays one line.

use crate::document::{Document, Field, FieldType, FieldValue};
use crate::error::{FalxError, Result};
use crate::index::field_infos::FieldInfos;
use crate::storage::checksum::{check_footer, check_header, write_footer, write_header, FOOTER_LENGTH};
use crate::storage::structured::{StructReader, StructWriter};
use crate::storage::{StorageInput, StorageOutput};

/// Codec name of the stored-fields file.
pub const STORED_FIELDS_CODEC: &str = "FalxStoredFields";
/// Current stored-fields format version.
pub const STORED_FIELDS_VERSION: u32 = 1;
/// Extension of the stored-fields file.
pub const STORED_FIELDS_EXTENSION: &str = "fld";

const DOC: &str = "doc ";
const FIELD: &str = "  field ";
const NAME: &str = "    name ";
const TYPE: &str = "    type ";
const VALUE: &str = "    value ";
const END: &str = "END";

const TYPE_STRING: &str = "string";
const TYPE_BINARY: &str = "binary";
const TYPE_INT: &str = "int";
const TYPE_DOUBLE: &str = "double";

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\n', "\\n")
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('\\') => out.push('\\'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

fn from_hex(text: &str) -> Result<Vec<u8>> {
    if text.len() % 2 != 0 {
        return Err(FalxError::corrupt("odd-length hex value"));
    }
    let mut out = Vec::with_capacity(text.len() / 2);
    for chunk in text.as_bytes().chunks(2) {
        let hi = (chunk[0] as char)
            .to_digit(16)
            .ok_or_else(|| FalxError::corrupt("bad hex digit"))?;
        let lo = (chunk[1] as char)
            .to_digit(16)
            .ok_or_else(|| FalxError::corrupt("bad hex digit"))?;
        out.push((hi * 16 + lo) as u8);
    }
    Ok(out)
}

/// Writes the stored fields of one segment.
pub struct StoredFieldsWriter {
    out: StructWriter<Box<dyn StorageOutput>>,
    num_docs: u32,
}

impl StoredFieldsWriter {
    /// Open a writer over a fresh `.fld` output.
    pub fn new(out: Box<dyn StorageOutput>, segment_id: &[u8; 16]) -> Result<Self> {
        let mut out = StructWriter::new(out);
        write_header(&mut out, STORED_FIELDS_CODEC, STORED_FIELDS_VERSION, segment_id, "")?;
        Ok(StoredFieldsWriter { out, num_docs: 0 })
    }

    fn line(&mut self, text: &str) -> Result<()> {
        self.out.write_raw(text.as_bytes())?;
        self.out.write_raw(b"\n")
    }

    /// Write one document's stored fields, in field order.
    pub fn write_document(&mut self, doc: &Document, field_infos: &FieldInfos) -> Result<()> {
        self.line(&format!("{DOC}{}", self.num_docs))?;
        for field in &doc.fields {
            if !field.field_type.stored {
                continue;
            }
            let number = field_infos
                .get(&field.name)
                .map(|info| info.number)
                .ok_or_else(|| {
                    FalxError::invalid_argument(format!("stored field {} not registered", field.name))
                })?;
            self.line(&format!("{FIELD}{number}"))?;
            self.line(&format!("{NAME}{}", field.name))?;
            match &field.value {
                FieldValue::Text(text) => {
                    self.line(&format!("{TYPE}{TYPE_STRING}"))?;
                    self.line(&format!("{VALUE}{}", escape(text)))?;
                }
                FieldValue::Binary(bytes) => {
                    self.line(&format!("{TYPE}{TYPE_BINARY}"))?;
                    self.line(&format!("{VALUE}{}", to_hex(bytes)))?;
                }
                FieldValue::Int(value) => {
                    self.line(&format!("{TYPE}{TYPE_INT}"))?;
                    self.line(&format!("{VALUE}{value}"))?;
                }
                FieldValue::Float(value) => {
                    self.line(&format!("{TYPE}{TYPE_DOUBLE}"))?;
                    self.line(&format!("{VALUE}{value}"))?;
                }
            }
        }
        self.num_docs += 1;
        Ok(())
    }

    /// Write the `END` marker and footer, and close the file.
    pub fn finish(mut self) -> Result<()> {
        self.line(END)?;
        write_footer(&mut self.out)?;
        self.out.close()
    }
}

/// Reads stored fields back as [`Document`]s.
pub struct StoredFieldsReader {
    lines: Vec<String>,
    doc_starts: Vec<usize>,
}

impl StoredFieldsReader {
    /// Load and index the `.fld` file.
    pub fn open(
        input: Box<dyn StorageInput>,
        segment_id: &[u8; 16],
        resource: &str,
    ) -> Result<Self> {
        let mut reader = StructReader::new(input);
        check_header(
            &mut reader,
            STORED_FIELDS_CODEC,
            STORED_FIELDS_VERSION,
            STORED_FIELDS_VERSION,
            Some(segment_id),
            resource,
        )?;
        let body_len = reader
            .len()
            .checked_sub(reader.position() + FOOTER_LENGTH)
            .ok_or_else(|| FalxError::corrupt(format!("{resource} too short")))?;
        let body = reader.read_raw(body_len as usize)?;
        check_footer(&mut reader, resource)?;

        let text = String::from_utf8(body)
            .map_err(|e| FalxError::corrupt(format!("{resource} not UTF-8: {e}")))?;
        let lines: Vec<String> = text.lines().map(str::to_string).collect();
        match lines.last() {
            Some(last) if last == END => {}
            _ => return Err(FalxError::corrupt(format!("{resource} missing END marker"))),
        }

        let mut doc_starts = Vec::new();
        for (i, line) in lines.iter().enumerate() {
            if line.starts_with(DOC) {
                doc_starts.push(i);
            }
        }
        Ok(StoredFieldsReader { lines, doc_starts })
    }

    /// Number of documents in the file.
    pub fn num_docs(&self) -> u32 {
        self.doc_starts.len() as u32
    }

    /// Retrieve one document's stored fields.
    pub fn document(&self, doc_id: u32) -> Result<Document> {
        let start = *self
            .doc_starts
            .get(doc_id as usize)
            .ok_or_else(|| FalxError::invalid_argument(format!("doc {doc_id} out of range")))?;
        let end = self
            .doc_starts
            .get(doc_id as usize + 1)
            .copied()
            .unwrap_or(self.lines.len() - 1); // lines.len()-1 is END

        let mut doc = Document::new();
        let mut i = start + 1;
        while i < end {
            let line = &self.lines[i];
            if !line.starts_with(FIELD) {
                return Err(FalxError::corrupt(format!("expected field line, got {line:?}")));
            }
            let name = self.expect(i + 1, NAME)?;
            let type_name = self.expect(i + 2, TYPE)?;
            let raw_value = self.expect(i + 3, VALUE)?;
            let value = match type_name {
                TYPE_STRING => FieldValue::Text(unescape(raw_value)),
                TYPE_BINARY => FieldValue::Binary(from_hex(raw_value)?),
                TYPE_INT => FieldValue::Int(raw_value.parse().map_err(|e| {
                    FalxError::corrupt(format!("bad stored int {raw_value:?}: {e}"))
                })?),
                TYPE_DOUBLE => FieldValue::Float(raw_value.parse().map_err(|e| {
                    FalxError::corrupt(format!("bad stored double {raw_value:?}: {e}"))
                })?),
                other => {
                    return Err(FalxError::corrupt(format!("unknown stored type {other:?}")))
                }
            };
            doc.add_field(Field::new(name.to_string(), value, FieldType::stored_only()));
            i += 4;
        }
        Ok(doc)
    }

    fn expect(&self, i: usize, prefix: &str) -> Result<&str> {
        let line = self
            .lines
            .get(i)
            .ok_or_else(|| FalxError::corrupt("stored fields truncated"))?;
        line.strip_prefix(prefix)
            .ok_or_else(|| FalxError::corrupt(format!("expected {prefix:?} line, got {line:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::field_infos::{DocValuesType, FieldInfosBuilder, IndexOptions};
    use crate::storage::memory::MemoryStorage;
    use crate::storage::{MemoryStorageConfig, Storage};

    fn infos() -> FieldInfos {
        let mut builder = FieldInfosBuilder::new();
        for name in ["title", "blob", "year", "score"] {
            builder
                .add_or_update(name, IndexOptions::None, DocValuesType::None, false)
                .unwrap();
        }
        builder.finish().unwrap()
    }

    #[test]
    fn test_roundtrip() {
        let storage = MemoryStorage::new(MemoryStorageConfig::default());
        let id = [2u8; 16];
        let infos = infos();
        {
            let mut writer =
                StoredFieldsWriter::new(storage.create_output("_0.fld").unwrap(), &id).unwrap();
            let doc0 = Document::new()
                .add(Field::stored("title", "hello\nworld"))
                .add(Field::new(
                    "blob",
                    FieldValue::Binary(vec![0, 255, 16]),
                    FieldType::stored_only(),
                ));
            let doc1 = Document::new()
                .add(Field::new(
                    "year",
                    FieldValue::Int(-2021),
                    FieldType::stored_only(),
                ))
                .add(Field::new(
                    "score",
                    FieldValue::Float(2.5),
                    FieldType::stored_only(),
                ));
            writer.write_document(&doc0, &infos).unwrap();
            writer.write_document(&doc1, &infos).unwrap();
            writer.finish().unwrap();
        }

        let reader =
            StoredFieldsReader::open(storage.open_input("_0.fld").unwrap(), &id, "_0.fld").unwrap();
        assert_eq!(reader.num_docs(), 2);

        let doc0 = reader.document(0).unwrap();
        assert_eq!(doc0.get_text("title"), Some("hello\nworld"));
        assert_eq!(doc0.get("blob"), Some(&FieldValue::Binary(vec![0, 255, 16])));

        let doc1 = reader.document(1).unwrap();
        assert_eq!(doc1.get("year"), Some(&FieldValue::Int(-2021)));
        assert_eq!(doc1.get("score"), Some(&FieldValue::Float(2.5)));

        assert!(reader.document(2).is_err());
    }

    #[test]
    fn test_unstored_fields_skipped() {
        let storage = MemoryStorage::new(MemoryStorageConfig::default());
        let id = [2u8; 16];
        let infos = infos();
        {
            let mut writer =
                StoredFieldsWriter::new(storage.create_output("_0.fld").unwrap(), &id).unwrap();
            let mut indexed_only = Field::text("title", "invisible");
            indexed_only.field_type.stored = false;
            let doc = Document::new()
                .add(indexed_only)
                .add(Field::stored("year", "kept"));
            writer.write_document(&doc, &infos).unwrap();
            writer.finish().unwrap();
        }
        let reader =
            StoredFieldsReader::open(storage.open_input("_0.fld").unwrap(), &id, "_0.fld").unwrap();
        let doc = reader.document(0).unwrap();
        assert_eq!(doc.get("title"), None);
        assert_eq!(doc.get_text("year"), Some("kept"));
    }

    #[test]
    fn test_escape_roundtrip() {
        for value in ["plain", "with\nnewline", "back\\slash", "both\\\n"] {
            assert_eq!(unescape(&escape(value)), value);
        }
    }
}

//! Documents and fields as fed to the index writer.
//!
//! A [`Document`] is an ordered list of named, typed fields. The
//! [`FieldType`] controls how each field is processed: indexed into
//! postings (and at what detail), stored for retrieval, recorded as a
//! doc-values column, indexed as a point, or captured as a term vector.

use crate::index::field_infos::{DocValuesType, IndexOptions};

/// A field's value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// UTF-8 text.
    Text(String),
    /// Opaque bytes.
    Binary(Vec<u8>),
    /// Signed integer.
    Int(i64),
    /// Double-precision float.
    Float(f64),
}

impl FieldValue {
    /// The text content, if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// How a field is processed at index time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldType {
    /// Postings detail level; `None` means not inverted.
    pub index_options: IndexOptions,
    /// Whether the raw value is kept in the stored-fields file.
    pub stored: bool,
    /// Whether text is run through the analyzer (false = single token).
    pub tokenized: bool,
    /// Doc-values column type.
    pub doc_values: DocValuesType,
    /// Point dimensions (0 = not a point).
    pub point_dimension_count: u32,
    /// Bytes per point dimension.
    pub point_num_bytes: u32,
    /// Whether a term vector is recorded for the field.
    pub term_vectors: bool,
}

impl FieldType {
    /// Full-text field: tokenized, positions indexed, stored.
    pub fn text() -> Self {
        FieldType {
            index_options: IndexOptions::DocsAndFreqsAndPositions,
            stored: true,
            tokenized: true,
            doc_values: DocValuesType::None,
            point_dimension_count: 0,
            point_num_bytes: 0,
            term_vectors: false,
        }
    }

    /// Like [`FieldType::text`] but with character offsets too.
    pub fn text_with_offsets() -> Self {
        FieldType {
            index_options: IndexOptions::DocsAndFreqsAndPositionsAndOffsets,
            ..Self::text()
        }
    }

    /// Atomic keyword: indexed as a single term, docs only, stored.
    pub fn keyword() -> Self {
        FieldType {
            index_options: IndexOptions::Docs,
            stored: true,
            tokenized: false,
            doc_values: DocValuesType::None,
            point_dimension_count: 0,
            point_num_bytes: 0,
            term_vectors: false,
        }
    }

    /// Numeric field: stored, numeric doc values, one-dimensional point.
    pub fn numeric() -> Self {
        FieldType {
            index_options: IndexOptions::None,
            stored: true,
            tokenized: false,
            doc_values: DocValuesType::Numeric,
            point_dimension_count: 1,
            point_num_bytes: 8,
            term_vectors: false,
        }
    }

    /// Stored-only field, untouched by the inverted index.
    pub fn stored_only() -> Self {
        FieldType {
            index_options: IndexOptions::None,
            stored: true,
            tokenized: false,
            doc_values: DocValuesType::None,
            point_dimension_count: 0,
            point_num_bytes: 0,
            term_vectors: false,
        }
    }

    /// Enable term vectors on this type.
    pub fn with_term_vectors(mut self) -> Self {
        self.term_vectors = true;
        self
    }

    /// Replace the doc-values type.
    pub fn with_doc_values(mut self, doc_values: DocValuesType) -> Self {
        self.doc_values = doc_values;
        self
    }
}

/// One named, typed value of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Field name.
    pub name: String,
    /// Field value.
    pub value: FieldValue,
    /// Index-time processing options.
    pub field_type: FieldType,
}

impl Field {
    /// Full-text field.
    pub fn text<S: Into<String>, V: Into<String>>(name: S, value: V) -> Self {
        Field {
            name: name.into(),
            value: FieldValue::Text(value.into()),
            field_type: FieldType::text(),
        }
    }

    /// Keyword field (single untokenized term).
    pub fn keyword<S: Into<String>, V: Into<String>>(name: S, value: V) -> Self {
        Field {
            name: name.into(),
            value: FieldValue::Text(value.into()),
            field_type: FieldType::keyword(),
        }
    }

    /// Numeric field (doc values + point).
    pub fn numeric<S: Into<String>>(name: S, value: i64) -> Self {
        Field {
            name: name.into(),
            value: FieldValue::Int(value),
            field_type: FieldType::numeric(),
        }
    }

    /// Stored-only field.
    pub fn stored<S: Into<String>, V: Into<String>>(name: S, value: V) -> Self {
        Field {
            name: name.into(),
            value: FieldValue::Text(value.into()),
            field_type: FieldType::stored_only(),
        }
    }

    /// Field with an explicit type.
    pub fn new<S: Into<String>>(name: S, value: FieldValue, field_type: FieldType) -> Self {
        Field {
            name: name.into(),
            value,
            field_type,
        }
    }
}

/// An ordered collection of fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    /// The document's fields, in insertion order.
    pub fields: Vec<Field>,
}

impl Document {
    /// New empty document.
    pub fn new() -> Self {
        Document::default()
    }

    /// Append a field, builder-style.
    pub fn add(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Append a field in place.
    pub fn add_field(&mut self, field: Field) {
        self.fields.push(field);
    }

    /// First value of the named field.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }

    /// First text value of the named field.
    pub fn get_text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.as_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_style() {
        let doc = Document::new()
            .add(Field::text("title", "a quick brown fox"))
            .add(Field::keyword("id", "doc-1"))
            .add(Field::numeric("year", 2021));
        assert_eq!(doc.fields.len(), 3);
        assert_eq!(doc.get_text("id"), Some("doc-1"));
        assert_eq!(doc.get("year"), Some(&FieldValue::Int(2021)));
        assert_eq!(doc.get("missing"), None);
    }

    #[test]
    fn test_field_type_presets() {
        assert!(FieldType::text().tokenized);
        assert!(!FieldType::keyword().tokenized);
        assert_eq!(FieldType::numeric().point_dimension_count, 1);
        assert_eq!(
            FieldType::text_with_offsets().index_options,
            IndexOptions::DocsAndFreqsAndPositionsAndOffsets
        );
    }
}

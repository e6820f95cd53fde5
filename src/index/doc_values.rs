//! Doc-values columns and norms (`.dvd`).
//!
//! The body is line-oriented text with fixed-width per-doc records so a
//! value is one seek away: a numeric record is `patternLen + 2` bytes
//! (zero-padded offset from the field minimum, a `T`/`F` has-value flag and
//! a newline), a binary record is `9 + patternLen + maxLength + 2` bytes
//! (a `length ` line then the padded raw value and the flag line). Sorted
//! and sorted-set fields store a sorted unique-value dictionary followed by
//! per-doc ordinal records; multi-valued ordinals are comma-separated and
//! parsed once when the reader opens.

use ahash::AHashMap;

use crate::error::{FalxError, Result};
use crate::storage::checksum::{check_footer, check_header, write_footer, write_header, FOOTER_LENGTH};
use crate::storage::structured::{StructReader, StructWriter};
use crate::storage::{StorageInput, StorageOutput};

/// Codec name of the doc-values file.
pub const DOC_VALUES_CODEC: &str = "FalxDocValues";
/// Current doc-values format version.
pub const DOC_VALUES_VERSION: u32 = 1;
/// Extension of the doc-values file.
pub const DOC_VALUES_EXTENSION: &str = "dvd";

const FIELD: &str = "field ";
const TYPE: &str = "  type ";
const MIN_VALUE: &str = "  minvalue ";
const PATTERN: &str = "  pattern ";
const MAX_LENGTH: &str = "  maxlength ";
const NUM_VALUES: &str = "  numvalues ";
const ORD_PATTERN: &str = "  ordpattern ";
const LENGTH: &str = "length ";
const END: &str = "END";

const TYPE_NUMERIC: &str = "numeric";
const TYPE_BINARY: &str = "binary";
const TYPE_SORTED: &str = "sorted";
const TYPE_SORTED_NUMERIC: &str = "sorted_numeric";
const TYPE_SORTED_SET: &str = "sorted_set";
const TYPE_NORMS: &str = "norms";

fn digits_for(value: u64) -> usize {
    value.to_string().len().max(1)
}

/// Writes every doc-values column of one segment.
pub struct DocValuesWriter {
    out: StructWriter<Box<dyn StorageOutput>>,
    max_doc: u32,
}

impl DocValuesWriter {
    /// Open a writer over a fresh `.dvd` output for `max_doc` documents.
    pub fn new(out: Box<dyn StorageOutput>, segment_id: &[u8; 16], max_doc: u32) -> Result<Self> {
        let mut out = StructWriter::new(out);
        write_header(&mut out, DOC_VALUES_CODEC, DOC_VALUES_VERSION, segment_id, "")?;
        Ok(DocValuesWriter { out, max_doc })
    }

    fn line(&mut self, text: &str) -> Result<()> {
        self.out.write_raw(text.as_bytes())?;
        self.out.write_raw(b"\n")
    }

    fn write_numeric_body(&mut self, values: &[Option<i64>]) -> Result<()> {
        let min = values.iter().flatten().copied().min().unwrap_or(0);
        let max = values.iter().flatten().copied().max().unwrap_or(0);
        let width = digits_for((max as i128 - min as i128) as u64);
        self.line(&format!("{MIN_VALUE}{min}"))?;
        self.line(&format!("{PATTERN}{width}"))?;
        for doc in 0..self.max_doc as usize {
            match values.get(doc).copied().flatten() {
                Some(value) => {
                    let offset = (value as i128 - min as i128) as u64;
                    self.line(&format!("{offset:0width$}T"))?;
                }
                None => self.line(&format!("{:0width$}F", 0))?,
            }
        }
        Ok(())
    }

    /// Write a numeric column.
    pub fn add_numeric_field(&mut self, name: &str, values: &[Option<i64>]) -> Result<()> {
        self.line(&format!("{FIELD}{name}"))?;
        self.line(&format!("{TYPE}{TYPE_NUMERIC}"))?;
        self.write_numeric_body(values)
    }

    /// Write a field's one-byte length norms as a numeric column.
    pub fn add_norms(&mut self, name: &str, norms: &[Option<u8>]) -> Result<()> {
        self.line(&format!("{FIELD}{name}"))?;
        self.line(&format!("{TYPE}{TYPE_NORMS}"))?;
        let values: Vec<Option<i64>> = norms.iter().map(|n| n.map(|n| n as i64)).collect();
        self.write_numeric_body(&values)
    }

    /// Write a binary column.
    pub fn add_binary_field(&mut self, name: &str, values: &[Option<Vec<u8>>]) -> Result<()> {
        self.line(&format!("{FIELD}{name}"))?;
        self.line(&format!("{TYPE}{TYPE_BINARY}"))?;
        let max_length = values
            .iter()
            .flatten()
            .map(|v| v.len())
            .max()
            .unwrap_or(0);
        let width = digits_for(max_length as u64);
        self.line(&format!("{MAX_LENGTH}{max_length}"))?;
        self.line(&format!("{PATTERN}{width}"))?;
        let empty = Vec::new();
        for doc in 0..self.max_doc as usize {
            let value = values.get(doc).and_then(|v| v.as_ref());
            let bytes = value.unwrap_or(&empty);
            self.line(&format!("{LENGTH}{:0width$}", bytes.len()))?;
            self.out.write_raw(bytes)?;
            // pad the value slot so every record has the same size
            for _ in bytes.len()..max_length {
                self.out.write_raw(b" ")?;
            }
            self.out.write_raw(b"\n")?;
            self.line(if value.is_some() { "T" } else { "F" })?;
        }
        Ok(())
    }

    fn write_value_dict(&mut self, dict: &[Vec<u8>]) -> Result<()> {
        let max_length = dict.iter().map(|v| v.len()).max().unwrap_or(0);
        let width = digits_for(max_length as u64);
        self.line(&format!("{NUM_VALUES}{}", dict.len()))?;
        self.line(&format!("{MAX_LENGTH}{max_length}"))?;
        self.line(&format!("{PATTERN}{width}"))?;
        for value in dict {
            self.line(&format!("{LENGTH}{:0width$}", value.len()))?;
            self.out.write_raw(value)?;
            for _ in value.len()..max_length {
                self.out.write_raw(b" ")?;
            }
            self.out.write_raw(b"\n")?;
        }
        Ok(())
    }

    /// Write a sorted column: per-doc single ordinal into a sorted
    /// unique-value dictionary.
    pub fn add_sorted_field(&mut self, name: &str, values: &[Option<Vec<u8>>]) -> Result<()> {
        self.line(&format!("{FIELD}{name}"))?;
        self.line(&format!("{TYPE}{TYPE_SORTED}"))?;

        let mut dict: Vec<Vec<u8>> = values.iter().flatten().cloned().collect();
        dict.sort();
        dict.dedup();
        self.write_value_dict(&dict)?;

        // ord records: ord+1, zero = missing
        let ord_width = digits_for(dict.len() as u64 + 1);
        self.line(&format!("{ORD_PATTERN}{ord_width}"))?;
        for doc in 0..self.max_doc as usize {
            let ord = values
                .get(doc)
                .and_then(|v| v.as_ref())
                .map(|v| dict.binary_search(v).map(|i| i + 1).unwrap_or(0))
                .unwrap_or(0);
            self.line(&format!("{ord:0ord_width$}"))?;
        }
        Ok(())
    }

    /// Write a sorted-set column: per-doc ordinal set as CSV records.
    pub fn add_sorted_set_field(&mut self, name: &str, values: &[Vec<Vec<u8>>]) -> Result<()> {
        self.line(&format!("{FIELD}{name}"))?;
        self.line(&format!("{TYPE}{TYPE_SORTED_SET}"))?;

        let mut dict: Vec<Vec<u8>> = values.iter().flatten().cloned().collect();
        dict.sort();
        dict.dedup();
        self.write_value_dict(&dict)?;

        let csv_for = |doc_values: &[Vec<u8>]| -> String {
            let mut ords: Vec<usize> = doc_values
                .iter()
                .filter_map(|v| dict.binary_search(v).ok())
                .collect();
            ords.sort_unstable();
            ords.dedup();
            ords.iter()
                .map(|o| o.to_string())
                .collect::<Vec<_>>()
                .join(",")
        };
        let empty = Vec::new();
        let max_csv = (0..self.max_doc as usize)
            .map(|doc| csv_for(values.get(doc).unwrap_or(&empty)).len())
            .max()
            .unwrap_or(0);
        self.line(&format!("{ORD_PATTERN}{max_csv}"))?;
        for doc in 0..self.max_doc as usize {
            let csv = csv_for(values.get(doc).unwrap_or(&empty));
            self.line(&format!("{csv:<max_csv$}"))?;
        }
        Ok(())
    }

    /// Write a sorted-numeric column: per-doc sorted value list as CSV.
    pub fn add_sorted_numeric_field(&mut self, name: &str, values: &[Vec<i64>]) -> Result<()> {
        self.line(&format!("{FIELD}{name}"))?;
        self.line(&format!("{TYPE}{TYPE_SORTED_NUMERIC}"))?;
        let csv_for = |doc_values: &[i64]| -> String {
            let mut sorted = doc_values.to_vec();
            sorted.sort_unstable();
            sorted
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(",")
        };
        let empty = Vec::new();
        let max_csv = (0..self.max_doc as usize)
            .map(|doc| csv_for(values.get(doc).unwrap_or(&empty)).len())
            .max()
            .unwrap_or(0);
        self.line(&format!("{ORD_PATTERN}{max_csv}"))?;
        for doc in 0..self.max_doc as usize {
            let csv = csv_for(values.get(doc).unwrap_or(&empty));
            self.line(&format!("{csv:<max_csv$}"))?;
        }
        Ok(())
    }

    /// Write the end marker and footer, and close the file.
    pub fn finish(mut self) -> Result<()> {
        self.line(END)?;
        write_footer(&mut self.out)?;
        self.out.close()
    }
}

/// One decoded doc-values column.
#[derive(Debug, Clone)]
enum ColumnData {
    Numeric {
        values: Vec<Option<i64>>,
    },
    Binary {
        values: Vec<Option<Vec<u8>>>,
    },
    Sorted {
        dict: Vec<Vec<u8>>,
        ords: Vec<Option<u64>>,
    },
    SortedSet {
        dict: Vec<Vec<u8>>,
        ords: Vec<Vec<u64>>,
    },
    SortedNumeric {
        values: Vec<Vec<i64>>,
    },
}

/// Reader over every doc-values column of a segment.
///
/// Columns are decoded once at open; ordinal CSVs are parsed into integers
/// here so per-access costs stay constant.
pub struct DocValuesReader {
    columns: AHashMap<String, ColumnData>,
    norms: AHashMap<String, std::sync::Arc<Vec<Option<i64>>>>,
}

/// Byte cursor over the file body: text lines are newline-terminated, but
/// raw value slots are consumed by their known fixed size so values may
/// contain newline bytes.
struct LineParser {
    body: Vec<u8>,
    at: usize,
}

impl LineParser {
    fn new(body: Vec<u8>) -> Self {
        LineParser { body, at: 0 }
    }

    fn peek(&self) -> Option<&[u8]> {
        if self.at >= self.body.len() {
            return None;
        }
        let end = self.body[self.at..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|i| self.at + i)
            .unwrap_or(self.body.len());
        Some(&self.body[self.at..end])
    }

    fn next(&mut self) -> Result<&[u8]> {
        if self.at >= self.body.len() {
            return Err(FalxError::corrupt("doc values truncated"));
        }
        let start = self.at;
        let end = self.body[start..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|i| start + i)
            .ok_or_else(|| FalxError::corrupt("doc values line unterminated"))?;
        self.at = end + 1;
        Ok(&self.body[start..end])
    }

    /// Consume a fixed-width raw value slot plus its terminating newline.
    fn raw_slot(&mut self, width: usize) -> Result<&[u8]> {
        if self.at + width + 1 > self.body.len() {
            return Err(FalxError::corrupt("doc values truncated"));
        }
        let slot = &self.body[self.at..self.at + width];
        if self.body[self.at + width] != b'\n' {
            return Err(FalxError::corrupt("value slot missing newline"));
        }
        self.at += width + 1;
        Ok(slot)
    }

    fn expect_str(&mut self, prefix: &str) -> Result<String> {
        let line = self.next()?;
        let text = std::str::from_utf8(line)
            .map_err(|_| FalxError::corrupt("doc values line not UTF-8"))?;
        text.strip_prefix(prefix)
            .map(str::to_string)
            .ok_or_else(|| FalxError::corrupt(format!("expected {prefix:?}, got {text:?}")))
    }

    fn expect_usize(&mut self, prefix: &str) -> Result<usize> {
        let text = self.expect_str(prefix)?;
        text.trim()
            .parse()
            .map_err(|e| FalxError::corrupt(format!("bad number {text:?}: {e}")))
    }

    fn expect_i64(&mut self, prefix: &str) -> Result<i64> {
        let text = self.expect_str(prefix)?;
        text.trim()
            .parse()
            .map_err(|e| FalxError::corrupt(format!("bad number {text:?}: {e}")))
    }
}

impl DocValuesReader {
    /// Load and decode the `.dvd` file.
    pub fn open(
        input: Box<dyn StorageInput>,
        segment_id: &[u8; 16],
        max_doc: u32,
        resource: &str,
    ) -> Result<Self> {
        let mut reader = StructReader::new(input);
        check_header(
            &mut reader,
            DOC_VALUES_CODEC,
            DOC_VALUES_VERSION,
            DOC_VALUES_VERSION,
            Some(segment_id),
            resource,
        )?;
        let body_len = reader
            .len()
            .checked_sub(reader.position() + FOOTER_LENGTH)
            .ok_or_else(|| FalxError::corrupt(format!("{resource} too short")))?;
        let body = reader.read_raw(body_len as usize)?;
        check_footer(&mut reader, resource)?;

        let mut parser = LineParser::new(body);
        let mut columns = AHashMap::new();
        let mut norms = AHashMap::new();
        loop {
            match parser.peek() {
                Some(line) if line == END.as_bytes() => break,
                Some(_) => {}
                None => return Err(FalxError::corrupt(format!("{resource} missing END"))),
            }
            let name = parser.expect_str(FIELD)?;
            let type_name = parser.expect_str(TYPE)?;
            match type_name.as_str() {
                TYPE_NUMERIC => {
                    let values = Self::read_numeric(&mut parser, max_doc)?;
                    columns.insert(name, ColumnData::Numeric { values });
                }
                TYPE_NORMS => {
                    let values = Self::read_numeric(&mut parser, max_doc)?;
                    norms.insert(name, std::sync::Arc::new(values));
                }
                TYPE_BINARY => {
                    let values = Self::read_binary(&mut parser, max_doc)?;
                    columns.insert(name, ColumnData::Binary { values });
                }
                TYPE_SORTED => {
                    let dict = Self::read_dict(&mut parser)?;
                    let _ord_width = parser.expect_usize(ORD_PATTERN)?;
                    let mut ords = Vec::with_capacity(max_doc as usize);
                    for _ in 0..max_doc {
                        let line = parser.next()?;
                        let text = std::str::from_utf8(line)
                            .map_err(|_| FalxError::corrupt("ord line not UTF-8"))?;
                        let ord: u64 = text.trim().parse().map_err(|e| {
                            FalxError::corrupt(format!("bad ord {text:?}: {e}"))
                        })?;
                        ords.push(if ord == 0 { None } else { Some(ord - 1) });
                    }
                    columns.insert(name, ColumnData::Sorted { dict, ords });
                }
                TYPE_SORTED_SET => {
                    let dict = Self::read_dict(&mut parser)?;
                    let _csv_width = parser.expect_usize(ORD_PATTERN)?;
                    let mut ords = Vec::with_capacity(max_doc as usize);
                    for _ in 0..max_doc {
                        let line = parser.next()?;
                        let text = std::str::from_utf8(line)
                            .map_err(|_| FalxError::corrupt("ord CSV not UTF-8"))?;
                        let trimmed = text.trim();
                        let parsed: Vec<u64> = if trimmed.is_empty() {
                            Vec::new()
                        } else {
                            trimmed
                                .split(',')
                                .map(|s| {
                                    s.parse().map_err(|e| {
                                        FalxError::corrupt(format!("bad ord {s:?}: {e}"))
                                    })
                                })
                                .collect::<Result<_>>()?
                        };
                        ords.push(parsed);
                    }
                    columns.insert(name, ColumnData::SortedSet { dict, ords });
                }
                TYPE_SORTED_NUMERIC => {
                    let _csv_width = parser.expect_usize(ORD_PATTERN)?;
                    let mut values = Vec::with_capacity(max_doc as usize);
                    for _ in 0..max_doc {
                        let line = parser.next()?;
                        let text = std::str::from_utf8(line)
                            .map_err(|_| FalxError::corrupt("value CSV not UTF-8"))?;
                        let trimmed = text.trim();
                        let parsed: Vec<i64> = if trimmed.is_empty() {
                            Vec::new()
                        } else {
                            trimmed
                                .split(',')
                                .map(|s| {
                                    s.parse().map_err(|e| {
                                        FalxError::corrupt(format!("bad value {s:?}: {e}"))
                                    })
                                })
                                .collect::<Result<_>>()?
                        };
                        values.push(parsed);
                    }
                    columns.insert(name, ColumnData::SortedNumeric { values });
                }
                other => {
                    return Err(FalxError::corrupt(format!(
                        "unknown doc-values type {other:?}"
                    )))
                }
            }
        }
        Ok(DocValuesReader { columns, norms })
    }

    fn read_numeric(parser: &mut LineParser, max_doc: u32) -> Result<Vec<Option<i64>>> {
        let min = parser.expect_i64(MIN_VALUE)?;
        let _width = parser.expect_usize(PATTERN)?;
        let mut values = Vec::with_capacity(max_doc as usize);
        for _ in 0..max_doc {
            let line = parser.next()?;
            let text = std::str::from_utf8(line)
                .map_err(|_| FalxError::corrupt("numeric record not UTF-8"))?;
            if text.len() < 2 {
                return Err(FalxError::corrupt("numeric record too short"));
            }
            let (digits, flag) = text.split_at(text.len() - 1);
            let offset: u64 = digits.parse().map_err(|e| {
                FalxError::corrupt(format!("bad numeric record {digits:?}: {e}"))
            })?;
            values.push(match flag {
                "T" => Some((min as i128 + offset as i128) as i64),
                "F" => None,
                other => {
                    return Err(FalxError::corrupt(format!(
                        "bad has-value flag {other:?}"
                    )))
                }
            });
        }
        Ok(values)
    }

    fn read_binary(parser: &mut LineParser, max_doc: u32) -> Result<Vec<Option<Vec<u8>>>> {
        let max_length = parser.expect_usize(MAX_LENGTH)?;
        let _width = parser.expect_usize(PATTERN)?;
        let mut values = Vec::with_capacity(max_doc as usize);
        for _ in 0..max_doc {
            let len = parser.expect_usize(LENGTH)?;
            if len > max_length {
                return Err(FalxError::corrupt("binary value longer than maxlength"));
            }
            let bytes = parser.raw_slot(max_length)?[..len].to_vec();
            let flag = parser.next()?;
            values.push(match flag {
                b"T" => Some(bytes),
                b"F" => None,
                _ => return Err(FalxError::corrupt("bad has-value flag")),
            });
        }
        Ok(values)
    }

    fn read_dict(parser: &mut LineParser) -> Result<Vec<Vec<u8>>> {
        let num_values = parser.expect_usize(NUM_VALUES)?;
        let max_length = parser.expect_usize(MAX_LENGTH)?;
        let _width = parser.expect_usize(PATTERN)?;
        let mut dict = Vec::with_capacity(num_values);
        for _ in 0..num_values {
            let len = parser.expect_usize(LENGTH)?;
            if len > max_length {
                return Err(FalxError::corrupt("dict value longer than maxlength"));
            }
            dict.push(parser.raw_slot(max_length)?[..len].to_vec());
        }
        Ok(dict)
    }

    /// Numeric value of a doc, if the field has one.
    pub fn numeric(&self, field: &str, doc: u32) -> Option<i64> {
        match self.columns.get(field)? {
            ColumnData::Numeric { values } => values.get(doc as usize).copied().flatten(),
            _ => None,
        }
    }

    /// Binary value of a doc, if the field has one.
    pub fn binary(&self, field: &str, doc: u32) -> Option<&[u8]> {
        match self.columns.get(field)? {
            ColumnData::Binary { values } => {
                values.get(doc as usize).and_then(|v| v.as_deref())
            }
            _ => None,
        }
    }

    /// Sorted ordinal of a doc.
    pub fn sorted_ord(&self, field: &str, doc: u32) -> Option<u64> {
        match self.columns.get(field)? {
            ColumnData::Sorted { ords, .. } => ords.get(doc as usize).copied().flatten(),
            _ => None,
        }
    }

    /// Value behind a sorted or sorted-set ordinal.
    pub fn lookup_ord(&self, field: &str, ord: u64) -> Option<&[u8]> {
        match self.columns.get(field)? {
            ColumnData::Sorted { dict, .. } | ColumnData::SortedSet { dict, .. } => {
                dict.get(ord as usize).map(|v| v.as_slice())
            }
            _ => None,
        }
    }

    /// Number of unique values of a sorted or sorted-set field.
    pub fn value_count(&self, field: &str) -> Option<u64> {
        match self.columns.get(field)? {
            ColumnData::Sorted { dict, .. } | ColumnData::SortedSet { dict, .. } => {
                Some(dict.len() as u64)
            }
            _ => None,
        }
    }

    /// Sorted-set ordinals of a doc (pre-parsed).
    pub fn sorted_set_ords(&self, field: &str, doc: u32) -> Option<&[u64]> {
        match self.columns.get(field)? {
            ColumnData::SortedSet { ords, .. } => ords.get(doc as usize).map(|v| v.as_slice()),
            _ => None,
        }
    }

    /// Sorted-numeric values of a doc (pre-parsed).
    pub fn sorted_numeric(&self, field: &str, doc: u32) -> Option<&[i64]> {
        match self.columns.get(field)? {
            ColumnData::SortedNumeric { values } => {
                values.get(doc as usize).map(|v| v.as_slice())
            }
            _ => None,
        }
    }

    /// One-byte length norm of a doc for a field, if recorded.
    pub fn norm(&self, field: &str, doc: u32) -> Option<u8> {
        self.norms
            .get(field)?
            .get(doc as usize)
            .copied()
            .flatten()
            .map(|v| v as u8)
    }

    /// The whole norms column of a field, shared for per-scorer access.
    pub fn norms_column(&self, field: &str) -> Option<std::sync::Arc<Vec<Option<i64>>>> {
        self.norms.get(field).cloned()
    }

    /// Whether the field has a norms column.
    pub fn has_norms(&self, field: &str) -> bool {
        self.norms.contains_key(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;
    use crate::storage::{MemoryStorageConfig, Storage};

    const ID: [u8; 16] = [4u8; 16];

    fn roundtrip(build: impl FnOnce(&mut DocValuesWriter), max_doc: u32) -> DocValuesReader {
        let storage = MemoryStorage::new(MemoryStorageConfig::default());
        {
            let mut writer = DocValuesWriter::new(
                storage.create_output("_0.dvd").unwrap(),
                &ID,
                max_doc,
            )
            .unwrap();
            build(&mut writer);
            writer.finish().unwrap();
        }
        DocValuesReader::open(storage.open_input("_0.dvd").unwrap(), &ID, max_doc, "_0.dvd")
            .unwrap()
    }

    #[test]
    fn test_numeric_roundtrip() {
        let reader = roundtrip(
            |w| {
                w.add_numeric_field("price", &[Some(-5), None, Some(1000), Some(0)])
                    .unwrap();
            },
            4,
        );
        assert_eq!(reader.numeric("price", 0), Some(-5));
        assert_eq!(reader.numeric("price", 1), None);
        assert_eq!(reader.numeric("price", 2), Some(1000));
        assert_eq!(reader.numeric("price", 3), Some(0));
        assert_eq!(reader.numeric("missing", 0), None);
    }

    #[test]
    fn test_binary_roundtrip() {
        let reader = roundtrip(
            |w| {
                w.add_binary_field(
                    "payload",
                    &[Some(b"ab\ncd".to_vec()), None, Some(Vec::new())],
                )
                .unwrap();
            },
            3,
        );
        assert_eq!(reader.binary("payload", 0), Some(b"ab\ncd".as_ref()));
        assert_eq!(reader.binary("payload", 1), None);
        assert_eq!(reader.binary("payload", 2), Some(b"".as_ref()));
    }

    #[test]
    fn test_sorted_roundtrip() {
        let reader = roundtrip(
            |w| {
                w.add_sorted_field(
                    "color",
                    &[
                        Some(b"red".to_vec()),
                        Some(b"blue".to_vec()),
                        None,
                        Some(b"red".to_vec()),
                    ],
                )
                .unwrap();
            },
            4,
        );
        let ord0 = reader.sorted_ord("color", 0).unwrap();
        let ord1 = reader.sorted_ord("color", 1).unwrap();
        assert_eq!(reader.lookup_ord("color", ord0), Some(b"red".as_ref()));
        assert_eq!(reader.lookup_ord("color", ord1), Some(b"blue".as_ref()));
        assert!(ord1 < ord0, "blue sorts before red");
        assert_eq!(reader.sorted_ord("color", 2), None);
        assert_eq!(reader.sorted_ord("color", 3), Some(ord0));
        assert_eq!(reader.value_count("color"), Some(2));
    }

    #[test]
    fn test_sorted_set_roundtrip() {
        let reader = roundtrip(
            |w| {
                w.add_sorted_set_field(
                    "tags",
                    &[
                        vec![b"x".to_vec(), b"a".to_vec()],
                        vec![],
                        vec![b"a".to_vec()],
                    ],
                )
                .unwrap();
            },
            3,
        );
        let ords = reader.sorted_set_ords("tags", 0).unwrap();
        assert_eq!(ords.len(), 2);
        assert_eq!(reader.lookup_ord("tags", ords[0]), Some(b"a".as_ref()));
        assert_eq!(reader.lookup_ord("tags", ords[1]), Some(b"x".as_ref()));
        assert!(reader.sorted_set_ords("tags", 1).unwrap().is_empty());
        assert_eq!(reader.sorted_set_ords("tags", 2).unwrap(), &[0]);
    }

    #[test]
    fn test_sorted_numeric_roundtrip() {
        let reader = roundtrip(
            |w| {
                w.add_sorted_numeric_field("scores", &[vec![5, -2, 9], vec![], vec![7]])
                    .unwrap();
            },
            3,
        );
        assert_eq!(reader.sorted_numeric("scores", 0).unwrap(), &[-2, 5, 9]);
        assert!(reader.sorted_numeric("scores", 1).unwrap().is_empty());
        assert_eq!(reader.sorted_numeric("scores", 2).unwrap(), &[7]);
    }

    #[test]
    fn test_norms() {
        let reader = roundtrip(
            |w| {
                w.add_norms("body", &[Some(7), Some(120), None]).unwrap();
            },
            3,
        );
        assert!(reader.has_norms("body"));
        assert_eq!(reader.norm("body", 0), Some(7));
        assert_eq!(reader.norm("body", 1), Some(120));
        assert_eq!(reader.norm("body", 2), None);
    }
}

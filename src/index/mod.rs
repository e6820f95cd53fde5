//! The segmented index: codec files, the single writer and the readers.
//!
//! A segment is written once and never mutated; a commit atomically renames
//! a new `segments_N` into place. Deletes ride separate copy-on-write
//! `.liv` generations. One writer per directory (enforced by `write.lock`)
//! coexists with any number of readers pinned to their commit points.

pub mod doc_values;
pub mod field_infos;
pub mod live_docs;
pub mod points;
pub mod reader;
pub mod segment_info;
pub mod stored_fields;
pub mod term_vectors;
pub mod terms;
pub mod writer;

pub use reader::{IndexReader, LeafReaderContext, SegmentReader};
pub use writer::{IndexWriter, WriterConfig};

/// Extension of the postings doc file.
pub const DOC_EXTENSION: &str = "doc";
/// Extension of the postings positions file.
pub const POS_EXTENSION: &str = "pos";
/// Extension of the postings payloads/offsets file.
pub const PAY_EXTENSION: &str = "pay";
/// Extension of the terms metadata file.
pub const TIM_EXTENSION: &str = "tim";
/// Extension of the terms index file.
pub const TIP_EXTENSION: &str = "tip";

/// Codec name of the postings doc file.
pub const POSTINGS_DOC_CODEC: &str = "FalxPostingsDoc";
/// Codec name of the postings positions file.
pub const POSTINGS_POS_CODEC: &str = "FalxPostingsPos";
/// Codec name of the postings payloads file.
pub const POSTINGS_PAY_CODEC: &str = "FalxPostingsPay";
/// Version of the postings files.
pub const POSTINGS_VERSION: u32 = 1;

/// Name of the codec family recorded in commit points.
pub const CODEC_NAME: &str = "Falx1";

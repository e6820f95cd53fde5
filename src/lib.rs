//! # Falx
//!
//! A segmented full-text index engine for Rust: build, persist and query
//! on-disk inverted indexes.
//!
//! ## Features
//!
//! - Write-once segments with an atomic `segments_N` commit discipline
//! - FST-compiled terms dictionaries with prefix and range enumeration
//! - Block postings with multi-level skip lists and competitive impacts
//! - Boolean search (must / should / must-not / filter, `min_should_match`)
//!   with cost-based scorer planning and BM25 ranking
//! - Doc values, points, stored fields, term vectors and copy-on-write
//!   deletes
//! - Many concurrent readers against pinned snapshots, one writer per
//!   directory
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use falx::analysis::StandardAnalyzer;
//! use falx::document::{Document, Field};
//! use falx::index::{IndexReader, IndexWriter, WriterConfig};
//! use falx::search::{IndexSearcher, Query};
//! use falx::storage::{MemoryStorageConfig, StorageConfig, StorageFactory};
//!
//! # fn main() -> falx::error::Result<()> {
//! let storage: Arc<dyn falx::storage::Storage> =
//!     StorageFactory::create(StorageConfig::Memory(MemoryStorageConfig::default()))?.into();
//!
//! let config = WriterConfig::new(Arc::new(StandardAnalyzer::new()));
//! let mut writer = IndexWriter::new(storage.clone(), config)?;
//! writer.add_document(Document::new().add(Field::text("body", "a quick brown fox")))?;
//! writer.commit()?;
//! writer.close()?;
//!
//! let reader = IndexReader::open(storage)?;
//! let searcher = IndexSearcher::new(&reader);
//! let hits = searcher.search(&Query::term("body", "fox"), 10)?;
//! assert_eq!(hits.total_hits, 1);
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod document;
pub mod error;
pub mod fst;
pub mod index;
pub mod memory;
pub mod postings;
pub mod search;
pub mod storage;
pub mod util;

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

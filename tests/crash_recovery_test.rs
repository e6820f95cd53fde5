//! Commit-point durability: an uncommitted flush must stay invisible.

use std::sync::Arc;

use falx::analysis::WhitespaceAnalyzer;
use falx::document::{Document, Field};
use falx::index::{IndexReader, IndexWriter, WriterConfig};
use falx::storage::{FileStorageConfig, Storage, StorageConfig, StorageFactory};
use tempfile::TempDir;

fn open_storage(dir: &TempDir) -> Arc<dyn Storage> {
    StorageFactory::create(StorageConfig::File(FileStorageConfig::new(dir.path())))
        .unwrap()
        .into()
}

fn config() -> WriterConfig {
    WriterConfig::new(Arc::new(WhitespaceAnalyzer::new()))
}

#[test]
fn test_uncommitted_segment_is_invisible() {
    let dir = TempDir::new().unwrap();
    let storage = open_storage(&dir);

    {
        let mut writer = IndexWriter::new(storage.clone(), config()).unwrap();
        writer
            .add_document(Document::new().add(Field::text("body", "first committed")))
            .unwrap();
        writer
            .add_document(Document::new().add(Field::text("body", "second committed")))
            .unwrap();
        writer.commit().unwrap();

        // a third doc is flushed to disk but never committed; dropping the
        // writer here stands in for the process dying
        writer
            .add_document(Document::new().add(Field::text("body", "third uncommitted")))
            .unwrap();
        writer.flush().unwrap();
    }

    // the reader pins the last commit: exactly the first two docs
    let reader = IndexReader::open(storage.clone()).unwrap();
    assert_eq!(reader.num_docs(), 2);
    assert_eq!(
        reader.document(0).unwrap().get_text("body"),
        Some("first committed")
    );
    assert_eq!(
        reader.document(1).unwrap().get_text("body"),
        Some("second committed")
    );

    // nothing in the commit point references the orphaned segment
    let committed = falx::index::segment_info::SegmentInfos::read_latest(storage.as_ref()).unwrap();
    for segment in &committed.segments {
        for file in &segment.files {
            assert!(
                !file.starts_with("_1."),
                "uncommitted segment file {file} is referenced"
            );
        }
    }
}

#[test]
fn test_buffered_docs_die_with_the_writer() {
    let dir = TempDir::new().unwrap();
    let storage = open_storage(&dir);

    {
        let mut writer = IndexWriter::new(storage.clone(), config()).unwrap();
        writer
            .add_document(Document::new().add(Field::text("body", "kept")))
            .unwrap();
        writer.commit().unwrap();
        writer
            .add_document(Document::new().add(Field::text("body", "lost")))
            .unwrap();
        // neither flush nor commit: buffered only
    }

    let reader = IndexReader::open(storage).unwrap();
    assert_eq!(reader.num_docs(), 1);
    assert_eq!(reader.document(0).unwrap().get_text("body"), Some("kept"));
}

#[test]
fn test_reopened_index_appends() {
    let dir = TempDir::new().unwrap();
    let storage = open_storage(&dir);

    {
        let mut writer = IndexWriter::new(storage.clone(), config()).unwrap();
        writer
            .add_document(Document::new().add(Field::text("body", "one")))
            .unwrap();
        writer.commit().unwrap();
        writer.close().unwrap();
    }
    {
        let mut writer = IndexWriter::new(storage.clone(), config()).unwrap();
        writer
            .add_document(Document::new().add(Field::text("body", "two")))
            .unwrap();
        writer.commit().unwrap();
        writer.close().unwrap();
    }

    let reader = IndexReader::open(storage).unwrap();
    assert_eq!(reader.num_docs(), 2);
    assert_eq!(reader.leaves().len(), 2);
    reader.check_integrity().unwrap();
}

//! Corruption detection: every segment file is sealed by a CRC32 footer.

use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use falx::analysis::WhitespaceAnalyzer;
use falx::document::{Document, Field};
use falx::error::FalxError;
use falx::index::{IndexReader, IndexWriter, WriterConfig};
use falx::storage::{FileStorageConfig, Storage, StorageConfig, StorageFactory};
use tempfile::TempDir;

fn build_index(dir: &TempDir) -> Arc<dyn Storage> {
    let storage: Arc<dyn Storage> =
        StorageFactory::create(StorageConfig::File(FileStorageConfig::new(dir.path())))
            .unwrap()
            .into();
    let config = WriterConfig::new(Arc::new(WhitespaceAnalyzer::new()));
    let mut writer = IndexWriter::new(storage.clone(), config).unwrap();
    for i in 0..50 {
        writer
            .add_document(Document::new().add(Field::text(
                "body",
                format!("common token{i} payload text"),
            )))
            .unwrap();
    }
    writer.commit().unwrap();
    writer.close().unwrap();
    storage
}

fn flip_byte(dir: &TempDir, name: &str, offset_from_start: u64) {
    let path = dir.path().join(name);
    let mut file = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .unwrap();
    file.seek(SeekFrom::Start(offset_from_start)).unwrap();
    let mut byte = [0u8; 1];
    file.read_exact(&mut byte).unwrap();
    byte[0] ^= 0x01;
    file.seek(SeekFrom::Start(offset_from_start)).unwrap();
    file.write_all(&byte).unwrap();
}

#[test]
fn test_intact_index_verifies() {
    let dir = TempDir::new().unwrap();
    let storage = build_index(&dir);
    let reader = IndexReader::open(storage).unwrap();
    reader.check_integrity().unwrap();
}

#[test]
fn test_flipped_byte_in_doc_file_detected() {
    let dir = TempDir::new().unwrap();
    let storage = build_index(&dir);

    // corrupt a byte in the middle of the postings doc file
    let doc_len = std::fs::metadata(dir.path().join("_0.doc")).unwrap().len();
    flip_byte(&dir, "_0.doc", doc_len / 2);

    let reader = IndexReader::open(storage).unwrap();
    let err = reader.check_integrity().unwrap_err();
    assert!(matches!(err, FalxError::IndexCorrupt(_)), "got {err:?}");
    // a corrupt segment taints the index: callers gate queries on the
    // integrity check and refuse to serve results past this point
}

#[test]
fn test_flipped_byte_in_terms_index_detected() {
    let dir = TempDir::new().unwrap();
    let storage = build_index(&dir);
    let tip_len = std::fs::metadata(dir.path().join("_0.tip")).unwrap().len();
    flip_byte(&dir, "_0.tip", tip_len - 4);

    // the terms index is loaded eagerly; either opening fails outright or
    // the integrity sweep reports the corruption
    match IndexReader::open(storage) {
        Err(err) => assert!(matches!(err, FalxError::IndexCorrupt(_)), "got {err:?}"),
        Ok(reader) => {
            let err = reader.check_integrity().unwrap_err();
            assert!(matches!(err, FalxError::IndexCorrupt(_)), "got {err:?}");
        }
    }
}

#[test]
fn test_truncated_file_detected() {
    let dir = TempDir::new().unwrap();
    let storage = build_index(&dir);
    let path = dir.path().join("_0.fld");
    let len = std::fs::metadata(&path).unwrap().len();
    let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(len - 7).unwrap();

    match IndexReader::open(storage) {
        Err(err) => assert!(matches!(err, FalxError::IndexCorrupt(_)), "got {err:?}"),
        Ok(reader) => {
            assert!(reader.check_integrity().is_err());
        }
    }
}

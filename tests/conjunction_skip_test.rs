//! Conjunction over a large segment: skip-list driven `advance`.

use std::sync::Arc;

use falx::analysis::WhitespaceAnalyzer;
use falx::document::{Document, Field};
use falx::index::{IndexReader, IndexWriter, WriterConfig};
use falx::postings::{PostingsIterator, NO_MORE_DOCS};
use falx::search::{BooleanQuery, IndexSearcher, Query};
use falx::storage::{MemoryStorageConfig, Storage, StorageConfig, StorageFactory};

const NUM_DOCS: u32 = 10_000;

fn build_index() -> Arc<dyn Storage> {
    let storage: Arc<dyn Storage> =
        StorageFactory::create(StorageConfig::Memory(MemoryStorageConfig::default()))
            .unwrap()
            .into();
    let mut config = WriterConfig::new(Arc::new(WhitespaceAnalyzer::new()));
    config.max_buffered_docs = NUM_DOCS as usize + 1;
    let mut writer = IndexWriter::new(storage.clone(), config).unwrap();
    for i in 0..NUM_DOCS {
        let mut body = String::from("filler");
        if i % 2 == 0 {
            body.push_str(" t1");
        }
        if i % 97 == 0 {
            body.push_str(" t2");
        }
        writer
            .add_document(Document::new().add(Field::text("body", body)))
            .unwrap();
    }
    writer.commit().unwrap();
    writer.close().unwrap();
    storage
}

#[test]
fn test_conjunction_finds_even_multiples_of_97() {
    let storage = build_index();
    let reader = IndexReader::open(storage).unwrap();
    let searcher = IndexSearcher::new(&reader);

    let query = Query::Boolean(
        BooleanQuery::new()
            .must(Query::term("body", "t1"))
            .must(Query::term("body", "t2")),
    );
    let expected: Vec<u32> = (0..NUM_DOCS).filter(|i| i % 194 == 0).collect();
    assert_eq!(searcher.count(&query).unwrap(), expected.len() as u64);

    let mut hits: Vec<u32> = searcher
        .search(&query, NUM_DOCS as usize)
        .unwrap()
        .score_docs
        .iter()
        .map(|sd| sd.doc)
        .collect();
    hits.sort_unstable();
    assert_eq!(hits, expected);
}

#[test]
fn test_advance_skips_blocks() {
    let storage = build_index();
    let reader = IndexReader::open(storage).unwrap();
    let leaves = reader.leaves();
    let leaf = &leaves[0];

    // t1 matches 5000 docs (every even id): advancing far ahead must land
    // exactly on the next even id at or after the target
    let mut postings = leaf.reader.postings("body", b"t1", false).unwrap().unwrap();
    assert_eq!(postings.cost(), 5000);
    assert_eq!(postings.advance(4321).unwrap(), 4322);
    assert_eq!(postings.advance(9998).unwrap(), 9998);
    assert_eq!(postings.advance(9999).unwrap(), NO_MORE_DOCS);
}

#[test]
fn test_advance_interleaved_with_next() {
    let storage = build_index();
    let reader = IndexReader::open(storage).unwrap();
    let leaves = reader.leaves();
    let leaf = &leaves[0];

    let mut postings = leaf.reader.postings("body", b"t2", false).unwrap().unwrap();
    assert_eq!(postings.next_doc().unwrap(), 0);
    assert_eq!(postings.next_doc().unwrap(), 97);
    assert_eq!(postings.advance(5000).unwrap(), 5044); // 97 * 52
    assert_eq!(postings.next_doc().unwrap(), 5141);
}

#[test]
fn test_postings_strictly_increasing_and_bounded() {
    let storage = build_index();
    let reader = IndexReader::open(storage).unwrap();
    let leaves = reader.leaves();
    let leaf = &leaves[0];

    let mut postings = leaf.reader.postings("body", b"t1", false).unwrap().unwrap();
    let mut prev: Option<u32> = None;
    loop {
        let doc = postings.next_doc().unwrap();
        if doc == NO_MORE_DOCS {
            break;
        }
        assert!(doc < NUM_DOCS);
        if let Some(prev) = prev {
            assert!(doc > prev, "doc ids must strictly increase");
        }
        prev = Some(doc);
    }
}

//! End-to-end round-trip: what goes in through the writer comes back,
//! ordered and complete, through the reader.

use std::sync::Arc;

use falx::analysis::{Analyzer, StandardAnalyzer};
use falx::document::{Document, Field, FieldType, FieldValue};
use falx::index::field_infos::DocValuesType;
use falx::index::{IndexReader, IndexWriter, WriterConfig};
use falx::postings::{PostingsIterator, NO_MORE_DOCS};
use falx::search::{IndexSearcher, Query};
use falx::storage::{MemoryStorageConfig, Storage, StorageConfig, StorageFactory};

fn make_storage() -> Arc<dyn Storage> {
    StorageFactory::create(StorageConfig::Memory(MemoryStorageConfig::default()))
        .unwrap()
        .into()
}

#[test]
fn test_term_doc_freq_position_round_trip() {
    let analyzer = Arc::new(StandardAnalyzer::new());
    let storage = make_storage();
    let bodies = [
        "the quick brown fox jumps over the lazy dog",
        "the quick dog sleeps",
        "foxes and dogs and foxes",
    ];
    {
        let mut writer = IndexWriter::new(storage.clone(), WriterConfig::new(analyzer.clone())).unwrap();
        for body in &bodies {
            writer
                .add_document(Document::new().add(Field::text("body", *body)))
                .unwrap();
        }
        writer.commit().unwrap();
        writer.close().unwrap();
    }

    let reader = IndexReader::open(storage).unwrap();
    let leaves = reader.leaves();
    let leaf = &leaves[0];

    // terms are sorted and complete
    let terms = leaf.reader.terms_iter("body").unwrap();
    assert!(terms.windows(2).all(|w| w[0].0 < w[1].0));

    // re-analyzing the stored values reproduces the indexed streams
    for (doc_id, body) in bodies.iter().enumerate() {
        let stored = reader.document(doc_id as u32).unwrap();
        assert_eq!(stored.get_text("body"), Some(*body));

        let mut expected: std::collections::HashMap<String, Vec<u32>> =
            std::collections::HashMap::new();
        let mut position = -1i64;
        for token in analyzer.token_stream("body", body).unwrap() {
            position += token.position_increment.max(1) as i64;
            expected.entry(token.text).or_default().push(position as u32);
        }

        for (term, positions) in expected {
            let mut postings = leaf
                .reader
                .postings("body", term.as_bytes(), true)
                .unwrap()
                .unwrap();
            let mut doc = postings.next_doc().unwrap();
            while doc != doc_id as u32 {
                assert_ne!(doc, NO_MORE_DOCS, "term {term} lost doc {doc_id}");
                doc = postings.next_doc().unwrap();
            }
            assert_eq!(postings.freq() as usize, positions.len());
            for &want in &positions {
                assert_eq!(postings.next_position().unwrap(), want);
            }
        }
    }
}

#[test]
fn test_offsets_round_trip() {
    let storage = make_storage();
    {
        let mut writer = IndexWriter::new(
            storage.clone(),
            WriterConfig::new(Arc::new(StandardAnalyzer::new())),
        )
        .unwrap();
        let mut field = Field::text("body", "alpha beta alpha");
        field.field_type = FieldType::text_with_offsets();
        writer.add_document(Document::new().add(field)).unwrap();
        writer.commit().unwrap();
        writer.close().unwrap();
    }
    let reader = IndexReader::open(storage).unwrap();
    let leaves = reader.leaves();
    let mut postings = leaves[0]
        .reader
        .postings("body", b"alpha", true)
        .unwrap()
        .unwrap();
    assert_eq!(postings.next_doc().unwrap(), 0);
    assert_eq!(postings.freq(), 2);
    assert_eq!(postings.next_position().unwrap(), 0);
    assert_eq!(postings.start_offset(), Some(0));
    assert_eq!(postings.end_offset(), Some(5));
    assert_eq!(postings.next_position().unwrap(), 2);
    assert_eq!(postings.start_offset(), Some(11));
    assert_eq!(postings.end_offset(), Some(16));
}

#[test]
fn test_doc_values_and_points_round_trip() {
    let storage = make_storage();
    {
        let mut writer = IndexWriter::new(
            storage.clone(),
            WriterConfig::new(Arc::new(StandardAnalyzer::new())),
        )
        .unwrap();
        for (i, year) in [1999i64, 2004, 2021].iter().enumerate() {
            writer
                .add_document(
                    Document::new()
                        .add(Field::text("title", format!("book number {i}")))
                        .add(Field::numeric("year", *year))
                        .add(Field::new(
                            "genre",
                            FieldValue::Text(if i == 0 { "scifi" } else { "history" }.to_string()),
                            FieldType::stored_only().with_doc_values(DocValuesType::Sorted),
                        )),
                )
                .unwrap();
        }
        writer.commit().unwrap();
        writer.close().unwrap();
    }

    let reader = IndexReader::open(storage.clone()).unwrap();
    let leaves = reader.leaves();
    let leaf = &leaves[0];

    // numeric doc values
    let dv = leaf.reader.doc_values();
    assert_eq!(dv.numeric("year", 0), Some(1999));
    assert_eq!(dv.numeric("year", 2), Some(2021));

    // sorted doc values share one dictionary
    let ord0 = dv.sorted_ord("genre", 0).unwrap();
    assert_eq!(dv.lookup_ord("genre", ord0), Some(b"scifi".as_ref()));
    assert_eq!(dv.sorted_ord("genre", 1), dv.sorted_ord("genre", 2));

    // point range query over the year field
    let searcher = IndexSearcher::new(&reader);
    let range = Query::PointRange(falx::search::PointRangeQuery::new_i64("year", 2000, 2030));
    let mut hits: Vec<u32> = searcher
        .search(&range, 10)
        .unwrap()
        .score_docs
        .iter()
        .map(|sd| sd.doc)
        .collect();
    hits.sort_unstable();
    assert_eq!(hits, vec![1, 2]);
}

#[test]
fn test_term_vectors_round_trip() {
    let storage = make_storage();
    {
        let mut writer = IndexWriter::new(
            storage.clone(),
            WriterConfig::new(Arc::new(StandardAnalyzer::new())),
        )
        .unwrap();
        let mut field = Field::text("body", "red fish blue fish");
        field.field_type = FieldType::text().with_term_vectors();
        writer.add_document(Document::new().add(field)).unwrap();
        writer.commit().unwrap();
        writer.close().unwrap();
    }
    let reader = IndexReader::open(storage).unwrap();
    let leaves = reader.leaves();
    let vectors = leaves[0].reader.term_vectors(0).unwrap();
    assert_eq!(vectors.len(), 1);
    assert_eq!(vectors[0].field, "body");
    let fish = vectors[0]
        .terms
        .iter()
        .find(|t| t.term == b"fish")
        .unwrap();
    assert_eq!(fish.freq, 2);
    assert_eq!(fish.positions, vec![1, 3]);
}

#[test]
fn test_multi_segment_search_with_doc_bases() {
    let storage = make_storage();
    {
        let mut writer = IndexWriter::new(
            storage.clone(),
            WriterConfig::new(Arc::new(StandardAnalyzer::new())),
        )
        .unwrap();
        writer
            .add_document(Document::new().add(Field::text("body", "needle in segment one")))
            .unwrap();
        writer.flush().unwrap();
        writer
            .add_document(Document::new().add(Field::text("body", "hay only")))
            .unwrap();
        writer
            .add_document(Document::new().add(Field::text("body", "needle in segment two")))
            .unwrap();
        writer.commit().unwrap();
        writer.close().unwrap();
    }
    let reader = IndexReader::open(storage).unwrap();
    assert_eq!(reader.leaves().len(), 2);
    let searcher = IndexSearcher::new(&reader);
    let mut hits: Vec<u32> = searcher
        .search(&Query::term("body", "needle"), 10)
        .unwrap()
        .score_docs
        .iter()
        .map(|sd| sd.doc)
        .collect();
    hits.sort_unstable();
    assert_eq!(hits, vec![0, 2], "global ids include the doc base");
}

#[test]
fn test_cancellation() {
    use std::sync::atomic::AtomicBool;

    let storage = make_storage();
    {
        let mut writer = IndexWriter::new(
            storage.clone(),
            WriterConfig::new(Arc::new(StandardAnalyzer::new())),
        )
        .unwrap();
        for i in 0..500 {
            writer
                .add_document(Document::new().add(Field::text("body", format!("common {i}"))))
                .unwrap();
        }
        writer.commit().unwrap();
        writer.close().unwrap();
    }
    let reader = IndexReader::open(storage).unwrap();

    let cancelled = Arc::new(AtomicBool::new(true));
    let searcher = IndexSearcher::new(&reader).with_cancellation(cancelled);
    let err = searcher.search(&Query::term("body", "common"), 10).unwrap_err();
    assert!(matches!(err, falx::error::FalxError::SearchCancelled));
}

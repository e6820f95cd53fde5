//! Integration tests for Boolean queries over a committed index.

use std::sync::Arc;

use falx::analysis::WhitespaceAnalyzer;
use falx::document::{Document, Field};
use falx::index::{IndexReader, IndexWriter, WriterConfig};
use falx::search::{BooleanQuery, IndexSearcher, Query};
use falx::storage::{MemoryStorageConfig, Storage, StorageConfig, StorageFactory};

fn make_storage() -> Arc<dyn Storage> {
    StorageFactory::create(StorageConfig::Memory(MemoryStorageConfig::default()))
        .unwrap()
        .into()
}

fn index_docs(storage: &Arc<dyn Storage>, bodies: &[&str]) {
    let config = WriterConfig::new(Arc::new(WhitespaceAnalyzer::new()));
    let mut writer = IndexWriter::new(storage.clone(), config).unwrap();
    for body in bodies {
        writer
            .add_document(Document::new().add(Field::text("body", *body)))
            .unwrap();
    }
    writer.commit().unwrap();
    writer.close().unwrap();
}

fn docs_of(searcher: &IndexSearcher<'_>, query: &Query) -> Vec<u32> {
    let mut hits: Vec<u32> = searcher
        .search(query, 100)
        .unwrap()
        .score_docs
        .iter()
        .map(|sd| sd.doc)
        .collect();
    hits.sort_unstable();
    hits
}

#[test]
fn test_min_should_match_two_of_three() {
    // d0:"a b", d1:"a c", d2:"b c", d3:"d"
    let storage = make_storage();
    index_docs(&storage, &["a b", "a c", "b c", "d"]);
    let reader = IndexReader::open(storage).unwrap();
    let searcher = IndexSearcher::new(&reader);

    let query = Query::Boolean(
        BooleanQuery::new()
            .should(Query::term("body", "a"))
            .should(Query::term("body", "b"))
            .should(Query::term("body", "c"))
            .with_min_should_match(2),
    );
    assert_eq!(docs_of(&searcher, &query), vec![0, 1, 2]);
    assert_eq!(searcher.count(&query).unwrap(), 3);
}

#[test]
fn test_must_not_excludes() {
    // q = +a -b over d0..d4
    let storage = make_storage();
    index_docs(&storage, &["a", "a b", "a", "a b", "x"]);
    let reader = IndexReader::open(storage).unwrap();
    let searcher = IndexSearcher::new(&reader);

    let query = Query::Boolean(
        BooleanQuery::new()
            .must(Query::term("body", "a"))
            .must_not(Query::term("body", "b")),
    );
    assert_eq!(docs_of(&searcher, &query), vec![0, 2]);
}

#[test]
fn test_disjunction_is_union_and_scores_sum() {
    let storage = make_storage();
    index_docs(&storage, &["a", "b", "a b", "c"]);
    let reader = IndexReader::open(storage).unwrap();
    let searcher = IndexSearcher::new(&reader);

    let query = Query::Boolean(
        BooleanQuery::new()
            .should(Query::term("body", "a"))
            .should(Query::term("body", "b")),
    );
    let top = searcher.search(&query, 10).unwrap();
    assert_eq!(top.total_hits, 3);
    // the doc matching both clauses outranks single-clause docs
    assert_eq!(top.score_docs[0].doc, 2);
}

#[test]
fn test_conjunction_is_intersection() {
    let storage = make_storage();
    index_docs(&storage, &["a b c", "a b", "b c", "a c"]);
    let reader = IndexReader::open(storage).unwrap();
    let searcher = IndexSearcher::new(&reader);

    let query = Query::Boolean(
        BooleanQuery::new()
            .must(Query::term("body", "a"))
            .must(Query::term("body", "c")),
    );
    assert_eq!(docs_of(&searcher, &query), vec![0, 3]);
}

#[test]
fn test_filter_matches_without_scoring() {
    let storage = make_storage();
    index_docs(&storage, &["a b", "a", "b"]);
    let reader = IndexReader::open(storage).unwrap();
    let searcher = IndexSearcher::new(&reader);

    let scored = Query::Boolean(BooleanQuery::new().must(Query::term("body", "a")));
    let filtered = Query::Boolean(
        BooleanQuery::new()
            .must(Query::term("body", "a"))
            .filter(Query::term("body", "b")),
    );
    let scored_top = searcher.search(&scored, 10).unwrap();
    let filtered_top = searcher.search(&filtered, 10).unwrap();
    assert_eq!(filtered_top.total_hits, 1);
    assert_eq!(filtered_top.score_docs[0].doc, 0);
    // the filter narrows the result set but adds nothing to the score
    let scored_d0 = scored_top
        .score_docs
        .iter()
        .find(|sd| sd.doc == 0)
        .unwrap()
        .score;
    assert!((filtered_top.score_docs[0].score - scored_d0).abs() < 1e-6);
}

#[test]
fn test_should_boosts_required_match() {
    let storage = make_storage();
    index_docs(&storage, &["a", "a b"]);
    let reader = IndexReader::open(storage).unwrap();
    let searcher = IndexSearcher::new(&reader);

    let query = Query::Boolean(
        BooleanQuery::new()
            .must(Query::term("body", "a"))
            .should(Query::term("body", "b")),
    );
    let top = searcher.search(&query, 10).unwrap();
    assert_eq!(top.total_hits, 2);
    assert_eq!(top.score_docs[0].doc, 1, "optional match ranks first");
}

#[test]
fn test_match_all_and_match_none() {
    let storage = make_storage();
    index_docs(&storage, &["a", "b", "c"]);
    let reader = IndexReader::open(storage).unwrap();
    let searcher = IndexSearcher::new(&reader);

    assert_eq!(searcher.count(&Query::MatchAll).unwrap(), 3);
    assert_eq!(searcher.count(&Query::MatchNone).unwrap(), 0);

    // pure negation has no positive clause and matches nothing
    let only_not =
        Query::Boolean(BooleanQuery::new().must_not(Query::term("body", "a")));
    assert_eq!(searcher.count(&only_not).unwrap(), 0);
}

#[test]
fn test_phrase_query() {
    let storage = make_storage();
    index_docs(
        &storage,
        &["the quick brown fox", "brown the quick", "quick brown shoe"],
    );
    let reader = IndexReader::open(storage).unwrap();
    let searcher = IndexSearcher::new(&reader);

    let phrase = Query::Phrase(falx::search::PhraseQuery::new(
        "body",
        &["quick", "brown"],
    ));
    assert_eq!(docs_of(&searcher, &phrase), vec![0, 2]);

    let phrase3 = Query::Phrase(falx::search::PhraseQuery::new(
        "body",
        &["quick", "brown", "fox"],
    ));
    assert_eq!(docs_of(&searcher, &phrase3), vec![0]);
}

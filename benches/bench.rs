//! Criterion benchmarks for falx.
//!
//! Covers the hot paths: document indexing with flush, FST construction
//! and lookup, term search and boolean search over a committed index.

use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};

use falx::analysis::StandardAnalyzer;
use falx::document::{Document, Field};
use falx::fst::builder::FstBuilder;
use falx::fst::outputs::U64Outputs;
use falx::index::{IndexReader, IndexWriter, WriterConfig};
use falx::search::{BooleanQuery, IndexSearcher, Query};
use falx::storage::{MemoryStorageConfig, Storage, StorageConfig, StorageFactory};

const WORDS: &[&str] = &[
    "search", "engine", "full", "text", "index", "query", "document", "field", "term", "phrase",
    "boolean", "score", "rank", "match", "filter", "skip", "block", "posting", "segment", "commit",
];

fn generate_docs(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            let mut body = String::new();
            for j in 0..12 {
                body.push_str(WORDS[(i * 7 + j * 3) % WORDS.len()]);
                body.push(' ');
            }
            body
        })
        .collect()
}

fn build_index(bodies: &[String]) -> Arc<dyn Storage> {
    let storage: Arc<dyn Storage> =
        StorageFactory::create(StorageConfig::Memory(MemoryStorageConfig::default()))
            .unwrap()
            .into();
    let mut config = WriterConfig::new(Arc::new(StandardAnalyzer::new()));
    config.max_buffered_docs = bodies.len() + 1;
    let mut writer = IndexWriter::new(storage.clone(), config).unwrap();
    for body in bodies {
        writer
            .add_document(Document::new().add(Field::text("body", body.clone())))
            .unwrap();
    }
    writer.commit().unwrap();
    writer.close().unwrap();
    storage
}

fn bench_indexing(c: &mut Criterion) {
    let bodies = generate_docs(1000);
    let mut group = c.benchmark_group("indexing");
    group.throughput(Throughput::Elements(bodies.len() as u64));
    group.bench_function("index_1000_docs", |b| {
        b.iter(|| build_index(black_box(&bodies)))
    });
    group.finish();
}

fn bench_fst(c: &mut Criterion) {
    let keys: Vec<String> = (0..10_000u32).map(|i| format!("term{i:06}")).collect();
    let mut group = c.benchmark_group("fst");
    group.throughput(Throughput::Elements(keys.len() as u64));
    group.bench_function("build_10k_terms", |b| {
        b.iter(|| {
            let mut builder = FstBuilder::new(U64Outputs);
            for (i, key) in keys.iter().enumerate() {
                builder.add(key.as_bytes(), i as u64 + 1).unwrap();
            }
            black_box(builder.finish().unwrap())
        })
    });

    let mut builder = FstBuilder::new(U64Outputs);
    for (i, key) in keys.iter().enumerate() {
        builder.add(key.as_bytes(), i as u64 + 1).unwrap();
    }
    let fst = builder.finish().unwrap();
    group.bench_function("lookup", |b| {
        b.iter(|| {
            for key in keys.iter().step_by(97) {
                black_box(fst.get(key.as_bytes()).unwrap());
            }
        })
    });
    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let bodies = generate_docs(5000);
    let storage = build_index(&bodies);
    let reader = IndexReader::open(storage).unwrap();
    let searcher = IndexSearcher::new(&reader);

    let mut group = c.benchmark_group("search");
    group.bench_function("term_top10", |b| {
        b.iter(|| black_box(searcher.search(&Query::term("body", "search"), 10).unwrap()))
    });
    group.bench_function("boolean_conjunction_top10", |b| {
        let query = Query::Boolean(
            BooleanQuery::new()
                .must(Query::term("body", "search"))
                .must(Query::term("body", "index")),
        );
        b.iter(|| black_box(searcher.search(&query, 10).unwrap()))
    });
    group.bench_function("boolean_disjunction_count", |b| {
        let query = Query::Boolean(
            BooleanQuery::new()
                .should(Query::term("body", "engine"))
                .should(Query::term("body", "filter"))
                .should(Query::term("body", "commit")),
        );
        b.iter(|| black_box(searcher.count(&query).unwrap()))
    });
    group.finish();
}

criterion_group!(benches, bench_indexing, bench_fst, bench_search);
criterion_main!(benches);

//! Criterion benchmarks for Folium.
//!
//! - Vector tree insertion, single-threaded and concurrent
//! - Closest-match scans over committed pages
//! - End-to-end search through an index handle

use std::hint::black_box;
use std::sync::Arc;

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use folium::column::{ColumnReader, ColumnWriter, PageIndexWriter};
use folium::document::Document;
use folium::graph::{ConcurrentVectorTree, VectorNode, VectorTree};
use folium::index::{IndexConfig, IndexHandle, Query};
use folium::model::BagOfCharsModel;
use folium::postings::PostingsWriter;
use folium::storage::{MemoryStorage, Storage, StructWriter};
use folium::vector::{ElementWidth, SparseVector};

/// Generate random lowercase words.
fn generate_words(count: usize, seed: u64) -> Vec<String> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let len = rng.random_range(3..10);
            (0..len)
                .map(|_| rng.random_range(b'a'..=b'z') as char)
                .collect()
        })
        .collect()
}

fn vectors(words: &[String]) -> Vec<SparseVector> {
    words.iter().map(|w| BagOfCharsModel::embed_word(w)).collect()
}

fn bench_tree_insert(c: &mut Criterion) {
    let model = BagOfCharsModel::new();
    let vectors = vectors(&generate_words(5_000, 1));

    let mut group = c.benchmark_group("tree_insert");
    group.throughput(Throughput::Elements(vectors.len() as u64));

    group.bench_function("sequential", |b| {
        b.iter(|| {
            let mut tree = VectorTree::new(0);
            for (doc_id, vector) in vectors.iter().enumerate() {
                tree.insert(
                    VectorNode::with_doc_id(vector.clone(), doc_id as u64, 0),
                    &model,
                );
            }
            black_box(tree.len())
        })
    });

    group.bench_function("concurrent", |b| {
        b.iter(|| {
            let tree = ConcurrentVectorTree::new(0);
            vectors.par_iter().enumerate().for_each(|(doc_id, vector)| {
                tree.insert(
                    VectorNode::with_doc_id(vector.clone(), doc_id as u64, 0),
                    &model,
                );
            });
            black_box(tree.len())
        })
    });

    group.finish();
}

/// Commit `pages` pages of `per_page` random words and open a reader over them.
fn build_column(pages: usize, per_page: usize) -> (ColumnReader, Vec<SparseVector>) {
    let model = BagOfCharsModel::new();
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
    let mut all = Vec::new();

    for page in 0..pages {
        let page_vectors = vectors(&generate_words(per_page, 100 + page as u64));
        let mut tree = VectorTree::new(0);
        for (i, vector) in page_vectors.iter().enumerate() {
            tree.insert(
                VectorNode::with_doc_id(vector.clone(), (page * per_page + i) as u64, 0),
                &model,
            );
        }

        let mut column =
            ColumnWriter::new(storage.create_output_append("b.0.ix").unwrap(), ElementWidth::F32)
                .unwrap();
        let mut vector_output =
            StructWriter::new(storage.create_output_append("b.0.vec").unwrap()).unwrap();
        let mut postings = PostingsWriter::open(Arc::clone(&storage), "b.pos", "b.pix").unwrap();
        let mut page_index =
            PageIndexWriter::new(storage.create_output_append("b.0.ixtp").unwrap()).unwrap();
        column
            .create_page(&mut tree, &mut vector_output, &mut postings, &mut page_index)
            .unwrap();
        vector_output.close().unwrap();
        column.close().unwrap();
        postings.close().unwrap();
        page_index.close().unwrap();
        all.extend(page_vectors);
    }

    let reader = ColumnReader::open(
        storage.as_ref(),
        0,
        "b.0.ix",
        "b.0.vec",
        "b.0.ixtp",
        ElementWidth::F32,
    )
    .unwrap();
    (reader, all)
}

fn bench_page_scan(c: &mut Criterion) {
    let model = BagOfCharsModel::new();
    let (mut reader, stored) = build_column(8, 1_000);
    let queries = vectors(&generate_words(200, 9));

    let mut group = c.benchmark_group("page_scan");
    group.throughput(Throughput::Elements(queries.len() as u64));

    group.bench_function("scanning_all_pages", |b| {
        b.iter(|| {
            for query in &queries {
                black_box(reader.closest_match_scanning_all_pages(query, &model).unwrap());
            }
        })
    });

    let present: Vec<SparseVector> = stored.iter().step_by(40).cloned().collect();
    group.bench_function("stopping_at_first_identical_page", |b| {
        b.iter(|| {
            for query in &present {
                black_box(
                    reader
                        .closest_match_stopping_at_first_identical_page(query, &model)
                        .unwrap(),
                );
            }
        })
    });

    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
    let handle = IndexHandle::open(
        storage,
        "bench",
        IndexConfig::default(),
        Arc::new(BagOfCharsModel::new()),
    )
    .unwrap();

    let words = generate_words(2_000, 3);
    let mut session = handle.write_session().unwrap();
    for chunk in words.chunks(500) {
        let documents: Vec<Document> = chunk
            .windows(3)
            .map(|w| Document::builder().add_text("body", w.join(" ")).build())
            .collect();
        session.put_documents(&documents).unwrap();
        session.commit().unwrap();
    }
    drop(session);

    let query = Query::new().should("body", words[10].clone()).should("body", words[700].clone());
    c.bench_function("search_two_terms", |b| {
        b.iter(|| {
            let mut search = handle.search_session().unwrap();
            black_box(search.search(&query, 0, 10).unwrap())
        })
    });
}

criterion_group!(benches, bench_tree_insert, bench_page_scan, bench_search);
criterion_main!(benches);

//! Read path: closest-match lookups, scoring and pagination.

use std::cmp::Ordering;

use ahash::{AHashMap, AHashSet};
use log::debug;
use serde::Serialize;

use crate::column::ColumnReader;
use crate::document::{Document, DocumentStore, StoredDocuments};
use crate::error::Result;
use crate::index::handle::IndexHandle;
use crate::index::query::{Occur, Query, Term};
use crate::postings::PostingsReader;

/// One scored document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub doc_id: u64,
    pub score: f64,
    /// The stored document, if it could be found.
    pub document: Option<Document>,
}

/// One window of a result list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResults {
    /// Number of matching documents before pagination.
    pub total: usize,
    pub hits: Vec<SearchHit>,
}

/// Accumulates per-document scores.
///
/// Every query vector of a `Should` or `Must` term adds its match score to
/// the documents it resolves to. The sum is divided by the number of such
/// vectors, so a document matching every vector exactly scores 1.
#[derive(Debug, Default)]
pub struct Scorer {
    scores: AHashMap<u64, f64>,
    vectors: usize,
}

impl Scorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one scored query vector.
    pub fn add_vector(&mut self) {
        self.vectors += 1;
    }

    pub fn add(&mut self, doc_id: u64, score: f64) {
        *self.scores.entry(doc_id).or_insert(0.0) += score;
    }

    /// Normalized scores, best first, ties by ascending document ID.
    pub fn into_ranked(self, keep: impl Fn(u64) -> bool) -> Vec<(u64, f64)> {
        let total = self.vectors.max(1) as f64;
        let mut ranked: Vec<(u64, f64)> = self
            .scores
            .into_iter()
            .filter(|(doc_id, _)| keep(*doc_id))
            .map(|(doc_id, score)| (doc_id, score / total))
            .collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        ranked
    }
}

/// The `take` items after the first `skip`.
pub fn paginate<T>(items: Vec<T>, skip: usize, take: usize) -> Vec<T> {
    items.into_iter().skip(skip).take(take).collect()
}

/// Reader over a collection's committed pages.
///
/// Column readers are opened on first use and kept, so a session sees the
/// pages committed before it was opened.
#[derive(Debug)]
pub struct SearchSession<'a> {
    handle: &'a IndexHandle,
    readers: AHashMap<u64, Option<ColumnReader>>,
    postings: Option<PostingsReader>,
    documents: StoredDocuments,
}

impl<'a> SearchSession<'a> {
    pub(crate) fn new(handle: &'a IndexHandle) -> Result<Self> {
        Ok(Self {
            handle,
            readers: AHashMap::new(),
            postings: None,
            documents: handle.documents()?,
        })
    }

    fn reader(&mut self, key_id: u64) -> Result<Option<&mut ColumnReader>> {
        if !self.readers.contains_key(&key_id) {
            let reader = self.handle.open_column(key_id)?;
            self.readers.insert(key_id, reader);
        }
        Ok(self.readers.get_mut(&key_id).and_then(Option::as_mut))
    }

    fn postings(&mut self) -> Result<&mut PostingsReader> {
        let postings = match self.postings.take() {
            Some(postings) => postings,
            None => PostingsReader::open(
                self.handle.storage().as_ref(),
                &self.handle.files().postings(),
            )?,
        };
        Ok(self.postings.insert(postings))
    }

    /// Documents matching every query vector of `term`, each with the score
    /// of its vector's best match. Returns the number of query vectors.
    fn resolve(&mut self, term: &Term) -> Result<(usize, Vec<(u64, f64)>)> {
        let handle = self.handle;
        let model = handle.model();
        let vectors = model.embed(&term.value)?;
        let Some(key_id) = handle.key_id(&term.field) else {
            return Ok((vectors.len(), Vec::new()));
        };

        let mut matches = Vec::new();
        for vector in &vectors {
            let hit = match self.reader(key_id)? {
                Some(reader) => reader.closest_match_scanning_all_pages(vector, model)?,
                None => None,
            };
            let Some(hit) = hit else { continue };
            let doc_ids = self.postings()?.read(&hit.postings_offsets)?;
            matches.extend(doc_ids.into_iter().map(|doc_id| (doc_id, hit.score)));
        }
        Ok((vectors.len(), matches))
    }

    /// Run `query` and return the `take` best documents after `skip`.
    pub fn search(&mut self, query: &Query, skip: usize, take: usize) -> Result<SearchResults> {
        let mut scorer = Scorer::new();
        let mut required: Option<AHashSet<u64>> = None;
        let mut excluded = AHashSet::new();

        for term in &query.terms {
            let (vectors, matches) = self.resolve(term)?;
            match term.occur {
                Occur::MustNot => {
                    excluded.extend(matches.into_iter().map(|(doc_id, _)| doc_id));
                }
                Occur::Should | Occur::Must => {
                    for _ in 0..vectors {
                        scorer.add_vector();
                    }
                    if term.occur == Occur::Must {
                        let matched: AHashSet<u64> =
                            matches.iter().map(|(doc_id, _)| *doc_id).collect();
                        required = Some(match required {
                            Some(required) => required.intersection(&matched).copied().collect(),
                            None => matched,
                        });
                    }
                    for (doc_id, score) in matches {
                        scorer.add(doc_id, score);
                    }
                }
            }
        }

        let ranked = scorer.into_ranked(|doc_id| {
            !excluded.contains(&doc_id)
                && required.as_ref().is_none_or(|required| required.contains(&doc_id))
        });
        let total = ranked.len();
        debug!("query {query} matched {total} documents");

        let mut hits = Vec::new();
        for (doc_id, score) in paginate(ranked, skip, take) {
            hits.push(SearchHit {
                doc_id,
                score,
                document: self.documents.get(doc_id)?,
            });
        }
        Ok(SearchResults { total, hits })
    }
}

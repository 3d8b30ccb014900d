//! Write batches.
//!
//! A session accumulates one dirty tree per column plus the document IDs
//! that belong to vectors already on disk. [`WriteSession::commit`] turns
//! each dirty tree into a new page, chains the pending IDs onto the postings
//! of the committed vectors and starts the next batch.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use ahash::AHashMap;
use log::{debug, info, warn};
use rayon::prelude::*;

use crate::column::{ColumnReader, ColumnWriter, PageIndexWriter};
use crate::document::{Document, DocumentWriter};
use crate::error::Result;
use crate::graph::{ConcurrentVectorTree, VectorNode};
use crate::index::handle::{IndexHandle, WriteGuard};
use crate::postings::PostingsWriter;
use crate::storage::StructWriter;
use crate::vector::SparseVector;

/// What a commit wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitStats {
    /// Pages registered, one per non-empty dirty tree.
    pub pages: usize,
    /// Node blocks written.
    pub nodes: usize,
    /// Postings pages chained onto committed vectors.
    pub postings_appends: usize,
    /// Documents stored.
    pub documents: usize,
}

/// Where an embedded vector goes.
enum Placement {
    /// An identical vector is already committed under this postings head.
    Committed { key_id: u64, head: u64 },
    /// Insert into the dirty tree.
    Dirty(VectorNode),
}

/// One open write batch. Holds the collection's write lock until dropped.
pub struct WriteSession<'a> {
    handle: &'a IndexHandle,
    _guard: WriteGuard<'a>,
    dirty: BTreeMap<u64, ConcurrentVectorTree>,
    pending: BTreeMap<(u64, u64), BTreeSet<u64>>,
    readers: AHashMap<u64, Option<ColumnReader>>,
    documents: Option<DocumentWriter>,
    stored: usize,
}

impl<'a> WriteSession<'a> {
    pub(crate) fn new(handle: &'a IndexHandle, guard: WriteGuard<'a>) -> Result<Self> {
        Ok(Self {
            handle,
            _guard: guard,
            dirty: BTreeMap::new(),
            pending: BTreeMap::new(),
            readers: AHashMap::new(),
            documents: None,
            stored: 0,
        })
    }

    /// Index one field value for `doc_id`.
    pub fn put(&mut self, field: &str, value: &str, doc_id: u64) -> Result<()> {
        let key_id = self.handle.key_id_or_create(field)?;
        let vectors = self.handle.model().embed(value)?;
        for vector in vectors {
            match self.place(key_id, vector, doc_id)? {
                Placement::Committed { key_id, head } => {
                    self.pending.entry((key_id, head)).or_default().insert(doc_id);
                }
                Placement::Dirty(node) => {
                    self.dirty
                        .entry(key_id)
                        .or_insert_with(|| ConcurrentVectorTree::new(key_id))
                        .insert(node, self.handle.model());
                }
            }
        }
        Ok(())
    }

    /// Store a document and index every field. Returns its ID.
    pub fn put_document(&mut self, document: &Document) -> Result<u64> {
        let doc_id = self.store(document)?;
        for (field, value) in document.fields() {
            self.put(field, &value.to_indexable(), doc_id)?;
        }
        Ok(doc_id)
    }

    /// Store and index a batch of documents. Returns their IDs in order.
    ///
    /// With `parallel_embedding` on, values are embedded and dirty-tree
    /// inserts run on the rayon pool. Lookups against committed pages stay
    /// sequential since column readers seek.
    pub fn put_documents(&mut self, documents: &[Document]) -> Result<Vec<u64>> {
        if !self.handle.config().parallel_embedding {
            return documents.iter().map(|doc| self.put_document(doc)).collect();
        }

        let mut doc_ids = Vec::with_capacity(documents.len());
        let mut values = Vec::new();
        for document in documents {
            let doc_id = self.store(document)?;
            doc_ids.push(doc_id);
            for (field, value) in document.fields() {
                let key_id = self.handle.key_id_or_create(field)?;
                values.push((key_id, doc_id, value.to_indexable()));
            }
        }

        let handle = self.handle;
        let model = handle.model();
        let embedded = values
            .par_iter()
            .map(|(key_id, doc_id, value)| {
                model
                    .embed(value)
                    .map(|vectors| (*key_id, *doc_id, vectors))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut inserts = Vec::new();
        for (key_id, doc_id, vectors) in embedded {
            for vector in vectors {
                match self.place(key_id, vector, doc_id)? {
                    Placement::Committed { key_id, head } => {
                        self.pending.entry((key_id, head)).or_default().insert(doc_id);
                    }
                    Placement::Dirty(node) => {
                        self.dirty
                            .entry(key_id)
                            .or_insert_with(|| ConcurrentVectorTree::new(key_id));
                        inserts.push(node);
                    }
                }
            }
        }

        let dirty = &self.dirty;
        inserts.into_par_iter().for_each(|node| {
            if let Some(tree) = dirty.get(&node.key_id) {
                tree.insert(node, model);
            }
        });

        debug!(
            "indexed {} documents ({} values) in {}",
            documents.len(),
            values.len(),
            self.handle.collection()
        );
        Ok(doc_ids)
    }

    fn store(&mut self, document: &Document) -> Result<u64> {
        let writer = match self.documents.take() {
            Some(writer) => writer,
            None => DocumentWriter::open(
                self.handle.storage(),
                &self.handle.files().documents(),
                self.handle.config().document_page_size,
                self.handle.documents()?.next_doc_id(),
            )?,
        };
        let writer = self.documents.insert(writer);
        let doc_id = writer.put(document)?;
        self.stored += 1;
        Ok(doc_id)
    }

    /// Decide whether `vector` already lives in a committed page.
    fn place(&mut self, key_id: u64, vector: SparseVector, doc_id: u64) -> Result<Placement> {
        let handle = self.handle;
        let model = handle.model();
        if !self.readers.contains_key(&key_id) {
            let reader = handle.open_column(key_id)?;
            self.readers.insert(key_id, reader);
        }

        if let Some(Some(reader)) = self.readers.get_mut(&key_id) {
            if let Some(hit) = reader.closest_match_stopping_at_first_identical_page(&vector, model)? {
                if hit.score >= model.identical_angle() {
                    if let Some(head) = hit.postings_offsets.first() {
                        return Ok(Placement::Committed {
                            key_id,
                            head: *head,
                        });
                    }
                }
            }
        }

        Ok(Placement::Dirty(VectorNode::with_doc_id(vector, doc_id, key_id)))
    }

    /// Whether the batch holds nothing to commit.
    pub fn is_clean(&self) -> bool {
        self.dirty.values().all(|tree| tree.is_empty())
            && self.pending.is_empty()
            && self.stored == 0
    }

    /// Write the batch and start a new one.
    ///
    /// Postings and vectors are flushed before the page index entries that
    /// make a page visible, so a reader never sees a page whose data is
    /// missing. The dirty trees and pending postings are only dropped once
    /// every page is registered: after a failed commit the session still
    /// holds them and `commit` can be called again. Bytes a failed attempt
    /// appended without registering a page are never reached by readers.
    /// Documents are written once, so if their streams fail to close the
    /// collection needs a `validate` pass.
    pub fn commit(&mut self) -> Result<CommitStats> {
        if self.is_clean() {
            debug!("nothing to commit in {}", self.handle.collection());
            return Ok(CommitStats::default());
        }

        let result = self.write_batch();
        self.readers.clear();
        match result {
            Ok(stats) => {
                self.pending.clear();
                self.dirty.clear();
                self.stored = 0;
                info!(
                    "committed {}: {} pages, {} nodes, {} postings appends, {} documents",
                    self.handle.collection(),
                    stats.pages,
                    stats.nodes,
                    stats.postings_appends,
                    stats.documents
                );
                Ok(stats)
            }
            Err(e) => {
                warn!(
                    "commit of {} failed, batch kept for retry: {e}",
                    self.handle.collection()
                );
                Err(e)
            }
        }
    }

    fn write_batch(&mut self) -> Result<CommitStats> {
        let mut stats = CommitStats::default();
        let storage = self.handle.storage();
        let files = self.handle.files();
        let width = self.handle.config().element_width;

        let mut postings = PostingsWriter::open(
            Arc::clone(storage),
            &files.postings(),
            &files.postings_index(),
        )?;

        for (&(key_id, head), doc_ids) in &self.pending {
            let doc_ids: Vec<u64> = doc_ids.iter().copied().collect();
            postings.append_and_update_page_ref(head, &doc_ids)?;
            stats.postings_appends += 1;
            debug!("key {key_id}: {} ids chained onto head {head}", doc_ids.len());
        }

        let mut page_indexes = Vec::new();
        for (&key_id, tree) in &self.dirty {
            if tree.is_empty() {
                continue;
            }
            let mut tree = tree.snapshot();

            let mut column = ColumnWriter::new(
                storage.create_output_append(&files.column_index(key_id))?,
                width,
            )?;
            let mut vectors =
                StructWriter::new(storage.create_output_append(&files.column_vectors(key_id))?)?;
            let mut page_index =
                PageIndexWriter::new(storage.create_output_append(&files.page_index(key_id))?)?;

            let page = column.create_page(&mut tree, &mut vectors, &mut postings, &mut page_index)?;
            vectors.close()?;
            column.close()?;

            stats.pages += 1;
            stats.nodes += page.nodes;
            page_indexes.push(page_index);
        }

        postings.close()?;
        if let Some(documents) = self.documents.take() {
            documents.close()?;
        }
        stats.documents = self.stored;

        for page_index in page_indexes {
            page_index.close()?;
        }
        storage.sync()?;
        Ok(stats)
    }
}

impl Drop for WriteSession<'_> {
    fn drop(&mut self) {
        if !self.is_clean() {
            warn!(
                "discarding an uncommitted batch for {}",
                self.handle.collection()
            );
        }
    }
}

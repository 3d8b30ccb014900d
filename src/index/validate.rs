//! Consistency check between stored documents and the committed index.

use ahash::AHashMap;
use log::{debug, info};
use serde::Serialize;

use crate::column::ColumnReader;
use crate::document::{Document, DocumentStore};
use crate::error::{FoliumError, Result};
use crate::index::handle::IndexHandle;
use crate::postings::PostingsReader;

/// Summary of a successful validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub documents: usize,
    pub vectors: usize,
}

/// Re-embeds stored documents and checks each vector resolves back to the
/// document. The first mismatch fails the run with `DataMisalignment`.
#[derive(Debug)]
pub struct Validator<'a> {
    handle: &'a IndexHandle,
    readers: AHashMap<u64, Option<ColumnReader>>,
    postings: Option<PostingsReader>,
}

impl<'a> Validator<'a> {
    pub(crate) fn new(handle: &'a IndexHandle) -> Self {
        Self {
            handle,
            readers: AHashMap::new(),
            postings: None,
        }
    }

    /// Check every committed document.
    pub fn validate(&mut self) -> Result<ValidationReport> {
        let documents = self.handle.documents()?;
        let mut report = ValidationReport::default();

        for doc_id in documents.doc_ids() {
            let document = documents.get(doc_id)?.ok_or_else(|| {
                FoliumError::data_misalignment(format!("document {doc_id} is listed but missing"))
            })?;
            report.vectors += self.validate_document(doc_id, &document)?;
            report.documents += 1;
        }

        info!(
            "validated {}: {} documents, {} vectors",
            self.handle.collection(),
            report.documents,
            report.vectors
        );
        Ok(report)
    }

    /// Check one document. Returns the number of vectors checked.
    pub fn validate_document(&mut self, doc_id: u64, document: &Document) -> Result<usize> {
        let handle = self.handle;
        let model = handle.model();
        let mut checked = 0;

        for (field, value) in document.fields() {
            let key_id = handle.key_id(field).ok_or_else(|| {
                FoliumError::data_misalignment(format!(
                    "document {doc_id}: field {field} has no key"
                ))
            })?;
            if !self.readers.contains_key(&key_id) {
                let reader = handle.open_column(key_id)?;
                self.readers.insert(key_id, reader);
            }

            for vector in model.embed(&value.to_indexable())? {
                let hit = match self.readers.get_mut(&key_id).and_then(Option::as_mut) {
                    Some(reader) => {
                        reader.closest_match_stopping_at_first_identical_page(&vector, model)?
                    }
                    None => None,
                };
                let hit = match hit {
                    Some(hit) if hit.score >= model.identical_angle() => hit,
                    other => {
                        return Err(FoliumError::data_misalignment(format!(
                            "document {doc_id}: field {field} best score {} is below {}",
                            other.map_or(0.0, |hit| hit.score),
                            model.identical_angle()
                        )));
                    }
                };

                let doc_ids = self.postings()?.read(&hit.postings_offsets)?;
                if !doc_ids.contains(&doc_id) {
                    return Err(FoliumError::data_misalignment(format!(
                        "document {doc_id}: field {field} vector at {} does not list it",
                        hit.vector_offset
                    )));
                }
                checked += 1;
            }
        }

        debug!("document {doc_id}: {checked} vectors ok");
        Ok(checked)
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
}

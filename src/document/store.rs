//! Stored documents.
//!
//! Documents are kept as JSON blobs appended to one stream. Their addresses
//! are found through `i64` key pages keyed by document ID.

use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::document::Document;
use crate::error::{FoliumError, Result};
use crate::kv::{Address, KeyRejected, PagedKeyIndex, PagedKeyWriter};
use crate::storage::{Storage, StorageInput, StorageOutput, StructReader, StructWriter};

/// Source of full documents for result hydration and validation.
pub trait DocumentStore: Send + Sync + std::fmt::Debug {
    /// Fetch a document by ID.
    fn get(&self, doc_id: u64) -> Result<Option<Document>>;

    /// Every stored document ID, ascending.
    fn doc_ids(&self) -> Vec<u64>;

    /// Number of stored documents.
    fn len(&self) -> usize {
        self.doc_ids().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Names of the three document streams of a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFiles {
    pub blobs: String,
    pub keys: String,
    pub addresses: String,
}

impl DocumentFiles {
    pub fn for_collection(collection: &str) -> Self {
        Self {
            blobs: format!("{collection}.docs"),
            keys: format!("{collection}.dkeys"),
            addresses: format!("{collection}.daddr"),
        }
    }

    /// All names, for maintenance operations.
    pub fn all(&self) -> [&str; 3] {
        [&self.blobs, &self.keys, &self.addresses]
    }
}

/// Read side of the document streams.
#[derive(Debug)]
pub struct StoredDocuments {
    index: PagedKeyIndex<i64>,
    blobs: Mutex<Option<StructReader<Box<dyn StorageInput>>>>,
}

impl StoredDocuments {
    /// Open the committed documents. Missing streams mean no documents.
    pub fn open(storage: &dyn Storage, files: &DocumentFiles, page_size: usize) -> Result<Self> {
        let index = PagedKeyIndex::open(storage, &files.keys, &files.addresses, page_size)?;
        let blobs = if index.is_empty() {
            None
        } else {
            Some(StructReader::new(storage.open_input(&files.blobs)?)?)
        };

        Ok(Self {
            index,
            blobs: Mutex::new(blobs),
        })
    }

    /// The ID the next stored document receives.
    pub fn next_doc_id(&self) -> u64 {
        self.index
            .entries()
            .last()
            .map(|(id, _)| *id as u64 + 1)
            .unwrap_or(0)
    }
}

impl DocumentStore for StoredDocuments {
    fn get(&self, doc_id: u64) -> Result<Option<Document>> {
        let Some(address) = self.index.get(&(doc_id as i64)) else {
            return Ok(None);
        };

        let mut guard = self.blobs.lock();
        let blobs = guard.as_mut().ok_or_else(|| {
            FoliumError::missing_dependency(format!("document blob stream for doc {doc_id}"))
        })?;
        blobs.seek(address.offset)?;
        let bytes = blobs.read_raw(address.length as usize)?;
        let document = serde_json::from_slice(&bytes).map_err(|e| {
            FoliumError::corruption(format!("document {doc_id} at {}: {e}", address.offset))
        })?;
        Ok(Some(document))
    }

    fn doc_ids(&self) -> Vec<u64> {
        self.index
            .entries()
            .into_iter()
            .map(|(id, _)| id as u64)
            .collect()
    }

    fn len(&self) -> usize {
        self.index.len()
    }
}

/// Write side of the document streams.
#[derive(Debug)]
pub struct DocumentWriter {
    keys: PagedKeyWriter<i64>,
    blobs: StructWriter<Box<dyn StorageOutput>>,
    next_doc_id: u64,
    written: usize,
}

impl DocumentWriter {
    /// Open the streams for append. IDs continue after `next_doc_id - 1`.
    pub fn open(
        storage: &Arc<dyn Storage>,
        files: &DocumentFiles,
        page_size: usize,
        next_doc_id: u64,
    ) -> Result<Self> {
        Ok(Self {
            keys: PagedKeyWriter::open(storage.as_ref(), &files.keys, &files.addresses, page_size)?,
            blobs: StructWriter::new(storage.create_output_append(&files.blobs)?)?,
            next_doc_id,
            written: 0,
        })
    }

    /// Store a document under the next free ID and return that ID.
    pub fn put(&mut self, document: &Document) -> Result<u64> {
        let doc_id = self.next_doc_id;
        self.put_with_id(doc_id, document)?;
        Ok(doc_id)
    }

    /// Store a document under an explicit ID.
    pub fn put_with_id(&mut self, doc_id: u64, document: &Document) -> Result<()> {
        let bytes = serde_json::to_vec(document)?;
        let address = Address {
            offset: self.blobs.position(),
            length: bytes.len() as u64,
        };
        self.blobs.write_raw(&bytes)?;

        match self.keys.put(doc_id as i64, address) {
            Err(KeyRejected::PageFull { .. }) => {
                self.keys.flush_page()?;
                self.keys.put(doc_id as i64, address)?;
            }
            inserted => {
                inserted?;
            }
        }

        self.next_doc_id = self.next_doc_id.max(doc_id + 1);
        self.written += 1;
        Ok(())
    }

    /// The ID the next [`DocumentWriter::put`] assigns.
    pub fn next_doc_id(&self) -> u64 {
        self.next_doc_id
    }

    /// Flush blobs before key pages so every address points at written bytes.
    pub fn close(self) -> Result<()> {
        self.blobs.close()?;
        self.keys.close()?;
        debug!("stored {} documents", self.written);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn doc(title: &str) -> Document {
        Document::builder().add_text("title", title).build()
    }

    #[test]
    fn test_store_and_fetch_across_pages_and_sessions() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let files = DocumentFiles::for_collection("books");

        let mut writer = DocumentWriter::open(&storage, &files, 64, 0).unwrap();
        for i in 0..20 {
            assert_eq!(writer.put(&doc(&format!("book {i}"))).unwrap(), i);
        }
        writer.close().unwrap();

        let store = StoredDocuments::open(storage.as_ref(), &files, 64).unwrap();
        assert_eq!(store.len(), 20);
        assert_eq!(store.next_doc_id(), 20);
        assert_eq!(store.get(13).unwrap(), Some(doc("book 13")));
        assert_eq!(store.get(20).unwrap(), None);

        let mut writer = DocumentWriter::open(&storage, &files, 64, store.next_doc_id()).unwrap();
        assert_eq!(writer.put(&doc("sequel")).unwrap(), 20);
        writer.close().unwrap();

        let store = StoredDocuments::open(storage.as_ref(), &files, 64).unwrap();
        assert_eq!(store.doc_ids(), (0..21).collect::<Vec<u64>>());
        assert_eq!(store.get(20).unwrap(), Some(doc("sequel")));
        assert_eq!(store.get(0).unwrap(), Some(doc("book 0")));
    }

    #[test]
    fn test_empty_collection() {
        let storage = MemoryStorage::new_default();
        let store =
            StoredDocuments::open(&storage, &DocumentFiles::for_collection("none"), 4096).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.next_doc_id(), 0);
        assert_eq!(store.get(0).unwrap(), None);
    }
}

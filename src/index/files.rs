//! File names of a collection.

use crate::document::DocumentFiles;

/// Names every stream of one collection.
///
/// | stream | name |
/// |--------|------|
/// | column index blocks | `{collection}.{keyId}.ix` |
/// | column vectors | `{collection}.{keyId}.vec` |
/// | column page index | `{collection}.{keyId}.ixtp` |
/// | postings | `{collection}.pos` |
/// | postings chain tails | `{collection}.pix` |
/// | field name to key ID map | `{collection}.keys` |
/// | stored documents | see [`DocumentFiles`] |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionFiles {
    collection: String,
}

impl CollectionFiles {
    pub fn new<S: Into<String>>(collection: S) -> Self {
        Self {
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn column_index(&self, key_id: u64) -> String {
        format!("{}.{key_id}.ix", self.collection)
    }

    pub fn column_vectors(&self, key_id: u64) -> String {
        format!("{}.{key_id}.vec", self.collection)
    }

    pub fn page_index(&self, key_id: u64) -> String {
        format!("{}.{key_id}.ixtp", self.collection)
    }

    pub fn postings(&self) -> String {
        format!("{}.pos", self.collection)
    }

    pub fn postings_index(&self) -> String {
        format!("{}.pix", self.collection)
    }

    pub fn keys(&self) -> String {
        format!("{}.keys", self.collection)
    }

    pub fn documents(&self) -> DocumentFiles {
        DocumentFiles::for_collection(&self.collection)
    }

    /// Name of the single-writer lock.
    pub fn write_lock(&self) -> String {
        format!("{}.write", self.collection)
    }

    /// Every file the collection may own, given its key IDs.
    pub fn all(&self, key_ids: impl IntoIterator<Item = u64>) -> Vec<String> {
        let mut names = vec![self.keys(), self.postings(), self.postings_index()];
        names.extend(self.documents().all().iter().map(|s| s.to_string()));
        for key_id in key_ids {
            names.push(self.column_index(key_id));
            names.push(self.column_vectors(key_id));
            names.push(self.page_index(key_id));
        }
        names
    }
}

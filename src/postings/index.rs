//! Head-to-tail links for postings chains.
//!
//! Every vector's postings start at a fixed head address that is recorded in
//! its index block. Appends in later commits add pages at the end of the
//! chain, so the writer needs the current tail to patch. The links are kept
//! in memory and persisted as append-only `head:i64, tail:i64` records; when
//! a head appears more than once the last record wins.

use ahash::AHashMap;
use log::debug;

use crate::error::{FoliumError, Result};
use crate::storage::{Storage, StructReader, StructWriter};

const LINK_SIZE: u64 = 16;

/// Cache of postings chain tails keyed by chain head.
#[derive(Debug, Default)]
pub struct PostingsIndex {
    links: AHashMap<u64, u64>,
    pending: Vec<(u64, u64)>,
}

impl PostingsIndex {
    /// An empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the links persisted in `name`. A missing file is an empty index.
    pub fn load(storage: &dyn Storage, name: &str) -> Result<Self> {
        let mut index = Self::new();
        if !storage.file_exists(name) {
            return Ok(index);
        }

        let mut reader = StructReader::new(storage.open_input(name)?)?;
        if reader.size() % LINK_SIZE != 0 {
            return Err(FoliumError::corruption(format!(
                "postings index {name} has {} bytes, not a multiple of {LINK_SIZE}",
                reader.size()
            )));
        }
        while !reader.is_eof() {
            let head = reader.read_i64()?;
            let tail = reader.read_i64()?;
            if head < 0 || tail < 0 {
                return Err(FoliumError::corruption(format!(
                    "negative postings link {head} -> {tail} in {name}"
                )));
            }
            index.links.insert(head as u64, tail as u64);
        }
        debug!("loaded {} postings links from {name}", index.links.len());
        Ok(index)
    }

    /// Current tail of the chain starting at `head`, if known.
    pub fn tail(&self, head: u64) -> Option<u64> {
        self.links.get(&head).copied()
    }

    /// Record that the chain starting at `head` now ends at `tail`.
    pub fn record(&mut self, head: u64, tail: u64) {
        self.links.insert(head, tail);
        self.pending.push((head, tail));
    }

    /// Number of known chains.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Whether no chain is known.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Append links recorded since the last flush to `name`.
    pub fn flush(&mut self, storage: &dyn Storage, name: &str) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let mut writer = StructWriter::new(storage.create_output_append(name)?)?;
        for (head, tail) in self.pending.drain(..) {
            writer.write_i64(head as i64)?;
            writer.write_i64(tail as i64)?;
        }
        writer.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[test]
    fn test_last_record_wins_after_reload() {
        let storage = MemoryStorage::new_default();
        let mut index = PostingsIndex::new();
        index.record(0, 40);
        index.record(16, 56);
        index.flush(&storage, "c.pix").unwrap();
        index.record(0, 96);
        index.flush(&storage, "c.pix").unwrap();

        let loaded = PostingsIndex::load(&storage, "c.pix").unwrap();
        assert_eq!(loaded.tail(0), Some(96));
        assert_eq!(loaded.tail(16), Some(56));
        assert_eq!(loaded.tail(32), None);
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let storage = MemoryStorage::new_default();
        let index = PostingsIndex::load(&storage, "none.pix").unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_truncated_file_is_corruption() {
        let storage = MemoryStorage::new_default();
        let mut writer = StructWriter::new(storage.create_output("bad.pix").unwrap()).unwrap();
        writer.write_i64(1).unwrap();
        writer.close().unwrap();

        assert!(matches!(
            PostingsIndex::load(&storage, "bad.pix"),
            Err(FoliumError::Corruption(_))
        ));
    }
}

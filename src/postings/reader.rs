//! Postings chain reader.

use ahash::AHashSet;

use crate::error::{FoliumError, Result};
use crate::postings::PostingsPage;
use crate::storage::{Storage, StorageInput, StructReader};

/// Reads postings pages and walks their `next` links.
#[derive(Debug)]
pub struct PostingsReader {
    reader: StructReader<Box<dyn StorageInput>>,
}

impl PostingsReader {
    /// Open the postings stream `name`.
    pub fn open(storage: &dyn Storage, name: &str) -> Result<Self> {
        Ok(Self {
            reader: StructReader::new(storage.open_input(name)?)?,
        })
    }

    /// Read the page at `offset`.
    pub fn read_page(&mut self, offset: u64) -> Result<PostingsPage> {
        self.reader.seek(offset)?;
        let count = self.reader.read_i64()?;
        let next = self.reader.read_i64()?;
        if count < 0 || next < 0 {
            return Err(FoliumError::corruption(format!(
                "postings page at {offset} has count {count} and next {next}"
            )));
        }

        self.reader.ensure_records(count as u64, 8)?;
        let mut doc_ids = Vec::with_capacity(count as usize);
        for _ in 0..count {
            doc_ids.push(self.reader.read_i64()? as u64);
        }
        Ok(PostingsPage {
            offset,
            next: (next != 0).then_some(next as u64),
            doc_ids,
        })
    }

    /// Page addresses of the chain starting at `head`, in link order.
    pub fn chain(&mut self, head: u64) -> Result<Vec<u64>> {
        let mut seen = AHashSet::new();
        let mut addresses = Vec::new();
        let mut cursor = Some(head);

        while let Some(offset) = cursor {
            if !seen.insert(offset) {
                return Err(FoliumError::corruption(format!(
                    "postings chain from {head} loops back to {offset}"
                )));
            }
            addresses.push(offset);
            cursor = self.read_page(offset)?.next;
        }
        Ok(addresses)
    }

    /// Last page of the chain starting at `head`.
    pub fn tail(&mut self, head: u64) -> Result<u64> {
        let chain = self.chain(head)?;
        Ok(chain.last().copied().unwrap_or(head))
    }

    /// Read every document ID reachable from `addresses`.
    ///
    /// Each chain is walked oldest page first. IDs are returned once, in the
    /// order they were first seen.
    pub fn read(&mut self, addresses: &[u64]) -> Result<Vec<u64>> {
        let mut seen_pages = AHashSet::new();
        let mut seen_ids = AHashSet::new();
        let mut doc_ids = Vec::new();

        for &head in addresses {
            let mut cursor = Some(head);
            while let Some(offset) = cursor {
                // Tied heads may share a tail through earlier appends.
                if !seen_pages.insert(offset) {
                    break;
                }
                let page = self.read_page(offset)?;
                for id in page.doc_ids {
                    if seen_ids.insert(id) {
                        doc_ids.push(id);
                    }
                }
                cursor = page.next;
            }
        }

        Ok(doc_ids)
    }
}

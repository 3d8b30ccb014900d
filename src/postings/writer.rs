//! Postings writer.

use std::sync::Arc;

use log::{debug, warn};

use crate::error::{FoliumError, Result};
use crate::postings::{PostingsIndex, PostingsReader, PAGE_HEADER_SIZE};
use crate::storage::{Storage, StorageOutput, StructWriter};

/// Appends postings pages to a collection's postings stream.
///
/// Pages are only ever appended. Chaining a new page onto an existing chain
/// overwrites the predecessor's 8-byte `next` field, and those patches are
/// held back until [`PostingsWriter::close`] has flushed the stream so that a
/// buffered append can never land on top of a patch.
#[derive(Debug)]
pub struct PostingsWriter {
    storage: Arc<dyn Storage>,
    name: String,
    index_name: String,
    output: StructWriter<Box<dyn StorageOutput>>,
    session_start: u64,
    index: PostingsIndex,
    patches: Vec<(u64, u64)>,
}

impl PostingsWriter {
    /// Open `name` for appending, with chain tails loaded from `index_name`.
    pub fn open(storage: Arc<dyn Storage>, name: &str, index_name: &str) -> Result<Self> {
        let index = PostingsIndex::load(storage.as_ref(), index_name)?;
        let output = StructWriter::new(storage.create_output_append(name)?)?;
        let session_start = output.position();

        Ok(Self {
            storage,
            name: name.to_string(),
            index_name: index_name.to_string(),
            output,
            session_start,
            index,
            patches: Vec::new(),
        })
    }

    /// Append a new single-page chain and return its address.
    pub fn append(&mut self, doc_ids: &[u64]) -> Result<u64> {
        if doc_ids.is_empty() {
            return Err(FoliumError::invalid_argument(
                "refusing to write an empty postings page",
            ));
        }

        let offset = self.output.position();
        self.output.write_i64(doc_ids.len() as i64)?;
        self.output.write_i64(0)?;
        for id in doc_ids {
            self.output.write_i64(*id as i64)?;
        }
        Ok(offset)
    }

    /// Append `doc_ids` to the chain starting at `head` and return the new
    /// page's address.
    pub fn append_and_update_page_ref(&mut self, head: u64, doc_ids: &[u64]) -> Result<u64> {
        let tail = match self.index.tail(head) {
            Some(tail) => tail,
            None => self.find_tail(head)?,
        };

        let offset = self.append(doc_ids)?;
        self.patches.push((tail + 8, offset));
        self.index.record(head, offset);
        debug!("chained postings page {offset} after {tail} (head {head})");
        Ok(offset)
    }

    fn find_tail(&self, head: u64) -> Result<u64> {
        // Heads written by this writer are not readable yet, and any chain
        // grown from them is already in the index.
        if head >= self.session_start {
            return Ok(head);
        }

        let mut reader = PostingsReader::open(self.storage.as_ref(), &self.name)?;
        let chain = reader.chain(head)?;
        if chain.len() > 1 {
            warn!(
                "postings index had no entry for head {head} of a {}-page chain in {}; walked it",
                chain.len(),
                self.name
            );
        }
        Ok(chain.last().copied().unwrap_or(head))
    }

    /// Number of bytes appended so far by this writer.
    pub fn bytes_written(&self) -> u64 {
        self.output.position() - self.session_start
    }

    /// Flush appended pages, then apply chain patches and persist new links.
    pub fn close(mut self) -> Result<()> {
        self.output.close()?;
        for (offset, value) in &self.patches {
            self.storage.patch_u64(&self.name, *offset, *value)?;
        }
        self.index.flush(self.storage.as_ref(), &self.index_name)?;
        debug!(
            "closed postings writer for {} with {} patches",
            self.name,
            self.patches.len()
        );
        Ok(())
    }
}

/// Size of a postings page holding `count` document IDs.
pub fn page_len(count: usize) -> u64 {
    PAGE_HEADER_SIZE + 8 * count as u64
}

//! Page index: one `offset:i64, length:i64` entry per committed page.

use crate::error::{FoliumError, Result};
use crate::storage::{Storage, StorageOutput, StructReader, StructWriter};

/// Serialized size of one page entry.
pub const PAGE_ENTRY_SIZE: u64 = 16;

/// Location of one committed page inside an index stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: u64,
    pub length: u64,
}

impl Page {
    /// First byte past the page.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Appends entries to a page index stream.
///
/// Entries are held until [`PageIndexWriter::close`], so a writer dropped
/// without closing registers nothing.
#[derive(Debug)]
pub struct PageIndexWriter<W: StorageOutput> {
    writer: StructWriter<W>,
    pages: Vec<Page>,
}

impl<W: StorageOutput> PageIndexWriter<W> {
    pub fn new(output: W) -> Result<Self> {
        Ok(Self {
            writer: StructWriter::new(output)?,
            pages: Vec::new(),
        })
    }

    /// Register a page.
    pub fn put(&mut self, page: Page) -> Result<()> {
        self.pages.push(page);
        Ok(())
    }

    pub fn close(mut self) -> Result<()> {
        for page in std::mem::take(&mut self.pages) {
            self.writer.write_i64(page.offset as i64)?;
            self.writer.write_i64(page.length as i64)?;
        }
        self.writer.close()
    }
}

/// Reads every entry of the page index `name`, in append order.
pub fn read_page_index(storage: &dyn Storage, name: &str) -> Result<Vec<Page>> {
    let mut reader = StructReader::new(storage.open_input(name)?)?;
    if reader.size() % PAGE_ENTRY_SIZE != 0 {
        return Err(FoliumError::corruption(format!(
            "page index {name} has {} bytes, not a multiple of {PAGE_ENTRY_SIZE}",
            reader.size()
        )));
    }

    let mut pages = Vec::with_capacity((reader.size() / PAGE_ENTRY_SIZE) as usize);
    while !reader.is_eof() {
        let offset = reader.read_i64()?;
        let length = reader.read_i64()?;
        if offset < 0 || length < 0 {
            return Err(FoliumError::corruption(format!(
                "negative page entry ({offset}, {length}) in {name}"
            )));
        }
        pages.push(Page {
            offset: offset as u64,
            length: length as u64,
        });
    }
    Ok(pages)
}

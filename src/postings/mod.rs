//! Postings: the document IDs attached to each indexed vector.
//!
//! A postings page is `count:i64, next:i64, docId:i64 * count`. A vector that
//! gains documents in a later commit gets a new page chained from the tail
//! of its existing chain, so reading from the original head always yields
//! the accumulated set. `next == 0` marks the tail.

pub mod index;
pub mod reader;
pub mod writer;

pub use index::PostingsIndex;
pub use reader::PostingsReader;
pub use writer::{page_len, PostingsWriter};

/// Size of the `count, next` header.
pub const PAGE_HEADER_SIZE: u64 = 16;

/// One decoded postings page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingsPage {
    /// Address of the page.
    pub offset: u64,
    /// Address of the following page, if any.
    pub next: Option<u64>,
    /// Document IDs stored in this page.
    pub doc_ids: Vec<u64>,
}

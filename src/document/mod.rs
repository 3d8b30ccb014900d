//! Documents and their storage.

pub mod record;
pub mod store;

pub use record::{Document, DocumentBuilder, FieldValue};
pub use store::{DocumentFiles, DocumentStore, DocumentWriter, StoredDocuments};

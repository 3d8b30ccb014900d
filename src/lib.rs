//! # Folium
//!
//! Document search over paged, disk-resident binary vector trees.
//!
//! Field values are embedded into sparse vectors by a [`model::Model`] and
//! inserted into an in-memory tree per field. A commit serializes each tree
//! as an immutable page appended to the field's column, and attaches the
//! document IDs of every vector as postings. Queries walk the pages of a
//! column for the closest vector and score documents by how well their
//! vectors matched.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use folium::document::Document;
//! use folium::index::{IndexConfig, IndexHandle, Query};
//! use folium::model::BagOfCharsModel;
//! use folium::storage::{FileStorage, StorageConfig};
//!
//! # fn main() -> folium::error::Result<()> {
//! let storage = Arc::new(FileStorage::new("/tmp/folium", StorageConfig::default())?);
//! let handle = IndexHandle::open(
//!     storage,
//!     "books",
//!     IndexConfig::default(),
//!     Arc::new(BagOfCharsModel::new()),
//! )?;
//!
//! let mut session = handle.write_session()?;
//! session.put_document(&Document::builder().add_text("title", "apple pie").build())?;
//! session.commit()?;
//! drop(session);
//!
//! let results = handle
//!     .search_session()?
//!     .search(&Query::new().should("title", "apple"), 0, 10)?;
//! println!("{} hits", results.total);
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod column;
pub mod document;
pub mod error;
pub mod graph;
pub mod index;
pub mod kv;
pub mod model;
pub mod postings;
pub mod storage;
pub mod vector;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

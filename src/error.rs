//! Error types for the Folium library.
//!
//! All fallible operations return [`Result`], whose error side is the
//! [`FoliumError`] enum. Most variants carry a human readable message and are
//! built through the snake-case constructor helpers.
//!
//! # Examples
//!
//! ```
//! use folium::error::{FoliumError, Result};
//!
//! fn check_page_size(page_size: usize) -> Result<()> {
//!     if page_size % 16 != 0 {
//!         return Err(FoliumError::invalid_argument("page size must be a multiple of 16"));
//!     }
//!     Ok(())
//! }
//!
//! assert!(check_page_size(4096).is_ok());
//! assert!(check_page_size(100).is_err());
//! ```

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FoliumError {
    /// I/O errors (file operations, seeks, short reads surfaced by the OS).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A fixed-size page or buffer is full. The caller flushes and retries.
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// Indexed data disagrees with the documents it was built from.
    #[error("Data misalignment: {0}")]
    DataMisalignment(String),

    /// A file referenced by committed data does not exist.
    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    /// Malformed configuration or argument, rejected before any I/O.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A record could not be decoded (short read, bad terminator, bad length).
    #[error("Corruption: {0}")]
    Corruption(String),

    /// Lock contention or a failing backend.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Unparseable query string.
    #[error("Query error: {0}")]
    Query(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FoliumError>;

impl FoliumError {
    pub fn capacity_exceeded<S: Into<String>>(msg: S) -> Self {
        FoliumError::CapacityExceeded(msg.into())
    }

    pub fn data_misalignment<S: Into<String>>(msg: S) -> Self {
        FoliumError::DataMisalignment(msg.into())
    }

    pub fn missing_dependency<S: Into<String>>(msg: S) -> Self {
        FoliumError::MissingDependency(msg.into())
    }

    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        FoliumError::InvalidArgument(msg.into())
    }

    pub fn corruption<S: Into<String>>(msg: S) -> Self {
        FoliumError::Corruption(msg.into())
    }

    pub fn storage<S: Into<String>>(msg: S) -> Self {
        FoliumError::Storage(msg.into())
    }

    pub fn query<S: Into<String>>(msg: S) -> Self {
        FoliumError::Query(msg.into())
    }

    /// Whether a fixed-size page filled up.
    pub fn is_capacity_exceeded(&self) -> bool {
        matches!(self, FoliumError::CapacityExceeded(_))
    }
}

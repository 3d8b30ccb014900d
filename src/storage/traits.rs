//! The storage contract shared by every backend.

use std::io::{Read, Seek, Write};

use serde::{Deserialize, Serialize};

use crate::error::{FoliumError, Result};

/// A directory of named byte streams.
///
/// Streams are append-only: outputs are created fresh or opened for append,
/// and the only in-place mutation is [`Storage::patch_u64`].
pub trait Storage: Send + Sync + std::fmt::Debug {
    /// Open a stream for reading. A missing stream is a
    /// [`StorageError::FileNotFound`].
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>>;

    /// Create a stream, truncating any existing content.
    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>>;

    /// Open a stream for appending. The output position starts at the
    /// current end of the stream so that recorded offsets are absolute.
    fn create_output_append(&self, name: &str) -> Result<Box<dyn StorageOutput>>;

    /// Overwrite one little-endian 64-bit word at `offset` in an existing
    /// stream. The word must lie entirely inside the stream.
    ///
    /// Only postings `next` pointers are patched; everything else is
    /// immutable once written.
    fn patch_u64(&self, name: &str, offset: u64, value: u64) -> Result<()>;

    fn file_exists(&self, name: &str) -> bool;

    /// Delete a stream. Deleting a missing stream is not an error.
    fn delete_file(&self, name: &str) -> Result<()>;

    fn file_size(&self, name: &str) -> Result<u64>;

    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()>;

    /// Locks used to keep one writer per collection.
    fn lock_manager(&self) -> &dyn LockManager;

    /// Make closed outputs durable.
    fn sync(&self) -> Result<()>;

    fn config(&self) -> &StorageConfig;
}

/// A readable, seekable stream.
pub trait StorageInput: Read + Seek + Send + std::fmt::Debug {
    /// Length of the stream when it was opened.
    fn size(&self) -> Result<u64>;
}

/// An appendable stream.
pub trait StorageOutput: Write + Send + std::fmt::Debug {
    /// Absolute position of the next byte written.
    fn position(&self) -> Result<u64>;

    /// Flush buffered bytes, making them visible to new inputs.
    fn close(&mut self) -> Result<()>;
}

impl StorageOutput for Box<dyn StorageOutput> {
    fn position(&self) -> Result<u64> {
        self.as_ref().position()
    }

    fn close(&mut self) -> Result<()> {
        self.as_mut().close()
    }
}

impl StorageInput for Box<dyn StorageInput> {
    fn size(&self) -> Result<u64> {
        self.as_ref().size()
    }
}

/// Hands out named exclusive locks.
pub trait LockManager: Send + Sync + std::fmt::Debug {
    /// Take the lock `name`, failing with [`StorageError::LockFailed`] if it
    /// is held.
    fn acquire_lock(&self, name: &str) -> Result<Box<dyn StorageLock>>;

    /// Whether the lock `name` is currently held.
    fn is_locked(&self, name: &str) -> bool;
}

/// A held lock. Dropping it releases the lock.
pub trait StorageLock: Send + std::fmt::Debug {
    fn name(&self) -> &str;

    /// Release the lock early. Releasing twice is a no-op.
    fn release(&mut self) -> Result<()>;
}

/// Backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Capacity of the read and write buffers, in bytes.
    pub buffer_size: usize,

    /// fsync each output on close and after each patch.
    pub sync_writes: bool,

    /// Whether writers take a lock file before mutating a collection.
    pub use_locking: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            buffer_size: 64 * 1024,
            sync_writes: false,
            use_locking: true,
        }
    }
}

/// Backend failures, converted into [`FoliumError`] at the boundary.
#[derive(Debug, Clone)]
pub enum StorageError {
    FileNotFound(String),

    IoError(String),

    /// The named lock is already held.
    LockFailed(String),

    /// Patch target lies outside the file.
    PatchOutOfBounds { name: String, offset: u64, size: u64 },
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::FileNotFound(name) => write!(f, "File not found: {name}"),
            StorageError::IoError(msg) => write!(f, "I/O error: {msg}"),
            StorageError::LockFailed(name) => write!(f, "Failed to acquire lock: {name}"),
            StorageError::PatchOutOfBounds { name, offset, size } => write!(
                f,
                "Patch at offset {offset} is outside {name} ({size} bytes)"
            ),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<StorageError> for FoliumError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::FileNotFound(name) => FoliumError::missing_dependency(name),
            StorageError::LockFailed(_) => FoliumError::storage(err.to_string()),
            StorageError::PatchOutOfBounds { .. } => FoliumError::corruption(err.to_string()),
            StorageError::IoError(_) => FoliumError::storage(err.to_string()),
        }
    }
}

//! Named append-only byte streams.
//!
//! A collection is a set of streams in one [`Storage`]. The file system
//! backend is used in production; the memory backend in tests.

pub mod file;
pub mod memory;
pub mod structured;
pub mod traits;

pub use file::{FileLockManager, FileStorage};
pub use memory::{MemoryLockManager, MemoryStorage};
pub use structured::{StructReader, StructWriter};
pub use traits::{
    LockManager, Storage, StorageConfig, StorageError, StorageInput, StorageLock, StorageOutput,
};

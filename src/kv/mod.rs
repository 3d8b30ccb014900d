//! Fixed-width paged key engine.
//!
//! Keys of one primitive type are stored in fixed-size pages, sorted within
//! each page and padded with the type's maximum value. A parallel address
//! stream holds one `offset:i64, length:i64` entry per key slot; padding
//! slots store `-1, -1`. Both streams grow one page at a time, so page `n`
//! starts at `n * page_size` in the key stream.
//!
//! A full page is not an error condition: [`PagedKeyWriter::put`] returns
//! [`KeyRejected::PageFull`] and the caller flushes before retrying.

pub mod reader;
pub mod writer;

use std::cmp::Ordering;
use std::fmt::Debug;

pub use reader::{PagedKeyIndex, PagedKeyReader};
pub use writer::PagedKeyWriter;

use crate::error::{FoliumError, Result};

/// Size of one address entry.
pub const ADDRESS_SIZE: usize = 16;

/// A primitive key type with a fixed little-endian width.
pub trait KeyType: Copy + Debug + Send + Sync + 'static {
    /// Encoded width in bytes.
    const SIZE: usize;

    /// Largest value; used to pad pages.
    const MAX: Self;

    /// Total order over keys.
    fn compare(&self, other: &Self) -> Ordering;

    /// Encode into exactly [`KeyType::SIZE`] bytes.
    fn to_bytes(&self, out: &mut [u8]);

    /// Decode from exactly [`KeyType::SIZE`] bytes.
    fn from_bytes(bytes: &[u8]) -> Self;

    /// Whether the key can be stored. Every stored key must sort at or below
    /// [`KeyType::MAX`].
    fn is_storable(&self) -> bool {
        true
    }
}

macro_rules! integer_key {
    ($($t:ty),*) => {
        $(
            impl KeyType for $t {
                const SIZE: usize = std::mem::size_of::<$t>();
                const MAX: Self = <$t>::MAX;

                fn compare(&self, other: &Self) -> Ordering {
                    self.cmp(other)
                }

                fn to_bytes(&self, out: &mut [u8]) {
                    out.copy_from_slice(&self.to_le_bytes());
                }

                fn from_bytes(bytes: &[u8]) -> Self {
                    let mut buf = [0u8; std::mem::size_of::<$t>()];
                    buf.copy_from_slice(bytes);
                    <$t>::from_le_bytes(buf)
                }
            }
        )*
    };
}

integer_key!(u8, i16, i32, i64, i128);

impl KeyType for f64 {
    const SIZE: usize = 8;
    const MAX: Self = f64::MAX;

    fn compare(&self, other: &Self) -> Ordering {
        self.total_cmp(other)
    }

    fn is_storable(&self) -> bool {
        !self.is_nan()
    }

    fn to_bytes(&self, out: &mut [u8]) {
        out.copy_from_slice(&self.to_le_bytes());
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        f64::from_le_bytes(buf)
    }
}

/// Location of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Address {
    pub offset: u64,
    pub length: u64,
}

/// Successful [`PagedKeyWriter::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inserted {
    /// The key was new to the current page.
    Added,
    /// The key was already in the current page; its address was replaced.
    Replaced,
}

/// Why [`PagedKeyWriter::put`] refused a key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyRejected {
    /// The current page has no free slot.
    #[error("key page is full ({capacity} keys)")]
    PageFull { capacity: usize },
    /// The key has no place below the padding value, e.g. a NaN.
    #[error("key {0} cannot be stored")]
    Unstorable(String),
}

impl From<KeyRejected> for FoliumError {
    fn from(rejected: KeyRejected) -> Self {
        match rejected {
            KeyRejected::PageFull { .. } => FoliumError::capacity_exceeded(rejected.to_string()),
            KeyRejected::Unstorable(_) => FoliumError::invalid_argument(rejected.to_string()),
        }
    }
}

/// Number of keys of type `K` that fit in `page_size` bytes, after checking
/// that the page size is usable.
pub fn page_capacity<K: KeyType>(page_size: usize) -> Result<usize> {
    if page_size == 0 || page_size % K::SIZE != 0 || page_size % ADDRESS_SIZE != 0 {
        return Err(FoliumError::invalid_argument(format!(
            "page size {page_size} must be a non-zero multiple of the key size {} and of {ADDRESS_SIZE}",
            K::SIZE
        )));
    }
    Ok(page_size / K::SIZE)
}

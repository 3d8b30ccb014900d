//! Key page readers.

use std::cmp::Ordering;

use crate::error::{FoliumError, Result};
use crate::kv::{page_capacity, Address, KeyType, ADDRESS_SIZE};
use crate::storage::{Storage, StructReader};

/// One decoded key page. Padding slots are dropped on load, so a mostly
/// empty page costs memory only for its real keys.
#[derive(Debug, Clone)]
pub struct PagedKeyReader<K: KeyType> {
    offset: u64,
    keys: Vec<K>,
    addresses: Vec<Address>,
}

impl<K: KeyType> PagedKeyReader<K> {
    /// Read the page that starts at `page_offset` in the key stream.
    pub fn open(
        storage: &dyn Storage,
        keys_name: &str,
        addresses_name: &str,
        page_offset: u64,
        page_size: usize,
    ) -> Result<Self> {
        let capacity = page_capacity::<K>(page_size)?;
        if page_offset % page_size as u64 != 0 {
            return Err(FoliumError::invalid_argument(format!(
                "page offset {page_offset} is not aligned to {page_size}"
            )));
        }
        let page_no = page_offset / page_size as u64;

        let mut key_reader = StructReader::new(storage.open_input(keys_name)?)?;
        key_reader.seek(page_offset)?;
        let raw = key_reader.read_raw(page_size)?;

        let mut address_reader = StructReader::new(storage.open_input(addresses_name)?)?;
        address_reader.seek(page_no * (capacity * ADDRESS_SIZE) as u64)?;
        let mut keys = Vec::new();
        let mut addresses = Vec::new();
        for chunk in raw.chunks_exact(K::SIZE) {
            let offset = address_reader.read_i64()?;
            let length = address_reader.read_i64()?;
            if offset >= 0 && length >= 0 {
                keys.push(K::from_bytes(chunk));
                addresses.push(Address {
                    offset: offset as u64,
                    length: length as u64,
                });
            }
        }

        Ok(Self {
            offset: page_offset,
            keys,
            addresses,
        })
    }

    /// Offset of this page in the key stream.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Address stored for `key`, if the page holds it.
    pub fn get(&self, key: &K) -> Option<Address> {
        let slot = self
            .keys
            .partition_point(|k| k.compare(key) == Ordering::Less);
        match self.keys.get(slot) {
            Some(found) if found.compare(key) == Ordering::Equal => Some(self.addresses[slot]),
            _ => None,
        }
    }

    /// Number of real keys in the page.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Real keys with their addresses, ascending.
    pub fn entries(&self) -> impl Iterator<Item = (K, Address)> + '_ {
        self.keys.iter().copied().zip(self.addresses.iter().copied())
    }
}

/// Every page of a key stream. Later pages shadow earlier ones.
#[derive(Debug, Clone)]
pub struct PagedKeyIndex<K: KeyType> {
    pages: Vec<PagedKeyReader<K>>,
}

impl<K: KeyType> PagedKeyIndex<K> {
    /// Load all pages. Missing streams are an empty index.
    pub fn open(
        storage: &dyn Storage,
        keys_name: &str,
        addresses_name: &str,
        page_size: usize,
    ) -> Result<Self> {
        page_capacity::<K>(page_size)?;
        if !storage.file_exists(keys_name) {
            return Ok(Self { pages: Vec::new() });
        }

        let size = storage.file_size(keys_name)?;
        if size % page_size as u64 != 0 {
            return Err(FoliumError::corruption(format!(
                "{keys_name} has {size} bytes, not whole {page_size}-byte pages"
            )));
        }

        let pages = (0..size / page_size as u64)
            .map(|n| {
                PagedKeyReader::open(
                    storage,
                    keys_name,
                    addresses_name,
                    n * page_size as u64,
                    page_size,
                )
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { pages })
    }

    /// Address of `key` in the newest page that holds it.
    pub fn get(&self, key: &K) -> Option<Address> {
        self.pages.iter().rev().find_map(|page| page.get(key))
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Number of distinct keys across all pages.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.iter().all(|page| page.is_empty())
    }

    /// Every live key with its newest address, ascending.
    pub fn entries(&self) -> Vec<(K, Address)> {
        let mut all: Vec<(K, Address)> = self
            .pages
            .iter()
            .rev()
            .flat_map(|page| page.entries())
            .collect();
        // Stable: for equal keys the newest page stays first.
        all.sort_by(|(a, _), (b, _)| a.compare(b));
        all.dedup_by(|later, earlier| later.0.compare(&earlier.0) == Ordering::Equal);
        all
    }
}

//! Key page writer.

use log::debug;

use crate::error::{FoliumError, Result};
use crate::kv::{page_capacity, Address, Inserted, KeyRejected, KeyType, ADDRESS_SIZE};
use crate::storage::{Storage, StorageOutput, StructWriter};

/// Buffers one page of keys and appends it when flushed.
#[derive(Debug)]
pub struct PagedKeyWriter<K: KeyType> {
    keys: StructWriter<Box<dyn StorageOutput>>,
    addresses: StructWriter<Box<dyn StorageOutput>>,
    page_size: usize,
    capacity: usize,
    entries: Vec<(K, Address)>,
}

impl<K: KeyType> PagedKeyWriter<K> {
    /// Open both streams for append. Existing content must be whole pages.
    pub fn open(
        storage: &dyn Storage,
        keys_name: &str,
        addresses_name: &str,
        page_size: usize,
    ) -> Result<Self> {
        let capacity = page_capacity::<K>(page_size)?;
        let keys = StructWriter::new(storage.create_output_append(keys_name)?)?;
        let addresses = StructWriter::new(storage.create_output_append(addresses_name)?)?;

        let pages = keys.position() / page_size as u64;
        if keys.position() % page_size as u64 != 0
            || addresses.position() != pages * (capacity * ADDRESS_SIZE) as u64
        {
            return Err(FoliumError::corruption(format!(
                "{keys_name} ({} bytes) and {addresses_name} ({} bytes) are not whole {page_size}-byte pages",
                keys.position(),
                addresses.position()
            )));
        }

        Ok(Self {
            keys,
            addresses,
            page_size,
            capacity,
            entries: Vec::with_capacity(capacity),
        })
    }

    /// Keys per page.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Keys buffered in the current page.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the next new key would not fit.
    pub fn is_full(&self) -> bool {
        self.entries.len() == self.capacity
    }

    /// Offset the current page will be written at.
    pub fn page_offset(&self) -> u64 {
        self.keys.position()
    }

    /// Add a key to the current page, or replace its address if it is
    /// already there.
    pub fn put(&mut self, key: K, address: Address) -> std::result::Result<Inserted, KeyRejected> {
        if !key.is_storable() {
            return Err(KeyRejected::Unstorable(format!("{key:?}")));
        }
        match self
            .entries
            .binary_search_by(|(existing, _)| existing.compare(&key))
        {
            Ok(i) => {
                self.entries[i].1 = address;
                Ok(Inserted::Replaced)
            }
            Err(_) if self.is_full() => Err(KeyRejected::PageFull {
                capacity: self.capacity,
            }),
            Err(i) => {
                self.entries.insert(i, (key, address));
                Ok(Inserted::Added)
            }
        }
    }

    /// Write the current page padded to full size. Returns its offset, or
    /// `None` if nothing was buffered.
    pub fn flush_page(&mut self) -> Result<Option<u64>> {
        if self.entries.is_empty() {
            return Ok(None);
        }

        let offset = self.keys.position();
        let mut page = vec![0u8; self.page_size];
        for (slot, chunk) in page.chunks_exact_mut(K::SIZE).enumerate() {
            match self.entries.get(slot) {
                Some((key, address)) => {
                    key.to_bytes(chunk);
                    self.addresses.write_i64(address.offset as i64)?;
                    self.addresses.write_i64(address.length as i64)?;
                }
                None => {
                    K::MAX.to_bytes(chunk);
                    self.addresses.write_i64(-1)?;
                    self.addresses.write_i64(-1)?;
                }
            }
        }
        self.keys.write_raw(&page)?;

        debug!(
            "flushed key page at {offset} with {} of {} keys",
            self.entries.len(),
            self.capacity
        );
        self.entries.clear();
        Ok(Some(offset))
    }

    /// Flush any buffered keys and close both streams.
    pub fn close(mut self) -> Result<()> {
        self.flush_page()?;
        self.keys.close()?;
        self.addresses.close()
    }
}

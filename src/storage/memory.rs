//! Heap-backed storage for tests and throwaway collections.

use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use parking_lot::Mutex;

use crate::error::Result;
use crate::storage::traits::{
    LockManager, Storage, StorageConfig, StorageError, StorageInput, StorageLock, StorageOutput,
};

type Files = Arc<Mutex<AHashMap<String, Vec<u8>>>>;

/// Storage keeping every file as a byte vector.
///
/// Bytes written through an output become visible when the output is
/// closed or dropped.
#[derive(Debug)]
pub struct MemoryStorage {
    files: Files,
    locks: MemoryLockManager,
    config: StorageConfig,
}

impl MemoryStorage {
    pub fn new(config: StorageConfig) -> Self {
        MemoryStorage {
            files: Arc::default(),
            locks: MemoryLockManager::default(),
            config,
        }
    }

    pub fn new_default() -> Self {
        Self::new(StorageConfig::default())
    }

    fn missing(name: &str) -> StorageError {
        StorageError::FileNotFound(name.to_string())
    }
}

impl Storage for MemoryStorage {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        let data = self
            .files
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| Self::missing(name))?;
        Ok(Box::new(MemoryInput {
            size: data.len() as u64,
            cursor: Cursor::new(data),
        }))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        Ok(Box::new(MemoryOutput {
            name: name.to_string(),
            pending: Vec::new(),
            files: Arc::clone(&self.files),
            replace: true,
            position: 0,
            closed: false,
        }))
    }

    fn create_output_append(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        let position = self.files.lock().get(name).map_or(0, |data| data.len() as u64);
        Ok(Box::new(MemoryOutput {
            name: name.to_string(),
            pending: Vec::new(),
            files: Arc::clone(&self.files),
            replace: false,
            position,
            closed: false,
        }))
    }

    fn patch_u64(&self, name: &str, offset: u64, value: u64) -> Result<()> {
        let mut files = self.files.lock();
        let data = files.get_mut(name).ok_or_else(|| Self::missing(name))?;
        let size = data.len() as u64;
        if offset.checked_add(8).is_none_or(|end| end > size) {
            return Err(StorageError::PatchOutOfBounds {
                name: name.to_string(),
                offset,
                size,
            }
            .into());
        }
        let at = offset as usize;
        data[at..at + 8].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    fn file_exists(&self, name: &str) -> bool {
        self.files.lock().contains_key(name)
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.files.lock().remove(name);
        Ok(())
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        self.files
            .lock()
            .get(name)
            .map(|data| data.len() as u64)
            .ok_or_else(|| Self::missing(name).into())
    }

    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()> {
        let mut files = self.files.lock();
        let data = files.remove(old_name).ok_or_else(|| Self::missing(old_name))?;
        files.insert(new_name.to_string(), data);
        Ok(())
    }

    fn lock_manager(&self) -> &dyn LockManager {
        &self.locks
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }

    fn config(&self) -> &StorageConfig {
        &self.config
    }
}

#[derive(Debug)]
struct MemoryInput {
    cursor: Cursor<Vec<u8>>,
    size: u64,
}

impl Read for MemoryInput {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl Seek for MemoryInput {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.cursor.seek(pos)
    }
}

impl StorageInput for MemoryInput {
    fn size(&self) -> Result<u64> {
        Ok(self.size)
    }
}

/// Buffers only its own bytes, so patches applied to the file while an
/// append output is open survive the close.
#[derive(Debug)]
struct MemoryOutput {
    name: String,
    pending: Vec<u8>,
    files: Files,
    replace: bool,
    position: u64,
    closed: bool,
}

impl Write for MemoryOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.closed {
            return Err(std::io::Error::other(format!("{} is closed", self.name)));
        }
        self.pending.extend_from_slice(buf);
        self.position += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl StorageOutput for MemoryOutput {
    fn position(&self) -> Result<u64> {
        Ok(self.position)
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let bytes = std::mem::take(&mut self.pending);
        let mut files = self.files.lock();
        if self.replace {
            files.insert(self.name.clone(), bytes);
        } else {
            files.entry(self.name.clone()).or_default().extend(bytes);
        }
        Ok(())
    }
}

impl Drop for MemoryOutput {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Named locks held in a shared set.
#[derive(Debug, Default)]
pub struct MemoryLockManager {
    held: Arc<Mutex<AHashSet<String>>>,
}

impl LockManager for MemoryLockManager {
    fn acquire_lock(&self, name: &str) -> Result<Box<dyn StorageLock>> {
        if !self.held.lock().insert(name.to_string()) {
            return Err(StorageError::LockFailed(name.to_string()).into());
        }
        Ok(Box::new(MemoryLock {
            name: name.to_string(),
            held: Arc::clone(&self.held),
            released: false,
        }))
    }

    fn is_locked(&self, name: &str) -> bool {
        self.held.lock().contains(name)
    }
}

#[derive(Debug)]
struct MemoryLock {
    name: String,
    held: Arc<Mutex<AHashSet<String>>>,
    released: bool,
}

impl StorageLock for MemoryLock {
    fn name(&self) -> &str {
        &self.name
    }

    fn release(&mut self) -> Result<()> {
        if !self.released {
            self.held.lock().remove(&self.name);
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for MemoryLock {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

//! Storage backed by one directory on the local file system.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, WriteBytesExt};
use log::debug;

use crate::error::{FoliumError, Result};
use crate::storage::traits::{
    LockManager, Storage, StorageConfig, StorageError, StorageInput, StorageLock, StorageOutput,
};

/// Each stream is a file named after it inside `directory`.
#[derive(Debug)]
pub struct FileStorage {
    directory: PathBuf,
    config: StorageConfig,
    locks: FileLockManager,
}

impl FileStorage {
    /// Open `directory`, creating it if needed.
    pub fn new<P: AsRef<Path>>(directory: P, config: StorageConfig) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        std::fs::create_dir_all(&directory).map_err(|e| {
            FoliumError::storage(format!("cannot create {}: {e}", directory.display()))
        })?;
        if !directory.is_dir() {
            return Err(FoliumError::storage(format!(
                "{} is not a directory",
                directory.display()
            )));
        }

        Ok(FileStorage {
            locks: FileLockManager {
                directory: directory.clone(),
            },
            directory,
            config,
        })
    }

    fn path(&self, name: &str) -> PathBuf {
        self.directory.join(name)
    }

    fn io_error(e: std::io::Error) -> StorageError {
        StorageError::IoError(e.to_string())
    }

    fn open_error(name: &str, e: std::io::Error) -> StorageError {
        if e.kind() == ErrorKind::NotFound {
            StorageError::FileNotFound(name.to_string())
        } else {
            Self::io_error(e)
        }
    }

    fn output(&self, file: File, position: u64) -> Box<dyn StorageOutput> {
        Box::new(FileOutput {
            writer: BufWriter::with_capacity(self.config.buffer_size, file),
            position,
            sync_writes: self.config.sync_writes,
        })
    }
}

impl Storage for FileStorage {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        let file = File::open(self.path(name)).map_err(|e| Self::open_error(name, e))?;
        let size = file.metadata().map_err(Self::io_error)?.len();
        Ok(Box::new(FileInput {
            reader: BufReader::with_capacity(self.config.buffer_size, file),
            size,
        }))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        let file = File::create(self.path(name)).map_err(Self::io_error)?;
        Ok(self.output(file, 0))
    }

    fn create_output_append(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(name))
            .map_err(Self::io_error)?;
        let end = file.metadata().map_err(Self::io_error)?.len();
        Ok(self.output(file, end))
    }

    fn patch_u64(&self, name: &str, offset: u64, value: u64) -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .open(self.path(name))
            .map_err(|e| Self::open_error(name, e))?;

        let size = file.metadata().map_err(Self::io_error)?.len();
        if offset.checked_add(8).is_none_or(|end| end > size) {
            return Err(StorageError::PatchOutOfBounds {
                name: name.to_string(),
                offset,
                size,
            }
            .into());
        }

        file.seek(SeekFrom::Start(offset))?;
        file.write_u64::<LittleEndian>(value)?;
        if self.config.sync_writes {
            file.sync_data()?;
        }
        Ok(())
    }

    fn file_exists(&self, name: &str) -> bool {
        self.path(name).is_file()
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        match std::fs::remove_file(self.path(name)) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(Self::io_error(e).into()),
            _ => Ok(()),
        }
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        let metadata = self
            .path(name)
            .metadata()
            .map_err(|e| Self::open_error(name, e))?;
        Ok(metadata.len())
    }

    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()> {
        std::fs::rename(self.path(old_name), self.path(new_name))
            .map_err(|e| Self::open_error(old_name, e))?;
        Ok(())
    }

    fn lock_manager(&self) -> &dyn LockManager {
        &self.locks
    }

    fn sync(&self) -> Result<()> {
        // Directory entries for new and renamed files.
        #[cfg(unix)]
        File::open(&self.directory)
            .and_then(|dir| dir.sync_all())
            .map_err(Self::io_error)?;
        Ok(())
    }

    fn config(&self) -> &StorageConfig {
        &self.config
    }
}

#[derive(Debug)]
struct FileInput {
    reader: BufReader<File>,
    size: u64,
}

impl Read for FileInput {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}

impl Seek for FileInput {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.reader.seek(pos)
    }
}

impl StorageInput for FileInput {
    fn size(&self) -> Result<u64> {
        Ok(self.size)
    }
}

#[derive(Debug)]
struct FileOutput {
    writer: BufWriter<File>,
    position: u64,
    sync_writes: bool,
}

impl Write for FileOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.writer.write(buf)?;
        self.position += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

impl StorageOutput for FileOutput {
    fn position(&self) -> Result<u64> {
        Ok(self.position)
    }

    fn close(&mut self) -> Result<()> {
        self.writer.flush().map_err(Self::flush_error)?;
        if self.sync_writes {
            self.writer.get_ref().sync_all().map_err(Self::flush_error)?;
        }
        Ok(())
    }
}

impl FileOutput {
    fn flush_error(e: std::io::Error) -> FoliumError {
        FoliumError::storage(format!("flush failed: {e}"))
    }
}

/// Locks are `<name>.lock` files created with `create_new`, so they also
/// exclude writers in other processes.
#[derive(Debug)]
pub struct FileLockManager {
    directory: PathBuf,
}

impl FileLockManager {
    fn lock_path(&self, name: &str) -> PathBuf {
        self.directory.join(format!("{name}.lock"))
    }
}

impl LockManager for FileLockManager {
    fn acquire_lock(&self, name: &str) -> Result<Box<dyn StorageLock>> {
        let path = self.lock_path(name);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => StorageError::LockFailed(name.to_string()),
                _ => FileStorage::io_error(e),
            })?;
        debug!("acquired lock {}", path.display());

        Ok(Box::new(FileLock {
            name: name.to_string(),
            path,
            _file: file,
            released: false,
        }))
    }

    fn is_locked(&self, name: &str) -> bool {
        self.lock_path(name).exists()
    }
}

#[derive(Debug)]
struct FileLock {
    name: String,
    path: PathBuf,
    _file: File,
    released: bool,
}

impl StorageLock for FileLock {
    fn name(&self) -> &str {
        &self.name
    }

    fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        std::fs::remove_file(&self.path)
            .map_err(|e| FoliumError::storage(format!("cannot release lock {}: {e}", self.name)))?;
        self.released = true;
        Ok(())
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

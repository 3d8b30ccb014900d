//! Little-endian fixed-width records over storage streams.
//!
//! Every on-disk structure (index blocks, page entries, postings headers,
//! vector payloads, key pages) is built from the primitives below.
//! [`StructWriter`] tracks the absolute stream position so callers can
//! record offsets. [`StructReader`] turns a short read into
//! [`FoliumError::Corruption`] rather than returning partial data.

use std::io::{self, Read, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{FoliumError, Result};
use crate::storage::{StorageInput, StorageOutput};

macro_rules! fixed_width {
    ($($ty:ty: $write:ident / $read:ident),* $(,)?) => {
        impl<W: StorageOutput> StructWriter<W> {
            $(
                pub fn $write(&mut self, value: $ty) -> Result<()> {
                    self.writer.$write::<LittleEndian>(value)?;
                    self.position += size_of::<$ty>() as u64;
                    Ok(())
                }
            )*
        }

        impl<R: StorageInput> StructReader<R> {
            $(
                pub fn $read(&mut self) -> Result<$ty> {
                    let value = self
                        .reader
                        .$read::<LittleEndian>()
                        .map_err(|e| self.short_read(size_of::<$ty>(), e))?;
                    self.position += size_of::<$ty>() as u64;
                    Ok(value)
                }
            )*
        }
    };
}

fixed_width! {
    i32: write_i32 / read_i32,
    i64: write_i64 / read_i64,
    u64: write_u64 / read_u64,
    f32: write_f32 / read_f32,
    f64: write_f64 / read_f64,
}

#[derive(Debug)]
pub struct StructWriter<W: StorageOutput> {
    writer: W,
    position: u64,
}

impl<W: StorageOutput> StructWriter<W> {
    /// Starts at the output's own position, the end of the file for append
    /// outputs.
    pub fn new(writer: W) -> Result<Self> {
        let position = writer.position()?;
        Ok(StructWriter { writer, position })
    }

    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    /// Absolute offset of the next record.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn close(mut self) -> Result<()> {
        self.writer.close()
    }
}

#[derive(Debug)]
pub struct StructReader<R: StorageInput> {
    reader: R,
    position: u64,
    len: u64,
}

impl<R: StorageInput> StructReader<R> {
    pub fn new(reader: R) -> Result<Self> {
        let len = reader.size()?;
        Ok(StructReader {
            reader,
            position: 0,
            len,
        })
    }

    fn short_read(&self, wanted: usize, err: io::Error) -> FoliumError {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => FoliumError::corruption(format!(
                "short read: wanted {wanted} bytes at offset {} of {}",
                self.position, self.len
            )),
            _ => FoliumError::Io(err),
        }
    }

    pub fn read_raw(&mut self, length: usize) -> Result<Vec<u8>> {
        self.ensure_records(length as u64, 1)?;
        let mut bytes = vec![0u8; length];
        self.reader
            .read_exact(&mut bytes)
            .map_err(|e| self.short_read(length, e))?;
        self.position += length as u64;
        Ok(bytes)
    }

    /// Move to an absolute offset inside the stream.
    pub fn seek(&mut self, offset: u64) -> Result<()> {
        if offset > self.len {
            return Err(FoliumError::corruption(format!(
                "seek to {offset} past end of stream ({} bytes)",
                self.len
            )));
        }
        self.reader.seek(SeekFrom::Start(offset))?;
        self.position = offset;
        Ok(())
    }

    pub fn skip(&mut self, distance: u64) -> Result<()> {
        self.seek(self.position.saturating_add(distance))
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Stream length when the reader was opened.
    pub fn size(&self) -> u64 {
        self.len
    }

    /// Bytes between the current position and the end of the stream.
    pub fn remaining(&self) -> u64 {
        self.len.saturating_sub(self.position)
    }

    /// Fail with `Corruption` unless `count` records of `record_size` bytes
    /// fit before the end of the stream.
    pub fn ensure_records(&self, count: u64, record_size: u64) -> Result<()> {
        match count.checked_mul(record_size) {
            Some(bytes) if bytes <= self.remaining() => Ok(()),
            _ => Err(FoliumError::corruption(format!(
                "{count} records of {record_size} bytes at offset {} overrun the stream ({} bytes)",
                self.position, self.len
            ))),
        }
    }

    pub fn is_eof(&self) -> bool {
        self.position >= self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, Storage};

    fn write(
        storage: &MemoryStorage,
        name: &str,
        f: impl FnOnce(&mut StructWriter<Box<dyn StorageOutput>>),
    ) {
        let mut writer = StructWriter::new(storage.create_output(name).unwrap()).unwrap();
        f(&mut writer);
        writer.close().unwrap();
    }

    fn read(storage: &MemoryStorage, name: &str) -> StructReader<Box<dyn StorageInput>> {
        StructReader::new(storage.open_input(name).unwrap()).unwrap()
    }

    #[test]
    fn test_every_width() {
        let storage = MemoryStorage::new_default();
        write(&storage, "mixed", |w| {
            w.write_i32(-7).unwrap();
            w.write_i64(9_876_543_210).unwrap();
            w.write_u64(u64::MAX).unwrap();
            w.write_f32(0.25).unwrap();
            w.write_f64(-1.5).unwrap();
            w.write_raw(b"tail").unwrap();
            assert_eq!(w.position(), 36);
        });

        let mut reader = read(&storage, "mixed");
        assert_eq!(reader.size(), 36);
        assert_eq!(reader.read_i32().unwrap(), -7);
        assert_eq!(reader.read_i64().unwrap(), 9_876_543_210);
        assert_eq!(reader.read_u64().unwrap(), u64::MAX);
        assert_eq!(reader.read_f32().unwrap(), 0.25);
        assert_eq!(reader.read_f64().unwrap(), -1.5);
        assert_eq!(reader.read_raw(4).unwrap(), b"tail");
        assert!(reader.is_eof());
    }

    #[test]
    fn test_append_writer_starts_at_end() {
        let storage = MemoryStorage::new_default();
        write(&storage, "log", |w| w.write_i64(1).unwrap());

        let writer = StructWriter::new(storage.create_output_append("log").unwrap()).unwrap();
        assert_eq!(writer.position(), 8);
    }

    #[test]
    fn test_short_read_is_corruption() {
        let storage = MemoryStorage::new_default();
        write(&storage, "short", |w| w.write_i32(1).unwrap());

        let mut reader = read(&storage, "short");
        assert!(matches!(reader.read_i64(), Err(FoliumError::Corruption(_))));
    }

    #[test]
    fn test_seek_and_skip() {
        let storage = MemoryStorage::new_default();
        write(&storage, "seek", |w| {
            for i in 0..4 {
                w.write_i64(i).unwrap();
            }
        });

        let mut reader = read(&storage, "seek");
        reader.seek(8).unwrap();
        assert_eq!(reader.read_i64().unwrap(), 1);
        reader.skip(8).unwrap();
        assert_eq!(reader.read_i64().unwrap(), 3);
        assert!(reader.seek(64).is_err());
    }

    #[test]
    fn test_record_counts_checked_against_stream() {
        let storage = MemoryStorage::new_default();
        write(&storage, "four", |w| {
            for i in 0..4 {
                w.write_i64(i).unwrap();
            }
        });

        let mut reader = read(&storage, "four");
        reader.seek(8).unwrap();
        assert_eq!(reader.remaining(), 24);
        assert!(reader.ensure_records(3, 8).is_ok());
        assert!(matches!(
            reader.ensure_records(4, 8),
            Err(FoliumError::Corruption(_))
        ));
        assert!(matches!(
            reader.ensure_records(u64::MAX, 8),
            Err(FoliumError::Corruption(_))
        ));
    }
}

//! Storage abstraction layer for falx.
//!
//! This module provides a pluggable directory abstraction over which every
//! segment file is written and read. It supports two backends with a unified
//! interface:
//!
//! - **FileStorage**: disk-based persistent storage with atomic renames and
//!   reference-counted deletion protection,
//! - **MemoryStorage**: in-memory storage for testing and the in-RAM index.
//!
//! The index only ever uses the lifecycle "create, append, sync, rename,
//! open read-only, delete": segment files are write-once, and the
//! `segments_N` rename is the atomic commit point.
//!
//! # Example
//!
//! ```ignore
//! use falx::storage::{StorageConfig, StorageFactory, FileStorageConfig};
//!
//! let storage = StorageFactory::create(StorageConfig::File(
//!     FileStorageConfig::new("/path/to/index"),
//! ))?;
//! let files = storage.list_all()?;
//! ```

use std::fmt::Debug;
use std::io::{Read, Seek, Write};

use crate::error::Result;

pub mod checksum;
pub mod file;
pub mod memory;
pub mod structured;

/// A directory of index files.
///
/// Implementations must be safe to share across threads: many readers and a
/// single writer may hold the same storage at once.
pub trait Storage: Send + Sync + Debug {
    /// List all file names in the storage, in unspecified order.
    fn list_all(&self) -> Result<Vec<String>>;

    /// Open an existing file for reading.
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>>;

    /// Create a new file for writing, truncating any existing file.
    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>>;

    /// Check whether a file exists.
    fn file_exists(&self, name: &str) -> bool;

    /// Get the size of a file in bytes.
    fn file_size(&self, name: &str) -> Result<u64>;

    /// Delete a file.
    ///
    /// FileStorage defers the physical unlink while any open input still
    /// references the file; the name disappears from [`Storage::list_all`]
    /// immediately either way.
    fn delete_file(&self, name: &str) -> Result<()>;

    /// Atomically rename a file.
    ///
    /// This is the commit primitive: `pending_segments_N` is renamed to
    /// `segments_N` so readers never observe a partial commit.
    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()>;

    /// Ensure the named files' contents are durable.
    fn sync(&self, names: &[&str]) -> Result<()>;

    /// Ensure directory metadata (creations, renames) is durable.
    fn sync_metadata(&self) -> Result<()>;

    /// Acquire the single-writer lock, failing if it is already held.
    fn obtain_write_lock(&self) -> Result<Box<dyn StorageLock>>;

    /// Close the storage and release resources.
    fn close(&mut self) -> Result<()>;
}

/// A read cursor over one stored file.
///
/// Every input can be cloned; the clone is an independent cursor over the
/// same bytes, which is how per-thread readers share one open file.
/// `Sync` is required so readers holding an input can fan searches out
/// across threads; all mutation goes through `&mut self`.
pub trait StorageInput: Read + Seek + Send + Sync + Debug {
    /// Total length of the file in bytes.
    fn len(&self) -> u64;

    /// Whether the file is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current read position.
    fn position(&mut self) -> Result<u64>;

    /// Clone this input into an independent cursor positioned at 0.
    fn clone_input(&self) -> Result<Box<dyn StorageInput>>;

    /// A view over `[offset, offset + length)` of this file, positioned
    /// at 0.
    fn slice(&self, offset: u64, length: u64) -> Result<Box<dyn StorageInput>> {
        if offset + length > self.len() {
            return Err(crate::error::FalxError::invalid_argument(format!(
                "slice {offset}+{length} past end of file ({})",
                self.len()
            )));
        }
        Ok(Box::new(SlicedInput {
            inner: self.clone_input()?,
            start: offset,
            length,
            pos: 0,
            positioned: false,
        }))
    }

    /// Close the input stream.
    fn close(&mut self) -> Result<()>;
}

/// A windowed view over another input.
#[derive(Debug)]
pub struct SlicedInput {
    inner: Box<dyn StorageInput>,
    start: u64,
    length: u64,
    pos: u64,
    positioned: bool,
}

impl Read for SlicedInput {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if !self.positioned {
            self.inner.seek(std::io::SeekFrom::Start(self.start + self.pos))?;
            self.positioned = true;
        }
        let remaining = self.length.saturating_sub(self.pos);
        if remaining == 0 {
            return Ok(0);
        }
        let take = remaining.min(buf.len() as u64) as usize;
        let n = self.inner.read(&mut buf[..take])?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl std::io::Seek for SlicedInput {
    fn seek(&mut self, pos: std::io::SeekFrom) -> std::io::Result<u64> {
        let target = match pos {
            std::io::SeekFrom::Start(p) => p as i64,
            std::io::SeekFrom::End(p) => self.length as i64 + p,
            std::io::SeekFrom::Current(p) => self.pos as i64 + p,
        };
        if target < 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "seek before start of slice",
            ));
        }
        self.pos = target as u64;
        self.positioned = false;
        Ok(self.pos)
    }
}

impl StorageInput for SlicedInput {
    fn len(&self) -> u64 {
        self.length
    }

    fn position(&mut self) -> Result<u64> {
        Ok(self.pos)
    }

    fn clone_input(&self) -> Result<Box<dyn StorageInput>> {
        Ok(Box::new(SlicedInput {
            inner: self.inner.clone_input()?,
            start: self.start,
            length: self.length,
            pos: 0,
            positioned: false,
        }))
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}

/// A write cursor over one file being created.
pub trait StorageOutput: Write + Send + Debug {
    /// Current write position (= bytes written so far).
    fn position(&self) -> u64;

    /// Flush buffers and fsync to the storage medium.
    fn flush_and_sync(&mut self) -> Result<()>;

    /// Close the output stream.
    fn close(&mut self) -> Result<()>;
}

impl StorageInput for Box<dyn StorageInput> {
    fn len(&self) -> u64 {
        self.as_ref().len()
    }

    fn position(&mut self) -> Result<u64> {
        self.as_mut().position()
    }

    fn clone_input(&self) -> Result<Box<dyn StorageInput>> {
        self.as_ref().clone_input()
    }

    fn close(&mut self) -> Result<()> {
        self.as_mut().close()
    }
}

impl StorageOutput for Box<dyn StorageOutput> {
    fn position(&self) -> u64 {
        self.as_ref().position()
    }

    fn flush_and_sync(&mut self) -> Result<()> {
        self.as_mut().flush_and_sync()
    }

    fn close(&mut self) -> Result<()> {
        self.as_mut().close()
    }
}

/// The held single-writer lock; dropped or released explicitly.
pub trait StorageLock: Send + Debug {
    /// Name of the lock file.
    fn name(&self) -> &str;

    /// Release the lock.
    fn release(&mut self) -> Result<()>;
}

/// Configuration for storage backends.
#[derive(Debug, Clone)]
pub enum StorageConfig {
    /// File-based storage configuration (includes path).
    File(FileStorageConfig),

    /// Memory-based storage configuration.
    Memory(MemoryStorageConfig),
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Memory(MemoryStorageConfig::default())
    }
}

/// Configuration specific to file-based storage.
#[derive(Debug, Clone)]
pub struct FileStorageConfig {
    /// Path to the storage directory.
    pub path: std::path::PathBuf,

    /// Whether to fsync each file as it is closed.
    pub sync_on_close: bool,
}

impl FileStorageConfig {
    /// Create a new config with the given path and default settings.
    pub fn new<P: AsRef<std::path::Path>>(path: P) -> Self {
        FileStorageConfig {
            path: path.as_ref().to_path_buf(),
            sync_on_close: false,
        }
    }
}

/// Configuration specific to memory-based storage.
#[derive(Debug, Clone)]
pub struct MemoryStorageConfig {
    /// Initial capacity hint for the file map.
    pub initial_capacity: usize,
}

impl Default for MemoryStorageConfig {
    fn default() -> Self {
        MemoryStorageConfig {
            initial_capacity: 16,
        }
    }
}

/// A factory for creating storage instances.
pub struct StorageFactory;

impl StorageFactory {
    /// Create a new storage instance with the given configuration.
    pub fn create(config: StorageConfig) -> Result<Box<dyn Storage>> {
        match config {
            StorageConfig::Memory(mem_config) => {
                Ok(Box::new(memory::MemoryStorage::new(mem_config)))
            }
            StorageConfig::File(file_config) => {
                let path = file_config.path.clone();
                Ok(Box::new(file::FileStorage::new(&path, file_config)?))
            }
        }
    }
}

/// Build a segment file name: `<segment>[_<suffix>].<ext>`.
pub fn segment_file_name(segment: &str, suffix: &str, ext: &str) -> String {
    if suffix.is_empty() {
        format!("{segment}.{ext}")
    } else {
        format!("{segment}_{suffix}.{ext}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_file_name() {
        assert_eq!(segment_file_name("_0", "", "doc"), "_0.doc");
        assert_eq!(segment_file_name("_3", "tmp", "tip"), "_3_tmp.tip");
    }

    #[test]
    fn test_storage_config_default() {
        match StorageConfig::default() {
            StorageConfig::Memory(mem) => assert_eq!(mem.initial_capacity, 16),
            _ => panic!("expected memory config"),
        }
    }

    #[test]
    fn test_factory_memory() {
        let storage = StorageFactory::create(StorageConfig::default()).unwrap();
        assert!(!storage.file_exists("segments_1"));
        assert!(storage.list_all().unwrap().is_empty());
    }

    #[test]
    fn test_slice_view() {
        use std::io::Read;

        let storage = StorageFactory::create(StorageConfig::default()).unwrap();
        {
            let mut out = storage.create_output("data").unwrap();
            std::io::Write::write_all(&mut out, b"0123456789").unwrap();
            out.close().unwrap();
        }
        let input = storage.open_input("data").unwrap();
        let mut slice = input.slice(3, 4).unwrap();
        assert_eq!(slice.len(), 4);
        let mut buf = Vec::new();
        slice.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"3456");
        assert!(input.slice(8, 4).is_err());
    }
}

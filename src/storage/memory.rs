//! In-memory storage backend.
//!
//! Files are plain byte vectors behind an `Arc`, so cloned inputs share the
//! same immutable contents. Used by tests and the in-RAM index.

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::error::{FalxError, Result};
use crate::storage::{
    MemoryStorageConfig, Storage, StorageInput, StorageLock, StorageOutput,
};

type FileMap = Arc<RwLock<AHashMap<String, Arc<Vec<u8>>>>>;

/// Memory-backed [`Storage`] implementation.
pub struct MemoryStorage {
    files: FileMap,
    locks: Arc<RwLock<AHashMap<String, ()>>>,
    closed: bool,
}

impl fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStorage")
            .field("files", &self.files.read().len())
            .finish()
    }
}

impl MemoryStorage {
    /// Create a new empty memory storage.
    pub fn new(config: MemoryStorageConfig) -> Self {
        MemoryStorage {
            files: Arc::new(RwLock::new(AHashMap::with_capacity(config.initial_capacity))),
            locks: Arc::new(RwLock::new(AHashMap::new())),
            closed: false,
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(FalxError::already_closed("memory storage"));
        }
        Ok(())
    }
}

impl Storage for MemoryStorage {
    fn list_all(&self) -> Result<Vec<String>> {
        self.check_open()?;
        let mut names: Vec<String> = self.files.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        self.check_open()?;
        let files = self.files.read();
        let data = files
            .get(name)
            .ok_or_else(|| FalxError::storage(format!("file not found: {name}")))?
            .clone();
        Ok(Box::new(MemoryInput {
            name: name.to_string(),
            data,
            pos: 0,
        }))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        self.check_open()?;
        Ok(Box::new(MemoryOutput {
            name: name.to_string(),
            buffer: Vec::new(),
            files: self.files.clone(),
            closed: false,
        }))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.files.read().contains_key(name)
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        let files = self.files.read();
        files
            .get(name)
            .map(|data| data.len() as u64)
            .ok_or_else(|| FalxError::storage(format!("file not found: {name}")))
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.check_open()?;
        self.files
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| FalxError::storage(format!("file not found: {name}")))
    }

    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()> {
        self.check_open()?;
        let mut files = self.files.write();
        let data = files
            .remove(old_name)
            .ok_or_else(|| FalxError::storage(format!("file not found: {old_name}")))?;
        files.insert(new_name.to_string(), data);
        Ok(())
    }

    fn sync(&self, _names: &[&str]) -> Result<()> {
        self.check_open()
    }

    fn sync_metadata(&self) -> Result<()> {
        self.check_open()
    }

    fn obtain_write_lock(&self) -> Result<Box<dyn StorageLock>> {
        self.check_open()?;
        let mut locks = self.locks.write();
        if locks.contains_key("write.lock") {
            return Err(FalxError::storage("write.lock already held"));
        }
        locks.insert("write.lock".to_string(), ());
        Ok(Box::new(MemoryLock {
            name: "write.lock".to_string(),
            locks: self.locks.clone(),
            released: false,
        }))
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

/// Read cursor over an in-memory file.
pub struct MemoryInput {
    name: String,
    data: Arc<Vec<u8>>,
    pos: u64,
}

impl fmt::Debug for MemoryInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemoryInput({}, len={})", self.name, self.data.len())
    }
}

impl Read for MemoryInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let start = self.pos.min(self.data.len() as u64) as usize;
        let n = (self.data.len() - start).min(buf.len());
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for MemoryInput {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::End(p) => self.data.len() as i64 + p,
            SeekFrom::Current(p) => self.pos as i64 + p,
        };
        if new_pos < 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "seek before start"));
        }
        self.pos = new_pos as u64;
        Ok(self.pos)
    }
}

impl StorageInput for MemoryInput {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn position(&mut self) -> Result<u64> {
        Ok(self.pos)
    }

    fn clone_input(&self) -> Result<Box<dyn StorageInput>> {
        Ok(Box::new(MemoryInput {
            name: self.name.clone(),
            data: self.data.clone(),
            pos: 0,
        }))
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Write cursor; contents become visible in the file map on close.
pub struct MemoryOutput {
    name: String,
    buffer: Vec<u8>,
    files: FileMap,
    closed: bool,
}

impl fmt::Debug for MemoryOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemoryOutput({}, len={})", self.name, self.buffer.len())
    }
}

impl Write for MemoryOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl StorageOutput for MemoryOutput {
    fn position(&self) -> u64 {
        self.buffer.len() as u64
    }

    fn flush_and_sync(&mut self) -> Result<()> {
        // publish current contents so readers opened after a sync see them
        self.files
            .write()
            .insert(self.name.clone(), Arc::new(self.buffer.clone()));
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.files
                .write()
                .insert(self.name.clone(), Arc::new(std::mem::take(&mut self.buffer)));
            self.closed = true;
        }
        Ok(())
    }
}

impl Drop for MemoryOutput {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[derive(Debug)]
struct MemoryLock {
    name: String,
    locks: Arc<RwLock<AHashMap<String, ()>>>,
    released: bool,
}

impl StorageLock for MemoryLock {
    fn name(&self) -> &str {
        &self.name
    }

    fn release(&mut self) -> Result<()> {
        if !self.released {
            self.locks.write().remove(&self.name);
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

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> MemoryStorage {
        MemoryStorage::new(MemoryStorageConfig::default())
    }

    #[test]
    fn test_write_then_read() {
        let storage = storage();
        {
            let mut out = storage.create_output("a.bin").unwrap();
            out.write_all(b"hello falx").unwrap();
            out.close().unwrap();
        }
        let mut input = storage.open_input("a.bin").unwrap();
        let mut buf = Vec::new();
        input.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"hello falx");
        assert_eq!(input.len(), 10);
    }

    #[test]
    fn test_rename_is_replace() {
        let storage = storage();
        for (name, contents) in [("pending_segments_1", b"new".as_ref()), ("segments_0", b"old")] {
            let mut out = storage.create_output(name).unwrap();
            out.write_all(contents).unwrap();
            out.close().unwrap();
        }
        storage.rename_file("pending_segments_1", "segments_1").unwrap();
        assert!(!storage.file_exists("pending_segments_1"));
        assert!(storage.file_exists("segments_1"));
    }

    #[test]
    fn test_clone_input_is_independent() {
        let storage = storage();
        let mut out = storage.create_output("x").unwrap();
        out.write_all(&[1, 2, 3, 4]).unwrap();
        out.close().unwrap();

        let mut a = storage.open_input("x").unwrap();
        let mut byte = [0u8; 2];
        a.read_exact(&mut byte).unwrap();

        let mut b = a.clone_input().unwrap();
        let mut all = Vec::new();
        b.read_to_end(&mut all).unwrap();
        assert_eq!(all, vec![1, 2, 3, 4]);
        assert_eq!(a.position().unwrap(), 2);
    }

    #[test]
    fn test_write_lock_exclusive() {
        let storage = storage();
        let lock = storage.obtain_write_lock().unwrap();
        assert!(storage.obtain_write_lock().is_err());
        drop(lock);
        assert!(storage.obtain_write_lock().is_ok());
    }

    #[test]
    fn test_delete_missing_file() {
        let storage = storage();
        assert!(storage.delete_file("nope").is_err());
    }
}
